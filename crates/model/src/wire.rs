use crate::resource::{Capability, Requirement, Resource};
use std::fmt;

/// A realised edge: `requirer` satisfies `requirement` through `provider`'s
/// `capability`. All four refer to declared entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wire {
    requirer: Resource,
    requirement: Requirement,
    provider: Resource,
    capability: Capability,
}

impl Wire {
    pub fn new(
        requirer: Resource,
        requirement: Requirement,
        provider: Resource,
        capability: Capability,
    ) -> Self {
        Self {
            requirer,
            requirement,
            provider,
            capability,
        }
    }

    pub fn requirer(&self) -> &Resource {
        &self.requirer
    }

    pub fn requirement(&self) -> &Requirement {
        &self.requirement
    }

    pub fn provider(&self) -> &Resource {
        &self.provider
    }

    pub fn capability(&self) -> &Capability {
        &self.capability
    }
}

impl fmt::Display for Wire {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            self.requirer, self.provider, self.capability
        )
    }
}

/// An already-resolved resource's realised state: its effective capabilities
/// and requirements (after fragment attachment and export substitution) and
/// the wires satisfying its requirements.
#[derive(Debug, Clone)]
pub struct Wiring {
    resource: Resource,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
    wires: Vec<Wire>,
}

impl Wiring {
    pub fn new(
        resource: Resource,
        capabilities: Vec<Capability>,
        requirements: Vec<Requirement>,
        wires: Vec<Wire>,
    ) -> Self {
        Self {
            resource,
            capabilities,
            requirements,
            wires,
        }
    }

    /// Wiring for a freshly resolved resource: effective capabilities and
    /// requirements are the declared ones.
    pub fn from_wires(resource: Resource, wires: Vec<Wire>) -> Self {
        let capabilities = resource.capabilities();
        let requirements = resource.requirements();
        Self {
            resource,
            capabilities,
            requirements,
            wires,
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.resource
    }

    pub fn resource_capabilities(&self, namespace: Option<&str>) -> Vec<Capability> {
        self.capabilities
            .iter()
            .filter(|c| namespace.map(|ns| c.namespace() == ns).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn resource_requirements(&self, namespace: Option<&str>) -> Vec<Requirement> {
        self.requirements
            .iter()
            .filter(|r| namespace.map(|ns| r.namespace() == ns).unwrap_or(true))
            .cloned()
            .collect()
    }

    pub fn required_wires(&self, namespace: Option<&str>) -> Vec<Wire> {
        self.wires
            .iter()
            .filter(|w| {
                namespace
                    .map(|ns| w.requirement().namespace() == ns)
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }
}
