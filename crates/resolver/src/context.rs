use crate::ordering::compare_candidates;
use std::cmp::Ordering;
use std::collections::HashMap;
use weft_model::namespace;
use weft_model::{Capability, Requirement, ResolveContext, Resource, Wiring};

/// A [`ResolveContext`] over a fixed set of resources.
///
/// Providers are found by matching every known resource's capabilities
/// against the requirement and ranking them with
/// [`compare_candidates`]: resolved providers first, then the namespace
/// tie-breaks, then provider id. Hosted capabilities are inserted keeping
/// that order.
#[derive(Default)]
pub struct StaticResolveContext {
    mandatory: Vec<Resource>,
    optional: Vec<Resource>,
    repository: Vec<Resource>,
    wirings: HashMap<Resource, Wiring>,
}

impl StaticResolveContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource that is only available as a provider.
    pub fn add_resource(&mut self, resource: Resource) {
        if !self.repository.contains(&resource) {
            self.repository.push(resource);
        }
    }

    pub fn add_mandatory(&mut self, resource: Resource) {
        self.add_resource(resource.clone());
        self.mandatory.push(resource);
    }

    pub fn add_optional(&mut self, resource: Resource) {
        self.add_resource(resource.clone());
        self.optional.push(resource);
    }

    /// Registers existing resolved state. The wiring's resource also joins
    /// the provider repository.
    pub fn add_wiring(&mut self, wiring: Wiring) {
        self.add_resource(wiring.resource().clone());
        self.wirings.insert(wiring.resource().clone(), wiring);
    }

    fn is_resolved(&self, resource: &Resource) -> bool {
        self.wirings.contains_key(resource.declared())
    }
}

impl ResolveContext for StaticResolveContext {
    fn mandatory_resources(&self) -> Vec<Resource> {
        self.mandatory.clone()
    }

    fn optional_resources(&self) -> Vec<Resource> {
        self.optional.clone()
    }

    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability> {
        let mut providers = Vec::new();
        for resource in &self.repository {
            let capabilities = match self.wirings.get(resource) {
                Some(wiring) => wiring.resource_capabilities(None),
                None => resource.capabilities(),
            };
            for capability in capabilities {
                if requirement.matches(&capability) {
                    providers.push(capability);
                }
            }
        }
        providers.sort_by(|a, b| {
            compare_candidates(
                a,
                self.is_resolved(a.resource()),
                b,
                self.is_resolved(b.resource()),
            )
        });
        providers
    }

    fn wiring(&self, resource: &Resource) -> Option<&Wiring> {
        self.wirings.get(resource)
    }

    fn insert_hosted_capability(
        &self,
        capabilities: &mut Vec<Capability>,
        hosted: &Capability,
    ) -> usize {
        let hosted_resolved = self.is_resolved(hosted.resource());
        let index = capabilities
            .iter()
            .position(|existing| {
                compare_candidates(
                    hosted,
                    hosted_resolved,
                    existing,
                    self.is_resolved(existing.resource()),
                ) == Ordering::Less
            })
            .unwrap_or(capabilities.len());
        capabilities.insert(index, hosted.clone());
        index
    }

    fn is_effective(&self, requirement: &Requirement) -> bool {
        namespace::is_effective_at_resolve(requirement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_model::namespace::PACKAGE_NAMESPACE;
    use weft_model::{ResourceBuilder, Version};

    #[test]
    fn test_find_providers_ranked_by_version_then_id() {
        let old = ResourceBuilder::new(3, "old", Version::new(1, 0, 0))
            .export_package("x", Version::new(1, 0, 0), &[])
            .build();
        let new = ResourceBuilder::new(2, "new", Version::new(1, 0, 0))
            .export_package("x", Version::new(2, 0, 0), &[])
            .build();
        let importer = ResourceBuilder::new(1, "importer", Version::new(1, 0, 0))
            .import_package("x")
            .build();

        let mut ctx = StaticResolveContext::new();
        ctx.add_resource(old.clone());
        ctx.add_resource(new.clone());
        ctx.add_mandatory(importer.clone());

        let requirement = importer.requirements_in(PACKAGE_NAMESPACE).remove(0);
        let providers = ctx.find_providers(&requirement);
        assert_eq!(providers.len(), 2);
        assert_eq!(providers[0].resource(), &new);
        assert_eq!(providers[1].resource(), &old);
    }

    #[test]
    fn test_effective_directive_gates_requirements() {
        let mut directives = weft_model::Directives::new();
        directives.insert("effective".to_string(), "active".to_string());
        let resource = ResourceBuilder::new(1, "r", Version::new(1, 0, 0))
            .requirement(
                PACKAGE_NAMESPACE,
                weft_model::Filter::Any,
                directives,
            )
            .build();
        let ctx = StaticResolveContext::new();
        let requirement = resource.requirements_in(PACKAGE_NAMESPACE).remove(0);
        assert!(!ctx.is_effective(&requirement));
    }
}
