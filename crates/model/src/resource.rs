use crate::filter::{Attributes, Directives, Filter};
use crate::namespace::{
    BUNDLE_NAMESPACE, BUNDLE_VERSION_ATTRIBUTE, CARDINALITY_DIRECTIVE, CARDINALITY_MULTIPLE,
    EXECUTION_ENVIRONMENT_NAMESPACE, HOST_NAMESPACE, IDENTITY_NAMESPACE, PACKAGE_NAMESPACE,
    RESOLUTION_DIRECTIVE, RESOLUTION_DYNAMIC, RESOLUTION_OPTIONAL, USES_DIRECTIVE,
    VERSION_ATTRIBUTE, VISIBILITY_DIRECTIVE, VISIBILITY_REEXPORT,
};
use crate::value::{Value, Version};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

#[derive(Debug)]
struct CapabilityData {
    namespace: String,
    attributes: Attributes,
    directives: Directives,
}

#[derive(Debug)]
struct RequirementData {
    namespace: String,
    filter: Filter,
    directives: Directives,
}

#[derive(Debug)]
struct ResourceData {
    id: u64,
    capabilities: Vec<CapabilityData>,
    requirements: Vec<RequirementData>,
}

#[derive(Debug)]
struct WrappedData {
    host: Resource,
    fragments: Vec<Resource>,
}

/// A module: an identified unit declaring capabilities and requirements.
///
/// Cheap to clone. A resource is either *declared* (as built by the caller)
/// or a *wrapped host* — the synthetic merge of a host with its attached
/// fragments. Wrapped hosts generate their capability and requirement views
/// on demand, re-homed to the wrap, so the handle graph stays acyclic.
#[derive(Debug, Clone)]
pub struct Resource {
    inner: Inner,
}

#[derive(Debug, Clone)]
enum Inner {
    Declared(Arc<ResourceData>),
    Wrapped(Arc<WrappedData>),
}

impl Resource {
    /// Synthetic resource merging `host` with its attached fragments.
    pub fn wrapped(host: Resource, fragments: Vec<Resource>) -> Resource {
        Resource {
            inner: Inner::Wrapped(Arc::new(WrappedData { host, fragments })),
        }
    }

    fn data(&self) -> &Arc<ResourceData> {
        match &self.inner {
            Inner::Declared(data) => data,
            Inner::Wrapped(wrapped) => wrapped.host.data(),
        }
    }

    fn key(&self) -> (u8, u64) {
        match &self.inner {
            Inner::Declared(data) => (0, data.id),
            Inner::Wrapped(wrapped) => (1, wrapped.host.id()),
        }
    }

    /// Caller-assigned identity; a wrapped host shares its host's id.
    pub fn id(&self) -> u64 {
        self.data().id
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(&self.inner, Inner::Wrapped(_))
    }

    /// The declared resource: `self` for declared resources, the host for
    /// wrapped hosts.
    pub fn declared(&self) -> &Resource {
        match &self.inner {
            Inner::Declared(_) => self,
            Inner::Wrapped(wrapped) => &wrapped.host,
        }
    }

    /// Attached fragments, for a wrapped host.
    pub fn fragments(&self) -> Option<&[Resource]> {
        match &self.inner {
            Inner::Declared(_) => None,
            Inner::Wrapped(wrapped) => Some(&wrapped.fragments),
        }
    }

    /// Declared capabilities; for a wrapped host, the host's capabilities
    /// plus each fragment's non-identity capabilities, re-homed to the wrap.
    pub fn capabilities(&self) -> Vec<Capability> {
        match &self.inner {
            Inner::Declared(data) => (0..data.capabilities.len())
                .map(|index| Capability::Declared {
                    resource: self.clone(),
                    index,
                })
                .collect(),
            Inner::Wrapped(wrapped) => {
                let mut capabilities = Vec::new();
                for capability in wrapped.host.capabilities() {
                    capabilities.push(Capability::hosted(self.clone(), capability));
                }
                for fragment in &wrapped.fragments {
                    for capability in fragment.capabilities() {
                        if capability.namespace() != IDENTITY_NAMESPACE {
                            capabilities.push(Capability::hosted(self.clone(), capability));
                        }
                    }
                }
                capabilities
            }
        }
    }

    pub fn capabilities_in(&self, namespace: &str) -> Vec<Capability> {
        self.capabilities()
            .into_iter()
            .filter(|c| c.namespace() == namespace)
            .collect()
    }

    /// Declared requirements; for a wrapped host, the host's requirements
    /// plus each fragment's payload requirements, re-homed to the wrap.
    /// Host and execution-environment requirements are not payload and stay
    /// with the fragment.
    pub fn requirements(&self) -> Vec<Requirement> {
        match &self.inner {
            Inner::Declared(data) => (0..data.requirements.len())
                .map(|index| Requirement::Declared {
                    resource: self.clone(),
                    index,
                })
                .collect(),
            Inner::Wrapped(wrapped) => {
                let mut requirements = Vec::new();
                for requirement in wrapped.host.requirements() {
                    requirements.push(Requirement::wrapped(self.clone(), requirement));
                }
                for fragment in &wrapped.fragments {
                    for requirement in fragment.requirements() {
                        let namespace = requirement.namespace();
                        if namespace != HOST_NAMESPACE
                            && namespace != EXECUTION_ENVIRONMENT_NAMESPACE
                        {
                            requirements.push(Requirement::wrapped(self.clone(), requirement));
                        }
                    }
                }
                requirements
            }
        }
    }

    pub fn requirements_in(&self, namespace: &str) -> Vec<Requirement> {
        self.requirements()
            .into_iter()
            .filter(|r| r.namespace() == namespace)
            .collect()
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Resource {}

impl Hash for Resource {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let declared = self.declared();
        match crate::namespace::symbolic_name(declared) {
            Some(name) => write!(f, "{}/{}", name, crate::namespace::version(declared)),
            None => write!(f, "resource#{}", self.id()),
        }
    }
}

/// A typed assertion a resource provides.
///
/// `Hosted` re-homes a declared capability to a wrapped host (or to the host
/// resource itself, for capabilities inherited from fragments). Identity is
/// structural: two wrappers of the same declared capability with the same
/// owner compare equal.
#[derive(Debug, Clone)]
pub enum Capability {
    Declared { resource: Resource, index: usize },
    Hosted { owner: Resource, declared: Arc<Capability> },
}

impl Capability {
    /// Re-homes `declared` to `owner`. Nested wrappers are flattened.
    pub fn hosted(owner: Resource, declared: Capability) -> Capability {
        Capability::Hosted {
            owner,
            declared: Arc::new(declared.declared().clone()),
        }
    }

    fn data(&self) -> &CapabilityData {
        match self {
            Capability::Declared { resource, index } => &resource.data().capabilities[*index],
            Capability::Hosted { declared, .. } => declared.data(),
        }
    }

    fn declared_parts(&self) -> (&Resource, usize) {
        match self {
            Capability::Declared { resource, index } => (resource, *index),
            Capability::Hosted { declared, .. } => declared.declared_parts(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.data().namespace
    }

    pub fn attributes(&self) -> &Attributes {
        &self.data().attributes
    }

    pub fn directives(&self) -> &Directives {
        &self.data().directives
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.data().attributes.get(key)
    }

    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    /// Package name, for capabilities in the package namespace.
    pub fn package_name(&self) -> Option<&str> {
        self.attr_str(PACKAGE_NAMESPACE)
    }

    /// The raw `uses` directive, if present and non-empty.
    pub fn uses(&self) -> Option<&str> {
        self.data()
            .directives
            .get(USES_DIRECTIVE)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// The resource this capability belongs to, wrap-aware.
    pub fn resource(&self) -> &Resource {
        match self {
            Capability::Declared { resource, .. } => resource,
            Capability::Hosted { owner, .. } => owner,
        }
    }

    /// The underlying declared capability.
    pub fn declared(&self) -> &Capability {
        match self {
            Capability::Declared { .. } => self,
            Capability::Hosted { declared, .. } => declared,
        }
    }

    pub fn declared_resource(&self) -> &Resource {
        self.declared_parts().0
    }

    pub fn is_hosted(&self) -> bool {
        matches!(self, Capability::Hosted { .. })
    }
}

impl PartialEq for Capability {
    fn eq(&self, other: &Self) -> bool {
        let (a_res, a_idx) = self.declared_parts();
        let (b_res, b_idx) = other.declared_parts();
        self.resource() == other.resource() && a_res == b_res && a_idx == b_idx
    }
}

impl Eq for Capability {}

impl Hash for Capability {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (res, idx) = self.declared_parts();
        self.resource().key().hash(state);
        res.key().hash(state);
        idx.hash(state);
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.namespace())?;
        for (key, value) in self.attributes() {
            write!(f, "; {}={}", key, value)?;
        }
        Ok(())
    }
}

/// A typed demand a resource makes, matched by filter against capabilities
/// of the same namespace.
#[derive(Debug, Clone)]
pub enum Requirement {
    Declared { resource: Resource, index: usize },
    Wrapped { owner: Resource, declared: Arc<Requirement> },
}

impl Requirement {
    /// Re-homes `declared` to `owner`. Nested wrappers are flattened.
    pub fn wrapped(owner: Resource, declared: Requirement) -> Requirement {
        Requirement::Wrapped {
            owner,
            declared: Arc::new(declared.declared().clone()),
        }
    }

    fn data(&self) -> &RequirementData {
        match self {
            Requirement::Declared { resource, index } => &resource.data().requirements[*index],
            Requirement::Wrapped { declared, .. } => declared.data(),
        }
    }

    fn declared_parts(&self) -> (&Resource, usize) {
        match self {
            Requirement::Declared { resource, index } => (resource, *index),
            Requirement::Wrapped { declared, .. } => declared.declared_parts(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.data().namespace
    }

    pub fn filter(&self) -> &Filter {
        &self.data().filter
    }

    pub fn directives(&self) -> &Directives {
        &self.data().directives
    }

    pub fn directive(&self, key: &str) -> Option<&str> {
        self.data().directives.get(key).map(String::as_str)
    }

    /// The resource this requirement belongs to, wrap-aware.
    pub fn resource(&self) -> &Resource {
        match self {
            Requirement::Declared { resource, .. } => resource,
            Requirement::Wrapped { owner, .. } => owner,
        }
    }

    /// The underlying declared requirement.
    pub fn declared(&self) -> &Requirement {
        match self {
            Requirement::Declared { .. } => self,
            Requirement::Wrapped { declared, .. } => declared,
        }
    }

    pub fn declared_resource(&self) -> &Resource {
        self.declared_parts().0
    }

    pub fn is_wrapped(&self) -> bool {
        matches!(self, Requirement::Wrapped { .. })
    }

    /// Namespace and filter match against a capability.
    pub fn matches(&self, capability: &Capability) -> bool {
        self.namespace() == capability.namespace()
            && self.filter().matches(capability.attributes())
    }
}

impl PartialEq for Requirement {
    fn eq(&self, other: &Self) -> bool {
        let (a_res, a_idx) = self.declared_parts();
        let (b_res, b_idx) = other.declared_parts();
        self.resource() == other.resource() && a_res == b_res && a_idx == b_idx
    }
}

impl Eq for Requirement {}

impl Hash for Requirement {
    fn hash<H: Hasher>(&self, state: &mut H) {
        let (res, idx) = self.declared_parts();
        self.resource().key().hash(state);
        res.key().hash(state);
        idx.hash(state);
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}; filter:={}", self.namespace(), self.filter())
    }
}

/// Builds a declared resource. The identity capability is always first.
pub struct ResourceBuilder {
    id: u64,
    symbolic_name: String,
    version: Version,
    capabilities: Vec<CapabilityData>,
    requirements: Vec<RequirementData>,
}

impl ResourceBuilder {
    pub fn new(id: u64, symbolic_name: &str, version: Version) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(IDENTITY_NAMESPACE.to_string(), Value::str(symbolic_name));
        attributes.insert(
            VERSION_ATTRIBUTE.to_string(),
            Value::Version(version.clone()),
        );
        Self {
            id,
            symbolic_name: symbolic_name.to_string(),
            version,
            capabilities: vec![CapabilityData {
                namespace: IDENTITY_NAMESPACE.to_string(),
                attributes,
                directives: Directives::new(),
            }],
            requirements: Vec::new(),
        }
    }

    pub fn capability(
        mut self,
        namespace: &str,
        attributes: Attributes,
        directives: Directives,
    ) -> Self {
        self.capabilities.push(CapabilityData {
            namespace: namespace.to_string(),
            attributes,
            directives,
        });
        self
    }

    pub fn requirement(mut self, namespace: &str, filter: Filter, directives: Directives) -> Self {
        self.requirements.push(RequirementData {
            namespace: namespace.to_string(),
            filter,
            directives,
        });
        self
    }

    /// Package export, with its `uses` constraint.
    pub fn export_package(self, name: &str, version: Version, uses: &[&str]) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(PACKAGE_NAMESPACE.to_string(), Value::str(name));
        attributes.insert(VERSION_ATTRIBUTE.to_string(), Value::Version(version));
        let mut directives = Directives::new();
        if !uses.is_empty() {
            directives.insert(USES_DIRECTIVE.to_string(), uses.join(","));
        }
        self.capability(PACKAGE_NAMESPACE, attributes, directives)
    }

    /// Package import at any version.
    pub fn import_package(self, name: &str) -> Self {
        self.requirement(
            PACKAGE_NAMESPACE,
            Filter::Eq(PACKAGE_NAMESPACE.to_string(), Value::str(name)),
            Directives::new(),
        )
    }

    /// Package import constrained to `[min, max)`.
    pub fn import_package_range(self, name: &str, min: Version, max: Option<Version>) -> Self {
        self.requirement(
            PACKAGE_NAMESPACE,
            Filter::And(vec![
                Filter::Eq(PACKAGE_NAMESPACE.to_string(), Value::str(name)),
                Filter::version_range(VERSION_ATTRIBUTE, min, max),
            ]),
            Directives::new(),
        )
    }

    pub fn optional_import_package(self, name: &str) -> Self {
        let mut directives = Directives::new();
        directives.insert(
            RESOLUTION_DIRECTIVE.to_string(),
            RESOLUTION_OPTIONAL.to_string(),
        );
        self.requirement(
            PACKAGE_NAMESPACE,
            Filter::Eq(PACKAGE_NAMESPACE.to_string(), Value::str(name)),
            directives,
        )
    }

    /// Dynamic package import; `None` is the wildcard form.
    pub fn dynamic_import(self, name: Option<&str>) -> Self {
        let mut directives = Directives::new();
        directives.insert(
            RESOLUTION_DIRECTIVE.to_string(),
            RESOLUTION_DYNAMIC.to_string(),
        );
        let filter = match name {
            Some(name) => Filter::Eq(PACKAGE_NAMESPACE.to_string(), Value::str(name)),
            None => Filter::Any,
        };
        self.requirement(PACKAGE_NAMESPACE, filter, directives)
    }

    /// Bundle capability mirroring the resource identity.
    pub fn provide_bundle(self) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(BUNDLE_NAMESPACE.to_string(), Value::str(&self.symbolic_name));
        attributes.insert(
            BUNDLE_VERSION_ATTRIBUTE.to_string(),
            Value::Version(self.version.clone()),
        );
        self.capability(BUNDLE_NAMESPACE, attributes, Directives::new())
    }

    pub fn require_bundle(self, name: &str, reexport: bool) -> Self {
        let mut directives = Directives::new();
        if reexport {
            directives.insert(
                VISIBILITY_DIRECTIVE.to_string(),
                VISIBILITY_REEXPORT.to_string(),
            );
        }
        self.requirement(
            BUNDLE_NAMESPACE,
            Filter::Eq(BUNDLE_NAMESPACE.to_string(), Value::str(name)),
            directives,
        )
    }

    /// Multiple-cardinality requirement in an arbitrary namespace.
    pub fn require_multiple(self, namespace: &str, filter: Filter) -> Self {
        let mut directives = Directives::new();
        directives.insert(
            CARDINALITY_DIRECTIVE.to_string(),
            CARDINALITY_MULTIPLE.to_string(),
        );
        self.requirement(namespace, filter, directives)
    }

    /// Host capability: this resource accepts fragments.
    pub fn host_capability(self) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert(HOST_NAMESPACE.to_string(), Value::str(&self.symbolic_name));
        attributes.insert(
            BUNDLE_VERSION_ATTRIBUTE.to_string(),
            Value::Version(self.version.clone()),
        );
        self.capability(HOST_NAMESPACE, attributes, Directives::new())
    }

    /// Host requirement: this resource is a fragment of `host_name`.
    pub fn fragment_host(self, host_name: &str) -> Self {
        self.requirement(
            HOST_NAMESPACE,
            Filter::Eq(HOST_NAMESPACE.to_string(), Value::str(host_name)),
            Directives::new(),
        )
    }

    pub fn build(self) -> Resource {
        Resource {
            inner: Inner::Declared(Arc::new(ResourceData {
                id: self.id,
                capabilities: self.capabilities,
                requirements: self.requirements,
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::namespace;
    use pretty_assertions::{assert_eq, assert_ne};

    fn host_and_fragment() -> (Resource, Resource) {
        let host = ResourceBuilder::new(1, "host", Version::new(1, 0, 0))
            .host_capability()
            .export_package("h", Version::new(1, 0, 0), &[])
            .build();
        let fragment = ResourceBuilder::new(2, "frag", Version::new(1, 0, 0))
            .fragment_host("host")
            .export_package("f", Version::new(1, 0, 0), &[])
            .build();
        (host, fragment)
    }

    #[test]
    fn test_builder_identity_first() {
        let resource = ResourceBuilder::new(7, "a.b.c", Version::new(2, 1, 0)).build();
        let caps = resource.capabilities();
        assert_eq!(caps.len(), 1);
        assert_eq!(caps[0].namespace(), IDENTITY_NAMESPACE);
        assert_eq!(namespace::symbolic_name(&resource).as_deref(), Some("a.b.c"));
        assert_eq!(namespace::version(&resource), Version::new(2, 1, 0));
    }

    #[test]
    fn test_fragment_predicate() {
        let (host, fragment) = host_and_fragment();
        assert!(!namespace::is_fragment(&host));
        assert!(namespace::is_fragment(&fragment));
    }

    #[test]
    fn test_requirement_matches_export() {
        let (host, fragment) = host_and_fragment();
        let host_req = fragment.requirements_in(HOST_NAMESPACE).remove(0);
        let host_cap = host.capabilities_in(HOST_NAMESPACE).remove(0);
        assert!(host_req.matches(&host_cap));

        let import = ResourceBuilder::new(3, "b", Version::new(1, 0, 0))
            .import_package_range("h", Version::new(0, 5, 0), Some(Version::new(2, 0, 0)))
            .build()
            .requirements_in(PACKAGE_NAMESPACE)
            .remove(0);
        let export = host.capabilities_in(PACKAGE_NAMESPACE).remove(0);
        assert!(import.matches(&export));
    }

    #[test]
    fn test_wrapped_host_merges_fragment() {
        let (host, fragment) = host_and_fragment();
        let wrap = Resource::wrapped(host.clone(), vec![fragment.clone()]);

        assert!(wrap.is_wrapped());
        assert_eq!(wrap.declared(), &host);
        assert_ne!(wrap, host);

        let packages: Vec<String> = wrap
            .capabilities_in(PACKAGE_NAMESPACE)
            .iter()
            .filter_map(|c| c.package_name().map(str::to_string))
            .collect();
        assert_eq!(packages, vec!["h".to_string(), "f".to_string()]);

        // The fragment's host requirement is not payload and stays behind.
        assert!(wrap.requirements_in(HOST_NAMESPACE).is_empty());

        for capability in wrap.capabilities() {
            assert_eq!(capability.resource(), &wrap);
        }
    }

    #[test]
    fn test_hosted_capability_identity_is_structural() {
        let (host, fragment) = host_and_fragment();
        let wrap = Resource::wrapped(host, vec![fragment]);
        let first = wrap.capabilities_in(PACKAGE_NAMESPACE).remove(1);
        let second = wrap.capabilities_in(PACKAGE_NAMESPACE).remove(1);
        assert_eq!(first, second);
        assert_ne!(&first, first.declared());
        assert_eq!(first.declared().package_name(), Some("f"));
    }
}
