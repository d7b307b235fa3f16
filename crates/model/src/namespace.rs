//! Namespace and directive vocabulary plus the predicates derived from it.

use crate::resource::{Requirement, Resource};
use crate::value::Version;

pub const PACKAGE_NAMESPACE: &str = "osgi.wiring.package";
pub const BUNDLE_NAMESPACE: &str = "osgi.wiring.bundle";
pub const HOST_NAMESPACE: &str = "osgi.wiring.host";
pub const IDENTITY_NAMESPACE: &str = "osgi.identity";
pub const EXECUTION_ENVIRONMENT_NAMESPACE: &str = "osgi.ee";

/// Prefix shared by the package, bundle, and host namespaces. Self-wires are
/// suppressed in these namespaces.
pub const WIRING_NAMESPACE_PREFIX: &str = "osgi.wiring.";

pub const RESOLUTION_DIRECTIVE: &str = "resolution";
pub const RESOLUTION_OPTIONAL: &str = "optional";
pub const RESOLUTION_DYNAMIC: &str = "dynamic";
pub const CARDINALITY_DIRECTIVE: &str = "cardinality";
pub const CARDINALITY_MULTIPLE: &str = "multiple";
pub const VISIBILITY_DIRECTIVE: &str = "visibility";
pub const VISIBILITY_REEXPORT: &str = "reexport";
pub const EFFECTIVE_DIRECTIVE: &str = "effective";
pub const EFFECTIVE_RESOLVE: &str = "resolve";
pub const USES_DIRECTIVE: &str = "uses";

pub const VERSION_ATTRIBUTE: &str = "version";
pub const BUNDLE_VERSION_ATTRIBUTE: &str = "bundle-version";

/// A fragment is a resource with a host requirement.
pub fn is_fragment(resource: &Resource) -> bool {
    !resource.declared().requirements_in(HOST_NAMESPACE).is_empty()
}

pub fn is_optional(req: &Requirement) -> bool {
    req.directive(RESOLUTION_DIRECTIVE) == Some(RESOLUTION_OPTIONAL)
}

pub fn is_dynamic(req: &Requirement) -> bool {
    req.directive(RESOLUTION_DIRECTIVE) == Some(RESOLUTION_DYNAMIC)
}

pub fn is_multiple(req: &Requirement) -> bool {
    req.directive(CARDINALITY_DIRECTIVE) == Some(CARDINALITY_MULTIPLE)
}

pub fn is_reexport(req: &Requirement) -> bool {
    req.directive(VISIBILITY_DIRECTIVE) == Some(VISIBILITY_REEXPORT)
}

/// Whether a requirement takes part in resolution, per its `effective`
/// directive. Contexts are free to widen this.
pub fn is_effective_at_resolve(req: &Requirement) -> bool {
    match req.directive(EFFECTIVE_DIRECTIVE) {
        None => true,
        Some(effective) => effective == EFFECTIVE_RESOLVE,
    }
}

/// Symbolic name from the identity capability, if the resource declares one.
pub fn symbolic_name(resource: &Resource) -> Option<String> {
    let declared = resource.declared();
    declared
        .capabilities_in(IDENTITY_NAMESPACE)
        .first()
        .and_then(|cap| cap.attr_str(IDENTITY_NAMESPACE).map(str::to_string))
}

/// Version from the identity capability, `0.0.0` when absent.
pub fn version(resource: &Resource) -> Version {
    let declared = resource.declared();
    declared
        .capabilities_in(IDENTITY_NAMESPACE)
        .first()
        .and_then(|cap| cap.attr(VERSION_ATTRIBUTE).cloned())
        .and_then(|value| value.as_version().cloned())
        .unwrap_or_default()
}
