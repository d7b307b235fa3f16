use std::cmp::Ordering;
use weft_model::namespace::{
    BUNDLE_NAMESPACE, BUNDLE_VERSION_ATTRIBUTE, PACKAGE_NAMESPACE, VERSION_ATTRIBUTE,
};
use weft_model::{Capability, Version};

/// Preference order between two candidates for the same requirement.
///
/// Resolved providers rank before unresolved ones. Bundle candidates
/// tie-break on symbolic name ascending then version descending; package
/// candidates on package name ascending then version descending. Provider id
/// ascending decides the rest.
pub fn compare_candidates(
    a: &Capability,
    a_resolved: bool,
    b: &Capability,
    b_resolved: bool,
) -> Ordering {
    match (a_resolved, b_resolved) {
        (true, false) => return Ordering::Less,
        (false, true) => return Ordering::Greater,
        _ => {}
    }

    let mut order = Ordering::Equal;
    if a.namespace() == BUNDLE_NAMESPACE && b.namespace() == BUNDLE_NAMESPACE {
        order = name_of(a, BUNDLE_NAMESPACE)
            .cmp(name_of(b, BUNDLE_NAMESPACE))
            .then_with(|| {
                version_of(b, BUNDLE_VERSION_ATTRIBUTE).cmp(&version_of(a, BUNDLE_VERSION_ATTRIBUTE))
            });
    } else if a.namespace() == PACKAGE_NAMESPACE && b.namespace() == PACKAGE_NAMESPACE {
        order = name_of(a, PACKAGE_NAMESPACE)
            .cmp(name_of(b, PACKAGE_NAMESPACE))
            .then_with(|| version_of(b, VERSION_ATTRIBUTE).cmp(&version_of(a, VERSION_ATTRIBUTE)));
    }

    order.then_with(|| a.resource().id().cmp(&b.resource().id()))
}

fn name_of<'a>(capability: &'a Capability, key: &str) -> &'a str {
    capability.attr_str(key).unwrap_or("")
}

fn version_of(capability: &Capability, key: &str) -> Version {
    capability
        .attr(key)
        .and_then(|value| value.as_version())
        .cloned()
        .unwrap_or_default()
}
