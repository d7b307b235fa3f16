use crate::resource::{Capability, Requirement, Resource};
use crate::wire::Wiring;

/// The contract a caller implements to drive a resolve.
///
/// The resolver consults the context read-only, except for
/// [`insert_hosted_capability`](ResolveContext::insert_hosted_capability),
/// which must be deterministic for equal inputs. Candidate ordering returned
/// by [`find_providers`](ResolveContext::find_providers) is authoritative:
/// the resolver preserves it and treats index 0 as the preferred choice.
pub trait ResolveContext {
    /// Resources that must resolve; failure to resolve any of them fails the
    /// whole resolve.
    fn mandatory_resources(&self) -> Vec<Resource>;

    /// Resources resolved on a best-effort basis.
    fn optional_resources(&self) -> Vec<Resource> {
        Vec::new()
    }

    /// Capabilities satisfying `requirement`, highest preference first.
    fn find_providers(&self, requirement: &Requirement) -> Vec<Capability>;

    /// Existing resolved state for `resource`, if any.
    fn wiring(&self, resource: &Resource) -> Option<&Wiring>;

    /// Ranks a fragment-hosted capability among already-found candidates.
    /// Implementations insert `hosted` into `capabilities` and return the
    /// insertion index. The default appends.
    fn insert_hosted_capability(
        &self,
        capabilities: &mut Vec<Capability>,
        hosted: &Capability,
    ) -> usize {
        capabilities.push(hosted.clone());
        capabilities.len() - 1
    }

    /// Gate for requirements whose `effective` directive excludes resolve
    /// time. The default considers every requirement effective.
    fn is_effective(&self, _requirement: &Requirement) -> bool {
        true
    }
}
