//! Renders uses-constraint violations as dependency-chain explanations.

use crate::candidates::Candidates;
use crate::error::ResolutionError;
use crate::packages::Blame;
use crate::session::ResolveSession;
use std::fmt::Write;
use weft_model::namespace::{self, PACKAGE_NAMESPACE};
use weft_model::{Capability, Requirement, ResolveContext, Resource};

/// A resource exports a package and is also exposed to it through a uses
/// chain from another provider.
pub(crate) fn export_conflict_error<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    resource: &Resource,
    package: &str,
    used_blame: &Blame,
) -> ResolutionError {
    let exposing = used_blame.capability.resource();
    let message = format!(
        "Uses constraint violation. Unable to resolve resource {} [{}] because it \
         exports package '{}' and is also exposed to it from resource {} [{}] via \
         the following dependency chain:\n\n{}",
        display_name(resource),
        resource,
        package,
        display_name(exposing),
        exposing,
        format_blame_chain(session, candidates, used_blame),
    );
    ResolutionError::UsesConflict {
        message,
        requirements: Vec::new(),
    }
}

/// A resource is exposed to one package from two providers through two
/// dependency chains. Covers both fragment-import conflicts and
/// import/require-vs-used conflicts.
pub(crate) fn chain_conflict_error<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    resource: &Resource,
    package: &str,
    blame1: &Blame,
    blame2: &Blame,
) -> ResolutionError {
    let provider1 = blame1.capability.resource();
    let provider2 = blame2.capability.resource();
    let message = format!(
        "Uses constraint violation. Unable to resolve resource {} [{}] because it is \
         exposed to package '{}' from resources {} [{}] and {} [{}] via two dependency \
         chains.\n\nChain 1:\n{}\n\nChain 2:\n{}",
        display_name(resource),
        resource,
        package,
        display_name(provider1),
        provider1,
        display_name(provider2),
        provider2,
        format_blame_chain(session, candidates, blame1),
        format_blame_chain(session, candidates, blame2),
    );
    ResolutionError::UsesConflict {
        message,
        requirements: blame2.root().cloned().into_iter().collect(),
    }
}

fn display_name(resource: &Resource) -> String {
    namespace::symbolic_name(resource.declared())
        .unwrap_or_else(|| format!("resource#{}", resource.id()))
}

/// One chain, rendered as alternating requirement and capability steps:
///
/// ```text
///   consumer [consumer/1.0.0]
///     import: (osgi.wiring.package=p)
///      |
///     export: osgi.wiring.package=p; uses:=q
///   provider [provider/1.0.0]
/// ```
fn format_blame_chain<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    blame: &Blame,
) -> String {
    let mut out = String::new();
    if blame.requirements.is_empty() {
        let _ = write!(out, "{}", blame.capability.resource());
        return out;
    }
    let last_index = blame.requirements.len() - 1;
    for (i, requirement) in blame.requirements.iter().enumerate() {
        let owner = requirement.resource();
        let _ = writeln!(out, "  {} [{}]", display_name(owner), owner);
        let demand = if requirement.namespace() == PACKAGE_NAMESPACE {
            "import"
        } else {
            "require"
        };
        let _ = writeln!(out, "    {}: {}", demand, requirement.filter());
        let _ = writeln!(out, "     |");
        let supply = if requirement.namespace() == PACKAGE_NAMESPACE {
            "export"
        } else {
            "provide"
        };
        let _ = write!(out, "    {}: ", supply);

        if i < last_index {
            match satisfying_capability(session, candidates, requirement) {
                Some(capability) if capability.namespace() == PACKAGE_NAMESPACE => {
                    let _ = write!(
                        out,
                        "{}={}",
                        PACKAGE_NAMESPACE,
                        capability.package_name().unwrap_or("?")
                    );
                    let used = satisfying_capability(session, candidates, &blame.requirements[i + 1])
                        .and_then(|c| c.package_name().map(str::to_string));
                    if let Some(used) = used {
                        let _ = write!(out, "; uses:={}", used);
                    }
                }
                Some(capability) => {
                    let _ = write!(out, "{}", capability);
                }
                None => {
                    let _ = write!(out, "<unknown>");
                }
            }
            let _ = writeln!(out);
        } else {
            match satisfying_capability(session, candidates, requirement) {
                Some(capability) => {
                    let _ = write!(out, "{}", capability);
                    // When the chain ends in a different package than the
                    // conflicting one, spell out the final uses hop.
                    if capability.namespace() == PACKAGE_NAMESPACE
                        && capability.package_name() != blame.capability.package_name()
                    {
                        if let Some(package) = blame.capability.package_name() {
                            let _ = write!(out, "; uses:={}", package);
                            let _ = write!(
                                out,
                                "\n    export: {}={}",
                                PACKAGE_NAMESPACE, package
                            );
                        }
                    }
                }
                None => {
                    let _ = write!(out, "<unknown>");
                }
            }
            let final_resource = blame.capability.resource();
            let _ = write!(
                out,
                "\n  {} [{}]",
                display_name(final_resource),
                final_resource
            );
        }
    }
    out
}

/// The capability currently satisfying `requirement`: the head candidate if
/// the owner is resolving, otherwise the existing wire's capability.
fn satisfying_capability<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    requirement: &Requirement,
) -> Option<Capability> {
    if let Some(capability) = candidates.first_candidate(requirement) {
        return Some(capability);
    }
    let wiring = session.ctx().wiring(requirement.resource())?;
    let declared = requirement.declared();
    wiring
        .required_wires(None)
        .into_iter()
        .find(|wire| wire.requirement().declared() == declared)
        .map(|wire| wire.capability().clone())
}
