use crate::candidates::Candidates;
use crate::diagnostics;
use crate::error::ResolutionError;
use crate::packages::{
    calculate_package_spaces, is_compatible, Blame, Packages, UsedBlames,
};
use crate::session::ResolveSession;
use indexmap::IndexMap;
use std::collections::HashSet;
use weft_model::namespace;
use weft_model::{Requirement, ResolveContext, Resource};

/// Computes package spaces for every host and checks uses-constraint
/// consistency, attributing failures to the faulty declared resource.
pub(crate) fn check_consistency<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    all_candidates: &Candidates,
    current_faulty: &mut IndexMap<Resource, ResolutionError>,
    hosts: &IndexMap<Resource, Resource>,
    dynamic: bool,
) -> Option<ResolutionError> {
    let host_list: Vec<Resource> = hosts.values().cloned().collect();
    let all_packages = match calculate_package_spaces(session, all_candidates, host_list) {
        Ok(packages) => packages,
        // The permutation itself is invalid (a dynamic import re-covers a
        // visible package); there is no faulty resource to remove.
        Err(error) => return Some(error),
    };

    let mut rethrow = None;
    let mut result_cache: HashSet<Resource> = HashSet::new();
    for (declared, wrap) in hosts {
        if let Some(error) = check_package_space(
            session,
            wrap,
            all_candidates,
            dynamic,
            &all_packages,
            &mut result_cache,
        ) {
            // A wrapped requirement at the root means a fragment is to
            // blame, not its host.
            let mut faulty = declared.clone();
            for requirement in error.root_requirements() {
                if requirement.is_wrapped() {
                    faulty = requirement.declared_resource().clone();
                    break;
                }
            }
            current_faulty.insert(faulty, error.clone());
            rethrow = Some(error);
        }
    }
    rethrow
}

fn check_package_space<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    resource: &Resource,
    all_candidates: &Candidates,
    dynamic: bool,
    all_packages: &IndexMap<Resource, Packages>,
    result_cache: &mut HashSet<Resource>,
) -> Option<ResolutionError> {
    if result_cache.contains(resource) {
        return None;
    }
    if !dynamic && session.ctx().wiring(resource).is_some() {
        return None;
    }
    let Some(packages) = all_packages.get(resource) else {
        return None;
    };

    // Conflicting imports of one package from different providers: a
    // fragment import overlapping a host import.
    for (package, blames) in &packages.imported {
        if blames.len() < 2 {
            continue;
        }
        let source_blame = &blames[0];
        for blame in &blames[1..] {
            if blame.capability.resource() == source_blame.capability.resource() {
                continue;
            }
            session.with_import_queue(|queue| {
                if let Some(root) = blame.root() {
                    all_candidates.permutate(root, queue);
                }
                if let Some(root) = source_blame.root() {
                    all_candidates.permutate(root, queue);
                }
            });
            let error = diagnostics::chain_conflict_error(
                session,
                all_candidates,
                resource,
                package,
                source_blame,
                blame,
            );
            log::debug!(
                "Candidate permutation failed due to a conflict with a fragment import; \
                 will try another if possible. ({})",
                error
            );
            return Some(error);
        }
    }

    let mut permutation: Option<Candidates> = None;
    let mut mutated: HashSet<Requirement> = HashSet::new();

    // Exported package vs uses constraint.
    for (package, export_blame) in &packages.exported {
        let Some(used) = packages.used.get(package) else {
            continue;
        };
        let mut error: Option<ResolutionError> = None;
        for (used_capability, used_blames) in used {
            if is_compatible(
                session,
                all_candidates,
                all_packages,
                std::slice::from_ref(export_blame),
                used_capability,
            ) {
                continue;
            }
            for used_blame in &used_blames.blames {
                if check_multiple(session, used_blames, used_blame, all_candidates) {
                    // The offending providers were dropped from the
                    // multiple-cardinality binding instead.
                    continue;
                }
                let perm = permutation.get_or_insert_with(|| all_candidates.copy());
                if error.is_none() {
                    error = Some(diagnostics::export_conflict_error(
                        session,
                        all_candidates,
                        resource,
                        package,
                        used_blame,
                    ));
                }
                mutate_blame_chain(perm, &mut mutated, used_blame);
            }
        }
        if let Some(error) = error {
            if !mutated.is_empty() {
                if let Some(permutation) = permutation.take() {
                    session.push_uses_permutation(permutation);
                }
            }
            log::debug!(
                "Candidate permutation failed due to a conflict between an export and import; \
                 will try another if possible. ({})",
                error
            );
            return Some(error);
        }
    }

    // Imported/required package vs uses constraint. Imports shadow requires
    // on collision, but both participate.
    let mut import_require: IndexMap<String, Vec<Blame>> = packages.required.clone();
    for (package, blames) in &packages.imported {
        import_require.insert(package.clone(), blames.clone());
    }
    for (package, requirement_blames) in &import_require {
        let Some(used) = packages.used.get(package) else {
            continue;
        };
        for (used_capability, used_blames) in used {
            if is_compatible(
                session,
                all_candidates,
                all_packages,
                requirement_blames,
                used_capability,
            ) {
                continue;
            }
            // For split packages the first blame stands in as the
            // representative; list order makes the choice deterministic.
            let requirement_blame = &requirement_blames[0];
            let mut error: Option<ResolutionError> = None;
            for used_blame in &used_blames.blames {
                if check_multiple(session, used_blames, used_blame, all_candidates) {
                    continue;
                }
                let perm = permutation.get_or_insert_with(|| all_candidates.copy());
                if error.is_none() {
                    error = Some(diagnostics::chain_conflict_error(
                        session,
                        all_candidates,
                        resource,
                        package,
                        requirement_blame,
                        used_blame,
                    ));
                }
                mutate_blame_chain(perm, &mut mutated, used_blame);
            }
            if let Some(error) = error {
                if !mutated.is_empty() {
                    if let Some(permutation) = permutation.take() {
                        session.push_uses_permutation(permutation);
                    }
                }
                // Also backtrack on the original import decisions, in case
                // no viable candidate exists for the uses side.
                for requirement_blame in requirement_blames {
                    if let Some(root) = requirement_blame.root() {
                        if !mutated.contains(root) {
                            session.with_import_queue(|queue| {
                                all_candidates.permutate_if_needed(root, queue)
                            });
                        }
                    }
                }
                log::debug!(
                    "Candidate permutation failed due to a conflict between imports; \
                     will try another if possible. ({})",
                    error
                );
                return Some(error);
            }
        }
    }

    result_cache.insert(resource.clone());

    // Recurse into every resource this one depends on. If a child fails
    // without producing a permutation, backtrack on the requirement that
    // leads to it.
    let permutations_before = session.permutation_count();
    for requirement in resource.requirements() {
        let Some(capability) = all_candidates.first_candidate(&requirement) else {
            continue;
        };
        if capability.resource() == resource {
            continue;
        }
        let provider = capability.resource().clone();
        if let Some(error) = check_package_space(
            session,
            &provider,
            all_candidates,
            false,
            all_packages,
            result_cache,
        ) {
            if session.permutation_count() == permutations_before {
                session.with_import_queue(|queue| all_candidates.permutate(&requirement, queue));
            }
            return Some(error);
        }
    }
    None
}

/// Multiple-cardinality relaxation: when the blame's root requirement binds
/// multiple providers, drop the root-cause providers from the binding in the
/// session's multiple-card delta instead of permutating. Succeeds when at
/// least one candidate survives.
fn check_multiple<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    used_blames: &UsedBlames,
    used_blame: &Blame,
    all_candidates: &Candidates,
) -> bool {
    let Some(root) = used_blame.root() else {
        return false;
    };
    if !namespace::is_multiple(root) {
        return false;
    }
    let causes = used_blames.root_causes(root);
    let survivors =
        session.with_multiple_card(all_candidates, |candidates| {
            candidates.clear_candidates(root, &causes)
        });
    !survivors.is_empty()
}

/// Walks the blame chain tail to head and removes the head candidate of the
/// first removable single-cardinality requirement not yet mutated in this
/// attempt.
fn mutate_blame_chain(
    permutation: &mut Candidates,
    mutated: &mut HashSet<Requirement>,
    used_blame: &Blame,
) {
    for requirement in used_blame.requirements.iter().rev() {
        if namespace::is_multiple(requirement) {
            continue;
        }
        if mutated.contains(requirement) {
            break;
        }
        if permutation.can_remove_candidate(requirement) {
            permutation.remove_first_candidate(requirement);
            mutated.insert(requirement.clone());
            break;
        }
    }
}
