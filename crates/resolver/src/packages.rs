use crate::candidates::Candidates;
use crate::error::ResolutionError;
use crate::session::{PackageSources, ResolveSession};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use weft_model::namespace::{self, BUNDLE_NAMESPACE, PACKAGE_NAMESPACE};
use weft_model::{Capability, Requirement, ResolveContext, Resource};

/// A requirement paired with the capability the current permutation would
/// wire it to.
pub(crate) struct WireCandidate {
    pub requirement: Requirement,
    pub capability: Capability,
}

/// How a package reached a resource's package space: the providing
/// capability and the chain of requirements traversed to reach it. An empty
/// chain marks the resource's own export.
#[derive(Debug, Clone)]
pub(crate) struct Blame {
    pub capability: Capability,
    pub requirements: Vec<Requirement>,
}

impl Blame {
    pub fn export(capability: Capability) -> Self {
        Self {
            capability,
            requirements: Vec::new(),
        }
    }

    pub fn new(capability: Capability, requirements: Vec<Requirement>) -> Self {
        Self {
            capability,
            requirements,
        }
    }

    /// The requirement at the root of the chain.
    pub fn root(&self) -> Option<&Requirement> {
        self.requirements.first()
    }
}

/// All blames sharing one used capability, plus the capabilities that pulled
/// the use in through a multiple-cardinality root requirement.
#[derive(Debug, Default)]
pub(crate) struct UsedBlames {
    pub blames: Vec<Blame>,
    root_causes: IndexMap<Requirement, HashSet<Capability>>,
}

impl UsedBlames {
    pub fn add_blame(&mut self, blame: Blame, matching_cause: Option<&Capability>) {
        if let (Some(cause), Some(root)) = (matching_cause, blame.root()) {
            // Only a root requirement can have multiple cardinality;
            // capabilities can only use package capabilities, so the uses
            // directive never transits another multiple-cardinality hop.
            if namespace::is_multiple(root) {
                self.root_causes
                    .entry(root.clone())
                    .or_default()
                    .insert(cause.clone());
            }
        }
        self.blames.push(blame);
    }

    pub fn root_causes(&self, requirement: &Requirement) -> HashSet<Capability> {
        self.root_causes
            .get(requirement)
            .cloned()
            .unwrap_or_default()
    }
}

/// Per-resource package space for one trial permutation.
#[derive(Default, Debug)]
pub(crate) struct Packages {
    pub exported: IndexMap<String, Blame>,
    pub imported: IndexMap<String, Vec<Blame>>,
    pub required: IndexMap<String, Vec<Blame>>,
    pub used: IndexMap<String, IndexMap<Capability, UsedBlames>>,
}

#[derive(Default)]
struct PackageAdds {
    imported: Vec<(String, Blame)>,
    required: Vec<(String, Blame)>,
}

struct UsedAdd {
    package: String,
    blame: Blame,
    matching_cause: Option<Capability>,
}

/// Computes the package space of every resource reachable from `hosts`
/// under the current permutation.
pub(crate) fn calculate_package_spaces<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    hosts: Vec<Resource>,
) -> Result<IndexMap<Resource, Packages>, ResolutionError> {
    // Wire candidates for the closure of reachable resources.
    let mut all_wire_candidates: IndexMap<Resource, Vec<WireCandidate>> = IndexMap::new();
    let mut to_compute: Vec<Resource> = hosts;
    while let Some(resource) = to_compute.pop() {
        if all_wire_candidates.contains_key(&resource) {
            continue;
        }
        let wires = wire_candidates_of(session, candidates, &resource);
        for wire in &wires {
            let provider = wire.capability.resource().clone();
            if !all_wire_candidates.contains_key(&provider) && provider != resource {
                to_compute.push(provider);
            }
        }
        all_wire_candidates.insert(resource, wires);
    }

    // Exported packages first; imports and requires read them.
    let mut all_packages: IndexMap<Resource, Packages> = IndexMap::new();
    for resource in all_wire_candidates.keys() {
        let mut packages = Packages::default();
        exported_packages(session, candidates, resource, &mut packages.exported);
        all_packages.insert(resource.clone(), packages);
    }

    for (resource, wires) in &all_wire_candidates {
        let adds = collect_candidate_packages(session, candidates, &all_packages, resource, wires)?;
        if let Some(packages) = all_packages.get_mut(resource) {
            for (package, blame) in adds.imported {
                packages.imported.entry(package).or_default().push(blame);
            }
            for (package, blame) in adds.required {
                packages.required.entry(package).or_default().push(blame);
            }
        }
    }

    let resources: Vec<Resource> = all_wire_candidates.keys().cloned().collect();
    for resource in &resources {
        compute_uses(
            session,
            candidates,
            &all_wire_candidates,
            &mut all_packages,
            resource,
        );
    }

    Ok(all_packages)
}

fn wire_candidates_of<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    resource: &Resource,
) -> Vec<WireCandidate> {
    let mut wires = Vec::new();
    match session.ctx().wiring(resource) {
        Some(wiring) => {
            // Existing wires, with requirement and capability re-homed when
            // they originate in fragments; dynamic requirements are re-homed
            // too since they are shared between matching imports.
            for wire in wiring.required_wires(None) {
                let mut requirement = wire.requirement().clone();
                if requirement.resource() != wire.requirer() || namespace::is_dynamic(&requirement)
                {
                    requirement = Requirement::wrapped(wire.requirer().clone(), requirement);
                }
                let mut capability = wire.capability().clone();
                if capability.resource() != wire.provider() {
                    capability = Capability::hosted(wire.provider().clone(), capability);
                }
                wires.push(WireCandidate {
                    requirement,
                    capability,
                });
            }
            // A pending dynamic import contributes its head candidate; it
            // must come last so the shadow check can key off it.
            for requirement in wiring.resource_requirements(None) {
                if namespace::is_dynamic(&requirement) {
                    if let Some(capability) = candidates.first_candidate(&requirement) {
                        wires.push(WireCandidate {
                            requirement,
                            capability,
                        });
                        break;
                    }
                }
            }
        }
        None => {
            for requirement in resource.requirements() {
                if namespace::is_dynamic(&requirement) {
                    continue;
                }
                let Some(caps) = candidates.candidates(&requirement) else {
                    continue;
                };
                if namespace::is_multiple(&requirement) {
                    for capability in caps {
                        wires.push(WireCandidate {
                            requirement: requirement.clone(),
                            capability: capability.clone(),
                        });
                    }
                } else if let Some(capability) = caps.first() {
                    wires.push(WireCandidate {
                        requirement: requirement.clone(),
                        capability: capability.clone(),
                    });
                }
            }
        }
    }
    wires
}

fn exported_packages<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    resource: &Resource,
    exported: &mut IndexMap<String, Blame>,
) {
    let resolved = session.ctx().wiring(resource).is_some();
    let capabilities = match session.ctx().wiring(resource) {
        Some(wiring) => wiring.resource_capabilities(None),
        None => resource.capabilities(),
    };
    for capability in capabilities {
        if capability.namespace() != PACKAGE_NAMESPACE {
            continue;
        }
        let capability = if capability.resource() != resource {
            Capability::hosted(resource.clone(), capability)
        } else {
            capability
        };
        if let Some(package) = capability.package_name().map(str::to_string) {
            exported.insert(package, Blame::export(capability));
        }
    }
    // For a resolving resource, substitutable exports whose import found a
    // provider are not exports any more. Resolved wirings already exclude
    // them.
    if !exported.is_empty() && !resolved {
        for requirement in resource.requirements() {
            if requirement.namespace() != PACKAGE_NAMESPACE {
                continue;
            }
            if let Some(candidate) = candidates.first_candidate(&requirement) {
                if let Some(package) = candidate.package_name() {
                    exported.shift_remove(package);
                }
            }
        }
    }
}

fn collect_candidate_packages<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_packages: &IndexMap<Resource, Packages>,
    resource: &Resource,
    wires: &[WireCandidate],
) -> Result<PackageAdds, ResolutionError> {
    let mut adds = PackageAdds::default();
    for wire in wires {
        if namespace::is_dynamic(&wire.requirement) {
            // A resource cannot dynamically import a package it can already
            // see through an export, import, or required bundle.
            let package = wire
                .capability
                .package_name()
                .unwrap_or_default()
                .to_string();
            let already_visible = all_packages
                .get(resource)
                .map(|p| p.exported.contains_key(&package))
                .unwrap_or(false)
                || adds.imported.iter().any(|(name, _)| name == &package)
                || adds.required.iter().any(|(name, _)| name == &package);
            if already_visible {
                return Err(ResolutionError::DynamicImportShadowed {
                    resource: resource.declared().clone(),
                    package,
                });
            }
        }
        let mut capability_cycles = HashSet::new();
        let mut required_cycles = HashSet::new();
        merge_candidate_packages(
            session,
            candidates,
            all_packages,
            &wire.requirement,
            &wire.capability,
            &mut adds,
            &mut capability_cycles,
            &mut required_cycles,
        );
    }
    Ok(adds)
}

#[allow(clippy::too_many_arguments)]
fn merge_candidate_packages<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_packages: &IndexMap<Resource, Packages>,
    current_requirement: &Requirement,
    capability: &Capability,
    adds: &mut PackageAdds,
    capability_cycles: &mut HashSet<Capability>,
    required_cycles: &mut HashSet<Resource>,
) {
    if !capability_cycles.insert(capability.clone()) {
        return;
    }
    if capability.namespace() == PACKAGE_NAMESPACE {
        if let Some(package) = capability.package_name() {
            adds.imported.push((
                package.to_string(),
                Blame::new(capability.clone(), vec![current_requirement.clone()]),
            ));
        }
    } else if capability.namespace() == BUNDLE_NAMESPACE {
        let provider = capability.resource().clone();
        if required_cycles.insert(provider.clone()) {
            // Requiring a bundle pulls in everything it exports.
            if let Some(packages) = all_packages.get(&provider) {
                for blame in packages.exported.values() {
                    if let Some(package) = blame.capability.package_name() {
                        adds.required.push((
                            package.to_string(),
                            Blame::new(blame.capability.clone(), vec![current_requirement.clone()]),
                        ));
                    }
                }
            }
        }
        // Follow the provider's reexported require-bundle chains.
        match session.ctx().wiring(&provider) {
            Some(wiring) => {
                for wire in wiring.required_wires(Some(BUNDLE_NAMESPACE)) {
                    if namespace::is_reexport(wire.requirement()) {
                        merge_candidate_packages(
                            session,
                            candidates,
                            all_packages,
                            current_requirement,
                            wire.capability(),
                            adds,
                            capability_cycles,
                            required_cycles,
                        );
                    }
                }
            }
            None => {
                for requirement in provider.requirements_in(BUNDLE_NAMESPACE) {
                    if namespace::is_reexport(&requirement) {
                        if let Some(next) = candidates.first_candidate(&requirement) {
                            merge_candidate_packages(
                                session,
                                candidates,
                                all_packages,
                                current_requirement,
                                &next,
                                adds,
                                capability_cycles,
                                required_cycles,
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Adds the transitive consequences of `uses` directives to `resource`'s
/// package space. Only resolving resources and resolved resources with a
/// pending dynamic import need this; a resolved resource's space is
/// consistent by definition.
fn compute_uses<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_wire_candidates: &IndexMap<Resource, Vec<WireCandidate>>,
    all_packages: &mut IndexMap<Resource, Packages>,
    resource: &Resource,
) {
    let Some(wires) = all_wire_candidates.get(resource) else {
        return;
    };
    let resolved = session.ctx().wiring(resource).is_some();
    let has_dynamic_wire = wires
        .last()
        .map(|w| namespace::is_dynamic(&w.requirement))
        .unwrap_or(false);
    if resolved && !has_dynamic_wire {
        return;
    }

    let mut cycle = HashSet::new();
    let mut adds: Vec<UsedAdd> = Vec::new();

    // Uses constraints carried by generic (non-package, non-bundle)
    // capabilities the resource wires to.
    for wire in wires {
        let ns = wire.requirement.namespace();
        if ns != BUNDLE_NAMESPACE && ns != PACKAGE_NAMESPACE {
            merge_uses(
                session,
                candidates,
                all_packages,
                resource,
                &wire.capability,
                &[wire.requirement.clone()],
                Some(&wire.capability),
                &mut adds,
                &mut cycle,
            );
        }
    }

    // Uses constraints reached through imported and required packages.
    let blames: Vec<Blame> = match all_packages.get(resource) {
        Some(packages) => packages
            .imported
            .values()
            .flatten()
            .chain(packages.required.values().flatten())
            .cloned()
            .collect(),
        None => Vec::new(),
    };
    for blame in blames {
        if let Some(root) = blame.root() {
            merge_uses(
                session,
                candidates,
                all_packages,
                resource,
                &blame.capability,
                &[root.clone()],
                None,
                &mut adds,
                &mut cycle,
            );
        }
    }

    if let Some(packages) = all_packages.get_mut(resource) {
        for add in adds {
            packages
                .used
                .entry(add.package)
                .or_default()
                .entry(add.blame.capability.clone())
                .or_default()
                .add_blame(add.blame, add.matching_cause.as_ref());
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn merge_uses<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_packages: &IndexMap<Resource, Packages>,
    resource: &Resource,
    merge_capability: &Capability,
    blame_requirements: &[Requirement],
    matching_cause: Option<&Capability>,
    adds: &mut Vec<UsedAdd>,
    cycle: &mut HashSet<Capability>,
) {
    // The resource's own capabilities are verified as its package space is
    // built; only foreign providers need merging here.
    if merge_capability.resource() == resource {
        return;
    }
    if !cycle.insert(merge_capability.clone()) {
        return;
    }

    let sources: Vec<Capability> = {
        let set = package_sources(session, candidates, all_packages, merge_capability);
        let borrowed = set.borrow();
        borrowed.iter().cloned().collect()
    };
    for source in sources {
        let Some(uses) = source.uses().map(str::to_string) else {
            continue;
        };
        let Some(source_packages) = all_packages.get(source.resource()) else {
            continue;
        };
        for used_package in session.parse_uses(&uses).iter() {
            // Locate the used package in the source's space: exports first,
            // then requires, then imports.
            let source_blames: Vec<Blame> =
                if let Some(blame) = source_packages.exported.get(used_package) {
                    vec![blame.clone()]
                } else if let Some(blames) = source_packages.required.get(used_package) {
                    blames.clone()
                } else if let Some(blames) = source_packages.imported.get(used_package) {
                    blames.clone()
                } else {
                    // Unsatisfied use; it constrains nothing.
                    continue;
                };
            for blame in source_blames {
                let chain = if blame.requirements.is_empty() {
                    blame_requirements.to_vec()
                } else {
                    // Extend with the last requirement only: the one wired
                    // to the blamed capability.
                    let mut chain = blame_requirements.to_vec();
                    if let Some(last) = blame.requirements.last() {
                        chain.push(last.clone());
                    }
                    chain
                };
                adds.push(UsedAdd {
                    package: used_package.clone(),
                    blame: Blame::new(blame.capability.clone(), chain.clone()),
                    matching_cause: matching_cause.cloned(),
                });
                merge_uses(
                    session,
                    candidates,
                    all_packages,
                    resource,
                    &blame.capability,
                    &chain,
                    matching_cause,
                    adds,
                    cycle,
                );
            }
        }
    }
}

/// The capabilities that can contribute `capability`'s package to a
/// consumer, transitively through required bundles.
pub(crate) fn package_sources<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_packages: &IndexMap<Resource, Packages>,
    capability: &Capability,
) -> PackageSources {
    if let Some(sources) = session.package_sources_for(capability) {
        return sources;
    }
    compute_package_sources(session, candidates, all_packages, capability.resource());
    session
        .package_sources_for(capability)
        .unwrap_or_else(|| Rc::new(RefCell::new(HashSet::new())))
}

fn compute_package_sources<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_packages: &IndexMap<Resource, Packages>,
    resource: &Resource,
) {
    let capabilities = match session.ctx().wiring(resource) {
        Some(wiring) => wiring.resource_capabilities(None),
        None => resource.capabilities(),
    };
    let mut local: IndexMap<String, PackageSources> = IndexMap::new();
    for source in capabilities {
        if source.namespace() == PACKAGE_NAMESPACE {
            let Some(package) = source.package_name().map(str::to_string) else {
                continue;
            };
            let set = local
                .entry(package)
                .or_insert_with(|| Rc::new(RefCell::new(HashSet::new())))
                .clone();
            let wrapped = if source.resource() != resource {
                Capability::hosted(resource.clone(), source.clone())
            } else {
                source.clone()
            };
            // Register both forms before extending so lookups during
            // require-cycles terminate.
            session.insert_package_sources(wrapped.clone(), set.clone());
            if wrapped != source {
                session.insert_package_sources(source, set.clone());
            }
            set.borrow_mut().insert(wrapped);
        } else if source.uses().is_some() {
            // A generic capability with uses constraints participates in
            // consistency checking as its own source.
            let set: PackageSources = Rc::new(RefCell::new(HashSet::new()));
            set.borrow_mut().insert(source.clone());
            session.insert_package_sources(source, set);
        } else {
            session.insert_package_sources(source, Rc::new(RefCell::new(HashSet::new())));
        }
    }
    // Packages also reachable through require-bundle contribute their own
    // transitive sources.
    for (package, set) in &local {
        let required: Vec<Blame> = match all_packages
            .get(resource)
            .and_then(|p| p.required.get(package))
        {
            Some(blames) => blames.clone(),
            None => continue,
        };
        for blame in required {
            let inserted = set.borrow_mut().insert(blame.capability.clone());
            if inserted {
                let transitive =
                    package_sources(session, candidates, all_packages, &blame.capability);
                if !Rc::ptr_eq(&transitive, set) {
                    let items: Vec<Capability> = transitive.borrow().iter().cloned().collect();
                    set.borrow_mut().extend(items);
                }
            }
        }
    }
}

/// Two providers are compatible iff one's transitive source set contains
/// the other's.
pub(crate) fn is_compatible<C: ResolveContext>(
    session: &ResolveSession<'_, C>,
    candidates: &Candidates,
    all_packages: &IndexMap<Resource, Packages>,
    current_blames: &[Blame],
    candidate: &Capability,
) -> bool {
    if current_blames.is_empty() {
        return true;
    }
    if current_blames.len() == 1 && &current_blames[0].capability == candidate {
        return true;
    }
    let mut current: HashSet<Capability> = HashSet::new();
    for blame in current_blames {
        let sources = package_sources(session, candidates, all_packages, &blame.capability);
        let borrowed = sources.borrow();
        current.extend(borrowed.iter().cloned());
    }
    let candidate_sources = package_sources(session, candidates, all_packages, candidate);
    let candidate_set = candidate_sources.borrow();
    candidate_set.iter().all(|c| current.contains(c))
        || current.iter().all(|c| candidate_set.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidates::PopulateMode;
    use crate::context::StaticResolveContext;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::rc::Rc;
    use weft_model::{ResourceBuilder, Version};

    fn populated(
        ctx: &StaticResolveContext,
        resources: &[&Resource],
    ) -> Candidates {
        let mut candidates = Candidates::new(Rc::new(RefCell::new(HashMap::new())));
        for resource in resources {
            candidates
                .populate(ctx, resource, PopulateMode::Mandatory)
                .unwrap();
        }
        candidates.prepare(ctx).unwrap();
        candidates
    }

    #[test]
    fn test_require_bundle_merges_reexported_packages() {
        let c = ResourceBuilder::new(5, "c", Version::new(1, 0, 0))
            .provide_bundle()
            .export_package("c.pkg", Version::new(1, 0, 0), &[])
            .build();
        let d = ResourceBuilder::new(6, "d", Version::new(1, 0, 0))
            .provide_bundle()
            .export_package("d.pkg", Version::new(1, 0, 0), &[])
            .require_bundle("c", true)
            .build();
        let e = ResourceBuilder::new(7, "e", Version::new(1, 0, 0))
            .require_bundle("d", false)
            .build();

        let mut ctx = StaticResolveContext::new();
        ctx.add_resource(c.clone());
        ctx.add_resource(d.clone());
        ctx.add_mandatory(e.clone());

        let candidates = populated(&ctx, &[&e]);
        let session = ResolveSession::new(&ctx);
        let spaces =
            calculate_package_spaces(&session, &candidates, vec![e.clone()]).unwrap();

        let packages = &spaces[&e];
        assert!(packages.required.contains_key("d.pkg"));
        // c.pkg arrives transitively through d's reexport.
        assert!(packages.required.contains_key("c.pkg"));
        assert!(packages.imported.is_empty());
        assert!(packages.exported.is_empty());
    }

    #[test]
    fn test_exported_and_imported_spaces() {
        let a = ResourceBuilder::new(1, "a", Version::new(1, 0, 0))
            .export_package("x", Version::new(1, 0, 0), &[])
            .build();
        let b = ResourceBuilder::new(2, "b", Version::new(1, 0, 0))
            .export_package("y", Version::new(1, 0, 0), &[])
            .import_package("x")
            .build();

        let mut ctx = StaticResolveContext::new();
        ctx.add_resource(a.clone());
        ctx.add_mandatory(b.clone());

        let candidates = populated(&ctx, &[&b]);
        let session = ResolveSession::new(&ctx);
        let spaces =
            calculate_package_spaces(&session, &candidates, vec![b.clone()]).unwrap();

        let packages = &spaces[&b];
        assert!(packages.exported.contains_key("y"));
        let imported = &packages.imported["x"];
        assert_eq!(imported.len(), 1);
        assert_eq!(imported[0].capability.resource(), &a);
        assert_eq!(imported[0].requirements.len(), 1);
    }

    #[test]
    fn test_uses_directive_populates_used_space() {
        let q = ResourceBuilder::new(3, "q", Version::new(1, 0, 0))
            .export_package("q", Version::new(1, 0, 0), &[])
            .build();
        let a = ResourceBuilder::new(2, "a", Version::new(1, 0, 0))
            .export_package("p", Version::new(1, 0, 0), &["q"])
            .import_package("q")
            .build();
        let b = ResourceBuilder::new(1, "b", Version::new(1, 0, 0))
            .import_package("p")
            .build();

        let mut ctx = StaticResolveContext::new();
        ctx.add_resource(q.clone());
        ctx.add_resource(a.clone());
        ctx.add_mandatory(b.clone());

        let candidates = populated(&ctx, &[&b]);
        let session = ResolveSession::new(&ctx);
        let spaces =
            calculate_package_spaces(&session, &candidates, vec![b.clone()]).unwrap();

        let packages = &spaces[&b];
        let used = packages.used.get("q").expect("used space for q");
        assert_eq!(used.len(), 1);
        let (capability, used_blames) = used.first().expect("one used capability");
        assert_eq!(capability.resource(), &q);
        // Chain: b's import of p, then a's import of q.
        assert_eq!(used_blames.blames[0].requirements.len(), 2);
    }

    #[test]
    fn test_dynamic_import_shadowed_by_export() {
        let d = ResourceBuilder::new(2, "d", Version::new(1, 0, 0))
            .export_package("x", Version::new(1, 0, 0), &[])
            .build();
        let host = ResourceBuilder::new(1, "host", Version::new(1, 0, 0))
            .export_package("x", Version::new(1, 0, 0), &[])
            .dynamic_import(Some("x"))
            .build();

        let mut ctx = StaticResolveContext::new();
        ctx.add_resource(d.clone());
        ctx.add_wiring(weft_model::Wiring::from_wires(host.clone(), Vec::new()));

        let requirement = host
            .requirements()
            .into_iter()
            .find(namespace::is_dynamic)
            .expect("dynamic requirement");
        let matches = d.capabilities_in(PACKAGE_NAMESPACE);

        let mut candidates = Candidates::new(Rc::new(RefCell::new(HashMap::new())));
        candidates
            .populate_dynamic(&ctx, &host, &requirement, matches)
            .unwrap();
        let session = ResolveSession::new(&ctx);
        let error =
            calculate_package_spaces(&session, &candidates, vec![host.clone()]).unwrap_err();
        assert!(matches!(
            error,
            ResolutionError::DynamicImportShadowed { .. }
        ));
    }

    #[test]
    fn test_compatible_iff_source_sets_nest() {
        let q1 = ResourceBuilder::new(1, "q1", Version::new(1, 0, 0))
            .export_package("q", Version::new(1, 0, 0), &[])
            .build();
        let q2 = ResourceBuilder::new(2, "q2", Version::new(2, 0, 0))
            .export_package("q", Version::new(2, 0, 0), &[])
            .build();
        let b = ResourceBuilder::new(3, "b", Version::new(1, 0, 0))
            .import_package("q")
            .build();

        let mut ctx = StaticResolveContext::new();
        ctx.add_resource(q1.clone());
        ctx.add_resource(q2.clone());
        ctx.add_mandatory(b.clone());

        let candidates = populated(&ctx, &[&b]);
        let session = ResolveSession::new(&ctx);
        let spaces =
            calculate_package_spaces(&session, &candidates, vec![b.clone()]).unwrap();

        let q1_cap = q1.capabilities_in(PACKAGE_NAMESPACE).remove(0);
        let q2_cap = q2.capabilities_in(PACKAGE_NAMESPACE).remove(0);
        let blame_q1 = Blame::new(q1_cap.clone(), Vec::new());

        // A capability is compatible with itself, not with an unrelated
        // provider of the same package.
        assert!(is_compatible(
            &session,
            &candidates,
            &spaces,
            std::slice::from_ref(&blame_q1),
            &q1_cap
        ));
        assert!(!is_compatible(
            &session,
            &candidates,
            &spaces,
            std::slice::from_ref(&blame_q1),
            &q2_cap
        ));
    }
}
