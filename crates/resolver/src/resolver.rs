use crate::candidates::{Candidates, Delta, PopulateMode};
use crate::consistency::check_consistency;
use crate::error::{ResolutionError, Result};
use crate::session::ResolveSession;
use indexmap::{IndexMap, IndexSet};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use weft_model::namespace::{
    self, BUNDLE_NAMESPACE, EXECUTION_ENVIRONMENT_NAMESPACE, HOST_NAMESPACE, IDENTITY_NAMESPACE,
    PACKAGE_NAMESPACE, WIRING_NAMESPACE_PREFIX,
};
use weft_model::{Capability, Requirement, ResolveContext, Resource, Wire};

/// The result of a resolve: for each newly resolved resource, its wires in
/// order — package wires, then bundle wires, then generic capability wires.
/// Resources with an existing wiring appear only when they gained a dynamic
/// wire.
pub type WireMap = IndexMap<Resource, Vec<Wire>>;

/// The resolver: a pure function from [`ResolveContext`] to [`WireMap`].
///
/// Stateless between calls; per-call state lives in a private session. Safe
/// to reuse for any number of resolves.
#[derive(Default)]
pub struct Resolver {
    cancel: Option<Arc<AtomicBool>>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// A resolver honouring `flag` between permutation attempts: setting it
    /// makes the current resolve return [`ResolutionError::Cancelled`].
    pub fn with_cancellation(flag: Arc<AtomicBool>) -> Self {
        Self { cancel: Some(flag) }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Resolves the context's mandatory and optional resources into a
    /// globally consistent wire map, or fails with a diagnostic citing the
    /// shortest implicated blame chains.
    pub fn resolve<C: ResolveContext>(&self, ctx: &C) -> Result<WireMap> {
        let valid_on_demand: Rc<RefCell<HashMap<Resource, bool>>> =
            Rc::new(RefCell::new(HashMap::new()));
        let mut mandatory: Vec<Resource> = ctx.mandatory_resources();
        let mut optional: Vec<Resource> = ctx.optional_resources();

        loop {
            let session = ResolveSession::new(ctx);
            let mut all_candidates = Candidates::new(valid_on_demand.clone());

            // Already-wired resources need no resolving, except fragments,
            // which may attach to new hosts.
            mandatory.retain(|resource| {
                namespace::is_fragment(resource) || ctx.wiring(resource).is_none()
            });
            for resource in &mandatory {
                all_candidates.populate(ctx, resource, PopulateMode::Mandatory)?;
            }
            for resource in &optional {
                if namespace::is_fragment(resource) || ctx.wiring(resource).is_none() {
                    all_candidates.populate(ctx, resource, PopulateMode::Optional)?;
                }
            }
            all_candidates.prepare(ctx)?;

            let mut all_resources: IndexSet<Resource> = mandatory.iter().cloned().collect();
            for resource in &optional {
                if all_candidates.is_populated(resource) {
                    all_resources.insert(resource.clone());
                }
            }

            // A fragment is verified through its host, so keep its host
            // requirement for package space targeting.
            let mut host_requirements: HashMap<Resource, Requirement> = HashMap::new();
            for resource in &all_resources {
                if namespace::is_fragment(resource) {
                    if let Some(requirement) =
                        resource.requirements_in(HOST_NAMESPACE).into_iter().next()
                    {
                        host_requirements.insert(resource.clone(), requirement);
                    }
                }
            }

            session.push_uses_permutation(all_candidates);
            let mut processed_deltas: HashSet<Delta> = HashSet::new();
            let mut faulty_resources: Option<IndexMap<Resource, ResolutionError>> = None;
            let mut rethrow: Option<ResolutionError> = None;

            loop {
                if self.is_cancelled() {
                    return Err(ResolutionError::Cancelled);
                }
                let Some(mut current) = session.next_permutation() else {
                    break;
                };
                // Operationally identical permutations are tried once.
                if !processed_deltas.insert(current.delta()) {
                    continue;
                }
                session.begin_attempt();

                if let Err(error) =
                    session.with_import_queue(|queue| current.check_substitutes(queue))
                {
                    rethrow = Some(error);
                    continue;
                }

                let mut hosts: IndexMap<Resource, Resource> = IndexMap::new();
                for resource in &all_resources {
                    let mut target = resource.clone();
                    if let Some(host_requirement) = host_requirements.get(resource) {
                        match current.first_candidate(host_requirement) {
                            Some(host_capability) => target = host_capability.resource().clone(),
                            // An already-resolved fragment that cannot
                            // attach to new hosts.
                            None => continue,
                        }
                    }
                    let wrap = current.wrapped_host(&target);
                    hosts.insert(target, wrap);
                }

                let mut current_faulty: IndexMap<Resource, ResolutionError> = IndexMap::new();
                rethrow = check_consistency(&session, &current, &mut current_faulty, &hosts, false);

                if !current_faulty.is_empty() {
                    // Keep the smallest faulty set seen; it names the least
                    // that must go for a retry to make sense.
                    faulty_resources = match faulty_resources.take() {
                        Some(best) if best.len() <= current_faulty.len() => Some(best),
                        _ => Some(current_faulty),
                    };
                }

                if rethrow.is_none() {
                    let chosen = match session.take_multiple_card() {
                        // Multiple-cardinality candidates were dropped to
                        // reach consistency; that delta is the result.
                        Some(multiple_card) => multiple_card,
                        None => current,
                    };
                    let mut wire_map = WireMap::new();
                    for resource in &all_resources {
                        let mut target = resource.clone();
                        if let Some(host_requirement) = host_requirements.get(resource) {
                            match chosen.first_candidate(host_requirement) {
                                Some(host_capability) => {
                                    target = host_capability.resource().clone()
                                }
                                None => continue,
                            }
                        }
                        if chosen.is_populated(&target) {
                            populate_wire_map(
                                ctx,
                                &chosen.wrapped_host(&target),
                                &mut wire_map,
                                &chosen,
                            );
                        }
                    }
                    return Ok(wire_map);
                }
            }

            let Some(error) = rethrow else {
                return Ok(WireMap::new());
            };

            // Permutations are exhausted. If only optional or on-demand
            // resources are implicated, drop or invalidate them and retry;
            // a mandatory culprit surfaces the error.
            let mut retry = false;
            if let Some(faulty) = &faulty_resources {
                let faulty_keys: HashSet<Resource> = faulty.keys().cloned().collect();
                let optional_len = optional.len();
                optional.retain(|resource| !faulty_keys.contains(resource));
                retry |= optional.len() != optional_len;
                {
                    let mut on_demand = valid_on_demand.borrow_mut();
                    for resource in &faulty_keys {
                        if on_demand.get(resource) == Some(&true) {
                            on_demand.insert(resource.clone(), false);
                            retry = true;
                        }
                    }
                }
                for (resource, error) in faulty.iter() {
                    log::debug!("Uses constraint violation for {}: {}", resource, error);
                }
            }
            if !retry {
                return Err(error);
            }
        }
    }

    /// Resolves a single dynamic requirement of an already-resolved host
    /// against pre-ranked matching capabilities. The returned map holds the
    /// host with exactly the one new wire, plus any transitively newly
    /// resolved providers.
    pub fn resolve_dynamic<C: ResolveContext>(
        &self,
        ctx: &C,
        host: &Resource,
        requirement: &Requirement,
        matches: Vec<Capability>,
    ) -> Result<WireMap> {
        for capability in &matches {
            if capability.namespace() != PACKAGE_NAMESPACE {
                return Err(ResolutionError::InvalidDynamicRequirement);
            }
        }
        if matches.is_empty() || ctx.wiring(host).is_none() {
            return Ok(WireMap::new());
        }

        let valid_on_demand: Rc<RefCell<HashMap<Resource, bool>>> =
            Rc::new(RefCell::new(HashMap::new()));
        loop {
            let session = ResolveSession::new(ctx);
            let mut all_candidates = Candidates::new(valid_on_demand.clone());
            all_candidates.populate_dynamic(ctx, host, requirement, matches.clone())?;
            all_candidates.prepare(ctx)?;
            session.push_uses_permutation(all_candidates);

            let mut processed_deltas: HashSet<Delta> = HashSet::new();
            let mut rethrow: Option<ResolutionError> = None;
            loop {
                if self.is_cancelled() {
                    return Err(ResolutionError::Cancelled);
                }
                let Some(mut current) = session.next_permutation() else {
                    break;
                };
                if !processed_deltas.insert(current.delta()) {
                    continue;
                }
                session.begin_attempt();

                if let Err(error) =
                    session.with_import_queue(|queue| current.check_substitutes(queue))
                {
                    rethrow = Some(error);
                    continue;
                }

                // The instigating resource is never a fragment: fragments
                // never trigger dynamic imports.
                let mut hosts: IndexMap<Resource, Resource> = IndexMap::new();
                hosts.insert(host.clone(), current.wrapped_host(host));
                let mut current_faulty: IndexMap<Resource, ResolutionError> = IndexMap::new();
                rethrow = check_consistency(&session, &current, &mut current_faulty, &hosts, true);

                if rethrow.is_none() {
                    let chosen = match session.take_multiple_card() {
                        Some(multiple_card) => multiple_card,
                        None => current,
                    };
                    let mut wire_map = WireMap::new();
                    populate_dynamic_wire_map(ctx, host, requirement, &mut wire_map, &chosen);
                    return Ok(wire_map);
                }
            }

            let Some(error) = rethrow else {
                return Ok(WireMap::new());
            };
            // If an on-demand fragment is implicated, invalidate it and
            // retry; anything else surfaces.
            let faulty_resource = error.root_requirements().into_iter().next().map(|faulty| {
                if faulty.is_wrapped() {
                    faulty.declared_resource().clone()
                } else {
                    faulty.resource().declared().clone()
                }
            });
            let mut retry = false;
            if let Some(resource) = faulty_resource {
                let mut on_demand = valid_on_demand.borrow_mut();
                if on_demand.get(&resource) == Some(&true) {
                    on_demand.insert(resource, false);
                    retry = true;
                }
            }
            if !retry {
                return Err(error);
            }
        }
    }
}

fn populate_wire_map<C: ResolveContext>(
    ctx: &C,
    resource: &Resource,
    wire_map: &mut WireMap,
    candidates: &Candidates,
) {
    let unwrapped = resource.declared().clone();
    if ctx.wiring(&unwrapped).is_some() || wire_map.contains_key(&unwrapped) {
        return;
    }
    // Insert the entry up front so dependency cycles terminate.
    wire_map.insert(unwrapped.clone(), Vec::new());

    let mut package_wires = Vec::new();
    let mut bundle_wires = Vec::new();
    let mut capability_wires = Vec::new();

    for requirement in resource.requirements() {
        let Some(cands) = candidates.candidates(&requirement) else {
            continue;
        };
        for cand in cands {
            // Self-wires are meaningless in the osgi.wiring.* namespaces.
            if !cand.namespace().starts_with(WIRING_NAMESPACE_PREFIX)
                || resource != cand.resource()
            {
                populate_wire_map(ctx, cand.resource(), wire_map, candidates);

                let provider = if requirement.namespace() == IDENTITY_NAMESPACE {
                    cand.declared_resource().clone()
                } else {
                    cand.resource().declared().clone()
                };
                let wire = Wire::new(
                    unwrapped.clone(),
                    requirement.declared().clone(),
                    provider,
                    cand.declared().clone(),
                );
                if requirement.namespace() == PACKAGE_NAMESPACE {
                    package_wires.push(wire);
                } else if requirement.namespace() == BUNDLE_NAMESPACE {
                    bundle_wires.push(wire);
                } else {
                    capability_wires.push(wire);
                }
            }
            if !namespace::is_multiple(&requirement) {
                break;
            }
        }
    }

    let mut wires = package_wires;
    wires.extend(bundle_wires);
    wires.extend(capability_wires);
    wire_map.insert(unwrapped.clone(), wires);

    // Each attached fragment gets its own entry: a host wire per host, plus
    // its non-payload wires the first time it is seen.
    if let Some(fragments) = resource.fragments() {
        for fragment in fragments {
            let first_seen =
                ctx.wiring(fragment).is_none() && !wire_map.contains_key(fragment);
            let mut fragment_wires = wire_map.get(fragment).cloned().unwrap_or_default();
            for requirement in fragment.requirements() {
                if is_payload(&requirement) {
                    continue;
                }
                if requirement.namespace() == HOST_NAMESPACE {
                    if let Some(host_capability) = unwrapped
                        .capabilities_in(HOST_NAMESPACE)
                        .into_iter()
                        .next()
                    {
                        fragment_wires.push(Wire::new(
                            fragment.clone(),
                            requirement.clone(),
                            unwrapped.clone(),
                            host_capability,
                        ));
                    }
                } else if first_seen {
                    if let Some(wire) = create_wire(&requirement, candidates) {
                        fragment_wires.push(wire);
                    }
                }
            }
            wire_map.insert(fragment.clone(), fragment_wires);
        }
    }
}

fn populate_dynamic_wire_map<C: ResolveContext>(
    ctx: &C,
    host: &Resource,
    requirement: &Requirement,
    wire_map: &mut WireMap,
    candidates: &Candidates,
) {
    wire_map.insert(host.clone(), Vec::new());
    let Some(candidate) = candidates.first_candidate(requirement) else {
        return;
    };
    if ctx.wiring(candidate.resource()).is_none() {
        let provider = candidate.resource().clone();
        populate_wire_map(ctx, &provider, wire_map, candidates);
    }
    let wire = Wire::new(
        host.clone(),
        requirement.declared().clone(),
        candidate.resource().declared().clone(),
        candidate.declared().clone(),
    );
    wire_map.insert(host.clone(), vec![wire]);
}

fn create_wire(requirement: &Requirement, candidates: &Candidates) -> Option<Wire> {
    let cand = candidates.first_candidate(requirement)?;
    Some(Wire::new(
        requirement.resource().declared().clone(),
        requirement.declared().clone(),
        cand.resource().declared().clone(),
        cand.declared().clone(),
    ))
}

/// Fragment requirements other than host and execution-environment are
/// payload: they move to the wrapped host.
fn is_payload(requirement: &Requirement) -> bool {
    let ns = requirement.namespace();
    ns != HOST_NAMESPACE && ns != EXECUTION_ENVIRONMENT_NAMESPACE
}
