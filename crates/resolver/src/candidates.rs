use crate::error::ResolutionError;
use indexmap::{IndexMap, IndexSet};
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use weft_model::namespace::{self, HOST_NAMESPACE, PACKAGE_NAMESPACE};
use weft_model::{Capability, Requirement, ResolveContext, Resource};

/// How a resource entered the resolution set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopulateMode {
    /// Failure to populate aborts the resolve.
    Mandatory,
    /// Failure marks the resource unsatisfied; the resolve continues.
    Optional,
    /// Like optional, but the resource can additionally be invalidated for
    /// the remainder of the resolve after a failed attempt implicates it.
    OnDemand,
}

#[derive(Debug, Clone)]
enum PopulateState {
    /// Re-entered while populating; treated optimistically as populated.
    /// The uses checker re-validates every choice afterwards, so optimism
    /// here costs at most extra permutations.
    InProgress,
    Populated,
    Failed(ResolutionError),
}

/// Fingerprint of a permutation: the head candidate choice per requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Delta(Vec<(Requirement, Option<Capability>)>);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubstituteStatus {
    Processing,
    Substituted,
    Exported,
}

/// Maps each populated requirement to its ordered candidate capabilities.
///
/// Created once per resolve, cloned cheaply for permutations. The shared
/// on-demand validity map survives clones and retries; everything else is
/// per-permutation state.
#[derive(Clone)]
pub struct Candidates {
    candidate_map: IndexMap<Requirement, Vec<Capability>>,
    /// Which requirements each capability is a candidate for.
    dependent_map: HashMap<Capability, IndexSet<Requirement>>,
    wrapped_hosts: HashMap<Resource, Resource>,
    populate_results: HashMap<Resource, PopulateState>,
    /// Export capability -> the import of the same package on the same
    /// resource that may substitute it.
    substitutable: IndexMap<Capability, Requirement>,
    mandatory: HashSet<Resource>,
    valid_on_demand: Rc<RefCell<HashMap<Resource, bool>>>,
    fragments_present: bool,
}

impl Candidates {
    pub fn new(valid_on_demand: Rc<RefCell<HashMap<Resource, bool>>>) -> Self {
        Self {
            candidate_map: IndexMap::new(),
            dependent_map: HashMap::new(),
            wrapped_hosts: HashMap::new(),
            populate_results: HashMap::new(),
            substitutable: IndexMap::new(),
            mandatory: HashSet::new(),
            valid_on_demand,
            fragments_present: false,
        }
    }

    /// Recursively pulls `resource` and every candidate provider it reaches
    /// into the candidate map.
    pub fn populate<C: ResolveContext>(
        &mut self,
        ctx: &C,
        resource: &Resource,
        mode: PopulateMode,
    ) -> Result<(), ResolutionError> {
        match mode {
            PopulateMode::Mandatory => {
                self.mandatory.insert(resource.clone());
                self.populate_resource(ctx, resource)
            }
            PopulateMode::Optional => {
                let _ = self.populate_resource(ctx, resource);
                Ok(())
            }
            PopulateMode::OnDemand => {
                self.valid_on_demand
                    .borrow_mut()
                    .entry(resource.clone())
                    .or_insert(true);
                let _ = self.populate_resource(ctx, resource);
                Ok(())
            }
        }
    }

    fn populate_resource<C: ResolveContext>(
        &mut self,
        ctx: &C,
        resource: &Resource,
    ) -> Result<(), ResolutionError> {
        match self.populate_results.get(resource) {
            Some(PopulateState::Populated) | Some(PopulateState::InProgress) => return Ok(()),
            Some(PopulateState::Failed(error)) => return Err(error.clone()),
            None => {}
        }
        if self.valid_on_demand.borrow().get(resource) == Some(&false) {
            let error = ResolutionError::InvalidatedResource {
                resource: resource.clone(),
            };
            self.populate_results
                .insert(resource.clone(), PopulateState::Failed(error.clone()));
            return Err(error);
        }
        self.populate_results
            .insert(resource.clone(), PopulateState::InProgress);

        let mut committed: Vec<(Requirement, Vec<Capability>)> = Vec::new();
        let mut failure: Option<ResolutionError> = None;

        for requirement in resource.requirements() {
            if namespace::is_dynamic(&requirement) || !ctx.is_effective(&requirement) {
                continue;
            }
            let mut candidates = ctx.find_providers(&requirement);
            let mut child_error: Option<ResolutionError> = None;
            candidates.retain(|capability| {
                let provider = capability.resource().clone();
                if &provider == resource || ctx.wiring(&provider).is_some() {
                    return true;
                }
                match self.populate_resource(ctx, &provider) {
                    Ok(()) => true,
                    Err(error) => {
                        child_error.get_or_insert(error);
                        false
                    }
                }
            });
            if candidates.is_empty() && !namespace::is_optional(&requirement) {
                failure = Some(ResolutionError::MissingRequirement {
                    resource: resource.clone(),
                    requirement,
                    cause: child_error.map(Box::new),
                });
                break;
            }
            if !candidates.is_empty() {
                committed.push((requirement, candidates));
            }
        }

        if let Some(error) = failure {
            self.populate_results
                .insert(resource.clone(), PopulateState::Failed(error.clone()));
            return Err(error);
        }

        if namespace::is_fragment(resource) {
            self.fragments_present = true;
        }
        for (requirement, candidates) in committed {
            for capability in &candidates {
                self.dependent_map
                    .entry(capability.clone())
                    .or_default()
                    .insert(requirement.clone());
            }
            self.candidate_map.insert(requirement, candidates);
        }
        self.populate_results
            .insert(resource.clone(), PopulateState::Populated);
        Ok(())
    }

    /// Seeds a single-requirement search for a dynamic import of an
    /// already-resolved host against a pre-ranked candidate list.
    pub fn populate_dynamic<C: ResolveContext>(
        &mut self,
        ctx: &C,
        host: &Resource,
        requirement: &Requirement,
        mut matches: Vec<Capability>,
    ) -> Result<(), ResolutionError> {
        let mut child_error: Option<ResolutionError> = None;
        matches.retain(|capability| {
            let provider = capability.resource().clone();
            if ctx.wiring(&provider).is_some() {
                return true;
            }
            match self.populate_resource(ctx, &provider) {
                Ok(()) => true,
                Err(error) => {
                    child_error.get_or_insert(error);
                    false
                }
            }
        });
        if matches.is_empty() {
            return Err(ResolutionError::MissingRequirement {
                resource: host.clone(),
                requirement: requirement.clone(),
                cause: child_error.map(Box::new),
            });
        }
        for capability in &matches {
            self.dependent_map
                .entry(capability.clone())
                .or_default()
                .insert(requirement.clone());
        }
        self.candidate_map.insert(requirement.clone(), matches);
        self.populate_results
            .insert(host.clone(), PopulateState::Populated);
        Ok(())
    }

    pub fn is_populated(&self, resource: &Resource) -> bool {
        matches!(
            self.populate_results.get(resource),
            Some(PopulateState::Populated)
        )
    }

    pub fn candidates(&self, requirement: &Requirement) -> Option<&[Capability]> {
        self.candidate_map.get(requirement).map(Vec::as_slice)
    }

    pub fn first_candidate(&self, requirement: &Requirement) -> Option<Capability> {
        self.candidate_map
            .get(requirement)
            .and_then(|candidates| candidates.first())
            .cloned()
    }

    /// The wrapped form of `resource` if fragments attached to it, otherwise
    /// `resource` itself.
    pub fn wrapped_host(&self, resource: &Resource) -> Resource {
        self.wrapped_hosts
            .get(resource)
            .cloned()
            .unwrap_or_else(|| resource.clone())
    }

    /// Merges attached fragments into wrapped hosts and records
    /// substitutable exports. Must run once, after population and before the
    /// search loop.
    pub fn prepare<C: ResolveContext>(&mut self, ctx: &C) -> Result<(), ResolutionError> {
        self.populate_substitutables();
        if !self.fragments_present {
            return Ok(());
        }

        // Group attachable fragments by host, in candidate-map order.
        let mut host_fragments: IndexMap<Resource, Vec<Resource>> = IndexMap::new();
        let mut all_fragments: IndexSet<Resource> = IndexSet::new();
        for (requirement, candidates) in &self.candidate_map {
            if requirement.namespace() != HOST_NAMESPACE || requirement.is_wrapped() {
                continue;
            }
            let fragment = requirement.resource().clone();
            if !matches!(
                self.populate_results.get(&fragment),
                Some(PopulateState::Populated)
            ) {
                continue;
            }
            all_fragments.insert(fragment.clone());
            for capability in candidates {
                let host = capability.resource().clone();
                let attached = host_fragments.entry(host).or_default();
                if !attached.contains(&fragment) {
                    attached.push(fragment.clone());
                }
            }
        }
        if host_fragments.is_empty() {
            return Ok(());
        }

        // A fragment must not reach itself through its hosts.
        self.check_attachment_cycles(&host_fragments)?;

        // Per host, keep the highest version of each fragment name.
        for attached in host_fragments.values_mut() {
            let mut best: IndexMap<String, Resource> = IndexMap::new();
            for fragment in attached.iter() {
                let name = namespace::symbolic_name(fragment).unwrap_or_default();
                match best.get(&name) {
                    Some(current)
                        if namespace::version(current) >= namespace::version(fragment) => {}
                    _ => {
                        best.insert(name, fragment.clone());
                    }
                }
            }
            *attached = best.into_values().collect();
        }
        let selected: HashSet<Resource> = host_fragments.values().flatten().cloned().collect();
        for fragment in all_fragments {
            if !selected.contains(&fragment) {
                self.remove_resource(&fragment)?;
            }
        }
        host_fragments.retain(|_, attached| !attached.is_empty());

        let wraps: Vec<(Resource, Resource)> = host_fragments
            .iter()
            .map(|(host, attached)| {
                (
                    host.clone(),
                    Resource::wrapped(host.clone(), attached.clone()),
                )
            })
            .collect();
        for (host, wrap) in &wraps {
            self.wrapped_hosts.insert(host.clone(), wrap.clone());
        }

        for (_, wrap) in &wraps {
            // Re-key the candidate lists under the wrapped requirements.
            for requirement in wrap.requirements() {
                if let Some(candidates) = self.candidate_map.get(requirement.declared()).cloned() {
                    for capability in &candidates {
                        self.dependent_map
                            .entry(capability.clone())
                            .or_default()
                            .insert(requirement.clone());
                    }
                    self.candidate_map.insert(requirement, candidates);
                }
            }
            // Offer the hosted capabilities wherever the declared ones were
            // candidates. The host capability itself is never replaced:
            // fragments attach to the declared host.
            for capability in wrap.capabilities() {
                if capability.namespace() == HOST_NAMESPACE {
                    continue;
                }
                let declared_cap = capability.declared().clone();
                let Some(dependents) = self.dependent_map.get(&declared_cap).cloned() else {
                    continue;
                };
                for requirement in dependents {
                    let Some(list) = self.candidate_map.get_mut(&requirement) else {
                        continue;
                    };
                    if let Some(position) = list.iter().position(|c| *c == declared_cap) {
                        list[position] = capability.clone();
                    } else if !list.contains(&capability) {
                        let _ = ctx.insert_hosted_capability(list, &capability);
                    }
                    self.dependent_map
                        .entry(capability.clone())
                        .or_default()
                        .insert(requirement.clone());
                }
            }
        }
        // The declared keys have been superseded by the wrapped ones.
        for (_, wrap) in &wraps {
            for requirement in wrap.requirements() {
                self.candidate_map.shift_remove(requirement.declared());
            }
        }
        Ok(())
    }

    fn check_attachment_cycles(
        &self,
        host_fragments: &IndexMap<Resource, Vec<Resource>>,
    ) -> Result<(), ResolutionError> {
        let mut graph: DiGraph<Resource, ()> = DiGraph::new();
        let mut nodes: HashMap<Resource, NodeIndex> = HashMap::new();
        for (host, fragments) in host_fragments {
            let host_node = match nodes.get(host) {
                Some(index) => *index,
                None => {
                    let index = graph.add_node(host.clone());
                    nodes.insert(host.clone(), index);
                    index
                }
            };
            for fragment in fragments {
                let fragment_node = match nodes.get(fragment) {
                    Some(index) => *index,
                    None => {
                        let index = graph.add_node(fragment.clone());
                        nodes.insert(fragment.clone(), index);
                        index
                    }
                };
                graph.add_edge(fragment_node, host_node, ());
            }
        }
        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(ResolutionError::FragmentCycle {
                resource: graph[cycle.node_id()].clone(),
            }),
        }
    }

    /// Records exports that the same resource also imports; such an export
    /// may be substituted away by the import's chosen provider.
    fn populate_substitutables(&mut self) {
        let populated: Vec<Resource> = self
            .candidate_map
            .keys()
            .map(|requirement| requirement.resource().clone())
            .filter(|resource| self.is_populated(resource))
            .collect();
        let mut seen: HashSet<Resource> = HashSet::new();
        for resource in populated {
            if !seen.insert(resource.clone()) {
                continue;
            }
            let mut exports: HashMap<String, Vec<Capability>> = HashMap::new();
            for capability in resource.capabilities_in(PACKAGE_NAMESPACE) {
                if let Some(name) = capability.package_name().map(str::to_string) {
                    exports.entry(name).or_default().push(capability);
                }
            }
            if exports.is_empty() {
                continue;
            }
            for requirement in resource.requirements_in(PACKAGE_NAMESPACE) {
                if namespace::is_dynamic(&requirement) {
                    continue;
                }
                let Some(candidates) = self.candidate_map.get(&requirement) else {
                    continue;
                };
                let Some(package) = candidates.first().and_then(|c| c.package_name()) else {
                    continue;
                };
                if let Some(exported) = exports.get(package) {
                    for capability in exported {
                        self.substitutable
                            .insert(capability.clone(), requirement.clone());
                    }
                }
            }
        }
    }

    /// Decides which substitutable exports are actually substituted under
    /// the current permutation and removes them from every dependent
    /// candidate list. Seeds an import permutation for each substitutable
    /// import so the decision can be revisited.
    pub fn check_substitutes(
        &mut self,
        import_permutations: &mut VecDeque<Candidates>,
    ) -> Result<(), ResolutionError> {
        let mut statuses: IndexMap<Capability, SubstituteStatus> = IndexMap::new();
        let exports: Vec<Capability> = self.substitutable.keys().cloned().collect();
        for capability in &exports {
            self.is_substituted(capability, &mut statuses);
        }
        for capability in &exports {
            if let Some(requirement) = self.substitutable.get(capability).cloned() {
                self.permutate_if_needed(&requirement, import_permutations);
            }
        }
        for (capability, status) in statuses {
            if status != SubstituteStatus::Substituted {
                continue;
            }
            let Some(dependents) = self.dependent_map.get(&capability).cloned() else {
                continue;
            };
            for requirement in dependents {
                let Some(candidates) = self.candidate_map.get_mut(&requirement) else {
                    continue;
                };
                candidates.retain(|c| c.declared() != capability.declared());
                if candidates.is_empty() {
                    self.candidate_map.shift_remove(&requirement);
                    if !namespace::is_optional(&requirement) {
                        return Err(ResolutionError::MissingRequirement {
                            resource: requirement.resource().clone(),
                            requirement: requirement.clone(),
                            cause: None,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn is_substituted(
        &self,
        capability: &Capability,
        statuses: &mut IndexMap<Capability, SubstituteStatus>,
    ) -> bool {
        match statuses.get(capability) {
            Some(SubstituteStatus::Processing) => return false,
            Some(SubstituteStatus::Substituted) => return true,
            Some(SubstituteStatus::Exported) => return false,
            None => {}
        }
        let Some(requirement) = self.substitutable.get(capability) else {
            statuses.insert(capability.clone(), SubstituteStatus::Exported);
            return false;
        };
        statuses.insert(capability.clone(), SubstituteStatus::Processing);
        if let Some(candidates) = self.candidate_map.get(requirement) {
            for candidate in candidates {
                if candidate.resource() == capability.resource() {
                    // The import still prefers the local export.
                    break;
                }
                if !self.is_substituted(candidate, statuses) {
                    statuses.insert(capability.clone(), SubstituteStatus::Substituted);
                    return true;
                }
            }
        }
        statuses.insert(capability.clone(), SubstituteStatus::Exported);
        false
    }

    /// Enqueues a copy of this state with the head candidate of
    /// `requirement` rotated to the tail.
    pub fn permutate(&self, requirement: &Requirement, permutations: &mut VecDeque<Candidates>) {
        if namespace::is_multiple(requirement) {
            return;
        }
        let Some(candidates) = self.candidate_map.get(requirement) else {
            return;
        };
        if candidates.len() < 2 {
            return;
        }
        let mut copy = self.clone();
        if let Some(list) = copy.candidate_map.get_mut(requirement) {
            list.rotate_left(1);
        }
        permutations.push_back(copy);
    }

    /// Like [`permutate`](Candidates::permutate), but skips when some queued
    /// permutation already changed the head choice for `requirement`.
    pub fn permutate_if_needed(
        &self,
        requirement: &Requirement,
        permutations: &mut VecDeque<Candidates>,
    ) {
        let Some(candidates) = self.candidate_map.get(requirement) else {
            return;
        };
        if candidates.len() < 2 {
            return;
        }
        let head = &candidates[0];
        let already_permutated = permutations.iter().any(|permutation| {
            permutation
                .candidate_map
                .get(requirement)
                .and_then(|list| list.first())
                .map(|first| first != head)
                .unwrap_or(false)
        });
        if !already_permutated {
            self.permutate(requirement, permutations);
        }
    }

    /// Whether dropping the head candidate leaves the requirement
    /// satisfiable.
    pub fn can_remove_candidate(&self, requirement: &Requirement) -> bool {
        match self.candidate_map.get(requirement) {
            Some(candidates) => candidates.len() > 1 || namespace::is_optional(requirement),
            None => false,
        }
    }

    /// Drops the head candidate. An emptied list removes the entry.
    pub fn remove_first_candidate(&mut self, requirement: &Requirement) {
        let now_empty = match self.candidate_map.get_mut(requirement) {
            Some(candidates) => {
                if !candidates.is_empty() {
                    candidates.remove(0);
                }
                candidates.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.candidate_map.shift_remove(requirement);
        }
    }

    /// For a multiple-cardinality requirement, retains only candidates
    /// outside `to_remove` and returns the survivors.
    pub fn clear_candidates(
        &mut self,
        requirement: &Requirement,
        to_remove: &HashSet<Capability>,
    ) -> Vec<Capability> {
        match self.candidate_map.get_mut(requirement) {
            Some(candidates) => {
                candidates.retain(|capability| !to_remove.contains(capability));
                candidates.clone()
            }
            None => Vec::new(),
        }
    }

    pub fn delta(&self) -> Delta {
        Delta(
            self.candidate_map
                .iter()
                .map(|(requirement, candidates)| {
                    (requirement.clone(), candidates.first().cloned())
                })
                .collect(),
        )
    }

    pub fn copy(&self) -> Candidates {
        self.clone()
    }

    /// Removes an unselected fragment and cascades to resources left
    /// without candidates for a non-optional requirement.
    fn remove_resource(&mut self, resource: &Resource) -> Result<(), ResolutionError> {
        let reason = ResolutionError::FragmentNotSelected {
            resource: resource.clone(),
        };
        let mut work = vec![resource.clone()];
        let mut visited: HashSet<Resource> = HashSet::new();
        while let Some(removed) = work.pop() {
            if !visited.insert(removed.clone()) {
                continue;
            }
            self.populate_results
                .insert(removed.clone(), PopulateState::Failed(reason.clone()));
            let owned: Vec<Requirement> = self
                .candidate_map
                .keys()
                .filter(|requirement| requirement.resource() == &removed)
                .cloned()
                .collect();
            for requirement in owned {
                self.candidate_map.shift_remove(&requirement);
            }
            for capability in removed.capabilities() {
                let Some(dependents) = self.dependent_map.get(&capability).cloned() else {
                    continue;
                };
                for requirement in dependents {
                    let Some(candidates) = self.candidate_map.get_mut(&requirement) else {
                        continue;
                    };
                    candidates.retain(|c| c != &capability);
                    if candidates.is_empty() {
                        self.candidate_map.shift_remove(&requirement);
                        if !namespace::is_optional(&requirement) {
                            let owner = requirement.resource().clone();
                            if self.mandatory.contains(&owner) {
                                return Err(ResolutionError::MissingRequirement {
                                    resource: owner,
                                    requirement: requirement.clone(),
                                    cause: Some(Box::new(reason.clone())),
                                });
                            }
                            work.push(owner);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}
