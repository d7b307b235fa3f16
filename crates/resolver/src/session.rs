use crate::candidates::Candidates;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use weft_model::{Capability, ResolveContext};

/// The transitive providers of a package, shared between the capabilities
/// that contribute it. Sets are registered in the session cache before they
/// are fully built so that require-cycles terminate.
pub(crate) type PackageSources = Rc<RefCell<HashSet<Capability>>>;

/// Per-resolve mutable state. Never shared across threads; all interior
/// mutability is confined to the calling thread.
pub(crate) struct ResolveSession<'a, C: ResolveContext> {
    ctx: &'a C,
    /// High-priority permutations seeded by uses-conflict mitigation.
    uses_permutations: RefCell<VecDeque<Candidates>>,
    /// Low-priority permutations backtracking on original import decisions.
    import_permutations: RefCell<VecDeque<Candidates>>,
    /// A delta of the current permutation with multiple-cardinality
    /// candidates cleared; adopted as the result if the attempt passes.
    multiple_card_candidates: RefCell<Option<Candidates>>,
    package_sources: RefCell<HashMap<Capability, PackageSources>>,
    uses_cache: RefCell<HashMap<String, Rc<Vec<String>>>>,
}

impl<'a, C: ResolveContext> ResolveSession<'a, C> {
    pub fn new(ctx: &'a C) -> Self {
        Self {
            ctx,
            uses_permutations: RefCell::new(VecDeque::new()),
            import_permutations: RefCell::new(VecDeque::new()),
            multiple_card_candidates: RefCell::new(None),
            package_sources: RefCell::new(HashMap::new()),
            uses_cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn ctx(&self) -> &C {
        self.ctx
    }

    pub fn push_uses_permutation(&self, candidates: Candidates) {
        self.uses_permutations.borrow_mut().push_back(candidates);
    }

    pub fn with_import_queue<R>(&self, f: impl FnOnce(&mut VecDeque<Candidates>) -> R) -> R {
        f(&mut self.import_permutations.borrow_mut())
    }

    /// Next permutation to try, preferring uses-permutations.
    pub fn next_permutation(&self) -> Option<Candidates> {
        self.uses_permutations
            .borrow_mut()
            .pop_front()
            .or_else(|| self.import_permutations.borrow_mut().pop_front())
    }

    pub fn permutation_count(&self) -> usize {
        self.uses_permutations.borrow().len() + self.import_permutations.borrow().len()
    }

    /// Clears the per-attempt caches at the top of each permutation attempt.
    pub fn begin_attempt(&self) {
        self.package_sources.borrow_mut().clear();
        *self.multiple_card_candidates.borrow_mut() = None;
    }

    /// Runs `f` on the multiple-cardinality delta, creating it as a copy of
    /// `base` on first use within an attempt.
    pub fn with_multiple_card<R>(
        &self,
        base: &Candidates,
        f: impl FnOnce(&mut Candidates) -> R,
    ) -> R {
        let mut slot = self.multiple_card_candidates.borrow_mut();
        let candidates = slot.get_or_insert_with(|| base.copy());
        f(candidates)
    }

    pub fn take_multiple_card(&self) -> Option<Candidates> {
        self.multiple_card_candidates.borrow_mut().take()
    }

    pub fn package_sources_for(&self, capability: &Capability) -> Option<PackageSources> {
        self.package_sources.borrow().get(capability).cloned()
    }

    pub fn insert_package_sources(&self, capability: Capability, sources: PackageSources) {
        self.package_sources.borrow_mut().insert(capability, sources);
    }

    /// Memoised parse of a `uses` directive: package names separated by
    /// commas and whitespace.
    pub fn parse_uses(&self, raw: &str) -> Rc<Vec<String>> {
        if let Some(parsed) = self.uses_cache.borrow().get(raw) {
            return parsed.clone();
        }
        let parsed = Rc::new(
            raw.split(|c: char| c == ',' || c.is_whitespace())
                .filter(|part| !part.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>(),
        );
        self.uses_cache
            .borrow_mut()
            .insert(raw.to_string(), parsed.clone());
        parsed
    }
}
