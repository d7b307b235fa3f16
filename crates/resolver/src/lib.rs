//! # weft-resolver
//!
//! A backtracking resolver for capability wiring. Given modules that
//! declare capabilities and requirements, it decides which providers
//! satisfy which requirements such that the resulting wiring graph is
//! globally consistent — including the transitive class-space rule imposed
//! by `uses` directives — or proves that no consistent wiring exists.
//!
//! ## Architecture
//!
//! ```text
//! ResolveContext (caller)
//!     │ mandatory/optional resources, ranked providers, existing wirings
//!     ▼
//! Candidates ──── populate (recursive pull-in)
//!     │           prepare (fragment merging, substitutable exports)
//!     ▼
//! Search loop ─── per permutation:
//!     │             package spaces (exported/imported/required/used)
//!     │             uses-constraint check
//!     │             on conflict: seed uses- and import-permutations, retry
//!     ▼
//! WireMap ─────── package wires, bundle wires, capability wires
//! ```
//!
//! The resolver is a pure function of the context: no I/O, no global state,
//! deterministic for deterministic provider ordering.

mod candidates;
mod consistency;
mod context;
mod diagnostics;
mod error;
mod ordering;
mod packages;
mod resolver;
mod session;

pub use candidates::{Candidates, Delta, PopulateMode};
pub use context::StaticResolveContext;
pub use error::{ResolutionError, Result};
pub use ordering::compare_candidates;
pub use resolver::{Resolver, WireMap};
