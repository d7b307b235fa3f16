//! # weft-model
//!
//! The capability and requirement model consumed by the weft resolver:
//! resources, capabilities, requirements, wires, attribute values, filters,
//! and the [`ResolveContext`] contract a caller implements.
//!
//! Resources are cheap-to-clone handles. Wrapped hosts (a host merged with
//! its attached fragments) and hosted capabilities are modelled as variants
//! of the same types, with `declared()` accessors to unwrap them; everything
//! crossing the API boundary deals in declared entities.

mod context;
mod error;
mod filter;
pub mod namespace;
mod resource;
mod value;
mod wire;

pub use context::ResolveContext;
pub use error::{ModelError, Result};
pub use filter::{Attributes, Directives, Filter};
pub use resource::{Capability, Requirement, Resource, ResourceBuilder};
pub use value::{Value, Version};
pub use wire::{Wire, Wiring};
