//! Expression extensions and condition evaluation for conditional TTLs.
//!
//! This crate layers three things on top of the CEL interpreter:
//!
//! - [`expand`]: compile-time rewriting of the `sortBy` receiver macro
//!   into the interpreter's native comprehension plus a sort call.
//! - [`compare`] and [`registry`]: the `sort`, `pair` and `reverseList`
//!   extension functions, with a stable comparator over interpreter
//!   values and over record collections keyed by creation timestamp.
//! - [`eval`]: ordered evaluation of condition lists against frozen
//!   target snapshots, folding every failure mode into a [`Verdict`]
//!   with a status reason and a retryability flag.

pub mod compare;
pub mod error;
pub mod eval;
pub mod expand;
pub mod registry;

pub use compare::{sort, SortOrder};
pub use error::{Error, Result};
pub use eval::{evaluate_conditions, Verdict};
pub use expand::expand;
pub use registry::{build_context, json_to_value, register_extensions};
