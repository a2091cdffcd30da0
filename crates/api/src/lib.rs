//! Object model for conditional, TTL-gated deletion of resource groups.
//!
//! A [`ConditionalTtl`] declares:
//!
//! - a **TTL**: a minimum lifetime relative to its creation timestamp,
//! - **targets**: named references to a single resource or a label-selected
//!   collection, tracked for evaluation and optionally deleted,
//! - **conditions**: boolean expressions that must all hold before deletion
//!   proceeds, retried on a configured period,
//! - optionally an external **release** to tear down and an **event sink**
//!   to notify once deletion happens.
//!
//! The reconciliation engine lives in `reaper-reconciler`; the expression
//! extension layer in `reaper-cel`. This crate is only the declarative
//! model and its wire contract.

pub mod conditions;
pub mod duration;
pub mod error;
pub mod types;

pub use conditions::{
    find_condition, set_condition, Condition, ConditionStatus, ReadyReason, CONDITION_TYPE_READY,
};
pub use duration::Duration;
pub use error::{Error, Result};
pub use types::{
    ConditionalTtl, ConditionalTtlSpec, ConditionalTtlStatus, ObjectMeta, ReleaseConfig,
    RetryConfig, Target, TargetReference, TargetState, TargetStatus, RESERVED_CONTEXT_NAME,
};
