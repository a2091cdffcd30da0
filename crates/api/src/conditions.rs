//! Status conditions published on reconciled objects.
//!
//! The `Ready` condition is the primary externally observable state of a
//! [`ConditionalTtl`](crate::ConditionalTtl): exactly one [`ReadyReason`]
//! holds at any time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The condition type the engine publishes.
pub const CONDITION_TYPE_READY: &str = "Ready";

/// Three-valued condition status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Reason codes for the `Ready` condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyReason {
    /// The object's TTL has not elapsed yet.
    NotExpired,
    /// One of the declared targets could not be resolved.
    TargetResolveError,
    /// The evaluation environment could not be built.
    EnvironmentError,
    /// A condition failed to compile.
    CompileError,
    /// A condition raised a runtime error.
    EvaluationError,
    /// A condition evaluated to a non-boolean value.
    ResultNotBoolean,
    /// All conditions compiled and evaluated, but the gate is still false.
    WaitingForConditions,
    /// The gate is true and teardown has begun.
    Terminating,
}

/// A single observed condition, mirroring the persisted wire shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: String,
    pub status: ConditionStatus,
    pub reason: ReadyReason,
    pub message: String,
    pub observed_generation: i64,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Build a `Ready` condition transitioning now; [`set_condition`]
    /// keeps the previous transition time when the status is unchanged.
    pub fn ready(
        status: ConditionStatus,
        reason: ReadyReason,
        message: impl Into<String>,
        observed_generation: i64,
    ) -> Self {
        Self {
            condition_type: CONDITION_TYPE_READY.to_string(),
            status,
            reason,
            message: message.into(),
            observed_generation,
            last_transition_time: Utc::now(),
        }
    }
}

/// Insert or update a condition in place, preserving the previous
/// `lastTransitionTime` when the status did not change.
pub fn set_condition(conditions: &mut Vec<Condition>, mut new: Condition) {
    match conditions
        .iter_mut()
        .find(|c| c.condition_type == new.condition_type)
    {
        Some(existing) => {
            if existing.status == new.status {
                new.last_transition_time = existing.last_transition_time;
            }
            *existing = new;
        }
        None => conditions.push(new),
    }
}

/// Find a condition by type.
pub fn find_condition<'a>(conditions: &'a [Condition], condition_type: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.condition_type == condition_type)
}
