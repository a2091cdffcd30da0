//! Condition evaluation over resolved target snapshots.
//!
//! Conditions are evaluated in declaration order against a fresh context
//! built from the frozen snapshots. Conjunction does not short-circuit:
//! a later condition that fails to compile or evaluate surfaces its error
//! even when an earlier condition already came out false, so authors see
//! broken expressions immediately instead of whenever the earlier ones
//! happen to flip.

use cel_interpreter::Value;
use chrono::{DateTime, Utc};
use tracing::debug;

use reaper_api::{ConditionStatus, ReadyReason, TargetStatus};

/// Outcome of one evaluation pass, carrying everything the caller needs
/// to both gate deletion and report status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// All conditions evaluated to `true`.
    pub conditions_met: bool,
    /// Whether the pass is worth retrying later. Expired TTLs with
    /// unmet conditions and transient evaluation failures are; broken
    /// expressions are not.
    pub retryable: bool,
    pub status: ConditionStatus,
    pub reason: ReadyReason,
    pub message: String,
}

impl Verdict {
    fn met() -> Self {
        Self {
            conditions_met: true,
            retryable: false,
            status: ConditionStatus::True,
            reason: ReadyReason::Terminating,
            message: "targets resolved and conditions met".to_string(),
        }
    }

    fn waiting() -> Self {
        // Every condition compiled and evaluated cleanly, so the object
        // reports healthy while the gate stays closed.
        Self {
            conditions_met: false,
            retryable: true,
            status: ConditionStatus::True,
            reason: ReadyReason::WaitingForConditions,
            message: "waiting for conditions to be met".to_string(),
        }
    }

    fn failure(reason: ReadyReason, retryable: bool, message: String) -> Self {
        Self {
            conditions_met: false,
            retryable,
            status: ConditionStatus::False,
            reason,
            message,
        }
    }
}

/// Evaluate every condition against the resolved snapshots.
///
/// The first broken condition aborts the pass: a compile failure or a
/// non-boolean result is permanent (the expression itself is wrong), an
/// evaluation failure is retryable (the data may change). An empty
/// condition list is trivially met.
pub fn evaluate_conditions(
    targets: &[TargetStatus],
    now: DateTime<Utc>,
    conditions: &[String],
) -> Verdict {
    let ctx = match crate::registry::build_context(targets, now) {
        Ok(ctx) => ctx,
        Err(e) => {
            return Verdict::failure(
                ReadyReason::EnvironmentError,
                false,
                format!("unable to build evaluation environment: {e}"),
            );
        }
    };

    let mut all_met = true;
    for (index, condition) in conditions.iter().enumerate() {
        let parsed = match cel_parser::parse(condition) {
            Ok(expr) => expr,
            Err(e) => {
                return Verdict::failure(
                    ReadyReason::CompileError,
                    false,
                    format!("unable to compile condition {index}: {e}"),
                );
            }
        };
        let expanded = match crate::expand::expand(parsed) {
            Ok(expr) => expr,
            Err(e) => {
                return Verdict::failure(
                    ReadyReason::CompileError,
                    false,
                    format!("unable to compile condition {index}: {e}"),
                );
            }
        };
        let value = match ctx.resolve(&expanded) {
            Ok(value) => value,
            Err(e) => {
                return Verdict::failure(
                    ReadyReason::EvaluationError,
                    true,
                    format!("unable to evaluate condition {index}: {e}"),
                );
            }
        };
        match value {
            Value::Bool(met) => {
                debug!(condition = index, met, "condition evaluated");
                all_met = all_met && met;
            }
            other => {
                return Verdict::failure(
                    ReadyReason::ResultNotBoolean,
                    false,
                    format!(
                        "condition {index} produced {}, expected a boolean",
                        crate::compare::kind(&other)
                    ),
                );
            }
        }
    }

    if all_met {
        Verdict::met()
    } else {
        Verdict::waiting()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use reaper_api::TargetState;
    use serde_json::json;

    fn target(name: &str, items: Vec<serde_json::Value>) -> TargetStatus {
        TargetStatus {
            name: name.to_string(),
            delete: true,
            include_when_evaluating: true,
            state: TargetState::Collection(items),
        }
    }

    fn evaluate(targets: &[TargetStatus], conditions: &[&str]) -> Verdict {
        let conditions: Vec<String> = conditions.iter().map(ToString::to_string).collect();
        evaluate_conditions(targets, Utc::now(), &conditions)
    }

    #[test]
    fn test_empty_condition_list_is_trivially_met() {
        let verdict = evaluate(&[], &[]);
        assert!(verdict.conditions_met);
        assert_eq!(verdict.reason, ReadyReason::Terminating);
        assert_eq!(verdict.status, ConditionStatus::True);
    }

    #[test]
    fn test_all_true_conditions_terminate() {
        let pods = target("pods", vec![json!({"phase": "Succeeded"})]);
        let verdict = evaluate(
            &[pods],
            &["size(pods) == 1", r#"pods[0].phase == "Succeeded""#],
        );
        assert!(verdict.conditions_met);
        assert!(!verdict.retryable);
        assert_eq!(verdict.reason, ReadyReason::Terminating);
    }

    #[test]
    fn test_unmet_condition_waits_and_retries() {
        let pods = target("pods", vec![json!({"phase": "Running"})]);
        let verdict = evaluate(&[pods], &["size(pods) == 0"]);
        assert!(!verdict.conditions_met);
        assert!(verdict.retryable);
        assert_eq!(verdict.status, ConditionStatus::True);
        assert_eq!(verdict.reason, ReadyReason::WaitingForConditions);
    }

    #[test]
    fn test_compile_error_is_permanent() {
        let verdict = evaluate(&[], &["1 =="]);
        assert!(!verdict.conditions_met);
        assert!(!verdict.retryable);
        assert_eq!(verdict.reason, ReadyReason::CompileError);
        assert!(verdict.message.contains("condition 0"), "{}", verdict.message);
    }

    #[test]
    fn test_broken_later_condition_surfaces_despite_earlier_false() {
        // No short-circuit: the author learns about the broken second
        // condition now, not after the first one flips to true.
        let verdict = evaluate(&[], &["1 == 2", "1 =="]);
        assert_eq!(verdict.reason, ReadyReason::CompileError);
        assert!(verdict.message.contains("condition 1"), "{}", verdict.message);
    }

    #[test]
    fn test_expansion_failure_reports_as_compile_error() {
        let pods = target("pods", Vec::new());
        let verdict = evaluate(&[pods], &["size(pods.sortBy(p.x, p.x)) == 0"]);
        assert_eq!(verdict.reason, ReadyReason::CompileError);
        assert!(!verdict.retryable);
    }

    #[test]
    fn test_evaluation_error_is_retryable() {
        let verdict = evaluate(&[], &["size(missing) == 0"]);
        assert!(!verdict.conditions_met);
        assert!(verdict.retryable);
        assert_eq!(verdict.reason, ReadyReason::EvaluationError);
    }

    #[test]
    fn test_non_boolean_result_is_permanent() {
        let verdict = evaluate(&[], &["1 + 1"]);
        assert!(!verdict.retryable);
        assert_eq!(verdict.reason, ReadyReason::ResultNotBoolean);
        assert!(verdict.message.contains("int"), "{}", verdict.message);
    }

    #[test]
    fn test_environment_failure_is_permanent() {
        let a = target("pods", Vec::new());
        let b = target("pods", Vec::new());
        let verdict = evaluate(&[a, b], &["true"]);
        assert!(!verdict.retryable);
        assert_eq!(verdict.reason, ReadyReason::EnvironmentError);
    }

    #[test]
    fn test_sort_by_condition_end_to_end() {
        let pods = target(
            "pods",
            vec![
                json!({"metadata": {"name": "b"}, "restarts": 5}),
                json!({"metadata": {"name": "a"}, "restarts": 1}),
            ],
        );
        let verdict = evaluate(
            &[pods],
            &[r#"pods.sortBy(p, p.restarts, "desc")[0].metadata.name == "b""#],
        );
        assert!(verdict.conditions_met, "{}", verdict.message);
    }
}
