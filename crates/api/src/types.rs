//! Core object model for conditional TTL-gated deletion.
//!
//! A [`ConditionalTtl`] declares a minimum lifetime, a set of referenced
//! targets to track and optionally delete, and a list of boolean
//! expression conditions that must all hold before deletion proceeds.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::conditions::{set_condition, Condition, ConditionStatus, ReadyReason};
use crate::duration::Duration;
use crate::error::{Error, Result};

/// Context variable name reserved for the evaluation instant.
pub const RESERVED_CONTEXT_NAME: &str = "time";

/// Minimal object metadata slice the engine reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default)]
    pub uid: String,
    #[serde(default)]
    pub generation: i64,
    pub creation_timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Create metadata for a namespaced object created now.
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            uid: String::new(),
            generation: 1,
            creation_timestamp: Utc::now(),
            deletion_timestamp: None,
            finalizers: Vec::new(),
            labels: BTreeMap::new(),
        }
    }
}

/// How a target group should be looked up: a single object by name, or a
/// collection by label selector. When both are set, `name` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetReference {
    pub api_version: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<BTreeMap<String, String>>,
}

/// A named target group: what to find, whether to delete it, and whether
/// its state participates in condition evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    #[serde(default)]
    pub delete: bool,
    #[serde(default)]
    pub include_when_evaluating: bool,
    pub reference: TargetReference,
}

/// How condition evaluation should be retried while the gate is false.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    pub period: Duration,
}

/// An external release to optionally tear down during finalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseConfig {
    pub release: String,
    #[serde(default)]
    pub delete: bool,
}

/// Declarative spec of a [`ConditionalTtl`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalTtlSpec {
    /// Minimum lifetime relative to the object's creation timestamp.
    pub ttl: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release: Option<ReleaseConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<Target>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_sink: Option<Url>,
}

impl ConditionalTtlSpec {
    /// Check the construction-time obligations the engine itself does not
    /// enforce. Meant to run at admission, before an object is accepted.
    pub fn validate(&self) -> Result<()> {
        if !self.conditions.is_empty() && self.retry.is_none() {
            return Err(Error::invalid_spec(
                "a retry period is required when conditions are declared",
            ));
        }
        let mut seen = std::collections::BTreeSet::new();
        for target in &self.targets {
            if target.name.is_empty() {
                return Err(Error::invalid_spec("target name must not be empty"));
            }
            if target.name == RESERVED_CONTEXT_NAME {
                return Err(Error::invalid_spec(format!(
                    "target name {RESERVED_CONTEXT_NAME:?} is reserved for the evaluation instant"
                )));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(Error::invalid_spec(format!(
                    "duplicate target name {:?}",
                    target.name
                )));
            }
            if target.reference.name.is_none() && target.reference.label_selector.is_none() {
                return Err(Error::invalid_spec(format!(
                    "target {:?} must reference a name or a label selector",
                    target.name
                )));
            }
        }
        Ok(())
    }
}

/// The resolved state of a target group: a single record or a homogeneous
/// ordered sequence of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetState {
    Collection(Vec<serde_json::Value>),
    Object(serde_json::Value),
}

impl TargetState {
    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        match self {
            Self::Collection(items) => items.len(),
            Self::Object(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A target snapshot frozen into status once the gate is met.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetStatus {
    pub name: String,
    pub delete: bool,
    pub include_when_evaluating: bool,
    pub state: TargetState,
}

/// Observed state of a [`ConditionalTtl`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalTtlStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
}

/// A managed object declaring conditional, TTL-gated deletion of a group
/// of related resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalTtl {
    pub metadata: ObjectMeta,
    pub spec: ConditionalTtlSpec,
    #[serde(default)]
    pub status: ConditionalTtlStatus,
}

impl ConditionalTtl {
    /// Create an object with the given metadata and spec and empty status.
    pub fn new(metadata: ObjectMeta, spec: ConditionalTtlSpec) -> Self {
        Self {
            metadata,
            spec,
            status: ConditionalTtlStatus::default(),
        }
    }

    /// The instant the TTL gate opens.
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.metadata.creation_timestamp + self.spec.ttl.as_chrono()
    }

    /// Whether the object is being deleted.
    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self, name: &str) -> bool {
        self.metadata.finalizers.iter().any(|f| f == name)
    }

    /// Attach a finalizer marker; returns true when it was not yet present.
    pub fn add_finalizer(&mut self, name: &str) -> bool {
        if self.has_finalizer(name) {
            return false;
        }
        self.metadata.finalizers.push(name.to_string());
        true
    }

    /// Detach a finalizer marker; returns true when it was present.
    pub fn remove_finalizer(&mut self, name: &str) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != name);
        self.metadata.finalizers.len() != before
    }

    /// Publish the `Ready` condition on the status.
    pub fn set_ready(&mut self, status: ConditionStatus, reason: ReadyReason, message: impl Into<String>) {
        let condition = Condition::ready(status, reason, message, self.metadata.generation);
        set_condition(&mut self.status.conditions, condition);
    }
}
