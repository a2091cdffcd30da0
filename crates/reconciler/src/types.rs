//! Shared types for the reconciliation engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Namespaced identity of a managed object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The kind of resource a target reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub api_version: String,
    pub kind: String,
}

impl ResourceRef {
    pub fn new(api_version: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.api_version, self.kind)
    }
}

/// What the engine wants to happen after a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// When to look at the object again. `None` means wait for the next
    /// change notification; zero means immediately.
    pub requeue_after: Option<std::time::Duration>,
}

impl ReconcileOutcome {
    /// Nothing further to do until the object changes.
    pub fn done() -> Self {
        Self {
            requeue_after: None,
        }
    }

    /// Look again as soon as possible.
    pub fn requeue_now() -> Self {
        Self {
            requeue_after: Some(std::time::Duration::ZERO),
        }
    }

    /// Look again after the given delay.
    pub fn requeue_after(delay: std::time::Duration) -> Self {
        Self {
            requeue_after: Some(delay),
        }
    }

    pub fn is_done(&self) -> bool {
        self.requeue_after.is_none()
    }
}
