//! Release teardown abstraction.
//!
//! A conditional TTL may own an external release (a packaged install
//! living outside the target resources). Tearing it down is behind a
//! trait so the engine never links against a package manager directly.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use crate::error::{Error, Result};

/// Uninstalls named releases. Uninstalling a release that no longer
/// exists must succeed; the engine retries failed finalizer steps and
/// will call this again.
#[async_trait]
pub trait ReleaseUninstaller: Send + Sync {
    async fn uninstall(&self, namespace: &str, release: &str) -> Result<()>;
}

/// Records uninstall requests instead of performing them. Used in tests
/// and dry runs.
#[derive(Default)]
pub struct RecordingUninstaller {
    uninstalled: RwLock<Vec<(String, String)>>,
    fail_next: RwLock<bool>,
}

impl RecordingUninstaller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next uninstall call fail once.
    pub async fn fail_next(&self) {
        *self.fail_next.write().await = true;
    }

    /// Namespaced releases uninstalled so far.
    pub async fn uninstalled(&self) -> Vec<(String, String)> {
        self.uninstalled.read().await.clone()
    }
}

#[async_trait]
impl ReleaseUninstaller for RecordingUninstaller {
    async fn uninstall(&self, namespace: &str, release: &str) -> Result<()> {
        let mut fail = self.fail_next.write().await;
        if *fail {
            *fail = false;
            return Err(Error::release_uninstall(release, "injected failure"));
        }
        drop(fail);

        info!(namespace, release, "recording release uninstall");
        self.uninstalled
            .write()
            .await
            .push((namespace.to_string(), release.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[tokio::test]
    async fn test_recording_uninstaller_records() {
        let uninstaller = RecordingUninstaller::new();
        uninstaller.uninstall("default", "web").await.unwrap();
        assert_eq!(
            uninstaller.uninstalled().await,
            vec![("default".to_string(), "web".to_string())]
        );
    }

    #[tokio::test]
    async fn test_injected_failure_fails_once() {
        let uninstaller = RecordingUninstaller::new();
        uninstaller.fail_next().await;
        assert!(uninstaller.uninstall("default", "web").await.is_err());
        assert!(uninstaller.uninstall("default", "web").await.is_ok());
    }
}
