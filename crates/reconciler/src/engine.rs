//! The reconciliation engine.
//!
//! One pass over one object moves it through the lifecycle:
//!
//! 1. Still inside its TTL: publish `NotExpired` and requeue for the
//!    moment the gate opens.
//! 2. Expired: resolve targets and evaluate the conditions against the
//!    resolved snapshots.
//! 3. Conditions unmet: publish the verdict and requeue on the retry
//!    period when the verdict is worth retrying.
//! 4. Conditions met: freeze the snapshots into status, attach one
//!    finalizer marker per cleanup duty and request deletion of the
//!    object.
//! 5. Marked for deletion: perform exactly one finalizer step per pass,
//!    in fixed order, removing its marker afterwards.
//!
//! The engine is deliberately level-triggered: every decision is derived
//! from the stored object, never from memory carried between passes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use reaper_api::{ConditionStatus, ConditionalTtl, ReadyReason};
use reaper_cel::evaluate_conditions;

use crate::error::{Error, Result};
use crate::finalize::{
    self, EVENT_FINALIZER, FINALIZER_ORDER, RELEASE_FINALIZER, TARGET_FINALIZER,
};
use crate::release::ReleaseUninstaller;
use crate::resolve::resolve_targets;
use crate::sink::EventSink;
use crate::store::ResourceStore;
use crate::types::{ObjectKey, ReconcileOutcome};

/// Reconciles conditional TTL objects against a store.
pub struct Reconciler {
    store: Arc<dyn ResourceStore>,
    uninstaller: Arc<dyn ReleaseUninstaller>,
    sink: Arc<dyn EventSink>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        uninstaller: Arc<dyn ReleaseUninstaller>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            uninstaller,
            sink,
        }
    }

    /// Reconcile one object now.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome> {
        self.reconcile_at(key, Utc::now()).await
    }

    /// Reconcile one object as of the given instant. Split out so tests
    /// can drive the clock.
    pub async fn reconcile_at(
        &self,
        key: &ObjectKey,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        let Some(mut object) = self.store.get(key).await? else {
            debug!(object = %key, "object no longer exists");
            return Ok(ReconcileOutcome::done());
        };

        if object.is_deleting() {
            return self.finalize(&mut object, now).await;
        }

        let expires_at = object.expires_at();
        // The exact expiry instant still counts as unexpired.
        if now <= expires_at {
            let wait = (expires_at - now).to_std().unwrap_or_default();
            debug!(object = %key, expires_at = %expires_at, "time-to-live has not elapsed");
            object.set_ready(
                ConditionStatus::Unknown,
                ReadyReason::NotExpired,
                format!("time-to-live elapses at {}", expires_at.to_rfc3339()),
            );
            self.store.update_status(&object).await?;
            return Ok(ReconcileOutcome::requeue_after(wait));
        }

        let targets = match resolve_targets(self.store.as_ref(), &object).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(object = %key, error = %e, "target resolution failed");
                object.set_ready(
                    ConditionStatus::False,
                    ReadyReason::TargetResolveError,
                    e.to_string(),
                );
                self.store.update_status(&object).await?;
                // Retry is left to the caller's ambient backoff.
                return Err(e);
            }
        };

        let verdict = evaluate_conditions(&targets, now, &object.spec.conditions);
        debug!(
            object = %key,
            met = verdict.conditions_met,
            reason = ?verdict.reason,
            "conditions evaluated"
        );
        object.set_ready(verdict.status, verdict.reason, verdict.message.clone());

        if !verdict.conditions_met {
            self.store.update_status(&object).await?;
            if verdict.retryable {
                return Ok(match object.spec.retry {
                    Some(retry) => ReconcileOutcome::requeue_after(retry.period.to_std()),
                    None => ReconcileOutcome::done(),
                });
            }
            info!(object = %key, reason = ?verdict.reason, "giving up on conditions");
            return Ok(ReconcileOutcome::done());
        }

        // The snapshots freeze into status only once the gate is open.
        object.status.targets = targets;
        object.status.evaluation_time = Some(now);
        self.store.update_status(&object).await?;

        self.begin_deletion(key, &mut object).await
    }

    /// Attach the finalizer markers the spec calls for and request
    /// deletion. The finalizer steps run on subsequent passes.
    async fn begin_deletion(
        &self,
        key: &ObjectKey,
        object: &mut ConditionalTtl,
    ) -> Result<ReconcileOutcome> {
        let mut changed = false;
        if object.status.targets.iter().any(|t| t.delete) {
            changed |= object.add_finalizer(TARGET_FINALIZER);
        }
        if object.spec.release.as_ref().is_some_and(|r| r.delete) {
            changed |= object.add_finalizer(RELEASE_FINALIZER);
        }
        if object.spec.event_sink.is_some() {
            changed |= object.add_finalizer(EVENT_FINALIZER);
        }
        if changed {
            self.store.update(object).await?;
        }

        info!(
            object = %key,
            finalizers = object.metadata.finalizers.len(),
            "gate open, deleting object"
        );
        self.store.delete(key).await?;
        Ok(ReconcileOutcome::requeue_now())
    }

    /// Run the first pending finalizer step and persist its removal. A
    /// step that fails leaves its marker in place, so the next pass
    /// retries it.
    async fn finalize(
        &self,
        object: &mut ConditionalTtl,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome> {
        for name in FINALIZER_ORDER {
            if !object.has_finalizer(name) {
                continue;
            }
            info!(object = %object.metadata.name, finalizer = name, "running finalizer step");
            match name {
                TARGET_FINALIZER => {
                    finalize::delete_targets(self.store.as_ref(), object).await?;
                }
                RELEASE_FINALIZER => {
                    finalize::uninstall_release(self.uninstaller.as_ref(), object).await?;
                }
                EVENT_FINALIZER => {
                    finalize::notify_sink(self.sink.as_ref(), object, now).await?;
                }
                _ => continue,
            }
            object.remove_finalizer(name);
            self.store.update(object).await?;
            return Ok(ReconcileOutcome::requeue_now());
        }
        debug!(object = %object.metadata.name, "no pending finalizer steps");
        Ok(ReconcileOutcome::done())
    }
}

/// Builder for [`Reconciler`].
#[derive(Default)]
pub struct ReconcilerBuilder {
    store: Option<Arc<dyn ResourceStore>>,
    uninstaller: Option<Arc<dyn ReleaseUninstaller>>,
    sink: Option<Arc<dyn EventSink>>,
}

impl ReconcilerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_uninstaller(mut self, uninstaller: Arc<dyn ReleaseUninstaller>) -> Self {
        self.uninstaller = Some(uninstaller);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> Result<Reconciler> {
        let store = self
            .store
            .ok_or_else(|| Error::invalid_config("a resource store is required"))?;
        let uninstaller = self
            .uninstaller
            .ok_or_else(|| Error::invalid_config("a release uninstaller is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| Error::invalid_config("an event sink is required"))?;
        Ok(Reconciler::new(store, uninstaller, sink))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::panic)]

    use super::*;
    use crate::release::RecordingUninstaller;
    use crate::sink::RecordingSink;
    use crate::store::InMemoryStore;
    use crate::types::ResourceRef;
    use reaper_api::{
        ConditionalTtlSpec, Duration, ObjectMeta, ReleaseConfig, RetryConfig, Target,
        TargetReference, CONDITION_TYPE_READY,
    };
    use reaper_api::find_condition;
    use serde_json::json;
    use std::collections::BTreeMap;

    struct Harness {
        store: Arc<InMemoryStore>,
        uninstaller: Arc<RecordingUninstaller>,
        sink: Arc<RecordingSink>,
        reconciler: Reconciler,
    }

    impl Harness {
        fn new() -> Self {
            let store = Arc::new(InMemoryStore::new());
            let uninstaller = Arc::new(RecordingUninstaller::new());
            let sink = Arc::new(RecordingSink::new());
            let reconciler = Reconciler::new(store.clone(), uninstaller.clone(), sink.clone());
            Self {
                store,
                uninstaller,
                sink,
                reconciler,
            }
        }

        async fn ready_reason(&self, key: &ObjectKey) -> Option<ReadyReason> {
            self.ready(key).await.map(|(_, reason)| reason)
        }

        async fn ready(&self, key: &ObjectKey) -> Option<(ConditionStatus, ReadyReason)> {
            let object = self.store.get(key).await.unwrap()?;
            find_condition(&object.status.conditions, CONDITION_TYPE_READY)
                .map(|c| (c.status, c.reason))
        }

        /// Drive passes until the object disappears or the step limit
        /// trips.
        async fn run_to_completion(&self, key: &ObjectKey) {
            for _ in 0..10 {
                if self.store.get(key).await.unwrap().is_none() {
                    return;
                }
                self.reconciler.reconcile(key).await.unwrap();
            }
            panic!("object never finished deleting");
        }
    }

    fn spec() -> ConditionalTtlSpec {
        ConditionalTtlSpec {
            ttl: Duration::seconds(0),
            retry: Some(RetryConfig {
                period: Duration::seconds(30),
            }),
            release: None,
            targets: Vec::new(),
            conditions: Vec::new(),
            event_sink: None,
        }
    }

    fn pod_target(name: &str, selector: &[(&str, &str)]) -> Target {
        Target {
            name: name.to_string(),
            delete: true,
            include_when_evaluating: true,
            reference: TargetReference {
                api_version: "v1".to_string(),
                kind: "Pod".to_string(),
                name: None,
                label_selector: Some(
                    selector
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect::<BTreeMap<_, _>>(),
                ),
            },
        }
    }

    async fn seed(harness: &Harness, spec: ConditionalTtlSpec) -> ObjectKey {
        let object = ConditionalTtl::new(ObjectMeta::new("default", "demo"), spec);
        harness.store.put(object).await;
        ObjectKey::new("default", "demo")
    }

    #[tokio::test]
    async fn test_missing_object_is_done() {
        let harness = Harness::new();
        let outcome = harness
            .reconciler
            .reconcile(&ObjectKey::new("default", "ghost"))
            .await
            .unwrap();
        assert!(outcome.is_done());
    }

    #[tokio::test]
    async fn test_unexpired_object_requeues_for_expiry() {
        let harness = Harness::new();
        let mut spec = spec();
        spec.ttl = Duration::hours(1);
        let key = seed(&harness, spec).await;

        let outcome = harness.reconciler.reconcile(&key).await.unwrap();
        let wait = outcome.requeue_after.unwrap();
        assert!(wait > std::time::Duration::from_secs(3500));
        assert_eq!(
            harness.ready(&key).await,
            Some((ConditionStatus::Unknown, ReadyReason::NotExpired))
        );
    }

    #[tokio::test]
    async fn test_exact_expiry_instant_is_still_unexpired() {
        let harness = Harness::new();
        let key = seed(&harness, spec()).await;
        let expires_at = harness.store.get(&key).await.unwrap().unwrap().expires_at();

        let outcome = harness
            .reconciler
            .reconcile_at(&key, expires_at)
            .await
            .unwrap();
        assert_eq!(outcome.requeue_after, Some(std::time::Duration::ZERO));
        assert_eq!(
            harness.ready(&key).await,
            Some((ConditionStatus::Unknown, ReadyReason::NotExpired))
        );
    }

    #[tokio::test]
    async fn test_expired_object_without_duties_is_removed() {
        let harness = Harness::new();
        let key = seed(&harness, spec()).await;

        harness.reconciler.reconcile(&key).await.unwrap();
        assert!(harness.store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unmet_condition_requeues_on_retry_period() {
        let harness = Harness::new();
        let mut spec = spec();
        spec.conditions = vec!["1 == 2".to_string()];
        let key = seed(&harness, spec).await;

        let outcome = harness.reconciler.reconcile(&key).await.unwrap();
        assert_eq!(
            outcome.requeue_after,
            Some(std::time::Duration::from_secs(30))
        );
        assert_eq!(
            harness.ready_reason(&key).await,
            Some(ReadyReason::WaitingForConditions)
        );
    }

    #[tokio::test]
    async fn test_broken_condition_stops_requeueing() {
        let harness = Harness::new();
        let mut spec = spec();
        spec.conditions = vec!["1 ==".to_string()];
        let key = seed(&harness, spec).await;

        let outcome = harness.reconciler.reconcile(&key).await.unwrap();
        assert!(outcome.is_done());
        assert_eq!(
            harness.ready_reason(&key).await,
            Some(ReadyReason::CompileError)
        );
    }

    #[tokio::test]
    async fn test_resolve_failure_sets_condition_and_errors() {
        let harness = Harness::new();
        let mut spec = spec();
        spec.targets = vec![Target {
            name: "pod".to_string(),
            delete: false,
            include_when_evaluating: false,
            reference: TargetReference {
                api_version: "v1".to_string(),
                kind: "Pod".to_string(),
                name: Some("ghost".to_string()),
                label_selector: None,
            },
        }];
        let key = seed(&harness, spec).await;

        // No explicit schedule: the error propagates so the caller's
        // backoff drives the retry, even with a retry period configured.
        let err = harness.reconciler.reconcile(&key).await.err();
        assert!(matches!(err, Some(Error::TargetResolve { .. })));
        assert_eq!(
            harness.ready_reason(&key).await,
            Some(ReadyReason::TargetResolveError)
        );
    }

    #[tokio::test]
    async fn test_waiting_pass_does_not_freeze_snapshots() {
        let harness = Harness::new();
        let pods = ResourceRef::new("v1", "Pod");
        harness
            .store
            .put_resource(
                pods.clone(),
                "default",
                "worker",
                json!({"metadata": {"name": "worker", "labels": {"app": "web"}}}),
            )
            .await;

        let mut spec = spec();
        spec.targets = vec![pod_target("pods", &[("app", "web")])];
        spec.conditions = vec!["size(pods) == 0".to_string()];
        let key = seed(&harness, spec).await;

        harness.reconciler.reconcile(&key).await.unwrap();
        let object = harness.store.get(&key).await.unwrap().unwrap();
        assert!(object.status.targets.is_empty());
        assert!(object.status.evaluation_time.is_none());
        assert_eq!(
            harness.ready_reason(&key).await,
            Some(ReadyReason::WaitingForConditions)
        );
    }

    #[tokio::test]
    async fn test_full_lifecycle_deletes_in_order() {
        let harness = Harness::new();
        let pods = ResourceRef::new("v1", "Pod");
        harness
            .store
            .put_resource(
                pods.clone(),
                "default",
                "worker",
                json!({"metadata": {"name": "worker", "labels": {"app": "web"}},
                       "status": {"phase": "Succeeded"}}),
            )
            .await;

        let mut spec = spec();
        spec.targets = vec![pod_target("pods", &[("app", "web")])];
        spec.conditions = vec![r#"pods.all(p, p.status.phase == "Succeeded")"#.to_string()];
        spec.release = Some(ReleaseConfig {
            release: "web".to_string(),
            delete: true,
        });
        spec.event_sink = Some("https://sink.example/events".parse().unwrap());
        let key = seed(&harness, spec).await;

        // Gate pass: freezes targets, attaches finalizers, requests
        // deletion.
        let outcome = harness.reconciler.reconcile(&key).await.unwrap();
        assert_eq!(outcome.requeue_after, Some(std::time::Duration::ZERO));
        let object = harness.store.get(&key).await.unwrap().unwrap();
        assert!(object.is_deleting());
        assert_eq!(object.metadata.finalizers.len(), 3);

        // First finalizer pass deletes targets but nothing else yet.
        harness.reconciler.reconcile(&key).await.unwrap();
        assert!(!harness.store.has_resource(&pods, "default", "worker").await);
        assert!(harness.uninstaller.uninstalled().await.is_empty());
        assert!(harness.sink.sent().await.is_empty());

        // Second pass uninstalls the release.
        harness.reconciler.reconcile(&key).await.unwrap();
        assert_eq!(harness.uninstaller.uninstalled().await.len(), 1);
        assert!(harness.sink.sent().await.is_empty());

        // Third pass notifies and drops the last finalizer; the object
        // is gone.
        harness.reconciler.reconcile(&key).await.unwrap();
        let sent = harness.sink.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.targets.len(), 1);
        assert!(harness.store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_waiting_object_proceeds_once_condition_flips() {
        let harness = Harness::new();
        let pods = ResourceRef::new("v1", "Pod");
        harness
            .store
            .put_resource(
                pods.clone(),
                "default",
                "worker",
                json!({"metadata": {"name": "worker", "labels": {"app": "web"}},
                       "status": {"phase": "Running"}}),
            )
            .await;

        let mut spec = spec();
        spec.targets = vec![pod_target("pods", &[("app", "web")])];
        spec.conditions = vec![r#"pods.all(p, p.status.phase == "Succeeded")"#.to_string()];
        let key = seed(&harness, spec).await;

        harness.reconciler.reconcile(&key).await.unwrap();
        assert_eq!(
            harness.ready_reason(&key).await,
            Some(ReadyReason::WaitingForConditions)
        );

        harness
            .store
            .put_resource(
                pods.clone(),
                "default",
                "worker",
                json!({"metadata": {"name": "worker", "labels": {"app": "web"}},
                       "status": {"phase": "Succeeded"}}),
            )
            .await;

        harness.run_to_completion(&key).await;
        assert!(!harness.store.has_resource(&pods, "default", "worker").await);
    }

    #[tokio::test]
    async fn test_failed_finalizer_step_is_retried() {
        let harness = Harness::new();
        let mut spec = spec();
        spec.event_sink = Some("https://sink.example/events".parse().unwrap());
        let key = seed(&harness, spec).await;

        harness.reconciler.reconcile(&key).await.unwrap();
        assert!(harness.store.get(&key).await.unwrap().unwrap().is_deleting());

        harness.sink.fail_next().await;
        assert!(harness.reconciler.reconcile(&key).await.is_err());
        // Marker survives the failure; the next pass succeeds.
        assert!(harness.store.get(&key).await.unwrap().unwrap().is_deleting());

        harness.reconciler.reconcile(&key).await.unwrap();
        assert_eq!(harness.sink.sent().await.len(), 1);
        assert!(harness.store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshots_are_frozen_at_gate_time() {
        let harness = Harness::new();
        let pods = ResourceRef::new("v1", "Pod");
        harness
            .store
            .put_resource(
                pods.clone(),
                "default",
                "worker",
                json!({"metadata": {"name": "worker", "labels": {"app": "web"}}}),
            )
            .await;

        let mut spec = spec();
        spec.targets = vec![pod_target("pods", &[("app", "web")])];
        spec.event_sink = Some("https://sink.example/events".parse().unwrap());
        let key = seed(&harness, spec).await;

        // Gate pass freezes the snapshot.
        harness.reconciler.reconcile(&key).await.unwrap();

        // A resource created after the gate is not part of the frozen
        // snapshot and survives.
        harness
            .store
            .put_resource(
                pods.clone(),
                "default",
                "latecomer",
                json!({"metadata": {"name": "latecomer", "labels": {"app": "web"}}}),
            )
            .await;

        harness.run_to_completion(&key).await;
        assert!(!harness.store.has_resource(&pods, "default", "worker").await);
        assert!(harness.store.has_resource(&pods, "default", "latecomer").await);

        let sent = harness.sink.sent().await;
        assert_eq!(sent[0].1.targets[0].state.len(), 1);
    }

    #[tokio::test]
    async fn test_builder_requires_collaborators() {
        let err = ReconcilerBuilder::new().build().err();
        assert!(matches!(err, Some(Error::InvalidConfig { .. })));

        let built = ReconcilerBuilder::new()
            .with_store(Arc::new(InMemoryStore::new()))
            .with_uninstaller(Arc::new(RecordingUninstaller::new()))
            .with_sink(Arc::new(RecordingSink::new()))
            .build();
        assert!(built.is_ok());
    }
}
