//! Ordered finalizer steps.
//!
//! When the gate opens, the engine attaches one finalizer marker per
//! pending cleanup duty and then requests deletion of the object. While
//! the object is marked for deletion, each pass performs exactly one
//! step, removes its marker, and persists the object before looking at
//! the next one. The fixed order guarantees targets are gone before the
//! release is uninstalled, and the notification fires only after both.

use chrono::{DateTime, Utc};
use tracing::warn;

use reaper_api::{ConditionalTtl, TargetState, TargetStatus};

use crate::error::Result;
use crate::release::ReleaseUninstaller;
use crate::sink::{DeletionEvent, EventSink};
use crate::store::ResourceStore;
use crate::types::ResourceRef;

/// Marker for pending target deletion.
pub const TARGET_FINALIZER: &str = "reaper.dev/target-finalizer";
/// Marker for pending release teardown.
pub const RELEASE_FINALIZER: &str = "reaper.dev/release-finalizer";
/// Marker for the pending deletion notification.
pub const EVENT_FINALIZER: &str = "reaper.dev/event-finalizer";

/// Execution order of the finalizer steps.
pub const FINALIZER_ORDER: [&str; 3] = [TARGET_FINALIZER, RELEASE_FINALIZER, EVENT_FINALIZER];

/// Delete every frozen target snapshot marked for deletion. Records that
/// are already gone count as deleted.
pub async fn delete_targets(store: &dyn ResourceStore, object: &ConditionalTtl) -> Result<()> {
    for target in object.status.targets.iter().filter(|t| t.delete) {
        let Some(resource) = target_resource(object, target) else {
            warn!(
                object = %object.metadata.name,
                target = %target.name,
                "target has no resolvable resource kind, skipping"
            );
            continue;
        };
        for record in records(&target.state) {
            let Some(name) = record
                .pointer("/metadata/name")
                .and_then(serde_json::Value::as_str)
            else {
                warn!(
                    object = %object.metadata.name,
                    target = %target.name,
                    "snapshot record has no name, skipping"
                );
                continue;
            };
            let namespace = record
                .pointer("/metadata/namespace")
                .and_then(serde_json::Value::as_str)
                .unwrap_or(&object.metadata.namespace);
            store.delete_resource(&resource, namespace, name).await?;
        }
    }
    Ok(())
}

/// Tear down the declared release, when one is marked for deletion.
pub async fn uninstall_release(
    uninstaller: &dyn ReleaseUninstaller,
    object: &ConditionalTtl,
) -> Result<()> {
    if let Some(release) = object.spec.release.as_ref().filter(|r| r.delete) {
        uninstaller
            .uninstall(&object.metadata.namespace, &release.release)
            .await?;
    }
    Ok(())
}

/// Deliver the deletion notification, when a sink is declared. The event
/// is stamped with the evaluation instant frozen when the gate opened,
/// not the delivery instant.
pub async fn notify_sink(
    sink: &dyn EventSink,
    object: &ConditionalTtl,
    now: DateTime<Utc>,
) -> Result<()> {
    if let Some(url) = &object.spec.event_sink {
        let time = object.status.evaluation_time.unwrap_or(now);
        let event = DeletionEvent::for_object(object, time);
        sink.send(url, &event).await?;
    }
    Ok(())
}

/// The resource kind for a frozen target: the matching spec declaration
/// when it still exists, otherwise whatever the snapshot records carry.
fn target_resource(object: &ConditionalTtl, target: &TargetStatus) -> Option<ResourceRef> {
    if let Some(declared) = object.spec.targets.iter().find(|t| t.name == target.name) {
        return Some(ResourceRef::new(
            &declared.reference.api_version,
            &declared.reference.kind,
        ));
    }
    records(&target.state).first().and_then(|record| {
        let api_version = record.get("apiVersion")?.as_str()?;
        let kind = record.get("kind")?.as_str()?;
        Some(ResourceRef::new(api_version, kind))
    })
}

fn records(state: &TargetState) -> Vec<&serde_json::Value> {
    match state {
        TargetState::Object(record) => vec![record],
        TargetState::Collection(items) => items.iter().collect(),
    }
}
