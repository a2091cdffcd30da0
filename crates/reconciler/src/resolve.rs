//! Target resolution: turning declared references into snapshots.
//!
//! Each declared target resolves to either a single record (looked up by
//! name) or a collection (matched by label selector). A named target that
//! does not exist is a resolution error; a selector that matches nothing
//! is a valid empty collection. When a reference carries both, the name
//! wins.

use reaper_api::{ConditionalTtl, Target, TargetState, TargetStatus};

use crate::error::{Error, Result};
use crate::store::ResourceStore;
use crate::types::ResourceRef;

/// Resolve every declared target into a status snapshot, in declaration
/// order.
pub async fn resolve_targets(
    store: &dyn ResourceStore,
    object: &ConditionalTtl,
) -> Result<Vec<TargetStatus>> {
    let mut statuses = Vec::with_capacity(object.spec.targets.len());
    for target in &object.spec.targets {
        let state = resolve_target(store, &object.metadata.namespace, target).await?;
        statuses.push(TargetStatus {
            name: target.name.clone(),
            delete: target.delete,
            include_when_evaluating: target.include_when_evaluating,
            state,
        });
    }
    Ok(statuses)
}

async fn resolve_target(
    store: &dyn ResourceStore,
    namespace: &str,
    target: &Target,
) -> Result<TargetState> {
    let resource = ResourceRef::new(&target.reference.api_version, &target.reference.kind);
    if let Some(name) = &target.reference.name {
        let record = store
            .get_resource(&resource, namespace, name)
            .await?
            .ok_or_else(|| {
                Error::target_resolve(
                    &target.name,
                    format!("{resource} {namespace}/{name} not found"),
                )
            })?;
        return Ok(TargetState::Object(record));
    }
    if let Some(selector) = &target.reference.label_selector {
        let records = store.list_resources(&resource, namespace, selector).await?;
        return Ok(TargetState::Collection(records));
    }
    Err(Error::target_resolve(
        &target.name,
        "reference has neither a name nor a label selector",
    ))
}
