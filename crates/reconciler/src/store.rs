//! Storage abstraction over managed objects and their target resources.
//!
//! The engine only ever talks to a [`ResourceStore`]; the in-memory
//! implementation models the deletion contract the engine relies on:
//! deleting an object that still carries finalizers marks it with a
//! deletion timestamp instead of removing it, and an update that clears
//! the last finalizer of a marked object removes it for good.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use reaper_api::ConditionalTtl;

use crate::error::{Error, Result};
use crate::types::{ObjectKey, ResourceRef};

/// Access to managed objects and the resources their targets reference.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Fetch a managed object, `None` when it does not exist.
    async fn get(&self, key: &ObjectKey) -> Result<Option<ConditionalTtl>>;

    /// Persist the object's metadata and spec.
    async fn update(&self, object: &ConditionalTtl) -> Result<()>;

    /// Persist the object's status.
    async fn update_status(&self, object: &ConditionalTtl) -> Result<()>;

    /// Request deletion of a managed object. Absent objects are fine.
    async fn delete(&self, key: &ObjectKey) -> Result<()>;

    /// Fetch a single target resource, `None` when it does not exist.
    async fn get_resource(
        &self,
        resource: &ResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>>;

    /// List target resources whose labels carry every selector pair.
    async fn list_resources(
        &self,
        resource: &ResourceRef,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<serde_json::Value>>;

    /// Delete a target resource. Deleting an absent resource succeeds.
    async fn delete_resource(
        &self,
        resource: &ResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<()>;
}

type ResourceKey = (ResourceRef, String, String);

/// In-memory store for tests and local runs.
#[derive(Default)]
pub struct InMemoryStore {
    objects: RwLock<HashMap<ObjectKey, ConditionalTtl>>,
    resources: RwLock<HashMap<ResourceKey, serde_json::Value>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a managed object.
    pub async fn put(&self, object: ConditionalTtl) {
        let key = ObjectKey::new(&object.metadata.namespace, &object.metadata.name);
        self.objects.write().await.insert(key, object);
    }

    /// Seed a target resource record. The record's name and labels are
    /// read from its `metadata` field when matching selectors.
    pub async fn put_resource(
        &self,
        resource: ResourceRef,
        namespace: &str,
        name: &str,
        record: serde_json::Value,
    ) {
        self.resources
            .write()
            .await
            .insert((resource, namespace.to_string(), name.to_string()), record);
    }

    /// Whether a seeded resource still exists.
    pub async fn has_resource(&self, resource: &ResourceRef, namespace: &str, name: &str) -> bool {
        self.resources.read().await.contains_key(&(
            resource.clone(),
            namespace.to_string(),
            name.to_string(),
        ))
    }
}

fn record_labels(record: &serde_json::Value) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    if let Some(fields) = record
        .pointer("/metadata/labels")
        .and_then(serde_json::Value::as_object)
    {
        for (key, value) in fields {
            if let Some(value) = value.as_str() {
                labels.insert(key.clone(), value.to_string());
            }
        }
    }
    labels
}

fn matches_selector(record: &serde_json::Value, selector: &BTreeMap<String, String>) -> bool {
    let labels = record_labels(record);
    selector
        .iter()
        .all(|(key, value)| labels.get(key) == Some(value))
}

#[async_trait]
impl ResourceStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<ConditionalTtl>> {
        Ok(self.objects.read().await.get(key).cloned())
    }

    async fn update(&self, object: &ConditionalTtl) -> Result<()> {
        let key = ObjectKey::new(&object.metadata.namespace, &object.metadata.name);
        let mut objects = self.objects.write().await;
        if !objects.contains_key(&key) {
            return Err(Error::store(format!("object {key} does not exist")));
        }
        if object.is_deleting() && object.metadata.finalizers.is_empty() {
            debug!(object = %key, "last finalizer cleared, removing object");
            objects.remove(&key);
        } else {
            objects.insert(key, object.clone());
        }
        Ok(())
    }

    async fn update_status(&self, object: &ConditionalTtl) -> Result<()> {
        let key = ObjectKey::new(&object.metadata.namespace, &object.metadata.name);
        let mut objects = self.objects.write().await;
        match objects.get_mut(&key) {
            Some(stored) => {
                stored.status = object.status.clone();
                Ok(())
            }
            None => Err(Error::store(format!("object {key} does not exist"))),
        }
    }

    async fn delete(&self, key: &ObjectKey) -> Result<()> {
        let mut objects = self.objects.write().await;
        let Some(stored) = objects.get_mut(key) else {
            return Ok(());
        };
        if stored.metadata.finalizers.is_empty() {
            objects.remove(key);
        } else if stored.metadata.deletion_timestamp.is_none() {
            stored.metadata.deletion_timestamp = Some(Utc::now());
        }
        Ok(())
    }

    async fn get_resource(
        &self,
        resource: &ResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<Option<serde_json::Value>> {
        Ok(self
            .resources
            .read()
            .await
            .get(&(resource.clone(), namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn list_resources(
        &self,
        resource: &ResourceRef,
        namespace: &str,
        selector: &BTreeMap<String, String>,
    ) -> Result<Vec<serde_json::Value>> {
        let resources = self.resources.read().await;
        let mut matched: Vec<(&ResourceKey, &serde_json::Value)> = resources
            .iter()
            .filter(|((r, ns, _), record)| {
                r == resource && ns == namespace && matches_selector(record, selector)
            })
            .collect();
        // HashMap iteration order is arbitrary; keep listings deterministic.
        matched.sort_by(|((_, _, a), _), ((_, _, b), _)| a.cmp(b));
        Ok(matched.into_iter().map(|(_, record)| record.clone()).collect())
    }

    async fn delete_resource(
        &self,
        resource: &ResourceRef,
        namespace: &str,
        name: &str,
    ) -> Result<()> {
        self.resources.write().await.remove(&(
            resource.clone(),
            namespace.to_string(),
            name.to_string(),
        ));
        Ok(())
    }
}
