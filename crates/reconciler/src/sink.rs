//! Deletion event delivery.
//!
//! Once an object's targets are gone, a structured event describing what
//! was deleted can be posted to the sink URL declared in the spec. The
//! wire format is a CloudEvents binary-mode HTTP request: the payload is
//! the JSON event data, the event attributes travel as `ce-*` headers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;
use url::Url;

use reaper_api::{ConditionalTtl, TargetStatus};

use crate::error::{Error, Result};

/// CloudEvents attribute values for deletion notifications.
pub const EVENT_TYPE: &str = "dev.reaper.conditionalttl.deleted";
pub const EVENT_SOURCE: &str = "reaper.dev/finalizer";

/// A completed deletion. The JSON payload carries only `name`,
/// `namespace` and `targets`; `id` and `time` travel as CloudEvents
/// attributes (`ce-*` headers), never in the body.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletionEvent {
    /// Unique event id, stable per object deletion.
    #[serde(skip_serializing)]
    pub id: String,
    pub name: String,
    pub namespace: String,
    /// The evaluation instant frozen when the gate opened.
    #[serde(skip_serializing)]
    pub time: DateTime<Utc>,
    /// The frozen target snapshots the deletion acted on.
    pub targets: Vec<TargetStatus>,
}

impl DeletionEvent {
    /// Build the event for an object being finalized, stamped with the
    /// given instant.
    pub fn for_object(object: &ConditionalTtl, time: DateTime<Utc>) -> Self {
        let id = if object.metadata.uid.is_empty() {
            format!("{}/{}", object.metadata.namespace, object.metadata.name)
        } else {
            object.metadata.uid.clone()
        };
        Self {
            id,
            name: object.metadata.name.clone(),
            namespace: object.metadata.namespace.clone(),
            time,
            targets: object.status.targets.clone(),
        }
    }
}

/// Delivers deletion events to a sink URL.
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn send(&self, sink: &Url, event: &DeletionEvent) -> Result<()>;
}

/// Posts events over HTTP in CloudEvents binary mode.
pub struct HttpEventSink {
    client: reqwest::Client,
}

impl HttpEventSink {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Default for HttpEventSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventSink for HttpEventSink {
    async fn send(&self, sink: &Url, event: &DeletionEvent) -> Result<()> {
        let response = self
            .client
            .post(sink.clone())
            .header("ce-specversion", "1.0")
            .header("ce-id", &event.id)
            .header("ce-type", EVENT_TYPE)
            .header("ce-source", EVENT_SOURCE)
            .header("ce-time", event.time.to_rfc3339())
            .json(event)
            .send()
            .await
            .map_err(|e| Error::event_delivery(sink.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::event_delivery(
                sink.as_str(),
                format!("sink responded with status {status}"),
            ));
        }
        info!(sink = %sink, event = %event.id, "deletion event delivered");
        Ok(())
    }
}

/// Records events instead of delivering them. Used in tests.
#[derive(Default)]
pub struct RecordingSink {
    sent: RwLock<Vec<(Url, DeletionEvent)>>,
    fail_next: RwLock<bool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next delivery fail once.
    pub async fn fail_next(&self) {
        *self.fail_next.write().await = true;
    }

    pub async fn sent(&self) -> Vec<(Url, DeletionEvent)> {
        self.sent.read().await.clone()
    }
}

#[async_trait]
impl EventSink for RecordingSink {
    async fn send(&self, sink: &Url, event: &DeletionEvent) -> Result<()> {
        let mut fail = self.fail_next.write().await;
        if *fail {
            *fail = false;
            return Err(Error::event_delivery(sink.as_str(), "injected failure"));
        }
        drop(fail);

        self.sent.write().await.push((sink.clone(), event.clone()));
        Ok(())
    }
}
