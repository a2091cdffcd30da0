//! Reconciliation engine for conditional TTL-gated deletion.
//!
//! The [`Reconciler`] drives one object per call through the lifecycle
//! described in [`engine`]: TTL gate, target resolution, condition
//! evaluation, and the ordered finalizer steps that delete targets,
//! tear down the release, and deliver the deletion event.
//!
//! All side effects go through three collaborator traits so the engine
//! can run against an [`InMemoryStore`] in tests and against real
//! infrastructure in production: [`ResourceStore`], [`ReleaseUninstaller`]
//! and [`EventSink`].

pub mod engine;
pub mod error;
pub mod finalize;
pub mod release;
pub mod resolve;
pub mod sink;
pub mod store;
pub mod types;

pub use engine::{Reconciler, ReconcilerBuilder};
pub use error::{Error, Result};
pub use finalize::{EVENT_FINALIZER, FINALIZER_ORDER, RELEASE_FINALIZER, TARGET_FINALIZER};
pub use release::{RecordingUninstaller, ReleaseUninstaller};
pub use sink::{DeletionEvent, EventSink, HttpEventSink, RecordingSink};
pub use store::{InMemoryStore, ResourceStore};
pub use types::{ObjectKey, ReconcileOutcome, ResourceRef};
