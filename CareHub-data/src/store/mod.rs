//! Document store abstraction.
//!
//! Every entity is persisted as a JSON document in a named collection. The
//! `DocumentStore` trait is the only data-access interface the services use;
//! writes are announced on a broadcast channel so callers can subscribe to
//! changes instead of polling.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

use crate::repository::RepositoryError;

pub mod query;
pub mod timestamp;
mod in_memory;
#[cfg(any(test, feature = "mock"))]
mod offline;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use in_memory::InMemoryDocumentStore;
#[cfg(any(test, feature = "mock"))]
pub use offline::OfflineDocumentStore;
pub use query::{Direction, Filter, FilterOp, OrderBy, Query};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;
pub use timestamp::{parse_timestamp, timestamp_value, StoredTimestamp};

/// Capacity of the change-event channel per store
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

/// A stored document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Document id, unique within its collection
    pub id: String,
    /// Document body, always a JSON object
    pub data: Value,
    /// When the document was first written
    pub create_time: DateTime<Utc>,
    /// When the document was last written
    pub update_time: DateTime<Utc>,
}

/// Kind of change announced to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Document created
    Added,
    /// Document replaced or merged
    Modified,
    /// Document deleted
    Removed,
}

/// A change pushed to subscribers after a successful write
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Collection of the changed document
    pub collection: String,
    /// Kind of change
    pub kind: ChangeKind,
    /// Document after the write, or its last state when removed
    pub document: Document,
    /// Data before the write, for modifications
    pub previous: Option<Value>,
}

/// A single write inside an atomic batch
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create or replace a document
    Set {
        collection: String,
        id: String,
        data: Value,
    },
    /// Merge fields into an existing document
    Update {
        collection: String,
        id: String,
        patch: Value,
    },
    /// Merge fields into a document that has not been written since `update_time`
    UpdateIfUnchanged {
        collection: String,
        id: String,
        patch: Value,
        update_time: DateTime<Utc>,
    },
    /// Delete an existing document
    Delete { collection: String, id: String },
}

/// Data-access interface implemented by every backend
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch a document by id
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepositoryError>;

    /// Create a document with a generated id
    async fn add(&self, collection: &str, data: Value) -> Result<Document, RepositoryError>;

    /// Create or replace a document with a known id
    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<Document, RepositoryError>;

    /// Merge top-level fields into an existing document
    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Document, RepositoryError>;

    /// Delete an existing document
    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError>;

    /// Run a query against a collection
    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, RepositoryError>;

    /// Apply several writes atomically; nothing is written if any write fails
    async fn batch(&self, writes: Vec<WriteOp>) -> Result<(), RepositoryError>;

    /// Subscribe to changes made after this call
    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;

    /// Check that the store answers requests
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Reject document bodies that are not JSON objects
pub(crate) fn ensure_object(data: &Value) -> Result<(), RepositoryError> {
    if data.is_object() {
        Ok(())
    } else {
        Err(RepositoryError::Validation("document data must be a JSON object".to_string()))
    }
}

/// Fail with `Conflict` when a document was written after `update_time`
pub(crate) fn ensure_unchanged(
    collection: &str,
    document: &Document,
    update_time: DateTime<Utc>,
) -> Result<(), RepositoryError> {
    if document.update_time == update_time {
        Ok(())
    } else {
        Err(RepositoryError::Conflict(format!(
            "{}/{} was modified concurrently",
            collection, document.id
        )))
    }
}

/// Update time for a rewrite; strictly after the previous one so versions never repeat
pub(crate) fn next_update_time(previous: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    if now > previous {
        now
    } else {
        previous + chrono::Duration::microseconds(1)
    }
}

/// Shallow merge of `patch` into `target`
pub(crate) fn merge_patch(target: &mut Value, patch: &Value) -> Result<(), RepositoryError> {
    ensure_object(patch)?;
    if let (Some(target), Some(patch)) = (target.as_object_mut(), patch.as_object()) {
        for (key, value) in patch {
            target.insert(key.clone(), value.clone());
        }
    }
    Ok(())
}
