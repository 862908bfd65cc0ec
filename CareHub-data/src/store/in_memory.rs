use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use super::{ensure_object, ensure_unchanged, merge_patch, next_update_time, ChangeEvent, ChangeKind, Document, DocumentStore, Query, WriteOp, CHANGE_CHANNEL_CAPACITY};
use crate::repository::RepositoryError;

type Collections = HashMap<String, HashMap<String, Document>>;

/// In-memory document store, used in tests and when no database is configured
#[derive(Debug, Clone)]
pub struct InMemoryDocumentStore {
    /// Documents by collection then id
    collections: Arc<RwLock<Collections>>,
    /// Change feed
    changes: broadcast::Sender<ChangeEvent>,
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDocumentStore {
    /// Create an empty store
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
            changes,
        }
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            // No receivers is not an error
            let _ = self.changes.send(event);
        }
    }
}

/// Apply one write to the collections map, returning the resulting event
fn apply_write(collections: &mut Collections, write: WriteOp) -> Result<ChangeEvent, RepositoryError> {
    let now = Utc::now();

    match write {
        WriteOp::Set { collection, id, data } => {
            ensure_object(&data)?;
            let docs = collections.entry(collection.clone()).or_default();
            let (kind, create_time, update_time, previous) = match docs.get(&id) {
                Some(existing) => (
                    ChangeKind::Modified,
                    existing.create_time,
                    next_update_time(existing.update_time, now),
                    Some(existing.data.clone()),
                ),
                None => (ChangeKind::Added, now, now, None),
            };
            let document = Document {
                id: id.clone(),
                data,
                create_time,
                update_time,
            };
            docs.insert(id, document.clone());
            Ok(ChangeEvent { collection, kind, document, previous })
        }
        WriteOp::Update { collection, id, patch } => {
            let document = collections
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&id))
                .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", collection, id)))?;
            let previous = Some(document.data.clone());
            merge_patch(&mut document.data, &patch)?;
            document.update_time = next_update_time(document.update_time, now);
            Ok(ChangeEvent {
                collection,
                kind: ChangeKind::Modified,
                document: document.clone(),
                previous,
            })
        }
        WriteOp::UpdateIfUnchanged { collection, id, patch, update_time } => {
            let document = collections
                .get_mut(&collection)
                .and_then(|docs| docs.get_mut(&id))
                .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", collection, id)))?;
            ensure_unchanged(&collection, document, update_time)?;
            let previous = Some(document.data.clone());
            merge_patch(&mut document.data, &patch)?;
            document.update_time = next_update_time(document.update_time, now);
            Ok(ChangeEvent {
                collection,
                kind: ChangeKind::Modified,
                document: document.clone(),
                previous,
            })
        }
        WriteOp::Delete { collection, id } => {
            let document = collections
                .get_mut(&collection)
                .and_then(|docs| docs.remove(&id))
                .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", collection, id)))?;
            Ok(ChangeEvent {
                collection,
                kind: ChangeKind::Removed,
                document,
                previous: None,
            })
        }
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepositoryError> {
        let collections = self.collections.read()?;
        Ok(collections.get(collection).and_then(|docs| docs.get(id)).cloned())
    }

    async fn add(&self, collection: &str, data: Value) -> Result<Document, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        self.set(collection, &id, data).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<Document, RepositoryError> {
        let event = {
            let mut collections = self.collections.write()?;
            apply_write(&mut collections, WriteOp::Set {
                collection: collection.to_string(),
                id: id.to_string(),
                data,
            })?
        };
        debug!("Stored document {}/{}", collection, id);
        let document = event.document.clone();
        self.publish(vec![event]);
        Ok(document)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Document, RepositoryError> {
        let event = {
            let mut collections = self.collections.write()?;
            apply_write(&mut collections, WriteOp::Update {
                collection: collection.to_string(),
                id: id.to_string(),
                patch,
            })?
        };
        let document = event.document.clone();
        self.publish(vec![event]);
        Ok(document)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError> {
        let event = {
            let mut collections = self.collections.write()?;
            apply_write(&mut collections, WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            })?
        };
        self.publish(vec![event]);
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, RepositoryError> {
        let documents: Vec<Document> = {
            let collections = self.collections.read()?;
            collections
                .get(collection)
                .map(|docs| docs.values().cloned().collect())
                .unwrap_or_default()
        };
        query.apply(documents)
    }

    async fn batch(&self, writes: Vec<WriteOp>) -> Result<(), RepositoryError> {
        let events = {
            let mut collections = self.collections.write()?;
            // Stage on a copy so a failing write leaves nothing behind
            let mut staged = collections.clone();
            let events = writes
                .into_iter()
                .map(|write| apply_write(&mut staged, write))
                .collect::<Result<Vec<_>, _>>()?;
            *collections = staged;
            events
        };
        debug!("Committed batch of {} writes", events.len());
        self.publish(events);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        let _guard = self.collections.read()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_add_get_update_delete() {
        let store = InMemoryDocumentStore::new();
        let doc = store.add("users", json!({ "name": "Ada" })).await.unwrap();
        assert!(Uuid::parse_str(&doc.id).is_ok());

        let fetched = store.get("users", &doc.id).await.unwrap().unwrap();
        assert_eq!(fetched.data["name"], "Ada");

        let updated = store.update("users", &doc.id, json!({ "role": "doctor" })).await.unwrap();
        assert_eq!(updated.data, json!({ "name": "Ada", "role": "doctor" }));
        assert_eq!(updated.create_time, doc.create_time);

        store.delete("users", &doc.id).await.unwrap();
        assert!(store.get("users", &doc.id).await.unwrap().is_none());
        assert!(matches!(store.delete("users", &doc.id).await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_missing_document_fails() {
        let store = InMemoryDocumentStore::new();
        let result = store.update("users", "nope", json!({ "a": 1 })).await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_rejects_non_object_documents() {
        let store = InMemoryDocumentStore::new();
        assert!(matches!(store.add("users", json!("text")).await, Err(RepositoryError::Validation(_))));
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = InMemoryDocumentStore::new();
        store.set("bills", "b1", json!({ "paid": 0 })).await.unwrap();

        let failing = vec![
            WriteOp::Update { collection: "bills".into(), id: "b1".into(), patch: json!({ "paid": 10 }) },
            WriteOp::Delete { collection: "bills".into(), id: "missing".into() },
        ];
        assert!(store.batch(failing).await.is_err());
        let bill = store.get("bills", "b1").await.unwrap().unwrap();
        assert_eq!(bill.data["paid"], 0);

        let ok = vec![
            WriteOp::Update { collection: "bills".into(), id: "b1".into(), patch: json!({ "paid": 10 }) },
            WriteOp::Set { collection: "claims".into(), id: "c1".into(), data: json!({ "bill_id": "b1" }) },
        ];
        store.batch(ok).await.unwrap();
        assert_eq!(store.get("bills", "b1").await.unwrap().unwrap().data["paid"], 10);
        assert!(store.get("claims", "c1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_conditional_update_detects_intervening_write() {
        let store = InMemoryDocumentStore::new();
        let original = store.set("bills", "b1", json!({ "paid": 0 })).await.unwrap();
        let current = store.update("bills", "b1", json!({ "paid": 100 })).await.unwrap();
        assert!(current.update_time > original.update_time);

        let stale = WriteOp::UpdateIfUnchanged {
            collection: "bills".into(),
            id: "b1".into(),
            patch: json!({ "paid": 200 }),
            update_time: original.update_time,
        };
        assert!(matches!(store.batch(vec![stale]).await, Err(RepositoryError::Conflict(_))));
        assert_eq!(store.get("bills", "b1").await.unwrap().unwrap().data["paid"], 100);

        let fresh = WriteOp::UpdateIfUnchanged {
            collection: "bills".into(),
            id: "b1".into(),
            patch: json!({ "paid": 200 }),
            update_time: current.update_time,
        };
        store.batch(vec![fresh]).await.unwrap();
        assert_eq!(store.get("bills", "b1").await.unwrap().unwrap().data["paid"], 200);
    }

    #[tokio::test]
    async fn test_subscribers_receive_changes() {
        let store = InMemoryDocumentStore::new();
        let mut rx = store.subscribe();

        store.set("labs", "l1", json!({ "value": 1 })).await.unwrap();
        store.update("labs", "l1", json!({ "value": 2 })).await.unwrap();
        store.delete("labs", "l1").await.unwrap();

        let kinds: Vec<ChangeKind> = vec![
            rx.recv().await.unwrap().kind,
            rx.recv().await.unwrap().kind,
            rx.recv().await.unwrap().kind,
        ];
        assert_eq!(kinds, vec![ChangeKind::Added, ChangeKind::Modified, ChangeKind::Removed]);
    }

    #[tokio::test]
    async fn test_modified_events_carry_previous_data() {
        let store = InMemoryDocumentStore::new();
        let mut rx = store.subscribe();

        store.set("labs", "l1", json!({ "value": 1 })).await.unwrap();
        store.update("labs", "l1", json!({ "value": 2 })).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().previous, None);
        let modified = rx.recv().await.unwrap();
        assert_eq!(modified.previous, Some(json!({ "value": 1 })));
        assert_eq!(modified.document.data, json!({ "value": 2 }));
    }

    #[tokio::test]
    async fn test_query_unknown_collection_is_empty() {
        let store = InMemoryDocumentStore::new();
        let docs = store.query("nothing", &Query::new()).await.unwrap();
        assert!(docs.is_empty());
    }
}
