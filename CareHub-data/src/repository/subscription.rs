use futures::stream::{self, Stream};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use super::collection::{Collection, Entity};
use crate::store::{ChangeEvent, ChangeKind, Query};

/// A change to an entity seen by a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum Change<T> {
    /// Entity now matches and was just created
    Added(T),
    /// Entity matching the query was modified
    Modified(T),
    /// Entity was deleted, or no longer matches the query
    Removed(String),
}

/// Live feed of changes to entities of one collection
pub struct Subscription<T: Entity> {
    receiver: broadcast::Receiver<ChangeEvent>,
    query: Query,
    _entity: std::marker::PhantomData<fn() -> T>,
}

impl<T: Entity> Subscription<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<ChangeEvent>, query: Query) -> Self {
        Self {
            receiver,
            query,
            _entity: std::marker::PhantomData,
        }
    }

    /// Wait for the next relevant change; `None` once the store is gone
    pub async fn next(&mut self) -> Option<Change<T>> {
        loop {
            let event = match self.receiver.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Subscription on {} lagged, skipped {} changes", T::COLLECTION, skipped);
                    continue;
                }
                Err(RecvError::Closed) => return None,
            };

            if event.collection != T::COLLECTION {
                continue;
            }

            if let Some(change) = self.translate(event) {
                return Some(change);
            }
        }
    }

    fn translate(&self, event: ChangeEvent) -> Option<Change<T>> {
        let matches = self.query.matches(&event.document.data);
        let matched_before = event.previous.as_ref().is_some_and(|data| self.query.matches(data));
        let id = event.document.id.clone();

        let added = match (event.kind, matched_before, matches) {
            (ChangeKind::Removed, _, true) => return Some(Change::Removed(id)),
            // Only documents that were in the result set can leave it
            (ChangeKind::Modified, true, false) => return Some(Change::Removed(id)),
            (_, _, false) => return None,
            (ChangeKind::Added, _, true) | (ChangeKind::Modified, false, true) => true,
            (ChangeKind::Modified, true, true) => false,
        };

        match Collection::<T>::decode(event.document) {
            Ok(entity) if added => Some(Change::Added(entity)),
            Ok(entity) => Some(Change::Modified(entity)),
            Err(e) => {
                warn!("Ignoring undecodable change on {}/{}: {}", T::COLLECTION, id, e);
                None
            }
        }
    }

    /// Consume the subscription as a stream of changes
    pub fn into_stream(self) -> impl Stream<Item = Change<T>> + Send {
        stream::unfold(self, |mut subscription| async move {
            subscription.next().await.map(|change| (change, subscription))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DocumentStore, InMemoryDocumentStore};
    use futures::StreamExt;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Reading {
        #[serde(default)]
        id: String,
        patient_id: String,
        value: f64,
    }

    impl Entity for Reading {
        const COLLECTION: &'static str = "readings";

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    #[tokio::test]
    async fn test_only_matching_changes_are_delivered() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let readings: Collection<Reading> = Collection::new(store.clone());
        let mut subscription = readings.watch(Query::new().where_eq("patient_id", "p1"));

        store.set("other_collection", "x", json!({ "patient_id": "p1" })).await.unwrap();
        readings
            .create(Reading { id: "r0".into(), patient_id: "p2".into(), value: 1.0 })
            .await
            .unwrap();
        readings
            .create(Reading { id: "r1".into(), patient_id: "p1".into(), value: 2.0 })
            .await
            .unwrap();

        match subscription.next().await {
            Some(Change::Added(reading)) => assert_eq!(reading.id, "r1"),
            other => panic!("unexpected change: {:?}", other),
        }

        readings.update("r1", json!({ "value": 3.0 })).await.unwrap();
        match subscription.next().await {
            Some(Change::Modified(reading)) => assert_eq!(reading.value, 3.0),
            other => panic!("unexpected change: {:?}", other),
        }

        readings.update("r1", json!({ "patient_id": "p9" })).await.unwrap();
        assert_eq!(subscription.next().await, Some(Change::Removed("r1".to_string())));
    }

    #[tokio::test]
    async fn test_changes_outside_the_result_set_are_not_delivered() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let readings: Collection<Reading> = Collection::new(store.clone());
        readings
            .create(Reading { id: "other".into(), patient_id: "p2".into(), value: 1.0 })
            .await
            .unwrap();
        let mut subscription = readings.watch(Query::new().where_eq("patient_id", "p1"));

        // Edits and deletes of another patient's reading stay invisible
        readings.update("other", json!({ "value": 5.0 })).await.unwrap();
        store.set("readings", "other", json!({ "patient_id": "p3", "value": 6.0 })).await.unwrap();

        // Moving into the result set shows up as an addition
        readings.update("other", json!({ "patient_id": "p1" })).await.unwrap();
        match subscription.next().await {
            Some(Change::Added(reading)) => assert_eq!(reading.id, "other"),
            other => panic!("unexpected change: {:?}", other),
        }

        readings.delete("other").await.unwrap();
        assert_eq!(subscription.next().await, Some(Change::Removed("other".to_string())));
    }

    #[tokio::test]
    async fn test_stream_yields_changes() {
        let store = Arc::new(InMemoryDocumentStore::new());
        let readings: Collection<Reading> = Collection::new(store);
        let stream = readings.watch(Query::new()).into_stream();
        futures::pin_mut!(stream);

        readings
            .create(Reading { id: "a".into(), patient_id: "p".into(), value: 1.0 })
            .await
            .unwrap();
        readings.delete("a").await.unwrap();

        assert!(matches!(stream.next().await, Some(Change::Added(_))));
        assert_eq!(stream.next().await, Some(Change::Removed("a".to_string())));
    }
}
