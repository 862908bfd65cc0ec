//! A store whose backend is unreachable, for exercising error paths.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use super::{ChangeEvent, Document, DocumentStore, Query, WriteOp};
use crate::repository::RepositoryError;

/// Every call fails with `RepositoryError::Unavailable`
#[derive(Debug, Clone, Default)]
pub struct OfflineDocumentStore;

fn offline() -> RepositoryError {
    RepositoryError::Unavailable("document store is offline".to_string())
}

#[async_trait]
impl DocumentStore for OfflineDocumentStore {
    async fn get(&self, _collection: &str, _id: &str) -> Result<Option<Document>, RepositoryError> {
        Err(offline())
    }

    async fn add(&self, _collection: &str, _data: Value) -> Result<Document, RepositoryError> {
        Err(offline())
    }

    async fn set(&self, _collection: &str, _id: &str, _data: Value) -> Result<Document, RepositoryError> {
        Err(offline())
    }

    async fn update(&self, _collection: &str, _id: &str, _patch: Value) -> Result<Document, RepositoryError> {
        Err(offline())
    }

    async fn delete(&self, _collection: &str, _id: &str) -> Result<(), RepositoryError> {
        Err(offline())
    }

    async fn query(&self, _collection: &str, _query: &Query) -> Result<Vec<Document>, RepositoryError> {
        Err(offline())
    }

    async fn batch(&self, _writes: Vec<WriteOp>) -> Result<(), RepositoryError> {
        Err(offline())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        // Sender dropped at once, so subscribers see a closed channel
        broadcast::channel(1).1
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Err(offline())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::blog::BlogPost;
    use crate::Collection;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_collection_surfaces_unavailable() {
        let posts = Collection::<BlogPost>::new(Arc::new(OfflineDocumentStore));
        assert!(matches!(posts.get("p1").await, Err(RepositoryError::Unavailable(_))));
        assert!(matches!(posts.find(Query::new()).await, Err(RepositoryError::Unavailable(_))));

        let mut changes = posts.watch(Query::new());
        assert!(changes.next().await.is_none());
    }
}
