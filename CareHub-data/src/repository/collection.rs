use std::marker::PhantomData;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use super::errors::RepositoryError;
use super::subscription::Subscription;
use crate::store::{Document, DocumentStore, Query};

/// Default number of items per page
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Largest page a caller may request
pub const MAX_PAGE_SIZE: usize = 100;

/// A record persisted as one document in a fixed collection
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    /// Collection holding this entity
    const COLLECTION: &'static str;

    /// Document id, empty before the first write
    fn id(&self) -> &str;

    /// Assign the document id
    fn set_id(&mut self, id: String);
}

/// Cursor pagination request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Items per page, defaults to 20 and is capped at 100
    pub page_size: Option<usize>,
    /// Id of the last item of the previous page
    pub cursor: Option<String>,
}

impl PageRequest {
    /// First page of the given size
    pub fn first(page_size: usize) -> Self {
        Self {
            page_size: Some(page_size),
            cursor: None,
        }
    }

    /// Page following the given cursor
    pub fn after(page_size: usize, cursor: impl Into<String>) -> Self {
        Self {
            page_size: Some(page_size),
            cursor: Some(cursor.into()),
        }
    }

    /// Effective page size after defaults and bounds
    pub fn size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[cfg_attr(feature = "with-api", aliases(
    AppointmentPage = Page<crate::models::appointment::Appointment>,
    LabResultPage = Page<crate::models::lab_result::LabResult>,
    BillPage = Page<crate::models::billing::Bill>,
    BlogPostPage = Page<crate::models::blog::BlogPost>,
    UserPage = Page<crate::models::user::User>,
))]
pub struct Page<T> {
    /// Items of this page
    pub items: Vec<T>,
    /// Cursor for the next page, present when more items exist
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
    /// Whether another page follows
    pub has_more: bool,
}

impl<T> Page<T> {
    /// Transform the items of a page, keeping its cursor
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }
}

/// Typed access to one collection of the document store
pub struct Collection<T: Entity> {
    store: Arc<dyn DocumentStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T: Entity> Collection<T> {
    /// Create a collection handle over a store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Underlying store
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Decode a stored document into an entity
    pub fn decode(document: Document) -> Result<T, RepositoryError> {
        let mut data = document.data;
        if let Some(map) = data.as_object_mut() {
            map.insert("id".to_string(), Value::String(document.id));
        }
        Ok(serde_json::from_value(data)?)
    }

    /// Encode an entity as a document body
    pub fn encode(entity: &T) -> Result<Value, RepositoryError> {
        Ok(serde_json::to_value(entity)?)
    }

    /// Store a new entity; an empty id is replaced by a generated one
    pub async fn create(&self, mut entity: T) -> Result<T, RepositoryError> {
        if entity.id().is_empty() {
            entity.set_id(Uuid::new_v4().to_string());
        } else if self.store.get(T::COLLECTION, entity.id()).await?.is_some() {
            return Err(RepositoryError::Conflict(format!(
                "{}/{} already exists",
                T::COLLECTION,
                entity.id()
            )));
        }

        let document = self
            .store
            .set(T::COLLECTION, entity.id(), Self::encode(&entity)?)
            .await?;

        debug!("Created {}/{}", T::COLLECTION, document.id);
        Self::decode(document)
    }

    /// Fetch an entity by id
    pub async fn get(&self, id: &str) -> Result<Option<T>, RepositoryError> {
        self.store
            .get(T::COLLECTION, id)
            .await?
            .map(Self::decode)
            .transpose()
    }

    /// Fetch an entity that must exist
    pub async fn require(&self, id: &str) -> Result<T, RepositoryError> {
        self.get(id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", T::COLLECTION, id)))
    }

    /// Fetch an entity that must exist, with the update time a conditional write compares against
    pub async fn require_versioned(&self, id: &str) -> Result<(T, DateTime<Utc>), RepositoryError> {
        let document = self
            .store
            .get(T::COLLECTION, id)
            .await?
            .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", T::COLLECTION, id)))?;
        let update_time = document.update_time;
        Ok((Self::decode(document)?, update_time))
    }

    /// Run a query, keeping each match's update time
    pub async fn find_versioned(&self, query: Query) -> Result<Vec<(T, DateTime<Utc>)>, RepositoryError> {
        let documents = self.store.query(T::COLLECTION, &query).await?;
        documents
            .into_iter()
            .map(|document| {
                let update_time = document.update_time;
                Ok((Self::decode(document)?, update_time))
            })
            .collect()
    }

    /// Replace an existing entity
    pub async fn save(&self, entity: &T) -> Result<T, RepositoryError> {
        let document = self
            .store
            .set(T::COLLECTION, entity.id(), Self::encode(entity)?)
            .await?;
        Self::decode(document)
    }

    /// Merge a partial JSON object into an existing entity
    pub async fn update(&self, id: &str, patch: Value) -> Result<T, RepositoryError> {
        let document = self.store.update(T::COLLECTION, id, patch).await?;
        Self::decode(document)
    }

    /// Remove an entity permanently
    pub async fn delete(&self, id: &str) -> Result<(), RepositoryError> {
        self.store.delete(T::COLLECTION, id).await
    }

    /// Run a query and decode every match
    ///
    /// Documents that no longer decode are skipped with a warning so a single
    /// malformed record cannot hide the rest of a list.
    pub async fn find(&self, query: Query) -> Result<Vec<T>, RepositoryError> {
        let documents = self.store.query(T::COLLECTION, &query).await?;
        Ok(documents
            .into_iter()
            .filter_map(|document| {
                let id = document.id.clone();
                match Self::decode(document) {
                    Ok(entity) => Some(entity),
                    Err(e) => {
                        warn!("Skipping undecodable document {}/{}: {}", T::COLLECTION, id, e);
                        None
                    }
                }
            })
            .collect())
    }

    /// Run a query and return the first match
    pub async fn find_one(&self, query: Query) -> Result<Option<T>, RepositoryError> {
        Ok(self.find(query.limit(1)).await?.into_iter().next())
    }

    /// Run a query one page at a time
    ///
    /// The query should carry its ordering; one extra item is fetched to
    /// determine whether another page follows.
    pub async fn page(&self, query: Query, request: &PageRequest) -> Result<Page<T>, RepositoryError> {
        let size = request.size();
        let query = match &request.cursor {
            Some(cursor) => query.start_after(cursor.clone()),
            None => query,
        };

        let mut items = self.find(query.limit(size + 1)).await?;
        let has_more = items.len() > size;
        items.truncate(size);

        let next_cursor = if has_more {
            items.last().map(|item| item.id().to_string())
        } else {
            None
        };

        Ok(Page {
            items,
            next_cursor,
            has_more,
        })
    }

    /// Subscribe to changes of entities matching the query filters
    pub fn watch(&self, query: Query) -> Subscription<T> {
        Subscription::new(self.store.subscribe(), query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Direction, InMemoryDocumentStore};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Note {
        #[serde(default)]
        id: String,
        owner: String,
        rank: u32,
    }

    impl Entity for Note {
        const COLLECTION: &'static str = "notes";

        fn id(&self) -> &str {
            &self.id
        }

        fn set_id(&mut self, id: String) {
            self.id = id;
        }
    }

    fn notes() -> Collection<Note> {
        Collection::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn note(owner: &str, rank: u32) -> Note {
        Note { id: String::new(), owner: owner.to_string(), rank }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_roundtrips() {
        let notes = notes();
        let created = notes.create(note("ada", 1)).await.unwrap();
        assert!(!created.id.is_empty());
        assert_eq!(notes.require(&created.id).await.unwrap(), created);
        assert!(matches!(notes.require("missing").await, Err(RepositoryError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_create_with_existing_id_conflicts() {
        let notes = notes();
        let mut fixed = note("ada", 1);
        fixed.id = "fixed".to_string();
        notes.create(fixed.clone()).await.unwrap();
        assert!(matches!(notes.create(fixed).await, Err(RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_update_merges_fields() {
        let notes = notes();
        let created = notes.create(note("ada", 1)).await.unwrap();
        let updated = notes.update(&created.id, json!({ "rank": 7 })).await.unwrap();
        assert_eq!(updated.rank, 7);
        assert_eq!(updated.owner, "ada");
    }

    #[tokio::test]
    async fn test_pages_are_disjoint_and_terminate() {
        let notes = notes();
        for rank in 0..7 {
            notes.create(note("ada", rank)).await.unwrap();
        }
        notes.create(note("bob", 100)).await.unwrap();

        let query = Query::new()
            .where_eq("owner", "ada")
            .order_by("rank", Direction::Asc);

        let mut seen = Vec::new();
        let mut request = PageRequest::first(3);
        let mut pages = 0;
        loop {
            let page = notes.page(query.clone(), &request).await.unwrap();
            pages += 1;
            seen.extend(page.items.iter().map(|n| n.rank));
            match page.next_cursor {
                Some(cursor) => request = PageRequest::after(3, cursor),
                None => {
                    assert!(!page.has_more);
                    break;
                }
            }
        }

        assert_eq!(pages, 3);
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_page_size_is_clamped() {
        assert_eq!(PageRequest::default().size(), DEFAULT_PAGE_SIZE);
        assert_eq!(PageRequest::first(0).size(), 1);
        assert_eq!(PageRequest::first(10_000).size(), MAX_PAGE_SIZE);
    }

    #[tokio::test]
    async fn test_find_skips_malformed_documents() {
        let notes = notes();
        notes.create(note("ada", 1)).await.unwrap();
        notes
            .store()
            .set(Note::COLLECTION, "broken", json!({ "owner": "ada", "rank": "high" }))
            .await
            .unwrap();

        let found = notes.find(Query::new().where_eq("owner", "ada")).await.unwrap();
        assert_eq!(found.len(), 1);
    }
}
