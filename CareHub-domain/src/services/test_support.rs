//! Shared fixtures for service tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use serde_json::Value;
use tokio::sync::broadcast;

use care_hub_data::models::user::{AccessibilitySettings, Role, SecuritySettings, User};
use care_hub_data::store::{ChangeEvent, Document, DocumentStore, InMemoryDocumentStore, Query, WriteOp};
use care_hub_data::{Collection, RepositoryError};

use crate::audit::AuditLogger;
use crate::auth::UserInfo;

mock! {
    pub Store {}

    #[async_trait]
    impl DocumentStore for Store {
        async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepositoryError>;
        async fn add(&self, collection: &str, data: Value) -> Result<Document, RepositoryError>;
        async fn set(&self, collection: &str, id: &str, data: Value) -> Result<Document, RepositoryError>;
        async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Document, RepositoryError>;
        async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError>;
        async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, RepositoryError>;
        async fn batch(&self, writes: Vec<WriteOp>) -> Result<(), RepositoryError>;
        fn subscribe(&self) -> broadcast::Receiver<ChangeEvent>;
        async fn ping(&self) -> Result<(), RepositoryError>;
    }
}

/// In-memory store shared by a service under test and its assertions
pub struct TestStore {
    store: Arc<InMemoryDocumentStore>,
}

impl TestStore {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryDocumentStore::new()),
        }
    }

    pub fn dyn_store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn audit(&self) -> AuditLogger {
        AuditLogger::new(self.dyn_store())
    }
}

pub fn user_info(id: &str, role: Role) -> UserInfo {
    UserInfo {
        user_id: id.to_string(),
        role,
        email: None,
    }
}

pub fn user(id: &str, role: Role) -> User {
    let now = Utc::now();
    User {
        id: id.to_string(),
        email: format!("{}@example.com", id),
        display_name: format!("User {}", id),
        role,
        phone: None,
        date_of_birth: None,
        specialty: None,
        bio: None,
        accessibility: AccessibilitySettings::default(),
        security: SecuritySettings::default(),
        created_at: now,
        updated_at: now,
        deleted: false,
        deleted_at: None,
    }
}

pub async fn seed_user(store: &TestStore, id: &str, role: Role) -> User {
    Collection::<User>::new(store.dyn_store())
        .create(user(id, role))
        .await
        .expect("seed user")
}

/// Store that fails every call the way an unreachable backend would
pub fn unavailable_store() -> Arc<dyn DocumentStore> {
    let mut store = MockStore::new();
    store
        .expect_get()
        .returning(|_, _| Err(RepositoryError::Unavailable("connection refused".into())));
    store
        .expect_query()
        .returning(|_, _| Err(RepositoryError::Unavailable("connection refused".into())));
    store
        .expect_set()
        .returning(|_, _, _| Err(RepositoryError::Unavailable("connection refused".into())));
    store
        .expect_update()
        .returning(|_, _, _| Err(RepositoryError::Unavailable("connection refused".into())));
    store
        .expect_batch()
        .returning(|_| Err(RepositoryError::Unavailable("connection refused".into())));
    store.expect_subscribe().returning(|| broadcast::channel(1).1);
    Arc::new(store)
}
