use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

use super::{ensure_object, ensure_unchanged, merge_patch, next_update_time, ChangeEvent, ChangeKind, Document, DocumentStore, Query, WriteOp, CHANGE_CHANNEL_CAPACITY};
use crate::database::SqlitePool;
use crate::repository::RepositoryError;

/// Document store persisted in the `documents` table of a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    pool: SqlitePool,
    changes: broadcast::Sender<ChangeEvent>,
}

impl SqliteDocumentStore {
    /// Create a store over an already migrated pool
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { pool, changes }
    }

    /// Run blocking database work off the async executor
    async fn with_connection<T, F>(&self, work: F) -> Result<T, RepositoryError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, RepositoryError> + Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            work(&mut conn)
        })
        .await?
    }

    fn publish(&self, events: Vec<ChangeEvent>) {
        for event in events {
            let _ = self.changes.send(event);
        }
    }
}

fn parse_time(value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Validation(format!("corrupt document time '{}': {}", value, e)))
}

fn read_document(conn: &Connection, collection: &str, id: &str) -> Result<Option<Document>, RepositoryError> {
    let row = conn
        .query_row(
            "SELECT id, data, create_time, update_time FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )
        .optional()?;

    row.map(|(id, data, create_time, update_time)| build_document(id, &data, &create_time, &update_time))
        .transpose()
}

fn build_document(id: String, data: &str, create_time: &str, update_time: &str) -> Result<Document, RepositoryError> {
    Ok(Document {
        id,
        data: serde_json::from_str(data)?,
        create_time: parse_time(create_time)?,
        update_time: parse_time(update_time)?,
    })
}

fn write_document(conn: &Connection, collection: &str, document: &Document) -> Result<(), RepositoryError> {
    conn.execute(
        "INSERT INTO documents (collection, id, data, create_time, update_time)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(collection, id) DO UPDATE SET data = excluded.data, update_time = excluded.update_time",
        params![
            collection,
            document.id,
            serde_json::to_string(&document.data)?,
            document.create_time.to_rfc3339(),
            document.update_time.to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Apply one write on a connection or transaction
fn apply_write(conn: &Connection, write: WriteOp) -> Result<ChangeEvent, RepositoryError> {
    let now = Utc::now();

    match write {
        WriteOp::Set { collection, id, data } => {
            ensure_object(&data)?;
            let existing = read_document(conn, &collection, &id)?;
            let (kind, create_time, update_time, previous) = match existing {
                Some(doc) => (
                    ChangeKind::Modified,
                    doc.create_time,
                    next_update_time(doc.update_time, now),
                    Some(doc.data),
                ),
                None => (ChangeKind::Added, now, now, None),
            };
            let document = Document { id, data, create_time, update_time };
            write_document(conn, &collection, &document)?;
            Ok(ChangeEvent { collection, kind, document, previous })
        }
        WriteOp::Update { collection, id, patch } => {
            let mut document = read_document(conn, &collection, &id)?
                .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", collection, id)))?;
            let previous = Some(document.data.clone());
            merge_patch(&mut document.data, &patch)?;
            document.update_time = next_update_time(document.update_time, now);
            write_document(conn, &collection, &document)?;
            Ok(ChangeEvent { collection, kind: ChangeKind::Modified, document, previous })
        }
        WriteOp::UpdateIfUnchanged { collection, id, patch, update_time } => {
            let mut document = read_document(conn, &collection, &id)?
                .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", collection, id)))?;
            ensure_unchanged(&collection, &document, update_time)?;
            let previous = Some(document.data.clone());
            merge_patch(&mut document.data, &patch)?;
            document.update_time = next_update_time(document.update_time, now);
            write_document(conn, &collection, &document)?;
            Ok(ChangeEvent { collection, kind: ChangeKind::Modified, document, previous })
        }
        WriteOp::Delete { collection, id } => {
            let document = read_document(conn, &collection, &id)?
                .ok_or_else(|| RepositoryError::NotFound(format!("{}/{}", collection, id)))?;
            conn.execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )?;
            Ok(ChangeEvent { collection, kind: ChangeKind::Removed, document, previous: None })
        }
    }
}

/// Apply one write in its own transaction
///
/// `IMMEDIATE` takes the write lock before the read, so concurrent
/// read-modify-write cycles on other connections queue instead of interleaving.
fn apply_single(conn: &mut Connection, write: WriteOp) -> Result<ChangeEvent, RepositoryError> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let event = apply_write(&tx, write)?;
    tx.commit()?;
    Ok(event)
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, RepositoryError> {
        let (collection, id) = (collection.to_string(), id.to_string());
        self.with_connection(move |conn| read_document(conn, &collection, &id)).await
    }

    async fn add(&self, collection: &str, data: Value) -> Result<Document, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        self.set(collection, &id, data).await
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> Result<Document, RepositoryError> {
        debug!("Storing document in database: {}/{}", collection, id);
        let write = WriteOp::Set {
            collection: collection.to_string(),
            id: id.to_string(),
            data,
        };
        let event = self.with_connection(move |conn| apply_single(conn, write)).await?;
        let document = event.document.clone();
        self.publish(vec![event]);
        Ok(document)
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Document, RepositoryError> {
        let write = WriteOp::Update {
            collection: collection.to_string(),
            id: id.to_string(),
            patch,
        };
        let event = self.with_connection(move |conn| apply_single(conn, write)).await?;
        let document = event.document.clone();
        self.publish(vec![event]);
        Ok(document)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RepositoryError> {
        let write = WriteOp::Delete {
            collection: collection.to_string(),
            id: id.to_string(),
        };
        let event = self.with_connection(move |conn| apply_single(conn, write)).await?;
        self.publish(vec![event]);
        Ok(())
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Document>, RepositoryError> {
        let collection = collection.to_string();
        let documents = self
            .with_connection(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, data, create_time, update_time FROM documents WHERE collection = ?1",
                )?;
                let rows = stmt.query_map(params![collection], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut documents = Vec::new();
                for row in rows {
                    let (id, data, create_time, update_time) = row?;
                    documents.push(build_document(id, &data, &create_time, &update_time)?);
                }
                Ok(documents)
            })
            .await?;

        query.apply(documents)
    }

    async fn batch(&self, writes: Vec<WriteOp>) -> Result<(), RepositoryError> {
        let events = self
            .with_connection(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let mut events = Vec::with_capacity(writes.len());
                for write in writes {
                    match apply_write(&tx, write) {
                        Ok(event) => events.push(event),
                        Err(e) => {
                            error!("Batch write failed, rolling back: {}", e);
                            return Err(e);
                        }
                    }
                }
                tx.commit()?;
                Ok(events)
            })
            .await?;
        self.publish(events);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.changes.subscribe()
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}
