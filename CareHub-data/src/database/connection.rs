//! Database connection module for the CareHub application
//!
//! Documents are persisted in SQLite through an r2d2 connection pool. The pool
//! is created once at startup and shared by every `SqliteDocumentStore`.

use std::env;
use std::sync::Arc;
use std::time::Duration;
use once_cell::sync::OnceCell;
use rusqlite::OpenFlags;
use tracing::{info, error};

use super::DatabaseError;
use super::migrations::run_sqlite_migrations;

/// Shared SQLite connection pool
pub type SqlitePool = Arc<r2d2::Pool<r2d2_sqlite::SqliteConnectionManager>>;

/// Global database pool used throughout the application
static DB_POOL: OnceCell<SqlitePool> = OnceCell::new();

/// Supported database types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// SQLite database (file-based)
    Sqlite,
    /// SQLite database held in memory, lost on restart
    SqliteMemory,
}

impl DatabaseType {
    /// Convert from string to database type
    pub fn parse(s: &str) -> Result<Self, DatabaseError> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(DatabaseType::Sqlite),
            "sqlite-memory" | "memory" => Ok(DatabaseType::SqliteMemory),
            _ => Err(DatabaseError::UnsupportedDatabaseType(s.to_string())),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database type
    pub db_type: DatabaseType,
    /// Path to SQLite database file
    pub sqlite_path: String,
    /// Maximum number of pooled connections
    pub pool_size: u32,
    /// Connection timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            db_type: DatabaseType::Sqlite,
            sqlite_path: "./data/carehub.db".to_string(),
            pool_size: 10,
            timeout_seconds: 30,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration from environment variables
    pub fn from_env() -> Result<Self, DatabaseError> {
        let defaults = Self::default();

        let db_type_str = env::var("DB_TYPE").unwrap_or_else(|_| "sqlite".to_string());
        let db_type = DatabaseType::parse(&db_type_str)?;

        let sqlite_path = match env::var("DB_SQLITE_PATH") {
            Ok(path) => {
                info!("Using SQLite database at: {}", path);
                path
            }
            Err(_) => {
                info!("No DB_SQLITE_PATH provided, will use default path: {}", defaults.sqlite_path);
                defaults.sqlite_path
            }
        };

        let pool_size = env::var("DB_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(defaults.pool_size);

        let timeout_seconds = env::var("DB_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.timeout_seconds);

        info!("Database configuration: pool_size={}, timeout={}s", pool_size, timeout_seconds);

        Ok(DatabaseConfig {
            db_type,
            sqlite_path,
            pool_size,
            timeout_seconds,
        })
    }
}

/// Initialize the global database connection pool from the environment
pub fn initialize_database_pool() -> Result<SqlitePool, DatabaseError> {
    if DB_POOL.get().is_some() {
        return Err(DatabaseError::PoolAlreadyInitialized);
    }

    let config = DatabaseConfig::from_env()?;
    info!("Initializing database pool with type: {:?}", config.db_type);

    let pool = create_pool(&config)?;

    DB_POOL
        .set(pool.clone())
        .map_err(|_| DatabaseError::PoolAlreadyInitialized)?;

    Ok(pool)
}

/// Create a migrated connection pool for the given configuration
pub fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    let pool = match config.db_type {
        DatabaseType::Sqlite => initialize_sqlite_pool(config)?,
        DatabaseType::SqliteMemory => initialize_in_memory_sqlite_pool(config)?,
    };

    run_migrations(&pool)?;
    Ok(pool)
}

/// Initialize SQLite connection pool
///
/// A file database that cannot be opened is an error, never an in-memory one.
fn initialize_sqlite_pool(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    use std::fs;
    use std::path::Path;

    info!("Initializing SQLite database at: {}", config.sqlite_path);

    if let Some(parent) = Path::new(&config.sqlite_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating parent directory: {:?}", parent);
            fs::create_dir_all(parent).map_err(|source| {
                error!("Failed to create directory {:?}: {}", parent, source);
                DatabaseError::CreateDirectory {
                    path: parent.display().to_string(),
                    source,
                }
            })?;
        }
    }

    let manager = r2d2_sqlite::SqliteConnectionManager::file(&config.sqlite_path)
        .with_flags(OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE);

    let pool = r2d2::Pool::builder()
        .max_size(config.pool_size)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)
        .map_err(|e| {
            error!("Failed to create SQLite connection pool: {}", e);
            e
        })?;

    info!("SQLite connection pool created successfully");
    Ok(Arc::new(pool))
}

/// Initialize an in-memory SQLite database
///
/// Every pooled connection to `:memory:` would see its own empty database, so
/// the pool is capped at a single connection.
fn initialize_in_memory_sqlite_pool(config: &DatabaseConfig) -> Result<SqlitePool, DatabaseError> {
    info!("Initializing in-memory SQLite database");

    let manager = r2d2_sqlite::SqliteConnectionManager::memory();

    let pool = r2d2::Pool::builder()
        .max_size(1)
        .connection_timeout(Duration::from_secs(config.timeout_seconds))
        .build(manager)?;

    info!("In-memory SQLite database initialized successfully");
    Ok(Arc::new(pool))
}

/// Run database migrations against a pool
fn run_migrations(pool: &SqlitePool) -> Result<(), DatabaseError> {
    let conn = pool.get()?;
    run_sqlite_migrations(&conn).map_err(DatabaseError::MigrationError)
}

/// Get information about the current database connection
pub fn get_connection_info() -> Option<String> {
    let pool = DB_POOL.get()?;
    Some(describe_pool(pool))
}

/// Describe a pool: backing file and connection counts
pub fn describe_pool(pool: &SqlitePool) -> String {
    match pool.get() {
        Ok(conn) => {
            let location = match conn.query_row("PRAGMA database_list", [], |row| row.get::<_, String>(2)) {
                Ok(path) if path.is_empty() || path == ":memory:" => "SQLite in-memory database".to_string(),
                Ok(path) => format!("SQLite database at {}", path),
                Err(_) => "SQLite database (path unknown)".to_string(),
            };

            let state = pool.state();
            format!(
                "{} (connections: active={}, idle={})",
                location, state.connections, state.idle_connections
            )
        }
        Err(e) => {
            error!("Failed to get SQLite connection: {}", e);
            format!("SQLite connection error: {}", e)
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.db_type, DatabaseType::Sqlite);
        assert!(config.sqlite_path.ends_with("carehub.db"));
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_database_type_parse() {
        assert_eq!(DatabaseType::parse("sqlite").unwrap(), DatabaseType::Sqlite);
        assert_eq!(DatabaseType::parse("SQLite").unwrap(), DatabaseType::Sqlite);
        assert_eq!(DatabaseType::parse("memory").unwrap(), DatabaseType::SqliteMemory);
        assert!(DatabaseType::parse("postgres").is_err());
    }

    #[test]
    fn test_in_memory_pool_is_migrated() {
        let config = DatabaseConfig {
            db_type: DatabaseType::SqliteMemory,
            ..DatabaseConfig::default()
        };
        let pool = create_pool(&config).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(describe_pool(&pool).contains("in-memory"));
    }

    #[test]
    fn test_unwritable_database_path_is_an_error() {
        let config = DatabaseConfig {
            db_type: DatabaseType::Sqlite,
            sqlite_path: "/dev/null/carehub/carehub.db".to_string(),
            pool_size: 1,
            timeout_seconds: 1,
        };
        let result = create_pool(&config);
        assert!(matches!(result, Err(DatabaseError::CreateDirectory { .. })));
    }
}
