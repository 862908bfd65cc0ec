//! Domain layer health check functionality
//! This module provides health check services for the application

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use care_hub_data::database;
use care_hub_data::DocumentStore;

/// Store round trips slower than this report the database as degraded
pub const SLOW_PING: Duration = Duration::from_millis(500);

/// System health status
#[derive(Debug, Clone, PartialEq)]
pub enum SystemStatus {
    /// All components are healthy
    Healthy,
    /// Some components are degraded but the system is functional
    Degraded,
    /// System is not functioning properly
    Unhealthy,
}

/// Component health status
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Component is functioning but with reduced performance
    Degraded,
    /// Component is not functioning
    Unhealthy,
}

/// Represents a health component with status and optional details
#[derive(Debug, Clone)]
pub struct HealthComponent {
    /// Status of the component
    pub status: ComponentStatus,
    /// Optional details about the component status
    pub details: Option<String>,
}

/// Represents the overall health of the system
#[derive(Debug, Clone)]
pub struct SystemHealth {
    /// Overall system status
    pub status: SystemStatus,
    /// Map of component names to their health status
    pub components: HashMap<String, HealthComponent>,
}

/// Trait for health services
#[async_trait]
pub trait HealthServiceTrait: Send + Sync + std::fmt::Debug {
    /// Get the overall system health
    async fn get_system_health(&self) -> SystemHealth;

    /// Check the status of the database
    /// Returns true if the database is healthy, false if it is slow
    /// Returns an error if the check could not be performed
    async fn check_database_status(&self) -> Result<bool, String>;
}

/// Health checks against the document store
pub struct HealthService {
    store: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService").finish_non_exhaustive()
    }
}

impl HealthService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl HealthServiceTrait for HealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let db_component = match self.check_database_status().await {
            Ok(true) => HealthComponent {
                status: ComponentStatus::Healthy,
                details: connection_details().await,
            },
            Ok(false) => HealthComponent {
                status: ComponentStatus::Degraded,
                details: Some("Database is available but responding slowly".to_string()),
            },
            Err(e) => HealthComponent {
                status: ComponentStatus::Unhealthy,
                details: Some(e),
            },
        };

        SystemHealth {
            status: overall_status(&db_component),
            components: vec![("database".to_string(), db_component)].into_iter().collect(),
        }
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        let started = Instant::now();
        match self.store.ping().await {
            Ok(()) => Ok(started.elapsed() < SLOW_PING),
            Err(e) => {
                warn!("Database health check failed: {}", e);
                Err(format!("Database connection error: {}", e))
            }
        }
    }
}

/// Describing the pool checks out a connection, which can block
async fn connection_details() -> Option<String> {
    tokio::task::spawn_blocking(database::get_connection_info)
        .await
        .unwrap_or_else(|e| {
            warn!("Connection info lookup failed: {}", e);
            None
        })
}

fn overall_status(db: &HealthComponent) -> SystemStatus {
    match db.status {
        ComponentStatus::Unhealthy => SystemStatus::Unhealthy,
        ComponentStatus::Degraded => SystemStatus::Degraded,
        ComponentStatus::Healthy => SystemStatus::Healthy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::MockStore;
    use care_hub_data::store::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_get_system_health() {
        let service = HealthService::new(Arc::new(InMemoryDocumentStore::new()));
        let health = service.get_system_health().await;
        assert_eq!(health.status, SystemStatus::Healthy);
        assert!(health.components.contains_key("database"));
    }

    #[tokio::test]
    async fn test_unreachable_store_is_unhealthy() {
        let mut store = MockStore::new();
        store
            .expect_ping()
            .returning(|| Err(care_hub_data::RepositoryError::Unavailable("down".into())));
        let service = HealthService::new(Arc::new(store));

        let health = service.get_system_health().await;
        assert_eq!(health.status, SystemStatus::Unhealthy);
        let db = &health.components["database"];
        assert_eq!(db.status, ComponentStatus::Unhealthy);
        assert!(db.details.as_deref().unwrap_or_default().contains("down"));
    }
}
