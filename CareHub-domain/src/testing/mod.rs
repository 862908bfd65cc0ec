// Testing utilities and mock implementations for the domain layer
// This module is only available when the "mock" feature is enabled

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use care_hub_data::media::ImageUploader;
use care_hub_data::models::user::{AccessibilitySettings, Role, SecuritySettings, User};
use care_hub_data::store::InMemoryDocumentStore;
use care_hub_data::{Collection, DocumentStore};

// Re-export the failing store from the data layer
pub use care_hub_data::store::OfflineDocumentStore;

use crate::auth::{SecurityError, TokenValidator};
use crate::config::{AppConfig, StoreBackend};
use crate::health::{ComponentStatus, HealthComponent, HealthServiceTrait, SystemHealth, SystemStatus};
use crate::services::Services;

/// Signing secret shared by test tokens and test configuration
pub const TEST_JWT_SECRET: &str = "carehub-test-secret-0123456789";

/// Configuration pointing at in-memory storage and fixed URLs
pub fn test_config() -> AppConfig {
    AppConfig {
        store_backend: StoreBackend::Memory,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        telemedicine_base_url: "https://meet.test".to_string(),
        umid_base_url: "https://carehub.test".to_string(),
        ..AppConfig::default()
    }
}

/// Services over a fresh in-memory store, plus the store for seeding
pub fn in_memory_services() -> (Services, Arc<dyn DocumentStore>) {
    let store: Arc<dyn DocumentStore> = Arc::new(InMemoryDocumentStore::new());
    let services = Services::new(store.clone(), &test_config(), ImageUploader::default());
    (services, store)
}

/// Services whose every store call fails
pub fn offline_services() -> Services {
    Services::new(Arc::new(OfflineDocumentStore), &test_config(), ImageUploader::default())
}

/// Validator matching `test_config`
pub fn test_validator() -> Result<TokenValidator, SecurityError> {
    let config = test_config();
    TokenValidator::new(&config.jwt_secret, &config.jwt_issuer)
}

/// Bearer token for a user, valid for one hour
pub fn issue_test_token(user_id: &str, role: Role) -> Result<String, SecurityError> {
    test_validator()?.issue(user_id, role, Some(&format!("{}@example.com", user_id)), Duration::hours(1))
}

/// Store a profile directly, bypassing the profile service
pub async fn seed_profile(
    store: &Arc<dyn DocumentStore>,
    id: &str,
    role: Role,
    display_name: &str,
) -> Result<User, care_hub_data::RepositoryError> {
    let now = Utc::now();
    Collection::<User>::new(store.clone())
        .create(User {
            id: id.to_string(),
            email: format!("{}@example.com", id),
            display_name: display_name.to_string(),
            role,
            phone: None,
            date_of_birth: None,
            specialty: (role == Role::Doctor).then(|| "General Practice".to_string()),
            bio: None,
            accessibility: AccessibilitySettings::default(),
            security: SecuritySettings::default(),
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
        })
        .await
}

/// Mock implementation of health services for testing system health
#[derive(Debug)]
pub struct MockHealthService {
    /// Database component status
    database_status: ComponentStatus,
    /// System status
    system_status: SystemStatus,
    /// Additional components
    components: HashMap<String, HealthComponent>,
}

impl Default for MockHealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHealthService {
    /// Create a new mock health service with all components healthy
    pub fn new() -> Self {
        Self {
            database_status: ComponentStatus::Healthy,
            system_status: SystemStatus::Healthy,
            components: HashMap::new(),
        }
    }

    /// Configure the mock with a degraded database
    pub fn with_degraded_database(mut self) -> Self {
        self.database_status = ComponentStatus::Degraded;
        self.system_status = SystemStatus::Degraded;
        self
    }

    /// Configure the mock with an unhealthy database
    pub fn with_unhealthy_database(mut self) -> Self {
        self.database_status = ComponentStatus::Unhealthy;
        self.system_status = SystemStatus::Unhealthy;
        self
    }

    /// Add a custom component with a specific status
    pub fn with_component(mut self, name: &str, status: ComponentStatus, details: Option<String>) -> Self {
        self.components.insert(name.to_string(), HealthComponent { status, details });
        self
    }
}

#[async_trait]
impl HealthServiceTrait for MockHealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let mut components = HashMap::new();

        components.insert(
            "database".to_string(),
            HealthComponent {
                status: self.database_status.clone(),
                details: match self.database_status {
                    ComponentStatus::Healthy => None,
                    ComponentStatus::Degraded => Some("Database is experiencing high load".to_string()),
                    ComponentStatus::Unhealthy => Some("Database connection failed".to_string()),
                },
            },
        );

        for (name, component) in &self.components {
            components.insert(name.clone(), component.clone());
        }

        SystemHealth {
            status: self.system_status.clone(),
            components,
        }
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        match self.database_status {
            ComponentStatus::Healthy => Ok(true),
            ComponentStatus::Degraded => Ok(false),
            ComponentStatus::Unhealthy => Err("Database connection failed".to_string()),
        }
    }
}

/// Factory function to create a mock health service
pub fn create_mock_health_service() -> Arc<dyn HealthServiceTrait> {
    Arc::new(MockHealthService::new())
}
