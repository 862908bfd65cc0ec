//! User profiles and per-user settings.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, instrument};
use validator::Validate;

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use care_hub_data::models::user::{AccessibilitySettings, Role, SecuritySettings, User};
use care_hub_data::store::{timestamp_value, Direction, DocumentStore, Query};
use care_hub_data::{Collection, Entity, Page, PageRequest};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

/// Profile created on first sign-in; id and role come from the token
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct CreateProfileRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1, max = 100))]
    pub display_name: String,
    #[serde(default)]
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub specialty: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 100))]
    pub display_name: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    #[validate(length(max = 100))]
    pub specialty: Option<String>,
    #[validate(length(max = 2000))]
    pub bio: Option<String>,
}

#[derive(Clone)]
pub struct ProfileService {
    users: Collection<User>,
    audit: AuditLogger,
}

impl ProfileService {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger) -> Self {
        Self {
            users: Collection::new(store),
            audit,
        }
    }

    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn create_profile(&self, user: &UserInfo, request: CreateProfileRequest) -> ServiceResult<User> {
        request.validate()?;
        if user.role != Role::Doctor && (request.specialty.is_some() || request.bio.is_some()) {
            return Err(ServiceError::Validation("specialty and bio are for doctors only".to_string()));
        }

        let now = Utc::now();
        // Conflict when a profile with this subject exists
        let profile = self
            .users
            .create(User {
                id: user.user_id.clone(),
                email: request.email,
                display_name: request.display_name,
                role: user.role,
                phone: request.phone,
                date_of_birth: request.date_of_birth,
                specialty: request.specialty,
                bio: request.bio,
                accessibility: AccessibilitySettings::default(),
                security: SecuritySettings::default(),
                created_at: now,
                updated_at: now,
                deleted: false,
                deleted_at: None,
            })
            .await?;

        info!("Created {} profile {}", profile.role, profile.id);
        self.log(user, SecurityEventType::ProfileUpdate, &profile.id, "created").await;
        Ok(profile)
    }

    pub async fn get_profile(&self, user: &UserInfo, id: &str) -> ServiceResult<User> {
        if !user.can_access_patient(id) {
            return Err(forbidden("view this profile"));
        }
        self.active(id).await
    }

    pub async fn update_profile(&self, user: &UserInfo, id: &str, request: UpdateProfileRequest) -> ServiceResult<User> {
        if !user.is_self_or_admin(id) {
            return Err(forbidden("update this profile"));
        }
        request.validate()?;
        let existing = self.active(id).await?;
        if existing.role != Role::Doctor && (request.specialty.is_some() || request.bio.is_some()) {
            return Err(ServiceError::Validation("specialty and bio are for doctors only".to_string()));
        }

        let mut patch = Map::new();
        if let Some(name) = request.display_name {
            patch.insert("display_name".into(), Value::String(name));
        }
        if let Some(phone) = request.phone {
            patch.insert("phone".into(), Value::String(phone));
        }
        if let Some(dob) = request.date_of_birth {
            patch.insert("date_of_birth".into(), json!(dob));
        }
        if let Some(specialty) = request.specialty {
            patch.insert("specialty".into(), Value::String(specialty));
        }
        if let Some(bio) = request.bio {
            patch.insert("bio".into(), Value::String(bio));
        }
        patch.insert("updated_at".into(), timestamp_value(Utc::now()));

        let updated = self.users.update(id, Value::Object(patch)).await?;
        self.log(user, SecurityEventType::ProfileUpdate, id, "updated").await;
        Ok(updated)
    }

    pub async fn update_accessibility(
        &self,
        user: &UserInfo,
        id: &str,
        settings: AccessibilitySettings,
    ) -> ServiceResult<User> {
        if !user.is_self_or_admin(id) {
            return Err(forbidden("change these settings"));
        }
        if !(0.5..=3.0).contains(&settings.font_scale) {
            return Err(ServiceError::Validation("font_scale must be between 0.5 and 3.0".to_string()));
        }
        if settings.language.trim().is_empty() {
            return Err(ServiceError::Validation("language is required".to_string()));
        }
        self.active(id).await?;

        let updated = self
            .users
            .update(
                id,
                json!({ "accessibility": settings, "updated_at": timestamp_value(Utc::now()) }),
            )
            .await?;
        self.log(user, SecurityEventType::ProfileUpdate, id, "accessibility").await;
        Ok(updated)
    }

    pub async fn update_security(&self, user: &UserInfo, id: &str, settings: SecuritySettings) -> ServiceResult<User> {
        if !user.is_self_or_admin(id) {
            return Err(forbidden("change these settings"));
        }
        if !(5..=1440).contains(&settings.session_timeout_minutes) {
            return Err(ServiceError::Validation(
                "session_timeout_minutes must be between 5 and 1440".to_string(),
            ));
        }
        self.active(id).await?;

        let updated = self
            .users
            .update(
                id,
                json!({ "security": settings, "updated_at": timestamp_value(Utc::now()) }),
            )
            .await?;
        self.log(
            user,
            SecurityEventType::SecuritySettingsChange,
            id,
            &format!("two_factor={} login_alerts={}", settings.two_factor_enabled, settings.login_alerts),
        )
        .await;
        Ok(updated)
    }

    /// Soft delete; the profile disappears from reads and listings
    pub async fn deactivate(&self, user: &UserInfo, id: &str) -> ServiceResult<()> {
        if !user.is_self_or_admin(id) {
            return Err(forbidden("deactivate this account"));
        }
        self.active(id).await?;
        let now = timestamp_value(Utc::now());
        self.users
            .update(id, json!({ "deleted": true, "deleted_at": now, "updated_at": now }))
            .await?;
        self.log(user, SecurityEventType::ProfileUpdate, id, "deactivated").await;
        Ok(())
    }

    /// Admin listing by display name
    pub async fn list_users(&self, user: &UserInfo, role: Option<Role>, page: &PageRequest) -> ServiceResult<Page<User>> {
        if !user.is_admin() {
            return Err(forbidden("list users"));
        }
        let mut query = Query::new().where_eq("deleted", false);
        if let Some(role) = role {
            query = query.where_eq("role", role.as_str());
        }
        Ok(self.users.page(query.order_by("display_name", Direction::Asc), page).await?)
    }

    async fn active(&self, id: &str) -> ServiceResult<User> {
        self.users
            .get(id)
            .await?
            .filter(|u| !u.deleted)
            .ok_or_else(|| ServiceError::NotFound(format!("user {}", id)))
    }

    async fn log(&self, user: &UserInfo, event_type: SecurityEventType, id: &str, details: &str) {
        self.audit
            .log(
                SecurityEvent::success(event_type, &user.user_id)
                    .with_resource(format!("{}/{}", User::COLLECTION, id))
                    .with_details(details),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::test_support::{seed_user, user_info, TestStore};

    fn request(name: &str) -> CreateProfileRequest {
        CreateProfileRequest {
            email: "ada@example.com".to_string(),
            display_name: name.to_string(),
            phone: None,
            date_of_birth: NaiveDate::from_ymd_opt(1990, 4, 2),
            specialty: None,
            bio: None,
        }
    }

    #[tokio::test]
    async fn test_create_profile_uses_token_identity() {
        let store = TestStore::new();
        let service = ProfileService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);

        let profile = service.create_profile(&patient, request("Ada")).await.unwrap();
        assert_eq!(profile.id, "p1");
        assert_eq!(profile.role, Role::Patient);
        assert_eq!(profile.accessibility, AccessibilitySettings::default());

        assert!(matches!(
            service.create_profile(&patient, request("Ada again")).await,
            Err(ServiceError::Conflict(_))
        ));

        let mut invalid = request("Bob");
        invalid.email = "not-an-email".to_string();
        assert!(matches!(
            service.create_profile(&user_info("p2", Role::Patient), invalid).await,
            Err(ServiceError::Validation(_))
        ));

        let mut with_specialty = request("Cy");
        with_specialty.specialty = Some("Cardiology".to_string());
        assert!(matches!(
            service.create_profile(&user_info("p3", Role::Patient), with_specialty.clone()).await,
            Err(ServiceError::Validation(_))
        ));
        let doctor = service.create_profile(&user_info("d1", Role::Doctor), with_specialty).await.unwrap();
        assert_eq!(doctor.specialty.as_deref(), Some("Cardiology"));
    }

    #[tokio::test]
    async fn test_settings_bounds_and_audit() {
        let store = TestStore::new();
        seed_user(&store, "p1", Role::Patient).await;
        let service = ProfileService::new(store.dyn_store(), store.audit());
        let patient = user_info("p1", Role::Patient);

        let settings = AccessibilitySettings { font_scale: 1.5, high_contrast: true, ..Default::default() };
        let updated = service.update_accessibility(&patient, "p1", settings).await.unwrap();
        assert!(updated.accessibility.high_contrast);

        let too_big = AccessibilitySettings { font_scale: 4.0, ..Default::default() };
        assert!(matches!(
            service.update_accessibility(&patient, "p1", too_big).await,
            Err(ServiceError::Validation(_))
        ));

        let security = SecuritySettings { two_factor_enabled: true, session_timeout_minutes: 15, ..Default::default() };
        let updated = service.update_security(&patient, "p1", security).await.unwrap();
        assert!(updated.security.two_factor_enabled);

        let short = SecuritySettings { session_timeout_minutes: 1, ..Default::default() };
        assert!(matches!(service.update_security(&patient, "p1", short).await, Err(ServiceError::Validation(_))));

        assert!(matches!(
            service
                .update_security(&user_info("p2", Role::Patient), "p1", SecuritySettings::default())
                .await,
            Err(ServiceError::Forbidden(_))
        ));

        let events = store.audit().recent_events(Some("p1"), 10).await.unwrap();
        assert!(events.iter().any(|e| e.event_type == "SECURITY_SETTINGS_CHANGE"));
    }

    #[tokio::test]
    async fn test_deactivated_profiles_disappear() {
        let store = TestStore::new();
        seed_user(&store, "p1", Role::Patient).await;
        seed_user(&store, "p2", Role::Patient).await;
        seed_user(&store, "d1", Role::Doctor).await;
        let service = ProfileService::new(store.dyn_store(), store.audit());
        let admin = user_info("a1", Role::Admin);

        let patients = service.list_users(&admin, Some(Role::Patient), &PageRequest::default()).await.unwrap();
        assert_eq!(patients.items.len(), 2);

        service.deactivate(&user_info("p2", Role::Patient), "p2").await.unwrap();
        assert!(matches!(service.get_profile(&admin, "p2").await, Err(ServiceError::NotFound(_))));
        let patients = service.list_users(&admin, Some(Role::Patient), &PageRequest::default()).await.unwrap();
        assert_eq!(patients.items.len(), 1);

        let update = UpdateProfileRequest { display_name: Some("Pat".to_string()), ..Default::default() };
        let renamed = service.update_profile(&user_info("p1", Role::Patient), "p1", update).await.unwrap();
        assert_eq!(renamed.display_name, "Pat");

        assert!(matches!(
            service.list_users(&user_info("p1", Role::Patient), None, &PageRequest::default()).await,
            Err(ServiceError::Forbidden(_))
        ));
        assert!(matches!(
            service.get_profile(&user_info("p1", Role::Patient), "d1").await,
            Err(ServiceError::Forbidden(_))
        ));
    }
}
