use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::{as_timestamp, as_timestamp_opt};

/// Role of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Patient
    Patient,
    /// Doctor
    Doctor,
    /// Administrator
    Admin,
}

impl Role {
    /// Lowercase name as stored
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "admin" => Ok(Role::Admin),
            other => Err(format!("invalid role: {}", other)),
        }
    }
}

/// Display preferences synced per user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct AccessibilitySettings {
    /// Text scale factor
    pub font_scale: f32,
    /// High contrast theme
    pub high_contrast: bool,
    /// Disable animations
    pub reduce_motion: bool,
    /// Screen reader hints
    pub screen_reader: bool,
    /// Interface language (BCP 47)
    pub language: String,
}

impl Default for AccessibilitySettings {
    fn default() -> Self {
        Self {
            font_scale: 1.0,
            high_contrast: false,
            reduce_motion: false,
            screen_reader: false,
            language: "en".to_string(),
        }
    }
}

/// Account security preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct SecuritySettings {
    /// Second factor required at sign-in
    pub two_factor_enabled: bool,
    /// Notify on new sign-ins
    pub login_alerts: bool,
    /// Idle session timeout
    pub session_timeout_minutes: u32,
    /// Last password change reported by the auth provider
    #[serde(with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub password_updated_at: Option<DateTime<Utc>>,
}

impl Default for SecuritySettings {
    fn default() -> Self {
        Self {
            two_factor_enabled: false,
            login_alerts: true,
            session_timeout_minutes: 30,
            password_updated_at: None,
        }
    }
}

/// User profile; the id is the auth provider's subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct User {
    /// Auth provider subject
    #[serde(default)]
    pub id: String,
    /// Contact email
    pub email: String,
    /// Name shown in the interface
    pub display_name: String,
    /// Account role
    pub role: Role,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Date of birth
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
    /// Medical specialty, doctors only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specialty: Option<String>,
    /// Short biography, doctors only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    /// Accessibility preferences
    #[serde(default)]
    pub accessibility: AccessibilitySettings,
    /// Security preferences
    #[serde(default)]
    pub security: SecuritySettings,
    /// Creation time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "as_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker
    #[serde(default)]
    pub deleted: bool,
    /// Soft-delete time
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Entity for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
