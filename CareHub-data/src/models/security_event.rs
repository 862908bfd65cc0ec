use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::as_timestamp;

/// Stored audit trail entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct SecurityEventRecord {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Event type name, e.g. `LAB_RESULT_VIEWED`
    pub event_type: String,
    /// Acting user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Whether the action succeeded
    pub success: bool,
    /// Affected resource path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    /// Free-form details
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// When the event happened
    #[serde(with = "as_timestamp")]
    pub timestamp: DateTime<Utc>,
}

impl Entity for SecurityEventRecord {
    const COLLECTION: &'static str = "security_logs";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
