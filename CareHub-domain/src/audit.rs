//! Security event logging.
//!
//! Every mutating service operation records a security event. Events go to
//! the tracing output and to the `security_logs` collection. The store write
//! is best-effort: a failure is logged and never fails the operation that
//! produced the event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use care_hub_data::models::security_event::SecurityEventRecord;
use care_hub_data::store::{Direction, DocumentStore, Query};
use care_hub_data::{Collection, RepositoryError};

/// Types of security events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SecurityEventType {
    Login,
    Logout,
    ProfileUpdate,
    SecuritySettingsChange,
    AppointmentCreated,
    AppointmentUpdated,
    AppointmentCancelled,
    LabResultCreated,
    LabResultViewed,
    LabResultUpdated,
    BillCreated,
    PaymentRecorded,
    ClaimSubmitted,
    ClaimUpdated,
    MedicationCreated,
    MedicationUpdated,
    DoseLogged,
    BlogPostCreated,
    BlogPostUpdated,
    BlogPostDeleted,
    UmidGenerated,
    UmidUpdated,
    UmidAccessed,
    UmidRevoked,
    AccessDenied,
    DataExport,
}

impl SecurityEventType {
    /// Name as written to the log
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::Login => "LOGIN",
            SecurityEventType::Logout => "LOGOUT",
            SecurityEventType::ProfileUpdate => "PROFILE_UPDATE",
            SecurityEventType::SecuritySettingsChange => "SECURITY_SETTINGS_CHANGE",
            SecurityEventType::AppointmentCreated => "APPOINTMENT_CREATED",
            SecurityEventType::AppointmentUpdated => "APPOINTMENT_UPDATED",
            SecurityEventType::AppointmentCancelled => "APPOINTMENT_CANCELLED",
            SecurityEventType::LabResultCreated => "LAB_RESULT_CREATED",
            SecurityEventType::LabResultViewed => "LAB_RESULT_VIEWED",
            SecurityEventType::LabResultUpdated => "LAB_RESULT_UPDATED",
            SecurityEventType::BillCreated => "BILL_CREATED",
            SecurityEventType::PaymentRecorded => "PAYMENT_RECORDED",
            SecurityEventType::ClaimSubmitted => "CLAIM_SUBMITTED",
            SecurityEventType::ClaimUpdated => "CLAIM_UPDATED",
            SecurityEventType::MedicationCreated => "MEDICATION_CREATED",
            SecurityEventType::MedicationUpdated => "MEDICATION_UPDATED",
            SecurityEventType::DoseLogged => "DOSE_LOGGED",
            SecurityEventType::BlogPostCreated => "BLOG_POST_CREATED",
            SecurityEventType::BlogPostUpdated => "BLOG_POST_UPDATED",
            SecurityEventType::BlogPostDeleted => "BLOG_POST_DELETED",
            SecurityEventType::UmidGenerated => "UMID_GENERATED",
            SecurityEventType::UmidUpdated => "UMID_UPDATED",
            SecurityEventType::UmidAccessed => "UMID_ACCESSED",
            SecurityEventType::UmidRevoked => "UMID_REVOKED",
            SecurityEventType::AccessDenied => "ACCESS_DENIED",
            SecurityEventType::DataExport => "DATA_EXPORT",
        }
    }
}

impl std::fmt::Display for SecurityEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Security event record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    /// Type of event
    pub event_type: SecurityEventType,
    /// Acting user, if known
    pub user_id: Option<String>,
    /// Whether the action succeeded
    pub success: bool,
    /// Affected resource, `collection/id`
    pub resource: Option<String>,
    /// Free-form details
    pub details: Option<String>,
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
}

impl SecurityEvent {
    /// Create a new event
    pub fn new(event_type: SecurityEventType, user_id: Option<&str>, success: bool) -> Self {
        Self {
            event_type,
            user_id: user_id.map(String::from),
            success,
            resource: None,
            details: None,
            timestamp: Utc::now(),
        }
    }

    /// Shorthand for a successful action by a known user
    pub fn success(event_type: SecurityEventType, user_id: &str) -> Self {
        Self::new(event_type, Some(user_id), true)
    }

    /// Set the resource
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Set the details
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    fn into_record(self) -> SecurityEventRecord {
        SecurityEventRecord {
            id: String::new(),
            event_type: self.event_type.to_string(),
            user_id: self.user_id,
            success: self.success,
            resource: self.resource,
            details: self.details,
            timestamp: self.timestamp,
        }
    }
}

/// Writes security events to the log and the store
#[derive(Clone)]
pub struct AuditLogger {
    records: Collection<SecurityEventRecord>,
}

impl AuditLogger {
    /// Create a logger writing to the given store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            records: Collection::new(store),
        }
    }

    /// Record an event; never fails
    pub async fn log(&self, event: SecurityEvent) {
        let user = event.user_id.as_deref().unwrap_or("anonymous");
        let status = if event.success { "SUCCESS" } else { "FAILURE" };
        info!(
            "AUDIT [{}] [{}] [{}] [{}] {}",
            event.event_type,
            user,
            status,
            event.resource.as_deref().unwrap_or("-"),
            event.details.as_deref().unwrap_or("")
        );

        let event_type = event.event_type;
        if let Err(e) = self.records.create(event.into_record()).await {
            error!("Failed to store security event {}: {}", event_type, e);
        }
    }

    /// Most recent events, newest first, optionally for one user
    pub async fn recent_events(
        &self,
        user_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SecurityEventRecord>, RepositoryError> {
        let mut query = Query::new();
        if let Some(user_id) = user_id {
            query = query.where_eq("user_id", user_id);
        }
        self.records
            .find(query.order_by("timestamp", Direction::Desc).limit(limit.clamp(1, 500)))
            .await
    }
}
