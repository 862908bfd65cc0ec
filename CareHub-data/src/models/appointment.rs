use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::{as_timestamp, as_timestamp_opt};

/// How the appointment takes place
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AppointmentKind {
    /// At the clinic
    InPerson,
    /// Telemedicine video call
    Video,
}

/// Appointment lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked, not yet confirmed by the doctor
    Scheduled,
    /// Confirmed by the doctor
    Confirmed,
    /// Took place
    Completed,
    /// Called off
    Cancelled,
    /// Patient did not attend
    NoShow,
}

impl AppointmentStatus {
    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Cancelled | AppointmentStatus::NoShow
        )
    }

    /// Whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        match self {
            Scheduled => matches!(next, Confirmed | Completed | Cancelled | NoShow),
            Confirmed => matches!(next, Completed | Cancelled | NoShow),
            Completed | Cancelled | NoShow => false,
        }
    }
}

/// Embeddable video room attached to a video appointment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VideoRoom {
    /// Provider room name
    pub room_name: String,
    /// Link that opens the call
    pub join_url: String,
    /// Link for an iframe embed
    pub embed_url: String,
}

/// A booked consultation between a patient and a doctor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Appointment {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Patient user id
    pub patient_id: String,
    /// Doctor user id
    pub doctor_id: String,
    /// Start time
    #[serde(with = "as_timestamp")]
    pub scheduled_at: DateTime<Utc>,
    /// Length in minutes
    pub duration_minutes: u32,
    /// In person or video
    pub kind: AppointmentKind,
    /// Lifecycle state
    pub status: AppointmentStatus,
    /// Reason for the visit
    pub reason: String,
    /// Doctor notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Video room for telemedicine appointments
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_room: Option<VideoRoom>,
    /// Reason given when cancelled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_reason: Option<String>,
    /// User that booked the appointment
    pub created_by: String,
    /// Creation time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "as_timestamp")]
    pub updated_at: DateTime<Utc>,
    /// Cancellation time
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Appointment {
    /// End time
    pub fn ends_at(&self) -> DateTime<Utc> {
        self.scheduled_at + Duration::minutes(i64::from(self.duration_minutes))
    }

    /// Whether this appointment occupies any part of `[start, end)`
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.scheduled_at < end && start < self.ends_at()
    }
}

impl Entity for Appointment {
    const COLLECTION: &'static str = "appointments";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
