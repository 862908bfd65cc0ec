use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::as_timestamp;

/// A prescribed or self-reported medication with a daily schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Medication {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Patient user id
    pub patient_id: String,
    /// Prescribing doctor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prescribed_by: Option<String>,
    /// Drug name
    pub name: String,
    /// Dose per intake, e.g. "500 mg"
    pub dosage: String,
    /// Intake instructions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Daily intake times as `HH:MM` (UTC)
    pub schedule: Vec<String>,
    /// First day of treatment
    pub start_date: NaiveDate,
    /// Last day of treatment, open ended when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    /// Send reminders for scheduled doses
    pub reminders_enabled: bool,
    /// Currently taken
    pub active: bool,
    /// Creation time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "as_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    /// Parsed schedule times; malformed entries are ignored
    pub fn schedule_times(&self) -> Vec<NaiveTime> {
        let mut times: Vec<NaiveTime> = self
            .schedule
            .iter()
            .filter_map(|t| NaiveTime::parse_from_str(t, "%H:%M").ok())
            .collect();
        times.sort();
        times.dedup();
        times
    }

    /// Whether treatment runs on the given day
    pub fn is_scheduled_on(&self, day: NaiveDate) -> bool {
        self.active && day >= self.start_date && self.end_date.map_or(true, |end| day <= end)
    }
}

impl Entity for Medication {
    const COLLECTION: &'static str = "medications";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Outcome of a scheduled dose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum DoseStatus {
    /// Dose taken
    Taken,
    /// Dose deliberately skipped
    Skipped,
}

/// Record of one scheduled dose
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct DoseLog {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Medication the dose belongs to
    pub medication_id: String,
    /// Patient user id
    pub patient_id: String,
    /// Scheduled intake time
    #[serde(with = "as_timestamp")]
    pub scheduled_for: DateTime<Utc>,
    /// When the patient logged the dose
    #[serde(with = "as_timestamp")]
    pub logged_at: DateTime<Utc>,
    /// Taken or skipped
    pub status: DoseStatus,
}

impl Entity for DoseLog {
    const COLLECTION: &'static str = "medication_doses";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
