use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::{as_timestamp, as_timestamp_opt};

/// Processing state of a lab result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    /// Sample taken, no value yet
    Pending,
    /// Value reported by the lab
    Completed,
    /// Reviewed by a doctor
    Reviewed,
}

impl LabStatus {
    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Pending => "pending",
            LabStatus::Completed => "completed",
            LabStatus::Reviewed => "reviewed",
        }
    }
}

/// A single numeric lab test result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct LabResult {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Patient user id
    pub patient_id: String,
    /// Ordering doctor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctor_id: Option<String>,
    /// Test name, e.g. "Glucose"
    pub test_name: String,
    /// Panel or category, e.g. "Metabolic"
    pub category: String,
    /// Measured value
    pub value: f64,
    /// Unit of the value
    pub unit: String,
    /// Lower bound of the reference range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_low: Option<f64>,
    /// Upper bound of the reference range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_high: Option<f64>,
    /// Value outside the reference range, stored so it can be queried
    #[serde(default)]
    pub abnormal: bool,
    /// Processing state
    pub status: LabStatus,
    /// When the sample was collected
    #[serde(with = "as_timestamp")]
    pub collected_at: DateTime<Utc>,
    /// When the lab reported the value
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
    /// Doctor notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// User that recorded the result
    pub created_by: String,
    /// Creation time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "as_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl LabResult {
    /// Whether the value falls outside its reference range
    pub fn is_abnormal(&self) -> bool {
        self.reference_low.map_or(false, |low| self.value < low)
            || self.reference_high.map_or(false, |high| self.value > high)
    }
}

impl Entity for LabResult {
    const COLLECTION: &'static str = "lab_results";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
