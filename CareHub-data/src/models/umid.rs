use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::{as_timestamp, as_timestamp_opt};

/// Person to call in an emergency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct EmergencyContact {
    /// Contact name
    pub name: String,
    /// Relationship to the patient
    pub relationship: String,
    /// Phone number
    pub phone: String,
}

/// Data disclosed to first responders through a UMID
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(default)]
pub struct EmergencyInfo {
    /// ABO/Rh blood type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blood_type: Option<String>,
    /// Known allergies
    pub allergies: Vec<String>,
    /// Chronic conditions
    pub conditions: Vec<String>,
    /// Current medications
    pub medications: Vec<String>,
    /// Emergency contacts
    pub emergency_contacts: Vec<EmergencyContact>,
    /// Free-form notes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Universal Medical ID issued to a patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Umid {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Patient user id
    pub patient_id: String,
    /// Public code encoded in the QR image
    pub code: String,
    /// Disclosed emergency data
    pub emergency_info: EmergencyInfo,
    /// Only active UMIDs grant access
    pub active: bool,
    /// Issue time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Revocation time
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
    /// Number of emergency lookups
    #[serde(default)]
    pub access_count: u64,
    /// Time of the last emergency lookup
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl Entity for Umid {
    const COLLECTION: &'static str = "umids";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}
