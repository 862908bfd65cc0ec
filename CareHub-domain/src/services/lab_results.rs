//! Lab results: recording, filtering, trends and live updates.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, instrument};
use validator::{Validate, ValidationError};

#[cfg(feature = "with-api")]
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::lab_result::{LabResult, LabStatus};
use care_hub_data::repository::Subscription;
use care_hub_data::store::{timestamp_value, Direction, DocumentStore, FilterOp, Query};
use care_hub_data::{Collection, Entity, Page, PageRequest};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

/// Relative change below which a trend counts as stable
pub const STABLE_THRESHOLD_PERCENT: f64 = 5.0;

/// Request to record a lab result
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
#[validate(schema(function = "validate_reference_range"))]
pub struct CreateLabResultRequest {
    /// Patient the result belongs to
    #[validate(length(min = 1, message = "is required"))]
    pub patient_id: String,
    /// Ordering doctor; defaults to the caller when the caller is a doctor
    #[serde(default)]
    pub doctor_id: Option<String>,
    /// Test name, e.g. "HbA1c"
    #[validate(length(min = 1, max = 100))]
    pub test_name: String,
    /// Panel or category, e.g. "Metabolic"
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    /// Measured value
    pub value: f64,
    /// Unit of the value
    #[validate(length(max = 32))]
    pub unit: String,
    /// Lower bound of the reference range
    #[serde(default)]
    pub reference_low: Option<f64>,
    /// Upper bound of the reference range
    #[serde(default)]
    pub reference_high: Option<f64>,
    /// Processing state, `completed` when absent
    #[serde(default)]
    pub status: Option<LabStatus>,
    /// When the sample was collected
    pub collected_at: DateTime<Utc>,
    /// Doctor notes
    #[serde(default)]
    #[validate(length(max = 4000))]
    pub notes: Option<String>,
}

fn validate_reference_range(request: &CreateLabResultRequest) -> Result<(), ValidationError> {
    if !request.value.is_finite() {
        return Err(ValidationError::new("value_not_finite"));
    }
    match (request.reference_low, request.reference_high) {
        (Some(low), Some(high)) if low > high => Err(ValidationError::new("reference_low_above_high")),
        _ => Ok(()),
    }
}

/// Filters for lab result lists
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema, IntoParams))]
#[cfg_attr(feature = "with-api", into_params(parameter_in = Query))]
pub struct LabResultFilter {
    /// Exact test name
    pub test_name: Option<String>,
    /// Exact category
    pub category: Option<String>,
    /// Processing state
    pub status: Option<LabStatus>,
    /// Collected at or after
    pub from: Option<DateTime<Utc>>,
    /// Collected before
    pub to: Option<DateTime<Utc>>,
    /// Only values outside their reference range
    #[serde(default)]
    pub abnormal_only: bool,
}

impl LabResultFilter {
    /// Query for one patient's results, newest first
    fn query(&self, patient_id: &str) -> Query {
        let mut query = Query::new().where_eq("patient_id", patient_id);
        if let Some(test_name) = &self.test_name {
            query = query.where_eq("test_name", test_name.as_str());
        }
        if let Some(category) = &self.category {
            query = query.where_eq("category", category.as_str());
        }
        if let Some(status) = self.status {
            query = query.where_eq("status", status.as_str());
        }
        if let Some(from) = self.from {
            query = query.where_date("collected_at", FilterOp::Gte, from);
        }
        if let Some(to) = self.to {
            query = query.where_date("collected_at", FilterOp::Lt, to);
        }
        if self.abnormal_only {
            query = query.where_eq("abnormal", true);
        }
        query.order_by("collected_at", Direction::Desc)
    }
}

/// Direction of a lab value over time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
    InsufficientData,
}

/// One value in a trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct TrendPoint {
    pub collected_at: DateTime<Utc>,
    pub value: f64,
}

/// Trend of one test for one patient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct LabTrend {
    /// Test name
    pub test_name: String,
    /// Overall direction, first value against last
    pub direction: TrendDirection,
    /// Relative change in percent; absent when it cannot be computed
    pub change_percent: Option<f64>,
    /// Values in chronological order
    pub points: Vec<TrendPoint>,
}

/// Compute the trend of a series of results for one test
pub fn compute_trend(test_name: &str, results: &[LabResult]) -> LabTrend {
    let mut points: Vec<TrendPoint> = results
        .iter()
        .map(|r| TrendPoint {
            collected_at: r.collected_at,
            value: r.value,
        })
        .collect();
    points.sort_by(|a, b| a.collected_at.cmp(&b.collected_at));

    let (direction, change_percent) = match (points.first(), points.last()) {
        (Some(first), Some(last)) if points.len() >= 2 => {
            let delta = last.value - first.value;
            if first.value == 0.0 {
                // No base to compare against; fall back to the sign of the change
                let direction = if delta > 0.0 {
                    TrendDirection::Increasing
                } else if delta < 0.0 {
                    TrendDirection::Decreasing
                } else {
                    TrendDirection::Stable
                };
                (direction, None)
            } else {
                let percent = delta / first.value.abs() * 100.0;
                let direction = if percent.abs() < STABLE_THRESHOLD_PERCENT {
                    TrendDirection::Stable
                } else if percent > 0.0 {
                    TrendDirection::Increasing
                } else {
                    TrendDirection::Decreasing
                };
                (direction, Some(percent))
            }
        }
        _ => (TrendDirection::InsufficientData, None),
    };

    LabTrend {
        test_name: test_name.to_string(),
        direction,
        change_percent,
        points,
    }
}

/// Lab result service
#[derive(Clone)]
pub struct LabResultService {
    results: Collection<LabResult>,
    audit: AuditLogger,
}

impl LabResultService {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger) -> Self {
        Self {
            results: Collection::new(store),
            audit,
        }
    }

    /// Record a result; doctors and admins only
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn create(&self, user: &UserInfo, request: CreateLabResultRequest) -> ServiceResult<LabResult> {
        if user.is_patient() {
            return Err(forbidden("record lab results"));
        }
        request.validate()?;

        let now = Utc::now();
        if request.collected_at > now {
            return Err(ServiceError::Validation("collected_at cannot be in the future".to_string()));
        }

        let status = request.status.unwrap_or(LabStatus::Completed);
        let doctor_id = request
            .doctor_id
            .or_else(|| user.is_doctor().then(|| user.user_id.clone()));

        let mut result = LabResult {
            id: String::new(),
            patient_id: request.patient_id,
            doctor_id,
            test_name: request.test_name,
            category: request.category,
            value: request.value,
            unit: request.unit,
            reference_low: request.reference_low,
            reference_high: request.reference_high,
            abnormal: false,
            status,
            collected_at: request.collected_at,
            reported_at: (status != LabStatus::Pending).then_some(now),
            notes: request.notes,
            created_by: user.user_id.clone(),
            created_at: now,
            updated_at: now,
        };
        result.abnormal = result.is_abnormal();

        let result = self.results.create(result).await?;
        info!("Recorded lab result {} for patient {}", result.id, result.patient_id);
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::LabResultCreated, &user.user_id)
                    .with_resource(resource(&result.id)),
            )
            .await;
        Ok(result)
    }

    /// Fetch one result; every read is audited
    pub async fn get(&self, user: &UserInfo, id: &str) -> ServiceResult<LabResult> {
        let result = self.results.require(id).await?;
        if !user.can_access_patient(&result.patient_id) {
            return Err(forbidden("view this lab result"));
        }
        self.audit
            .log(SecurityEvent::success(SecurityEventType::LabResultViewed, &user.user_id).with_resource(resource(id)))
            .await;
        Ok(result)
    }

    /// All matching results of a patient, newest first
    pub async fn list(&self, user: &UserInfo, patient_id: &str, filter: &LabResultFilter) -> ServiceResult<Vec<LabResult>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these lab results"));
        }
        Ok(self.results.find(filter.query(patient_id)).await?)
    }

    /// One page of matching results, newest first
    pub async fn page(
        &self,
        user: &UserInfo,
        patient_id: &str,
        filter: &LabResultFilter,
        page: &PageRequest,
    ) -> ServiceResult<Page<LabResult>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these lab results"));
        }
        Ok(self.results.page(filter.query(patient_id), page).await?)
    }

    /// Results outside their reference range
    pub async fn abnormal(&self, user: &UserInfo, patient_id: &str) -> ServiceResult<Vec<LabResult>> {
        let filter = LabResultFilter {
            abnormal_only: true,
            ..Default::default()
        };
        self.list(user, patient_id, &filter).await
    }

    /// Move a result to a new processing state
    pub async fn update_status(&self, user: &UserInfo, id: &str, status: LabStatus) -> ServiceResult<LabResult> {
        if user.is_patient() {
            return Err(forbidden("update lab results"));
        }
        let current = self.results.require(id).await?;

        let now = Utc::now();
        let mut patch = Map::new();
        patch.insert("status".to_string(), json!(status));
        patch.insert("updated_at".to_string(), timestamp_value(now));
        if status != LabStatus::Pending && current.reported_at.is_none() {
            patch.insert("reported_at".to_string(), timestamp_value(now));
        }

        let updated = self.results.update(id, Value::Object(patch)).await?;
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::LabResultUpdated, &user.user_id)
                    .with_resource(resource(id))
                    .with_details(format!("status -> {}", status.as_str())),
            )
            .await;
        Ok(updated)
    }

    /// Replace the doctor notes of a result
    pub async fn add_notes(&self, user: &UserInfo, id: &str, notes: &str) -> ServiceResult<LabResult> {
        if user.is_patient() {
            return Err(forbidden("annotate lab results"));
        }
        if notes.len() > 4000 {
            return Err(ServiceError::Validation("notes must be at most 4000 characters".to_string()));
        }

        let updated = self
            .results
            .update(
                id,
                json!({
                    "notes": notes,
                    "updated_at": timestamp_value(Utc::now()),
                }),
            )
            .await?;
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::LabResultUpdated, &user.user_id)
                    .with_resource(resource(id))
                    .with_details("notes updated"),
            )
            .await;
        Ok(updated)
    }

    /// Trend of one test across a patient's history
    pub async fn trend(&self, user: &UserInfo, patient_id: &str, test_name: &str) -> ServiceResult<LabTrend> {
        let filter = LabResultFilter {
            test_name: Some(test_name.to_string()),
            ..Default::default()
        };
        let results = self.list(user, patient_id, &filter).await?;
        debug!("Computing {} trend over {} results", test_name, results.len());
        Ok(compute_trend(test_name, &results))
    }

    /// Live changes to a patient's results
    pub fn watch(&self, user: &UserInfo, patient_id: &str) -> ServiceResult<Subscription<LabResult>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("watch these lab results"));
        }
        Ok(self.results.watch(Query::new().where_eq("patient_id", patient_id)))
    }
}

fn resource(id: &str) -> String {
    format!("{}/{}", LabResult::COLLECTION, id)
}
