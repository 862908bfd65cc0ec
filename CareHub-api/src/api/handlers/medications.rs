use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::medication::Medication;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::medications::{
    AddMedicationRequest, AdherenceReport, DoseReminder, LogDoseRequest, UpdateMedicationRequest,
};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;

pub const DEFAULT_REMINDER_WINDOW_MINUTES: i64 = 60;
pub const MAX_REMINDER_WINDOW_MINUTES: i64 = 24 * 60;
pub const DEFAULT_ADHERENCE_DAYS: i64 = 30;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct MedicationQueryParams {
    /// Only medications currently being taken
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ReminderQueryParams {
    /// Look-ahead in minutes (default: 60, max: 1440)
    pub window_minutes: Option<i64>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AdherenceQueryParams {
    /// First day, inclusive (default: 29 days before `to`)
    pub from: Option<NaiveDate>,
    /// Last day, inclusive (default: today, UTC)
    pub to: Option<NaiveDate>,
}

/// Add a medication to a patient's list
#[utoipa::path(
    post,
    path = "/api/v1/medications",
    request_body = AddMedicationRequest,
    responses(
        (status = 201, description = "Medication added", body = Medication),
        (status = 400, description = "Invalid schedule or dates", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn add_medication(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<AddMedicationRequest>,
) -> ApiResult<impl IntoResponse> {
    let medication = state.services.medications.add(&user, request).await?;
    info!("Added medication {} for {}", medication.id, medication.patient_id);
    Ok((StatusCode::CREATED, Json(medication)))
}

#[utoipa::path(
    get,
    path = "/api/v1/medications/{id}",
    params(("id" = String, Path, description = "Medication ID")),
    responses(
        (status = 200, description = "Medication found", body = Medication),
        (status = 404, description = "Medication not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn get_medication(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Medication>> {
    Ok(Json(state.services.medications.get(&user, &id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/medications/{id}",
    params(("id" = String, Path, description = "Medication ID")),
    request_body = UpdateMedicationRequest,
    responses(
        (status = 200, description = "Medication updated", body = Medication),
        (status = 400, description = "Invalid update", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_medication(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateMedicationRequest>,
) -> ApiResult<Json<Medication>> {
    Ok(Json(state.services.medications.update(&user, &id, request).await?))
}

/// Stop a medication, keeping its history
#[utoipa::path(
    post,
    path = "/api/v1/medications/{id}/deactivate",
    params(("id" = String, Path, description = "Medication ID")),
    responses((status = 200, description = "Medication stopped", body = Medication)),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn deactivate_medication(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Medication>> {
    Ok(Json(state.services.medications.deactivate(&user, &id).await?))
}

#[utoipa::path(
    delete,
    path = "/api/v1/medications/{id}",
    params(("id" = String, Path, description = "Medication ID")),
    responses(
        (status = 204, description = "Medication removed"),
        (status = 404, description = "Medication not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn remove_medication(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.medications.remove(&user, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Log a scheduled dose as taken or skipped
#[utoipa::path(
    post,
    path = "/api/v1/medications/{id}/doses",
    params(("id" = String, Path, description = "Medication ID")),
    request_body = LogDoseRequest,
    responses(
        (status = 201, description = "Dose logged", body = care_hub_data::models::medication::DoseLog),
        (status = 400, description = "Time is not on the schedule", body = ErrorResponse),
        (status = 409, description = "Dose already logged", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn log_dose(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<LogDoseRequest>,
) -> ApiResult<impl IntoResponse> {
    let log = state.services.medications.log_dose(&user, &id, request).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/medications",
    params(("id" = String, Path, description = "Patient ID"), MedicationQueryParams),
    responses(
        (status = 200, description = "Medications", body = [Medication]),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn patient_medications(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(params): Query<MedicationQueryParams>,
) -> ApiResult<Json<Vec<Medication>>> {
    Ok(Json(state.services.medications.list(&user, &id, params.active_only).await?))
}

/// Doses due soon that are not logged yet
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/reminders",
    params(("id" = String, Path, description = "Patient ID"), ReminderQueryParams),
    responses(
        (status = 200, description = "Due doses in time order", body = [DoseReminder]),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn due_reminders(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(params): Query<ReminderQueryParams>,
) -> ApiResult<Json<Vec<DoseReminder>>> {
    let minutes = params
        .window_minutes
        .unwrap_or(DEFAULT_REMINDER_WINDOW_MINUTES)
        .clamp(1, MAX_REMINDER_WINDOW_MINUTES);
    let reminders = state
        .services
        .medications
        .reminders_due(&user, &id, Utc::now(), Duration::minutes(minutes))
        .await?;
    Ok(Json(reminders))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/adherence",
    params(("id" = String, Path, description = "Patient ID"), AdherenceQueryParams),
    responses(
        (status = 200, description = "Adherence over the period", body = AdherenceReport),
        (status = 400, description = "Invalid date range", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "medications"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn adherence_report(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(params): Query<AdherenceQueryParams>,
) -> ApiResult<Json<AdherenceReport>> {
    let to = params.to.unwrap_or_else(|| Utc::now().date_naive());
    let from = params.from.unwrap_or(to - Duration::days(DEFAULT_ADHERENCE_DAYS - 1));
    Ok(Json(state.services.medications.adherence(&user, &id, from, to).await?))
}
