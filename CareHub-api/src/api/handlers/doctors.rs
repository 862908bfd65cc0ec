use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::user::User;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::doctors::BusySlot;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::state::AppState;

/// Query parameters for the doctor directory
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct DoctorQueryParams {
    /// Exact specialty to filter by
    pub specialty: Option<String>,
    /// Name fragment; takes precedence over `specialty`
    pub q: Option<String>,
}

/// Day to show a doctor's schedule for
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ScheduleQueryParams {
    /// Day in `YYYY-MM-DD` (UTC)
    pub date: NaiveDate,
}

/// List or search active doctors
#[utoipa::path(
    get,
    path = "/api/v1/doctors",
    params(DoctorQueryParams),
    responses(
        (status = 200, description = "Matching doctors", body = [User]),
        (status = 400, description = "Empty search term", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "doctors"
)]
#[instrument(skip(state))]
pub async fn list_doctors(
    State(state): State<AppState>,
    Query(params): Query<DoctorQueryParams>,
) -> ApiResult<Json<Vec<User>>> {
    let doctors = match params.q.as_deref() {
        Some(term) => state.services.doctors.search(term).await?,
        None => state.services.doctors.list(params.specialty.as_deref()).await?,
    };
    debug!("Found {} doctors", doctors.len());
    Ok(Json(doctors))
}

#[utoipa::path(
    get,
    path = "/api/v1/doctors/{id}",
    params(("id" = String, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Doctor found", body = User),
        (status = 404, description = "No active doctor with this ID", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "doctors"
)]
#[instrument(skip(state))]
pub async fn get_doctor(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<User>> {
    Ok(Json(state.services.doctors.get(&id).await?))
}

/// Busy slots of a doctor on one day
#[utoipa::path(
    get,
    path = "/api/v1/doctors/{id}/schedule",
    params(("id" = String, Path, description = "Doctor ID"), ScheduleQueryParams),
    responses(
        (status = 200, description = "Booked slots in time order", body = [BusySlot]),
        (status = 404, description = "No active doctor with this ID", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "doctors"
)]
#[instrument(skip(state))]
pub async fn doctor_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ScheduleQueryParams>,
) -> ApiResult<Json<Vec<BusySlot>>> {
    Ok(Json(state.services.doctors.schedule(&id, params.date).await?))
}

/// Patients the doctor has seen or will see
#[utoipa::path(
    get,
    path = "/api/v1/doctors/{id}/patients",
    params(("id" = String, Path, description = "Doctor ID")),
    responses(
        (status = 200, description = "Distinct patients", body = [User]),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "doctors"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn doctor_patients(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<User>>> {
    Ok(Json(state.services.doctors.patients_of(&user, &id).await?))
}
