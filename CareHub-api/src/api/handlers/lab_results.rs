use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    Extension, Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::lab_result::{LabResult, LabStatus};
use care_hub_data::repository::LabResultPage;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::lab_results::{CreateLabResultRequest, LabResultFilter, LabTrend};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::{change_event, ApiJson};
use crate::api::state::AppState;
use crate::entities::common::PageParams;

/// Request to move a lab result to a new processing state
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateLabStatusRequest {
    pub status: LabStatus,
}

/// Request to replace a lab result's doctor notes
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LabNotesRequest {
    pub notes: String,
}

/// Test whose trend is requested
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TrendQueryParams {
    /// Exact test name, e.g. "HbA1c"
    pub test_name: String,
}

/// Record a lab result
#[utoipa::path(
    post,
    path = "/api/v1/lab-results",
    request_body = CreateLabResultRequest,
    responses(
        (status = 201, description = "Lab result recorded", body = LabResult),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Patients cannot record results", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn create_lab_result(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<CreateLabResultRequest>,
) -> ApiResult<impl IntoResponse> {
    let result = state.services.lab_results.create(&user, request).await?;
    info!("Recorded lab result {} for {}", result.id, result.patient_id);
    Ok((StatusCode::CREATED, Json(result)))
}

#[utoipa::path(
    get,
    path = "/api/v1/lab-results/{id}",
    params(("id" = String, Path, description = "Lab result ID")),
    responses(
        (status = 200, description = "Lab result found", body = LabResult),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Lab result not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn get_lab_result(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<LabResult>> {
    Ok(Json(state.services.lab_results.get(&user, &id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/lab-results/{id}/status",
    params(("id" = String, Path, description = "Lab result ID")),
    request_body = UpdateLabStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = LabResult),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_lab_status(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateLabStatusRequest>,
) -> ApiResult<Json<LabResult>> {
    Ok(Json(state.services.lab_results.update_status(&user, &id, request.status).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/lab-results/{id}/notes",
    params(("id" = String, Path, description = "Lab result ID")),
    request_body = LabNotesRequest,
    responses(
        (status = 200, description = "Notes saved", body = LabResult),
        (status = 400, description = "Notes too long", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn add_lab_notes(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<LabNotesRequest>,
) -> ApiResult<Json<LabResult>> {
    Ok(Json(state.services.lab_results.add_notes(&user, &id, &request.notes).await?))
}

/// A patient's lab results, newest first
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/lab-results",
    params(("id" = String, Path, description = "Patient ID"), LabResultFilter, PageParams),
    responses(
        (status = 200, description = "One page of lab results", body = LabResultPage),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn patient_lab_results(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(filter): Query<LabResultFilter>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<LabResultPage>> {
    Ok(Json(state.services.lab_results.page(&user, &id, &filter, &page.into()).await?))
}

/// Results outside their reference range
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/lab-results/abnormal",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Abnormal results", body = [LabResult]),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn abnormal_lab_results(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<LabResult>>> {
    Ok(Json(state.services.lab_results.abnormal(&user, &id).await?))
}

/// Direction of one test's values over time
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/lab-results/trend",
    params(("id" = String, Path, description = "Patient ID"), TrendQueryParams),
    responses(
        (status = 200, description = "Trend of the test", body = LabTrend),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn lab_trend(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(params): Query<TrendQueryParams>,
) -> ApiResult<Json<LabTrend>> {
    Ok(Json(state.services.lab_results.trend(&user, &id, &params.test_name).await?))
}

/// Live changes to a patient's lab results as server-sent events
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/lab-results/stream",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Events named added, modified or removed", body = String, content_type = "text/event-stream"),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "lab_results"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn stream_lab_results(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let subscription = state.services.lab_results.watch(&user, &id)?;
    info!("Streaming lab result changes for {}", id);
    Ok(Sse::new(subscription.into_stream().map(change_event)).keep_alive(KeepAlive::default()))
}
