use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::umid::Umid;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::umid::{EmergencyInfoRequest, EmergencyView, QrPayload};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;

/// Who is reading an emergency record
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct EmergencyAccessParams {
    /// Responder name or badge number, recorded in the audit log
    pub accessor: Option<String>,
}

/// Issue a new medical ID, revoking any active one
#[utoipa::path(
    post,
    path = "/api/v1/patients/{id}/umid",
    params(("id" = String, Path, description = "Patient ID")),
    request_body = EmergencyInfoRequest,
    responses(
        (status = 201, description = "Medical ID issued", body = Umid),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "umid"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn generate_umid(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<EmergencyInfoRequest>,
) -> ApiResult<impl IntoResponse> {
    let umid = state.services.umid.generate(&user, &id, request).await?;
    info!("Issued medical ID {} for {}", umid.id, id);
    Ok((StatusCode::CREATED, Json(umid)))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/umid",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Active medical ID", body = Umid),
        (status = 404, description = "No active medical ID", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "umid"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn get_umid(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Umid>> {
    Ok(Json(state.services.umid.get_for_patient(&user, &id).await?))
}

/// Content for the printable QR code
#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/umid/qr",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "QR payload", body = QrPayload),
        (status = 404, description = "No active medical ID", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "umid"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn umid_qr(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<QrPayload>> {
    let umid = state.services.umid.get_for_patient(&user, &id).await?;
    Ok(Json(state.services.umid.qr_payload(&umid)))
}

#[utoipa::path(
    put,
    path = "/api/v1/umids/{id}/emergency-info",
    params(("id" = String, Path, description = "Medical ID record ID")),
    request_body = EmergencyInfoRequest,
    responses(
        (status = 200, description = "Emergency details replaced", body = Umid),
        (status = 409, description = "Medical ID is revoked", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "umid"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_emergency_info(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<EmergencyInfoRequest>,
) -> ApiResult<Json<Umid>> {
    Ok(Json(state.services.umid.update_emergency_info(&user, &id, request).await?))
}

#[utoipa::path(
    post,
    path = "/api/v1/umids/{id}/revoke",
    params(("id" = String, Path, description = "Medical ID record ID")),
    responses(
        (status = 200, description = "Medical ID revoked", body = Umid),
        (status = 409, description = "Already revoked", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "umid"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn revoke_umid(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Umid>> {
    let umid = state.services.umid.revoke(&user, &id).await?;
    info!("Revoked medical ID {}", id);
    Ok(Json(umid))
}

/// Emergency details behind a scanned code; no token required
#[utoipa::path(
    get,
    path = "/api/v1/emergency/{code}",
    params(("code" = String, Path, description = "Code printed on the medical ID"), EmergencyAccessParams),
    responses(
        (status = 200, description = "Emergency details", body = EmergencyView),
        (status = 404, description = "Unknown or revoked code", body = ErrorResponse)
    ),
    tag = "umid"
)]
#[instrument(skip(state))]
pub async fn emergency_access(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(params): Query<EmergencyAccessParams>,
) -> ApiResult<Json<EmergencyView>> {
    let view = state
        .services
        .umid
        .emergency_access(&code, params.accessor.as_deref())
        .await?;
    Ok(Json(view))
}
