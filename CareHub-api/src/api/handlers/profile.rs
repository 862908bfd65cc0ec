use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use tracing::{info, instrument};

use care_hub_data::models::user::{AccessibilitySettings, SecuritySettings, User};
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::profile::{CreateProfileRequest, UpdateProfileRequest};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;

/// Identity carried by the caller's token
#[utoipa::path(
    get,
    path = "/api/v1/me",
    responses(
        (status = 200, description = "Authenticated user", body = UserInfo),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
pub async fn current_user(Extension(user): Extension<UserInfo>) -> Json<UserInfo> {
    Json(user)
}

/// Create the caller's profile on first sign-in
#[utoipa::path(
    post,
    path = "/api/v1/profiles",
    request_body = CreateProfileRequest,
    responses(
        (status = 201, description = "Profile created", body = User),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 409, description = "Profile already exists", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn create_profile(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<CreateProfileRequest>,
) -> ApiResult<impl IntoResponse> {
    let profile = state.services.profiles.create_profile(&user, request).await?;
    info!("Created profile for {}", profile.id);
    Ok((StatusCode::CREATED, Json(profile)))
}

#[utoipa::path(
    get,
    path = "/api/v1/profiles/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Profile found", body = User),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Profile not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.services.profiles.get_profile(&user, &id).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/profiles/{id}",
    params(("id" = String, Path, description = "User ID")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = User),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.services.profiles.update_profile(&user, &id, request).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/profiles/{id}/accessibility",
    params(("id" = String, Path, description = "User ID")),
    request_body = AccessibilitySettings,
    responses(
        (status = 200, description = "Settings saved", body = User),
        (status = 400, description = "Invalid settings", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_accessibility(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(settings): ApiJson<AccessibilitySettings>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.services.profiles.update_accessibility(&user, &id, settings).await?))
}

#[utoipa::path(
    put,
    path = "/api/v1/profiles/{id}/security",
    params(("id" = String, Path, description = "User ID")),
    request_body = SecuritySettings,
    responses(
        (status = 200, description = "Settings saved", body = User),
        (status = 400, description = "Invalid settings", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_security(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(settings): ApiJson<SecuritySettings>,
) -> ApiResult<Json<User>> {
    Ok(Json(state.services.profiles.update_security(&user, &id, settings).await?))
}

/// Soft-delete an account
#[utoipa::path(
    delete,
    path = "/api/v1/profiles/{id}",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 204, description = "Account deactivated"),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "profile"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn deactivate_profile(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.services.profiles.deactivate(&user, &id).await?;
    info!("Deactivated account {}", id);
    Ok(StatusCode::NO_CONTENT)
}
