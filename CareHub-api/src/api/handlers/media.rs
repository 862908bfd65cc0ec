use axum::{extract::State, http::StatusCode, response::IntoResponse, Extension, Json};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::{info, instrument};

use care_hub_domain::auth::UserInfo;

use crate::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::entities::media::{UploadImageRequest, UploadImageResponse};

/// Upload an image to the first image host that accepts it
#[utoipa::path(
    post,
    path = "/api/v1/media/images",
    request_body = UploadImageRequest,
    responses(
        (status = 201, description = "Image stored", body = UploadImageResponse),
        (status = 400, description = "Not base64 or not a supported image", body = ErrorResponse),
        (status = 502, description = "Every image host failed", body = ErrorResponse),
        (status = 503, description = "No image hosts configured", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "media"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, file_name = %request.file_name))]
pub async fn upload_image(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<UploadImageRequest>,
) -> ApiResult<impl IntoResponse> {
    let bytes = STANDARD
        .decode(request.content_base64.trim())
        .map_err(|e| ApiError::BadRequest(format!("content_base64 is not valid base64: {}", e)))?;

    let url = state.services.media.upload(&bytes, &request.file_name).await?;
    info!("Uploaded {} ({} bytes)", request.file_name, bytes.len());
    Ok((StatusCode::CREATED, Json(UploadImageResponse { url })))
}
