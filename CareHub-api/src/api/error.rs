use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use utoipa::ToSchema;

use care_hub_data::media::MediaError;
use care_hub_data::RepositoryError;
use care_hub_domain::services::ServiceError;

/// Error response format for API
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Error type/code - machine-readable identifier
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// Optional additional details about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    fn new(error: &str, message: impl Into<String>) -> Self {
        Self {
            error: error.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("validation_error", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("forbidden", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("conflict", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new("service_unavailable", message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new("bad_gateway", message)
    }

    /// Internal errors never leak their cause to the client
    pub fn internal_error() -> Self {
        Self::new("internal_error", "An unexpected error occurred")
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    fn status(&self) -> StatusCode {
        match self.error.as_str() {
            "validation_error" | "bad_request" => StatusCode::BAD_REQUEST,
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "forbidden" => StatusCode::FORBIDDEN,
            "not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "bad_gateway" => StatusCode::BAD_GATEWAY,
            "service_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

/// Failures a handler can return
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Media(#[from] MediaError),

    /// Request could not be decoded
    #[error("Bad request: {0}")]
    BadRequest(String),
}

/// Result alias used by the handlers
pub type ApiResult<T> = Result<T, ApiError>;

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<ApiError> for ErrorResponse {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Service(ServiceError::Validation(msg)) => ErrorResponse::validation_error(msg),
            ApiError::Service(ServiceError::NotFound(msg)) => ErrorResponse::not_found(msg),
            ApiError::Service(ServiceError::Forbidden(msg)) => ErrorResponse::forbidden(msg),
            ApiError::Service(ServiceError::Conflict(msg)) => ErrorResponse::conflict(msg),
            ApiError::Service(ServiceError::Repository(RepositoryError::Unavailable(msg))) => {
                warn!("Store unavailable: {}", msg);
                ErrorResponse::unavailable("The data store is temporarily unavailable")
            }
            ApiError::Service(ServiceError::Repository(e)) => {
                error!("Repository error: {}", e);
                ErrorResponse::internal_error()
            }
            ApiError::Media(MediaError::InvalidImage(msg)) => ErrorResponse::validation_error(msg),
            ApiError::Media(MediaError::NoHosts) => ErrorResponse::unavailable("Image uploads are not configured"),
            ApiError::Media(MediaError::AllHostsFailed(failures)) => {
                error!("All image hosts failed: {}", failures.join("; "));
                ErrorResponse::bad_gateway("Image upload failed")
                    .with_details(serde_json::json!({ "attempts": failures.len() }))
            }
            ApiError::Media(e) => {
                error!("Image upload error: {}", e);
                ErrorResponse::bad_gateway("Image upload failed")
            }
            ApiError::BadRequest(msg) => ErrorResponse::bad_request(msg),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ErrorResponse::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_service_errors_map_to_status_codes() {
        assert_eq!(status_of(ServiceError::Validation("x".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(ServiceError::NotFound("x".into()).into()), StatusCode::NOT_FOUND);
        assert_eq!(status_of(ServiceError::Forbidden("x".into()).into()), StatusCode::FORBIDDEN);
        assert_eq!(status_of(ServiceError::Conflict("x".into()).into()), StatusCode::CONFLICT);
        assert_eq!(
            status_of(ServiceError::Repository(RepositoryError::Lock("poisoned".into())).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(ServiceError::Repository(RepositoryError::Unavailable("down".into())).into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_errors_hide_the_cause() {
        let body = ErrorResponse::from(ApiError::Service(ServiceError::Repository(RepositoryError::Lock(
            "secret detail".into(),
        ))));
        assert_eq!(body.error, "internal_error");
        assert!(!body.message.contains("secret detail"));
    }

    #[test]
    fn test_media_errors() {
        assert_eq!(status_of(MediaError::InvalidImage("bad".into()).into()), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(MediaError::NoHosts.into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status_of(MediaError::AllHostsFailed(vec!["a: down".into()]).into()),
            StatusCode::BAD_GATEWAY
        );
    }
}
