use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Image upload as JSON with base64 content
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadImageRequest {
    /// Original file name, passed to the image host
    pub file_name: String,
    /// Standard base64 encoding of the image bytes
    pub content_base64: String,
}

/// Where the uploaded image can be fetched
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UploadImageResponse {
    pub url: String,
}
