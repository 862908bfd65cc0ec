//! Image hosting with fallbacks.
//!
//! Profile pictures and blog cover images are pushed to free image-hosting
//! HTTP APIs. Hosts are tried in configuration order and the first URL
//! returned wins.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Largest accepted upload
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Image hosting errors
#[derive(Debug, Error)]
pub enum MediaError {
    /// Upload rejected before contacting any host
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Host answered without a usable URL
    #[error("Unexpected response from {host}: {message}")]
    UnexpectedResponse { host: String, message: String },

    /// No hosts configured
    #[error("No image hosts configured")]
    NoHosts,

    /// Every host failed
    #[error("All image hosts failed: {}", .0.join("; "))]
    AllHostsFailed(Vec<String>),
}

/// A remote service that stores an image and returns its public URL
#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Host name used in logs
    fn name(&self) -> &str;

    /// Upload the image and return its public URL
    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String, MediaError>;
}

/// Configuration of one HTTP image host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageHostConfig {
    /// Host name used in logs
    pub name: String,
    /// Upload endpoint
    pub endpoint: String,
    /// API key sent as the `key` form field
    pub api_key: String,
    /// JSON pointer to the URL inside the response body
    pub url_pointer: String,
}

impl ImageHostConfig {
    /// Parse `name|endpoint|api_key[|url_pointer]`
    pub fn parse(entry: &str) -> Option<Self> {
        let parts: Vec<&str> = entry.split('|').map(str::trim).collect();
        match parts.as_slice() {
            [name, endpoint, api_key] => Some(Self {
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                api_key: api_key.to_string(),
                url_pointer: "/data/url".to_string(),
            }),
            [name, endpoint, api_key, pointer] => Some(Self {
                name: name.to_string(),
                endpoint: endpoint.to_string(),
                api_key: api_key.to_string(),
                url_pointer: pointer.to_string(),
            }),
            _ => None,
        }
    }

    /// Parse a comma-separated host list, skipping malformed entries
    pub fn parse_list(list: &str) -> Vec<Self> {
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .filter_map(|entry| {
                let parsed = Self::parse(entry);
                if parsed.is_none() {
                    warn!("Ignoring malformed image host entry: {}", entry);
                }
                parsed
            })
            .collect()
    }
}

/// Image host reached over HTTP with a form-encoded base64 upload
pub struct HttpImageHost {
    config: ImageHostConfig,
    client: reqwest::Client,
}

impl HttpImageHost {
    /// Create a host client with a request timeout
    pub fn new(config: ImageHostConfig) -> Result<Self, MediaError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl ImageHost for HttpImageHost {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String, MediaError> {
        let encoded = STANDARD.encode(bytes);
        let form = [
            ("key", self.config.api_key.as_str()),
            ("image", encoded.as_str()),
            ("name", file_name),
        ];

        let response = self
            .client
            .post(&self.config.endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?;

        let body: Value = response.json().await?;
        extract_url(&body, &self.config.url_pointer).ok_or_else(|| MediaError::UnexpectedResponse {
            host: self.config.name.clone(),
            message: format!("no URL at {}", self.config.url_pointer),
        })
    }
}

/// Read an http(s) URL at a JSON pointer
fn extract_url(body: &Value, pointer: &str) -> Option<String> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|url| url.starts_with("https://") || url.starts_with("http://"))
        .map(str::to_string)
}

/// Uploads through a list of hosts, falling back on failure
#[derive(Clone, Default)]
pub struct ImageUploader {
    hosts: Vec<Arc<dyn ImageHost>>,
}

impl ImageUploader {
    /// Create an uploader over hosts in priority order
    pub fn new(hosts: Vec<Arc<dyn ImageHost>>) -> Self {
        Self { hosts }
    }

    /// Build HTTP hosts from configuration
    pub fn from_configs(configs: Vec<ImageHostConfig>) -> Result<Self, MediaError> {
        let hosts = configs
            .into_iter()
            .map(|config| HttpImageHost::new(config).map(|host| Arc::new(host) as Arc<dyn ImageHost>))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(hosts))
    }

    /// Number of configured hosts
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    /// Upload the image to the first host that accepts it
    pub async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String, MediaError> {
        validate_image(bytes)?;

        if self.hosts.is_empty() {
            return Err(MediaError::NoHosts);
        }

        let mut failures = Vec::new();
        for host in &self.hosts {
            debug!("Uploading {} ({} bytes) to {}", file_name, bytes.len(), host.name());
            match host.upload(bytes, file_name).await {
                Ok(url) => {
                    info!("Uploaded {} to {}", file_name, host.name());
                    return Ok(url);
                }
                Err(e) => {
                    warn!("Image host {} failed: {}", host.name(), e);
                    failures.push(format!("{}: {}", host.name(), e));
                }
            }
        }

        Err(MediaError::AllHostsFailed(failures))
    }
}

/// Check size and magic bytes of an upload
pub fn validate_image(bytes: &[u8]) -> Result<(), MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::InvalidImage("empty upload".to_string()));
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(MediaError::InvalidImage(format!(
            "image is {} bytes, limit is {}",
            bytes.len(),
            MAX_IMAGE_BYTES
        )));
    }

    let known = bytes.starts_with(&[0x89, b'P', b'N', b'G'])
        || bytes.starts_with(&[0xFF, 0xD8, 0xFF])
        || bytes.starts_with(b"GIF8")
        || (bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP");

    if known {
        Ok(())
    } else {
        Err(MediaError::InvalidImage("unsupported image format".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    struct StubHost {
        name: String,
        result: Result<String, String>,
        calls: AtomicUsize,
    }

    impl StubHost {
        fn ok(name: &str, url: &str) -> Arc<Self> {
            Arc::new(Self { name: name.into(), result: Ok(url.into()), calls: AtomicUsize::new(0) })
        }

        fn failing(name: &str) -> Arc<Self> {
            Arc::new(Self { name: name.into(), result: Err("503".into()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl ImageHost for StubHost {
        fn name(&self) -> &str {
            &self.name
        }

        async fn upload(&self, _bytes: &[u8], _file_name: &str) -> Result<String, MediaError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone().map_err(|message| MediaError::UnexpectedResponse {
                host: self.name.clone(),
                message,
            })
        }
    }

    #[tokio::test]
    async fn test_falls_back_to_next_host() {
        let first = StubHost::failing("primary");
        let second = StubHost::ok("backup", "https://img.example/a.png");
        let third = StubHost::ok("unused", "https://other.example/a.png");
        let hosts: Vec<Arc<dyn ImageHost>> = vec![first.clone(), second, third.clone()];
        let uploader = ImageUploader::new(hosts);

        let url = uploader.upload(PNG, "a.png").await.unwrap();
        assert_eq!(url, "https://img.example/a.png");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_reports_every_failure() {
        let hosts: Vec<Arc<dyn ImageHost>> = vec![StubHost::failing("a"), StubHost::failing("b")];
        let uploader = ImageUploader::new(hosts);
        match uploader.upload(PNG, "a.png").await {
            Err(MediaError::AllHostsFailed(failures)) => assert_eq!(failures.len(), 2),
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_rejects_non_images_before_uploading() {
        let host = StubHost::ok("a", "https://img.example/x");
        let hosts: Vec<Arc<dyn ImageHost>> = vec![host.clone()];
        let uploader = ImageUploader::new(hosts);
        assert!(matches!(uploader.upload(b"%PDF-1.7", "x.pdf").await, Err(MediaError::InvalidImage(_))));
        assert_eq!(host.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(ImageUploader::default().upload(PNG, "a").await, Err(MediaError::NoHosts)));
    }

    #[test]
    fn test_parse_host_list() {
        let hosts = ImageHostConfig::parse_list(
            "imgbb|https://api.imgbb.com/1/upload|k1, freeimage|https://freeimage.host/api/1/upload|k2|/image/url, broken",
        );
        assert_eq!(hosts.len(), 2);
        assert_eq!(hosts[0].url_pointer, "/data/url");
        assert_eq!(hosts[1].name, "freeimage");
        assert_eq!(hosts[1].url_pointer, "/image/url");
    }

    #[test]
    fn test_extract_url_requires_http() {
        let body = json!({ "data": { "url": "https://i.example/x.png" }, "bad": "ftp://x" });
        assert_eq!(extract_url(&body, "/data/url").as_deref(), Some("https://i.example/x.png"));
        assert_eq!(extract_url(&body, "/bad"), None);
        assert_eq!(extract_url(&body, "/missing"), None);
    }
}
