//! Application configuration read from the environment.

use std::env;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, warn};

use care_hub_data::media::ImageHostConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required variable not set
    #[error("Environment variable not found: {0}")]
    Missing(String),

    /// Variable set to an unusable value
    #[error("Invalid value for {name}: {message}")]
    Invalid { name: String, message: String },
}

/// Backend used for the document store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// SQLite through the connection pool
    Sqlite,
    /// Process memory, lost on restart
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" | "in-memory" | "in_memory" => Ok(StoreBackend::Memory),
            other => Err(ConfigError::Invalid {
                name: "STORE_BACKEND".to_string(),
                message: format!("unknown backend '{}'", other),
            }),
        }
    }
}

/// Settings for the API server and its services
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Listening port
    pub port: u16,
    /// Document store backend
    pub store_backend: StoreBackend,
    /// Directory for local data files
    pub data_dir: String,
    /// HMAC secret for bearer tokens
    pub jwt_secret: String,
    /// Expected token issuer
    pub jwt_issuer: String,
    /// Video provider base URL, rooms are created below it
    pub telemedicine_base_url: String,
    /// Public base URL encoded in UMID QR codes
    pub umid_base_url: String,
    /// Image hosts in fallback order
    pub image_hosts: Vec<ImageHostConfig>,
    /// Allowed CORS origins, empty allows any
    pub cors_origins: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            store_backend: StoreBackend::Sqlite,
            data_dir: "./data".to_string(),
            jwt_secret: String::new(),
            jwt_issuer: "carehub-auth".to_string(),
            telemedicine_base_url: "https://meet.jit.si".to_string(),
            umid_base_url: "http://localhost:3000".to_string(),
            image_hosts: Vec::new(),
            cors_origins: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Read the configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let jwt_secret = env::var("JWT_SECRET").map_err(|_| ConfigError::Missing("JWT_SECRET".to_string()))?;
        if jwt_secret.len() < 16 {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET".to_string(),
                message: "must be at least 16 characters".to_string(),
            });
        }

        let port = match env::var("PORT") {
            Ok(value) => value.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT".to_string(),
                message: e.to_string(),
            })?,
            Err(_) => defaults.port,
        };

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.store_backend,
        };

        let image_hosts = env::var("IMAGE_HOSTS")
            .map(|value| ImageHostConfig::parse_list(&value))
            .unwrap_or_default();
        if image_hosts.is_empty() {
            warn!("No image hosts configured, uploads will be rejected");
        }

        let cors_origins = env::var("CORS_ORIGINS")
            .map(|value| {
                value
                    .split(',')
                    .map(|origin| origin.trim().to_string())
                    .filter(|origin| !origin.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Self {
            port,
            store_backend,
            data_dir: env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            jwt_secret,
            jwt_issuer: env::var("JWT_ISSUER").unwrap_or(defaults.jwt_issuer),
            telemedicine_base_url: trim_base(env::var("TELEMEDICINE_BASE_URL").unwrap_or(defaults.telemedicine_base_url)),
            umid_base_url: trim_base(env::var("UMID_BASE_URL").unwrap_or(defaults.umid_base_url)),
            image_hosts,
            cors_origins,
        };

        debug!(
            "Loaded configuration: port={}, store={:?}, image_hosts={}",
            config.port,
            config.store_backend,
            config.image_hosts.len()
        );
        Ok(config)
    }
}

fn trim_base(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_backend_parsing() {
        assert_eq!("SQLite".parse::<StoreBackend>().unwrap(), StoreBackend::Sqlite);
        assert_eq!("memory".parse::<StoreBackend>().unwrap(), StoreBackend::Memory);
        assert!("postgres".parse::<StoreBackend>().is_err());
    }

    #[test]
    fn test_trim_base() {
        assert_eq!(trim_base("https://meet.example/".to_string()), "https://meet.example");
    }
}
