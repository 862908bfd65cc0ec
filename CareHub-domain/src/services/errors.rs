use thiserror::Error;
use validator::ValidationErrors;

use care_hub_data::RepositoryError;

/// Errors returned by every service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Input rejected
    #[error("Validation error: {0}")]
    Validation(String),

    /// Record does not exist or is not visible
    #[error("Not found: {0}")]
    NotFound(String),

    /// Caller may not perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Operation conflicts with the current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("Repository error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => ServiceError::NotFound(msg),
            RepositoryError::Validation(msg) => ServiceError::Validation(msg),
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Repository(other),
        }
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        let mut messages: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |err| match (&err.message, *field) {
                    (Some(msg), "__all__") => msg.to_string(),
                    (Some(msg), field) => format!("{}: {}", field, msg),
                    // Struct-level checks report under `__all__` with only a code
                    (None, "__all__") => err.code.replace('_', " "),
                    (None, field) => format!("Invalid {}", field),
                })
            })
            .collect();
        messages.sort();
        ServiceError::Validation(messages.join("; "))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Repository(RepositoryError::Serialization(err))
    }
}

/// Result alias used by the services
pub type ServiceResult<T> = Result<T, ServiceError>;

pub(crate) fn forbidden(what: &str) -> ServiceError {
    ServiceError::Forbidden(format!("not allowed to {}", what))
}
