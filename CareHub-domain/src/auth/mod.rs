//! Authentication module for CareHub API
//!
//! Identity comes from bearer tokens issued by the managed auth provider. The
//! middleware validates the token and places a `UserInfo` in the request
//! extensions for handlers and the role checks in `authorize`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[cfg(feature = "with-axum")]
use axum::{
    body::Body,
    extract::State,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
#[cfg(feature = "with-axum")]
use tracing::{debug, warn};

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use crate::audit::AuditLogger;

pub use care_hub_data::models::user::Role;

// Token validation and issuing
pub mod token;

// Role-based access control
#[cfg(feature = "with-axum")]
pub mod authorize;

pub use token::{SecurityError, TokenValidator};

/// Claims carried by bearer tokens
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Account role
    pub role: Role,
    /// Email, when the provider shares it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Issuer
    pub iss: String,
    /// Issued at (as timestamp)
    pub iat: i64,
    /// Expiration timestamp
    pub exp: i64,
}

/// User information extracted from authenticated requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct UserInfo {
    /// User ID
    pub user_id: String,
    /// Account role
    pub role: Role,
    /// Email, if known
    pub email: Option<String>,
}

impl UserInfo {
    /// Build a user from validated claims
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            role: claims.role,
            email: claims.email.clone(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_doctor(&self) -> bool {
        self.role == Role::Doctor
    }

    pub fn is_patient(&self) -> bool {
        self.role == Role::Patient
    }

    /// Patients reach only their own records; doctors and admins reach any
    pub fn can_access_patient(&self, patient_id: &str) -> bool {
        match self.role {
            Role::Patient => self.user_id == patient_id,
            Role::Doctor | Role::Admin => true,
        }
    }

    /// Acting on the user's own account, or an admin acting on any
    pub fn is_self_or_admin(&self, user_id: &str) -> bool {
        self.user_id == user_id || self.is_admin()
    }
}

/// State shared by the auth middleware layers
#[derive(Clone)]
pub struct AuthContext {
    /// Token validator
    pub validator: Arc<TokenValidator>,
    /// Audit logger for denied requests
    pub audit: AuditLogger,
}

impl AuthContext {
    pub fn new(validator: Arc<TokenValidator>, audit: AuditLogger) -> Self {
        Self { validator, audit }
    }
}

#[cfg(feature = "with-axum")]
fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "unauthorized",
            "message": message
        })),
    )
        .into_response()
}

/// Authentication middleware for protected routes
#[cfg(feature = "with-axum")]
pub async fn auth_middleware(
    State(auth): State<AuthContext>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let request_path = req.uri().path().to_string();

    let auth_header = match req.headers().get(header::AUTHORIZATION).map(|value| value.to_str()) {
        Some(Ok(value)) => value,
        Some(Err(_)) => {
            warn!("Invalid Authorization header format on {}", request_path);
            return unauthorized("Invalid Authorization header");
        }
        None => {
            debug!("Missing Authorization header on {}", request_path);
            return unauthorized("Missing bearer token");
        }
    };

    let token = match auth_header.strip_prefix("Bearer ") {
        Some(token) => token.trim(),
        None => {
            warn!("Authorization header does not contain Bearer token");
            return unauthorized("Missing bearer token");
        }
    };

    match auth.validator.validate(token) {
        Ok(claims) => {
            debug!("Authenticated {} ({}) for {}", claims.sub, claims.role, request_path);
            req.extensions_mut().insert(UserInfo::from_claims(&claims));
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(SecurityError::TokenExpired) => {
            warn!("Expired token on {}", request_path);
            unauthorized("Token has expired")
        }
        Err(e) => {
            warn!("Token rejected on {}: {}", request_path, e);
            unauthorized("Invalid token")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str, role: Role) -> UserInfo {
        UserInfo {
            user_id: id.to_string(),
            role,
            email: None,
        }
    }

    #[test]
    fn test_patient_access_is_limited_to_self() {
        let patient = user("p1", Role::Patient);
        assert!(patient.can_access_patient("p1"));
        assert!(!patient.can_access_patient("p2"));

        assert!(user("d1", Role::Doctor).can_access_patient("p2"));
        assert!(user("a1", Role::Admin).can_access_patient("p2"));
    }

    #[test]
    fn test_self_or_admin() {
        assert!(user("p1", Role::Patient).is_self_or_admin("p1"));
        assert!(!user("d1", Role::Doctor).is_self_or_admin("p1"));
        assert!(user("a1", Role::Admin).is_self_or_admin("p1"));
    }
}
