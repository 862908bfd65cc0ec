use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::{Claims, Role};

/// Security errors for token operations
#[derive(Debug, Error)]
pub enum SecurityError {
    /// JWT validation error
    #[error("Token validation error: {0}")]
    TokenValidation(String),

    /// Expired token
    #[error("Token has expired")]
    TokenExpired,

    /// Token not yet valid
    #[error("Token is not yet valid")]
    TokenNotYetValid,

    /// Invalid issuer
    #[error("Invalid token issuer")]
    InvalidIssuer,

    /// Configuration error
    #[error("Security configuration error: {0}")]
    ConfigError(String),
}

/// Validates HS256 bearer tokens minted by the auth provider
pub struct TokenValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
}

impl std::fmt::Debug for TokenValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenValidator").field("issuer", &self.issuer).finish()
    }
}

impl TokenValidator {
    /// Create a validator for a shared secret and issuer
    pub fn new(secret: &str, issuer: &str) -> Result<Self, SecurityError> {
        if secret.is_empty() {
            return Err(SecurityError::ConfigError("JWT secret is empty".to_string()));
        }
        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.to_string(),
        })
    }

    /// Expected issuer
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Validate a token and return its claims
    pub fn validate(&self, token: &str) -> Result<Claims, SecurityError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => SecurityError::TokenExpired,
            ErrorKind::ImmatureSignature => SecurityError::TokenNotYetValid,
            ErrorKind::InvalidIssuer => SecurityError::InvalidIssuer,
            _ => SecurityError::TokenValidation(e.to_string()),
        })?;

        debug!("Validated token for user {}", data.claims.sub);
        Ok(data.claims)
    }

    /// Mint a token; used by trusted tooling and tests, end users sign in
    /// through the auth provider
    pub fn issue(
        &self,
        user_id: &str,
        role: Role,
        email: Option<&str>,
        ttl: Duration,
    ) -> Result<String, SecurityError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            email: email.map(String::from),
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key).map_err(|e| {
            error!("Failed to encode JWT token: {}", e);
            SecurityError::TokenValidation(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-with-enough-length";

    #[test]
    fn test_issue_and_validate() {
        let validator = TokenValidator::new(SECRET, "carehub-auth").unwrap();
        let token = validator
            .issue("doc-1", Role::Doctor, Some("doc@example.com"), Duration::minutes(5))
            .unwrap();

        let claims = validator.validate(&token).unwrap();
        assert_eq!(claims.sub, "doc-1");
        assert_eq!(claims.role, Role::Doctor);
        assert_eq!(claims.email.as_deref(), Some("doc@example.com"));
    }

    #[test]
    fn test_rejects_expired_and_foreign_tokens() {
        let validator = TokenValidator::new(SECRET, "carehub-auth").unwrap();
        let expired = validator
            .issue("p1", Role::Patient, None, Duration::minutes(-10))
            .unwrap();
        assert!(matches!(validator.validate(&expired), Err(SecurityError::TokenExpired)));

        let other_issuer = TokenValidator::new(SECRET, "someone-else").unwrap();
        let token = other_issuer.issue("p1", Role::Patient, None, Duration::minutes(5)).unwrap();
        assert!(matches!(validator.validate(&token), Err(SecurityError::InvalidIssuer)));

        let other_secret = TokenValidator::new("a-different-secret-value", "carehub-auth").unwrap();
        let token = other_secret.issue("p1", Role::Patient, None, Duration::minutes(5)).unwrap();
        assert!(matches!(validator.validate(&token), Err(SecurityError::TokenValidation(_))));

        assert!(validator.validate("not-a-token").is_err());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert!(matches!(TokenValidator::new("", "x"), Err(SecurityError::ConfigError(_))));
    }
}
