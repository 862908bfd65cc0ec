use std::sync::Arc;

use axum::extract::FromRef;

use care_hub_domain::auth::{AuthContext, TokenValidator};
use care_hub_domain::services::Services;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub auth: AuthContext,
    /// Browser origins allowed by CORS; empty allows any
    pub cors_origins: Vec<String>,
}

impl AppState {
    /// Wire the services to a token validator; denied requests are audited
    /// through the services' logger
    pub fn new(services: Services, validator: Arc<TokenValidator>) -> Self {
        let auth = AuthContext::new(validator, services.audit.clone());
        Self {
            services,
            auth,
            cors_origins: Vec::new(),
        }
    }

    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }
}

impl FromRef<AppState> for AuthContext {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}
