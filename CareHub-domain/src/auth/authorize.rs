use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use futures::future::BoxFuture;
use serde_json::json;
use tracing::{debug, warn};

use crate::audit::{SecurityEvent, SecurityEventType};
use crate::auth::{AuthContext, Role, UserInfo};

/// Middleware for role-based access control
///
/// Runs after `auth_middleware`. A user holding none of `required_roles` gets
/// a 403 and an `ACCESS_DENIED` security event.
pub async fn require_roles(
    State(auth): State<AuthContext>,
    req: Request<Body>,
    next: Next,
    required_roles: Vec<Role>,
) -> Response {
    let request_path = req.uri().path().to_string();

    match req.extensions().get::<UserInfo>().cloned() {
        Some(user) if required_roles.contains(&user.role) => {
            debug!("User {} has required role for {}", user.user_id, request_path);
            next.run(req).await
        }
        Some(user) => {
            warn!(
                "User {} ({}) lacks required roles {:?} for {}",
                user.user_id, user.role, required_roles, request_path
            );

            let roles: Vec<&str> = required_roles.iter().map(Role::as_str).collect();
            auth.audit
                .log(
                    SecurityEvent::new(SecurityEventType::AccessDenied, Some(&user.user_id), false)
                        .with_resource(request_path)
                        .with_details(format!("requires one of: {}", roles.join(", "))),
                )
                .await;

            (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "forbidden",
                    "message": "You don't have the required permissions to access this resource",
                    "details": { "required_roles": roles }
                })),
            )
                .into_response()
        }
        None => {
            // auth_middleware must run first
            warn!("No user info found in request extensions for path: {}", request_path);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "internal_error",
                    "message": "Authentication context missing"
                })),
            )
                .into_response()
        }
    }
}

/// Middleware requiring any of the given roles
///
/// ```ignore
/// let admin_routes = Router::new()
///     .route("/users", get(list_users))
///     .layer(middleware::from_fn_with_state(auth.clone(), require_any_role(vec![Role::Admin])));
/// ```
pub fn require_any_role(
    roles: Vec<Role>,
) -> impl Fn(State<AuthContext>, Request<Body>, Next) -> BoxFuture<'static, Response> + Clone + Send + 'static {
    move |state, req, next| {
        let roles = roles.clone();
        Box::pin(async move { require_roles(state, req, next, roles).await })
    }
}

/// Middleware requiring a single role
pub fn require_role(
    role: Role,
) -> impl Fn(State<AuthContext>, Request<Body>, Next) -> BoxFuture<'static, Response> + Clone + Send + 'static {
    require_any_role(vec![role])
}
