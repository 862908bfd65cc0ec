use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::security_event::SecurityEventRecord;
use care_hub_data::models::user::Role;
use care_hub_data::repository::UserPage;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::ServiceError;

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::state::AppState;
use crate::entities::common::PageParams;

pub const DEFAULT_AUDIT_LIMIT: usize = 100;

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct UserQueryParams {
    /// Only accounts with this role
    pub role: Option<Role>,
}

#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct AuditQueryParams {
    /// Only events by this user
    pub user_id: Option<String>,
    /// Maximum number of events (default: 100, max: 500)
    pub limit: Option<usize>,
}

/// Outcome of the overdue sweep
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OverdueResponse {
    /// Bills moved to overdue
    pub marked: usize,
}

#[utoipa::path(
    get,
    path = "/api/v1/admin/users",
    params(UserQueryParams, PageParams),
    responses(
        (status = 200, description = "One page of accounts", body = UserPage),
        (status = 403, description = "Admins only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Query(params): Query<UserQueryParams>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<UserPage>> {
    Ok(Json(state.services.profiles.list_users(&user, params.role, &page.into()).await?))
}

/// Recent security events, newest first
#[utoipa::path(
    get,
    path = "/api/v1/admin/audit",
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Security events", body = [SecurityEventRecord]),
        (status = 403, description = "Admins only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn audit_events(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Query(params): Query<AuditQueryParams>,
) -> ApiResult<Json<Vec<SecurityEventRecord>>> {
    let events = state
        .services
        .audit
        .recent_events(params.user_id.as_deref(), params.limit.unwrap_or(DEFAULT_AUDIT_LIMIT))
        .await
        .map_err(ServiceError::from)?;
    Ok(Json(events))
}

/// Move unpaid bills past their due date to overdue
#[utoipa::path(
    post,
    path = "/api/v1/admin/bills/overdue",
    responses(
        (status = 200, description = "Sweep finished", body = OverdueResponse),
        (status = 403, description = "Admins only", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "admin"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn mark_overdue_bills(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
) -> ApiResult<Json<OverdueResponse>> {
    let marked = state.services.billing.mark_overdue(&user, Utc::now()).await?;
    info!("Marked {} bills overdue", marked);
    Ok(Json(OverdueResponse { marked }))
}
