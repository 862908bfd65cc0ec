use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use care_hub_data::models::billing::{Bill, BillStatus, InsuranceClaim};
use care_hub_data::repository::BillPage;
use care_hub_domain::auth::UserInfo;
use care_hub_domain::services::billing::{
    BillingSummary, CreateBillRequest, PaymentRequest, SubmitClaimRequest, UpdateClaimRequest,
};

use crate::api::error::{ApiResult, ErrorResponse};
use crate::api::extract::ApiJson;
use crate::api::state::AppState;
use crate::entities::common::PageParams;

/// Bill list filter
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct BillQueryParams {
    /// Only bills in this status
    pub status: Option<BillStatus>,
}

/// Issue a bill
#[utoipa::path(
    post,
    path = "/api/v1/bills",
    request_body = CreateBillRequest,
    responses(
        (status = 201, description = "Bill issued", body = Bill),
        (status = 400, description = "Invalid line items", body = ErrorResponse),
        (status = 403, description = "Patients cannot issue bills", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn create_bill(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<CreateBillRequest>,
) -> ApiResult<impl IntoResponse> {
    let bill = state.services.billing.create_bill(&user, request).await?;
    info!("Issued bill {} for {}", bill.id, bill.patient_id);
    Ok((StatusCode::CREATED, Json(bill)))
}

#[utoipa::path(
    get,
    path = "/api/v1/bills/{id}",
    params(("id" = String, Path, description = "Bill ID")),
    responses(
        (status = 200, description = "Bill found", body = Bill),
        (status = 403, description = "Not allowed", body = ErrorResponse),
        (status = 404, description = "Bill not found", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn get_bill(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Bill>> {
    Ok(Json(state.services.billing.get_bill(&user, &id).await?))
}

/// Record a payment against a bill
#[utoipa::path(
    post,
    path = "/api/v1/bills/{id}/payments",
    params(("id" = String, Path, description = "Bill ID")),
    request_body = PaymentRequest,
    responses(
        (status = 200, description = "Payment applied", body = Bill),
        (status = 400, description = "Amount not positive or above the outstanding balance", body = ErrorResponse),
        (status = 409, description = "Bill already settled", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn record_payment(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<PaymentRequest>,
) -> ApiResult<Json<Bill>> {
    let bill = state.services.billing.record_payment(&user, &id, request.amount_cents).await?;
    info!("Bill {} is now {}", bill.id, bill.status.as_str());
    Ok(Json(bill))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/bills",
    params(("id" = String, Path, description = "Patient ID"), BillQueryParams, PageParams),
    responses(
        (status = 200, description = "One page of bills", body = BillPage),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn patient_bills(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    Query(params): Query<BillQueryParams>,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<BillPage>> {
    let page = state
        .services
        .billing
        .list_bills(&user, &id, params.status, &page.into())
        .await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/billing-summary",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Billing totals", body = BillingSummary),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn billing_summary(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<BillingSummary>> {
    Ok(Json(state.services.billing.summary(&user, &id).await?))
}

/// Submit an insurance claim for a bill
#[utoipa::path(
    post,
    path = "/api/v1/claims",
    request_body = SubmitClaimRequest,
    responses(
        (status = 201, description = "Claim submitted", body = InsuranceClaim),
        (status = 400, description = "Claim exceeds the outstanding balance", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id))]
pub async fn submit_claim(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    ApiJson(request): ApiJson<SubmitClaimRequest>,
) -> ApiResult<impl IntoResponse> {
    let claim = state.services.billing.submit_claim(&user, request).await?;
    info!("Submitted claim {} for bill {}", claim.id, claim.bill_id);
    Ok((StatusCode::CREATED, Json(claim)))
}

/// Record the insurer's decision on a claim
#[utoipa::path(
    put,
    path = "/api/v1/claims/{id}/status",
    params(("id" = String, Path, description = "Claim ID")),
    request_body = UpdateClaimRequest,
    responses(
        (status = 200, description = "Claim updated", body = InsuranceClaim),
        (status = 403, description = "Admins only", body = ErrorResponse),
        (status = 409, description = "Transition not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, id = %id))]
pub async fn update_claim_status(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<UpdateClaimRequest>,
) -> ApiResult<Json<InsuranceClaim>> {
    Ok(Json(state.services.billing.update_claim_status(&user, &id, request).await?))
}

#[utoipa::path(
    get,
    path = "/api/v1/patients/{id}/claims",
    params(("id" = String, Path, description = "Patient ID")),
    responses(
        (status = 200, description = "Claims, newest first", body = [InsuranceClaim]),
        (status = 403, description = "Not allowed", body = ErrorResponse)
    ),
    security(("bearer" = [])),
    tag = "billing"
)]
#[instrument(skip_all, fields(user_id = %user.user_id, patient_id = %id))]
pub async fn patient_claims(
    State(state): State<AppState>,
    Extension(user): Extension<UserInfo>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<InsuranceClaim>>> {
    Ok(Json(state.services.billing.list_claims(&user, &id).await?))
}
