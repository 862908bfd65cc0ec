//! Bills, payments and insurance claims.
//!
//! Amounts are integer cents. A bill's paid amount never exceeds its total:
//! payments and claim payouts are checked against the outstanding balance
//! before anything is written.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

#[cfg(feature = "with-api")]
use utoipa::ToSchema;

use care_hub_data::models::billing::{Bill, BillStatus, ClaimStatus, InsuranceClaim, LineItem};
use care_hub_data::store::{timestamp_value, Direction, DocumentStore, FilterOp, Query, WriteOp};
use care_hub_data::{Collection, Entity, Page, PageRequest, RepositoryError};

use crate::audit::{AuditLogger, SecurityEvent, SecurityEventType};
use crate::auth::UserInfo;
use crate::services::errors::{forbidden, ServiceError, ServiceResult};

/// Read-modify-write cycles retried before a bill update gives up
const MAX_WRITE_ATTEMPTS: usize = 5;

/// Request to issue a bill
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct CreateBillRequest {
    /// Billed patient
    #[validate(length(min = 1, message = "is required"))]
    pub patient_id: String,
    /// Appointment being billed
    #[serde(default)]
    pub appointment_id: Option<String>,
    /// Summary shown to the patient
    #[validate(length(min = 1, max = 200))]
    pub description: String,
    /// Charges
    #[validate(length(min = 1, message = "at least one line item is required"))]
    pub line_items: Vec<LineItem>,
    /// Payment due date
    pub due_date: DateTime<Utc>,
}

/// Request to record a payment
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct PaymentRequest {
    /// Amount paid in cents
    pub amount_cents: i64,
}

/// Request to submit an insurance claim for a bill
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct SubmitClaimRequest {
    /// Bill covered by the claim
    #[validate(length(min = 1, message = "is required"))]
    pub bill_id: String,
    /// Insurance provider
    #[validate(length(min = 1, max = 100))]
    pub provider: String,
    /// Policy number
    #[validate(length(min = 1, max = 64))]
    pub policy_number: String,
    /// Amount claimed in cents
    pub claimed_cents: i64,
    /// Notes for the insurer
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

/// Request to move a claim to a new status
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct UpdateClaimRequest {
    /// Target status
    pub status: ClaimStatus,
    /// Approved amount, required when approving
    #[serde(default)]
    pub approved_cents: Option<i64>,
    /// Insurer notes
    #[serde(default)]
    pub notes: Option<String>,
}

/// Billing totals of one patient
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(ToSchema))]
pub struct BillingSummary {
    pub total_billed_cents: i64,
    pub total_paid_cents: i64,
    pub outstanding_cents: i64,
    pub overdue_count: usize,
    pub open_claims: usize,
}

/// Billing service
#[derive(Clone)]
pub struct BillingService {
    bills: Collection<Bill>,
    claims: Collection<InsuranceClaim>,
    audit: AuditLogger,
}

impl BillingService {
    pub fn new(store: Arc<dyn DocumentStore>, audit: AuditLogger) -> Self {
        Self {
            bills: Collection::new(store.clone()),
            claims: Collection::new(store),
            audit,
        }
    }

    /// Issue a bill; doctors and admins only
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn create_bill(&self, user: &UserInfo, request: CreateBillRequest) -> ServiceResult<Bill> {
        if user.is_patient() {
            return Err(forbidden("issue bills"));
        }
        request.validate()?;

        for item in &request.line_items {
            if item.description.trim().is_empty() || item.quantity == 0 || item.unit_price_cents < 0 {
                return Err(ServiceError::Validation(format!("invalid line item '{}'", item.description)));
            }
        }
        let total_cents = request
            .line_items
            .iter()
            .try_fold(0i64, |total, item: &LineItem| item.total_cents().and_then(|cents| total.checked_add(cents)))
            .ok_or_else(|| ServiceError::Validation("bill total is too large".to_string()))?;
        if total_cents <= 0 {
            return Err(ServiceError::Validation("bill total must be positive".to_string()));
        }

        let now = Utc::now();
        let bill = self
            .bills
            .create(Bill {
                id: String::new(),
                patient_id: request.patient_id,
                appointment_id: request.appointment_id,
                description: request.description,
                line_items: request.line_items,
                total_cents,
                paid_cents: 0,
                status: BillStatus::Pending,
                due_date: request.due_date,
                history: vec![format!("{} issued for {}", now.to_rfc3339(), format_cents(total_cents))],
                created_at: now,
                updated_at: now,
            })
            .await?;

        info!("Issued bill {} of {} cents", bill.id, bill.total_cents);
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::BillCreated, &user.user_id)
                    .with_resource(bill_resource(&bill.id)),
            )
            .await;
        Ok(bill)
    }

    /// Fetch one bill
    pub async fn get_bill(&self, user: &UserInfo, id: &str) -> ServiceResult<Bill> {
        let bill = self.bills.require(id).await?;
        if !user.can_access_patient(&bill.patient_id) {
            return Err(forbidden("view this bill"));
        }
        Ok(bill)
    }

    async fn versioned_bill(&self, user: &UserInfo, id: &str) -> ServiceResult<(Bill, DateTime<Utc>)> {
        let (bill, version) = self.bills.require_versioned(id).await?;
        if !user.can_access_patient(&bill.patient_id) {
            return Err(forbidden("view this bill"));
        }
        Ok((bill, version))
    }

    /// A patient's bills, newest first
    pub async fn list_bills(
        &self,
        user: &UserInfo,
        patient_id: &str,
        status: Option<BillStatus>,
        page: &PageRequest,
    ) -> ServiceResult<Page<Bill>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these bills"));
        }
        let mut query = Query::new().where_eq("patient_id", patient_id);
        if let Some(status) = status {
            query = query.where_eq("status", status.as_str());
        }
        Ok(self.bills.page(query.order_by("created_at", Direction::Desc), page).await?)
    }

    /// Record a payment against a bill
    ///
    /// The balance check and the write apply to the same stored version of
    /// the bill; a concurrent change restarts the cycle.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn record_payment(&self, user: &UserInfo, bill_id: &str, amount_cents: i64) -> ServiceResult<Bill> {
        if amount_cents <= 0 {
            return Err(ServiceError::Validation("payment amount must be positive".to_string()));
        }

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (bill, version) = self.versioned_bill(user, bill_id).await?;
            ensure_payable(&bill)?;
            if amount_cents > bill.outstanding_cents() {
                return Err(ServiceError::Validation(format!(
                    "payment of {} exceeds outstanding balance of {}",
                    format_cents(amount_cents),
                    format_cents(bill.outstanding_cents())
                )));
            }

            let updated = with_payment(&bill, amount_cents, "payment received", Utc::now());
            match self.bills.store().batch(vec![payment_write(&updated, version)]).await {
                Ok(()) => {
                    info!("Recorded payment of {} cents on bill {}", amount_cents, bill_id);
                    self.audit
                        .log(
                            SecurityEvent::success(SecurityEventType::PaymentRecorded, &user.user_id)
                                .with_resource(bill_resource(bill_id))
                                .with_details(format!("amount {}", format_cents(amount_cents))),
                        )
                        .await;
                    return Ok(updated);
                }
                Err(RepositoryError::Conflict(_)) => {
                    debug!("Bill {} changed during payment, attempt {}", bill_id, attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict(format!(
            "bill {} is being updated concurrently, try again",
            bill_id
        )))
    }

    /// Flag unpaid bills past their due date; returns how many changed
    pub async fn mark_overdue(&self, user: &UserInfo, now: DateTime<Utc>) -> ServiceResult<usize> {
        if !user.is_admin() {
            return Err(forbidden("mark bills overdue"));
        }

        let query = Query::new()
            .where_in(
                "status",
                vec![BillStatus::Pending.as_str().into(), BillStatus::PartiallyPaid.as_str().into()],
            )
            .where_date("due_date", FilterOp::Lt, now);

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let due = self.bills.find_versioned(query.clone()).await?;
            if due.is_empty() {
                return Ok(0);
            }

            let writes = due
                .iter()
                .map(|(bill, version)| {
                    let mut history = bill.history.clone();
                    history.push(format!("{} marked overdue", now.to_rfc3339()));
                    WriteOp::UpdateIfUnchanged {
                        collection: Bill::COLLECTION.to_string(),
                        id: bill.id.clone(),
                        patch: json!({
                            "status": BillStatus::Overdue,
                            "history": history,
                            "updated_at": timestamp_value(now),
                        }),
                        update_time: *version,
                    }
                })
                .collect();

            match self.bills.store().batch(writes).await {
                Ok(()) => {
                    warn!("Marked {} bills overdue", due.len());
                    return Ok(due.len());
                }
                Err(RepositoryError::Conflict(_)) => {
                    debug!("Bills changed while marking overdue, attempt {}", attempt);
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ServiceError::Conflict("bills are being updated concurrently, try again".to_string()))
    }

    /// Submit an insurance claim; the claim and the bill note are written together
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn submit_claim(&self, user: &UserInfo, request: SubmitClaimRequest) -> ServiceResult<InsuranceClaim> {
        request.validate()?;

        let (bill, version) = self.versioned_bill(user, &request.bill_id).await?;
        ensure_payable(&bill)?;
        if request.claimed_cents <= 0 || request.claimed_cents > bill.outstanding_cents() {
            return Err(ServiceError::Validation(format!(
                "claimed amount must be between 1 and {} cents",
                bill.outstanding_cents()
            )));
        }

        let now = Utc::now();
        let claim = InsuranceClaim {
            id: Uuid::new_v4().to_string(),
            bill_id: bill.id.clone(),
            patient_id: bill.patient_id.clone(),
            provider: request.provider,
            policy_number: request.policy_number,
            claimed_cents: request.claimed_cents,
            approved_cents: None,
            status: ClaimStatus::Submitted,
            submitted_at: now,
            resolved_at: None,
            notes: request.notes,
        };

        let mut history = bill.history.clone();
        history.push(format!(
            "{} claim {} submitted to {} for {}",
            now.to_rfc3339(),
            claim.id,
            claim.provider,
            format_cents(claim.claimed_cents)
        ));

        self.bills
            .store()
            .batch(vec![
                WriteOp::Set {
                    collection: InsuranceClaim::COLLECTION.to_string(),
                    id: claim.id.clone(),
                    data: Collection::<InsuranceClaim>::encode(&claim)?,
                },
                WriteOp::UpdateIfUnchanged {
                    collection: Bill::COLLECTION.to_string(),
                    id: bill.id.clone(),
                    patch: json!({ "history": history, "updated_at": timestamp_value(now) }),
                    update_time: version,
                },
            ])
            .await?;

        info!("Submitted claim {} for bill {}", claim.id, bill.id);
        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::ClaimSubmitted, &user.user_id)
                    .with_resource(claim_resource(&claim.id)),
            )
            .await;
        Ok(claim)
    }

    /// Move a claim through review; admins only
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn update_claim_status(
        &self,
        user: &UserInfo,
        claim_id: &str,
        request: UpdateClaimRequest,
    ) -> ServiceResult<InsuranceClaim> {
        if !user.is_admin() {
            return Err(forbidden("update insurance claims"));
        }

        let (mut claim, claim_version) = self.claims.require_versioned(claim_id).await?;
        if !claim.status.can_transition_to(request.status) {
            return Err(ServiceError::Conflict(format!(
                "cannot change claim from {} to {}",
                claim.status.as_str(),
                request.status.as_str()
            )));
        }

        let now = Utc::now();
        let mut writes = Vec::new();
        match request.status {
            ClaimStatus::Approved => {
                let approved = request
                    .approved_cents
                    .ok_or_else(|| ServiceError::Validation("approved_cents is required".to_string()))?;
                if approved < 0 || approved > claim.claimed_cents {
                    return Err(ServiceError::Validation(format!(
                        "approved amount must be between 0 and {} cents",
                        claim.claimed_cents
                    )));
                }
                claim.approved_cents = Some(approved);
                claim.resolved_at = Some(now);
            }
            ClaimStatus::Denied => {
                claim.resolved_at = Some(now);
            }
            ClaimStatus::Paid => {
                let (bill, bill_version) = self.bills.require_versioned(&claim.bill_id).await?;
                // The bill may have been paid down since approval
                let payout = claim.approved_cents.unwrap_or(0).min(bill.outstanding_cents());
                if payout > 0 {
                    let paid = with_payment(&bill, payout, &format!("insurance payout from {}", claim.provider), now);
                    writes.push(payment_write(&paid, bill_version));
                }
            }
            ClaimStatus::Submitted | ClaimStatus::InReview => {}
        }
        claim.status = request.status;
        if request.notes.is_some() {
            claim.notes = request.notes;
        }

        // Conditional on the claim too, so a payout cannot be applied twice
        writes.push(WriteOp::UpdateIfUnchanged {
            collection: InsuranceClaim::COLLECTION.to_string(),
            id: claim.id.clone(),
            patch: Collection::<InsuranceClaim>::encode(&claim)?,
            update_time: claim_version,
        });
        self.claims.store().batch(writes).await?;

        self.audit
            .log(
                SecurityEvent::success(SecurityEventType::ClaimUpdated, &user.user_id)
                    .with_resource(claim_resource(&claim.id))
                    .with_details(format!("status -> {}", claim.status.as_str())),
            )
            .await;
        Ok(claim)
    }

    /// A patient's claims, newest first
    pub async fn list_claims(&self, user: &UserInfo, patient_id: &str) -> ServiceResult<Vec<InsuranceClaim>> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view these claims"));
        }
        let query = Query::new()
            .where_eq("patient_id", patient_id)
            .order_by("submitted_at", Direction::Desc);
        Ok(self.claims.find(query).await?)
    }

    /// Totals across a patient's bills and claims
    pub async fn summary(&self, user: &UserInfo, patient_id: &str) -> ServiceResult<BillingSummary> {
        if !user.can_access_patient(patient_id) {
            return Err(forbidden("view this billing summary"));
        }

        let bills = self
            .bills
            .find(
                Query::new()
                    .where_eq("patient_id", patient_id)
                    .where_op("status", FilterOp::NotEq, BillStatus::Cancelled.as_str()),
            )
            .await?;
        let claims = self
            .claims
            .find(Query::new().where_eq("patient_id", patient_id).where_in(
                "status",
                vec![
                    ClaimStatus::Submitted.as_str().into(),
                    ClaimStatus::InReview.as_str().into(),
                    ClaimStatus::Approved.as_str().into(),
                ],
            ))
            .await?;

        Ok(bills.iter().fold(
            BillingSummary {
                open_claims: claims.len(),
                ..Default::default()
            },
            |mut summary, bill| {
                summary.total_billed_cents += bill.total_cents;
                summary.total_paid_cents += bill.paid_cents;
                summary.outstanding_cents += bill.outstanding_cents();
                if bill.status == BillStatus::Overdue {
                    summary.overdue_count += 1;
                }
                summary
            },
        ))
    }
}

fn ensure_payable(bill: &Bill) -> ServiceResult<()> {
    match bill.status {
        BillStatus::Paid | BillStatus::Cancelled => Err(ServiceError::Conflict(format!(
            "bill {} is {}",
            bill.id,
            bill.status.as_str()
        ))),
        _ => Ok(()),
    }
}

/// The bill after applying `amount_cents`; the caller checks the balance
fn with_payment(bill: &Bill, amount_cents: i64, note: &str, now: DateTime<Utc>) -> Bill {
    let mut paid = bill.clone();
    paid.paid_cents = bill.paid_cents.saturating_add(amount_cents).min(bill.total_cents);

    // Overdue bills stay overdue until settled
    paid.status = match paid.payment_status() {
        BillStatus::Paid => BillStatus::Paid,
        _ if bill.status == BillStatus::Overdue => BillStatus::Overdue,
        other => other,
    };
    paid.history
        .push(format!("{} {} of {}", now.to_rfc3339(), note, format_cents(amount_cents)));
    paid.updated_at = now;
    paid
}

/// Write of a paid bill, rejected if the stored bill moved past `version`
fn payment_write(paid: &Bill, version: DateTime<Utc>) -> WriteOp {
    WriteOp::UpdateIfUnchanged {
        collection: Bill::COLLECTION.to_string(),
        id: paid.id.clone(),
        patch: json!({
            "paid_cents": paid.paid_cents,
            "status": paid.status,
            "history": paid.history,
            "updated_at": timestamp_value(paid.updated_at),
        }),
        update_time: version,
    }
}

fn format_cents(cents: i64) -> String {
    format!("{}{}.{:02}", if cents < 0 { "-" } else { "" }, cents.abs() / 100, cents.abs() % 100)
}

fn bill_resource(id: &str) -> String {
    format!("{}/{}", Bill::COLLECTION, id)
}

fn claim_resource(id: &str) -> String {
    format!("{}/{}", InsuranceClaim::COLLECTION, id)
}
