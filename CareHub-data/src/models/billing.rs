use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::repository::Entity;
use crate::store::timestamp::{as_timestamp, as_timestamp_opt};

/// Payment state of a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum BillStatus {
    /// Nothing paid yet
    Pending,
    /// Some amount paid
    PartiallyPaid,
    /// Fully settled
    Paid,
    /// Past due and not settled
    Overdue,
    /// Voided
    Cancelled,
}

impl BillStatus {
    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            BillStatus::Pending => "pending",
            BillStatus::PartiallyPaid => "partially_paid",
            BillStatus::Paid => "paid",
            BillStatus::Overdue => "overdue",
            BillStatus::Cancelled => "cancelled",
        }
    }
}

/// One billed service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct LineItem {
    /// Service description
    pub description: String,
    /// Units billed
    pub quantity: u32,
    /// Price per unit in cents
    pub unit_price_cents: i64,
}

impl LineItem {
    /// Quantity times unit price; `None` when it does not fit in an `i64`
    pub fn total_cents(&self) -> Option<i64> {
        i64::from(self.quantity).checked_mul(self.unit_price_cents)
    }
}

/// A patient bill; amounts are in cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Bill {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Patient user id
    pub patient_id: String,
    /// Related appointment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub appointment_id: Option<String>,
    /// Summary shown on statements
    pub description: String,
    /// Billed services
    pub line_items: Vec<LineItem>,
    /// Sum of the line items
    pub total_cents: i64,
    /// Amount paid so far, never above the total
    pub paid_cents: i64,
    /// Payment state
    pub status: BillStatus,
    /// Payment due date
    #[serde(with = "as_timestamp")]
    pub due_date: DateTime<Utc>,
    /// Payment and claim history
    #[serde(default)]
    pub history: Vec<String>,
    /// Creation time
    #[serde(with = "as_timestamp")]
    pub created_at: DateTime<Utc>,
    /// Last update time
    #[serde(with = "as_timestamp")]
    pub updated_at: DateTime<Utc>,
}

impl Bill {
    /// Amount still owed
    pub fn outstanding_cents(&self) -> i64 {
        (self.total_cents - self.paid_cents).max(0)
    }

    /// Status implied by the paid amount
    pub fn payment_status(&self) -> BillStatus {
        if self.paid_cents >= self.total_cents {
            BillStatus::Paid
        } else if self.paid_cents > 0 {
            BillStatus::PartiallyPaid
        } else {
            BillStatus::Pending
        }
    }
}

impl Entity for Bill {
    const COLLECTION: &'static str = "bills";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

/// Insurance claim state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    /// Sent to the insurer
    Submitted,
    /// Under review by the insurer
    InReview,
    /// Accepted for an approved amount
    Approved,
    /// Rejected
    Denied,
    /// Insurer paid the approved amount
    Paid,
}

impl ClaimStatus {
    /// Stored name
    pub fn as_str(&self) -> &'static str {
        match self {
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::InReview => "in_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::Denied => "denied",
            ClaimStatus::Paid => "paid",
        }
    }

    /// Whether moving to `next` is allowed
    pub fn can_transition_to(&self, next: ClaimStatus) -> bool {
        use ClaimStatus::*;
        match self {
            Submitted => matches!(next, InReview | Approved | Denied),
            InReview => matches!(next, Approved | Denied),
            Approved => matches!(next, Paid),
            Denied | Paid => false,
        }
    }
}

/// Insurance claim against a bill; amounts are in cents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct InsuranceClaim {
    /// Document id
    #[serde(default)]
    pub id: String,
    /// Claimed bill
    pub bill_id: String,
    /// Patient user id
    pub patient_id: String,
    /// Insurance company
    pub provider: String,
    /// Policy number
    pub policy_number: String,
    /// Amount claimed
    pub claimed_cents: i64,
    /// Amount approved by the insurer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_cents: Option<i64>,
    /// Claim state
    pub status: ClaimStatus,
    /// Submission time
    #[serde(with = "as_timestamp")]
    pub submitted_at: DateTime<Utc>,
    /// Time of the final decision
    #[serde(default, with = "as_timestamp_opt", skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    /// Insurer remarks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Entity for InsuranceClaim {
    const COLLECTION: &'static str = "insurance_claims";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: String) {
        self.id = id;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_item_total_overflow_is_none() {
        let item = LineItem { description: "Visit".into(), quantity: 3, unit_price_cents: 2_500 };
        assert_eq!(item.total_cents(), Some(7_500));

        let huge = LineItem { description: "Equipment".into(), quantity: 4, unit_price_cents: (1i64 << 62) + 1 };
        assert_eq!(huge.total_cents(), None);
    }
}
