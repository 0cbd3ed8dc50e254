// src/models/billing.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billable units per call minute: partial minutes round up.
pub const CALL_UNIT_SECONDS: i64 = 60;

/// Default rates in micro-dollars (credit) and whole tokens per billable
/// unit, captured on the billing row when usage starts.
pub const CREDIT_PER_UNIT_CALL_PSTN_OUTGOING: i64 = 4_500;
pub const CREDIT_PER_UNIT_CALL_PSTN_INCOMING: i64 = 1_500;
pub const CREDIT_PER_UNIT_SMS: i64 = 8_000;
pub const CREDIT_PER_UNIT_EMAIL: i64 = 1_000;
pub const CREDIT_PER_UNIT_NUMBER: i64 = 5_000_000;

pub const TOKEN_PER_UNIT_CALL_PSTN_OUTGOING: i64 = 1;
pub const TOKEN_PER_UNIT_CALL_PSTN_INCOMING: i64 = 1;

/// An immutable ledger entry. Once status reaches `End` the row is never
/// mutated again except for soft delete.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Billing {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub account_id: Uuid,
    pub transaction_type: TransactionType,
    pub status: BillingStatus,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
    pub cost_type: CostType,
    pub rate_token_per_unit: i64,
    pub rate_credit_per_unit: i64,
    pub usage_duration: i32,
    pub billable_units: i64,
    /// Signed deltas applied to the account balances by this entry
    /// (negative for charges, positive for top-ups).
    pub delta_token: i64,
    pub delta_credit: i64,
    /// Balance snapshots taken immediately after this entry was applied.
    pub balance_token_after: i64,
    pub balance_credit_after: i64,
    pub tm_billing_start: Option<DateTime<Utc>>,
    pub tm_billing_end: Option<DateTime<Utc>>,
    pub tm_create: Option<DateTime<Utc>>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Usage,
    TopUp,
    Adjustment,
    Refund,
}

impl TransactionType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "top_up" => TransactionType::TopUp,
            "adjustment" => TransactionType::Adjustment,
            "refund" => TransactionType::Refund,
            _ => TransactionType::Usage,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            TransactionType::Usage => "usage",
            TransactionType::TopUp => "top_up",
            TransactionType::Adjustment => "adjustment",
            TransactionType::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BillingStatus {
    Pending,
    Progressing,
    End,
}

impl BillingStatus {
    pub fn from_str(s: &str) -> Self {
        match s {
            "progressing" => BillingStatus::Progressing,
            "end" => BillingStatus::End,
            _ => BillingStatus::Pending,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            BillingStatus::Pending => "pending",
            BillingStatus::Progressing => "progressing",
            BillingStatus::End => "end",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceType {
    Call,
    CallExtension,
    Sms,
    Email,
    Number,
    CreditFreeTier,
    Adjustment,
}

impl ReferenceType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "call" => ReferenceType::Call,
            "call_extension" => ReferenceType::CallExtension,
            "sms" => ReferenceType::Sms,
            "email" => ReferenceType::Email,
            "number" => ReferenceType::Number,
            "credit_free_tier" => ReferenceType::CreditFreeTier,
            _ => ReferenceType::Adjustment,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ReferenceType::Call => "call",
            ReferenceType::CallExtension => "call_extension",
            ReferenceType::Sms => "sms",
            ReferenceType::Email => "email",
            ReferenceType::Number => "number",
            ReferenceType::CreditFreeTier => "credit_free_tier",
            ReferenceType::Adjustment => "adjustment",
        }
    }

    /// Intra-system traffic is never charged and bypasses balance checks.
    pub fn is_zero_cost(&self) -> bool {
        matches!(self, ReferenceType::CallExtension)
    }

    /// Instant types have no usage window: start and end collapse into a
    /// single unit billed immediately.
    pub fn is_instant(&self) -> bool {
        matches!(
            self,
            ReferenceType::Sms | ReferenceType::Email | ReferenceType::Number
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CostType {
    CallPstnOutgoing,
    CallPstnIncoming,
    CallExtension,
    Sms,
    Email,
    NumberPurchase,
    NumberRenew,
    TopUp,
    Adjustment,
}

impl CostType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "call_pstn_outgoing" => CostType::CallPstnOutgoing,
            "call_pstn_incoming" => CostType::CallPstnIncoming,
            "call_extension" => CostType::CallExtension,
            "sms" => CostType::Sms,
            "email" => CostType::Email,
            "number_purchase" => CostType::NumberPurchase,
            "number_renew" => CostType::NumberRenew,
            "top_up" => CostType::TopUp,
            _ => CostType::Adjustment,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            CostType::CallPstnOutgoing => "call_pstn_outgoing",
            CostType::CallPstnIncoming => "call_pstn_incoming",
            CostType::CallExtension => "call_extension",
            CostType::Sms => "sms",
            CostType::Email => "email",
            CostType::NumberPurchase => "number_purchase",
            CostType::NumberRenew => "number_renew",
            CostType::TopUp => "top_up",
            CostType::Adjustment => "adjustment",
        }
    }

    /// Rates captured when usage starts: (token_per_unit, credit_per_unit).
    pub fn default_rates(&self) -> (i64, i64) {
        match self {
            CostType::CallPstnOutgoing => {
                (TOKEN_PER_UNIT_CALL_PSTN_OUTGOING, CREDIT_PER_UNIT_CALL_PSTN_OUTGOING)
            }
            CostType::CallPstnIncoming => {
                (TOKEN_PER_UNIT_CALL_PSTN_INCOMING, CREDIT_PER_UNIT_CALL_PSTN_INCOMING)
            }
            CostType::CallExtension => (0, 0),
            CostType::Sms => (0, CREDIT_PER_UNIT_SMS),
            CostType::Email => (0, CREDIT_PER_UNIT_EMAIL),
            CostType::NumberPurchase | CostType::NumberRenew => (0, CREDIT_PER_UNIT_NUMBER),
            CostType::TopUp | CostType::Adjustment => (0, 0),
        }
    }
}

/// Whole-minute billable units from elapsed wall-clock seconds, rounding
/// partial minutes up. Zero or negative duration bills nothing.
pub fn calculate_billable_units(duration_secs: i64) -> i64 {
    if duration_secs <= 0 {
        return 0;
    }
    (duration_secs + CALL_UNIT_SECONDS - 1) / CALL_UNIT_SECONDS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billable_units_round_up() {
        assert_eq!(calculate_billable_units(0), 0);
        assert_eq!(calculate_billable_units(-10), 0);
        assert_eq!(calculate_billable_units(1), 1);
        assert_eq!(calculate_billable_units(59), 1);
        assert_eq!(calculate_billable_units(60), 1);
        assert_eq!(calculate_billable_units(61), 2);
        assert_eq!(calculate_billable_units(600), 10);
    }

    #[test]
    fn reference_type_round_trip() {
        for rt in [
            ReferenceType::Call,
            ReferenceType::CallExtension,
            ReferenceType::Sms,
            ReferenceType::Email,
            ReferenceType::Number,
            ReferenceType::CreditFreeTier,
            ReferenceType::Adjustment,
        ] {
            assert_eq!(ReferenceType::from_str(rt.as_str()), rt);
        }
    }

    #[test]
    fn extension_calls_are_zero_cost() {
        assert!(ReferenceType::CallExtension.is_zero_cost());
        assert!(!ReferenceType::Call.is_zero_cost());
        assert_eq!(CostType::CallExtension.default_rates(), (0, 0));
    }

    #[test]
    fn instant_types() {
        assert!(ReferenceType::Sms.is_instant());
        assert!(ReferenceType::Email.is_instant());
        assert!(ReferenceType::Number.is_instant());
        assert!(!ReferenceType::Call.is_instant());
        assert!(!ReferenceType::CallExtension.is_instant());
    }

    #[test]
    fn pstn_calls_are_token_eligible() {
        let (token, credit) = CostType::CallPstnOutgoing.default_rates();
        assert_eq!(token, 1);
        assert_eq!(credit, 4_500);

        let (token, credit) = CostType::Sms.default_rates();
        assert_eq!(token, 0);
        assert_eq!(credit, 8_000);
    }
}
