// src/models/account.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A billing-capable customer entity. Balances are kept in integer
/// micro-dollars (credit) and whole tokens; never floating point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub name: String,
    pub detail: String,
    pub plan_type: PlanType,
    pub balance_credit: i64,
    pub balance_token: i64,
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
    pub tm_create: Option<DateTime<Utc>>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Free,
    Basic,
    Professional,
    Unlimited,
}

impl PlanType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "basic" => PlanType::Basic,
            "professional" => PlanType::Professional,
            "unlimited" => PlanType::Unlimited,
            _ => PlanType::Free,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlanType::Free => "free",
            PlanType::Basic => "basic",
            PlanType::Professional => "professional",
            PlanType::Unlimited => "unlimited",
        }
    }

    /// Tokens granted when a new allowance cycle opens.
    pub fn monthly_token_grant(&self) -> i64 {
        match self {
            PlanType::Free => 1_000,
            PlanType::Basic => 10_000,
            PlanType::Professional => 50_000,
            // Unlimited accounts bypass balance checks entirely, so the
            // cycle grant is irrelevant.
            PlanType::Unlimited => 0,
        }
    }

    /// Unlimited plans may overdraft without limit.
    pub fn bypasses_balance_check(&self) -> bool {
        matches!(self, PlanType::Unlimited)
    }

    /// Maximum owned resources of a kind, `None` for uncapped.
    pub fn resource_limit(&self, resource: ResourceType) -> Option<i64> {
        match (self, resource) {
            (PlanType::Unlimited, _) => None,
            (PlanType::Free, ResourceType::Number) => Some(1),
            (PlanType::Basic, ResourceType::Number) => Some(5),
            (PlanType::Professional, ResourceType::Number) => Some(20),
        }
    }

    /// Whether acquiring one more resource of this kind stays within the
    /// plan cap, given how many the account already owns.
    pub fn allows_resource(&self, resource: ResourceType, current_count: i64) -> bool {
        match self.resource_limit(resource) {
            None => true,
            Some(cap) => current_count < cap,
        }
    }
}

/// Account-scoped resources subject to per-plan caps.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Number,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    None,
    Prepaid,
}

impl PaymentType {
    pub fn from_str(s: &str) -> Self {
        match s {
            "prepaid" => PaymentType::Prepaid,
            _ => PaymentType::None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentType::None => "none",
            PaymentType::Prepaid => "prepaid",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    None,
    CreditCard,
}

impl PaymentMethod {
    pub fn from_str(s: &str) -> Self {
        match s {
            "credit_card" => PaymentMethod::CreditCard,
            _ => PaymentMethod::None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PaymentMethod::None => "none",
            PaymentMethod::CreditCard => "credit_card",
        }
    }
}

impl Account {
    pub fn is_deleted(&self) -> bool {
        self.tm_delete.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_type_round_trip() {
        for plan in [
            PlanType::Free,
            PlanType::Basic,
            PlanType::Professional,
            PlanType::Unlimited,
        ] {
            assert_eq!(PlanType::from_str(plan.as_str()), plan);
        }
    }

    #[test]
    fn unknown_plan_defaults_to_free() {
        assert_eq!(PlanType::from_str("gold"), PlanType::Free);
    }

    #[test]
    fn only_unlimited_bypasses_balance_check() {
        assert!(PlanType::Unlimited.bypasses_balance_check());
        assert!(!PlanType::Free.bypasses_balance_check());
        assert!(!PlanType::Basic.bypasses_balance_check());
        assert!(!PlanType::Professional.bypasses_balance_check());
    }

    #[test]
    fn token_grants_scale_with_plan() {
        assert_eq!(PlanType::Free.monthly_token_grant(), 1_000);
        assert_eq!(PlanType::Basic.monthly_token_grant(), 10_000);
        assert_eq!(PlanType::Professional.monthly_token_grant(), 50_000);
        assert_eq!(PlanType::Unlimited.monthly_token_grant(), 0);
    }

    #[test]
    fn number_caps_scale_with_plan() {
        assert_eq!(PlanType::Free.resource_limit(ResourceType::Number), Some(1));
        assert_eq!(PlanType::Basic.resource_limit(ResourceType::Number), Some(5));
        assert_eq!(
            PlanType::Professional.resource_limit(ResourceType::Number),
            Some(20)
        );
        assert_eq!(PlanType::Unlimited.resource_limit(ResourceType::Number), None);
    }

    #[test]
    fn resource_cap_is_exclusive_of_the_current_count() {
        // An account at its cap cannot acquire another one.
        assert!(PlanType::Free.allows_resource(ResourceType::Number, 0));
        assert!(!PlanType::Free.allows_resource(ResourceType::Number, 1));
        assert!(PlanType::Basic.allows_resource(ResourceType::Number, 4));
        assert!(!PlanType::Basic.allows_resource(ResourceType::Number, 5));
        assert!(PlanType::Unlimited.allows_resource(ResourceType::Number, 1_000_000));
    }
}
