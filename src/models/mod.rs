// src/models/mod.rs
pub mod account;
pub mod allowance;
pub mod billing;
pub mod failed_event;

pub use account::{Account, PaymentMethod, PaymentType, PlanType, ResourceType};
pub use allowance::Allowance;
pub use billing::{Billing, BillingStatus, CostType, ReferenceType, TransactionType};
pub use failed_event::{FailedEvent, FailedEventStatus};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ==================== API DTOs ====================

#[derive(Debug, Deserialize)]
pub struct BalanceRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct TokensRequest {
    pub amount: i64,
}

#[derive(Debug, Deserialize)]
pub struct ValidBalanceRequest {
    pub reference_type: ReferenceType,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct ValidBalanceResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub customer_id: Uuid,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub plan_type: Option<PlanType>,
    #[serde(default)]
    pub payment_type: Option<PaymentType>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
}

#[derive(Debug, Deserialize)]
pub struct ValidResourceLimitRequest {
    pub resource_type: ResourceType,
}

#[derive(Debug, Serialize)]
pub struct ValidResourceLimitResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAccountRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub detail: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanRequest {
    pub plan_type: PlanType,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentRequest {
    pub payment_type: PaymentType,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub customer_id: Option<Uuid>,
    #[serde(default)]
    pub account_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}
