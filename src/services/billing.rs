// src/services/billing.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BillingError;
use crate::events::{Event, EventPublisher};
use crate::models::billing::{calculate_billable_units, Billing, BillingStatus, CostType, ReferenceType};
use crate::services::allowance::AllowanceEngine;
use crate::services::deduction::compute_deduction;
use crate::store::Store;

/// Orchestrates the ledger around usage windows. Every entry point is
/// safe to replay: duplicate starts return the existing row, duplicate
/// ends are no-ops, duplicate instant charges collapse onto their
/// deterministic reference.
pub struct BillingService {
    store: Store,
    allowances: Arc<AllowanceEngine>,
    publisher: Arc<dyn EventPublisher>,
}

impl BillingService {
    pub fn new(
        store: Store,
        allowances: Arc<AllowanceEngine>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            store,
            allowances,
            publisher,
        }
    }

    // Best effort; a dropped notification never affects the ledger.
    async fn publish_billing(&self, event_type: &str, billing: &Billing) {
        let data = match serde_json::to_value(billing) {
            Ok(data) => data,
            Err(e) => {
                warn!("Failed to serialize billing event: {}", e);
                return;
            }
        };
        let event = Event {
            event_type: event_type.to_string(),
            publisher: "billing-manager".to_string(),
            data_type: "billing".to_string(),
            data,
        };
        if let Err(e) = self.publisher.publish(&event).await {
            warn!("Failed to publish {} for billing {}: {}", event_type, billing.id, e);
        }
    }

    pub async fn get(&self, billing_id: &Uuid) -> Result<Billing, BillingError> {
        self.store.billing_get(billing_id).await
    }

    pub async fn get_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &Uuid,
    ) -> Result<Billing, BillingError> {
        self.store
            .billing_get_by_reference(reference_type, reference_id)
            .await
    }

    pub async fn list(
        &self,
        customer_id: Option<Uuid>,
        account_id: Option<Uuid>,
        limit: i64,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Billing>, BillingError> {
        self.store
            .billing_list(customer_id, account_id, limit, token)
            .await
    }

    /// Open a usage window for a windowed reference (calls). Replays and
    /// races converge on the row that won the insert.
    pub async fn billing_start(
        &self,
        customer_id: Uuid,
        reference_type: ReferenceType,
        reference_id: Uuid,
        cost_type: CostType,
    ) -> Result<Billing, BillingError> {
        match self
            .store
            .billing_get_by_reference(reference_type, &reference_id)
            .await
        {
            Ok(existing) => {
                info!(
                    "Billing already started for {} {}: {} ({})",
                    reference_type.as_str(),
                    reference_id,
                    existing.id,
                    existing.status.as_str()
                );
                return Ok(existing);
            }
            Err(BillingError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let account = self.store.account_get_by_customer_id(&customer_id).await?;

        // Token-eligible types need a cycle open before the charge lands.
        let (token_per_unit, _) = cost_type.default_rates();
        if token_per_unit > 0 {
            self.allowances.ensure_current_cycle(&account).await?;
        }

        match self
            .store
            .billing_start_usage(customer_id, account.id, reference_type, reference_id, cost_type)
            .await
        {
            Ok(billing) => {
                self.publish_billing("billing_created", &billing).await;
                Ok(billing)
            }
            Err(BillingError::Duplicate) => {
                self.store
                    .billing_get_by_reference(reference_type, &reference_id)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Close a usage window and charge the elapsed duration. An already
    /// ended window returns as-is, so hangup replays cannot double bill;
    /// a close that loses a race to a concurrent one converges on the
    /// winning row via the `progressing`-only finalize in the store.
    pub async fn billing_end(
        &self,
        reference_type: ReferenceType,
        reference_id: &Uuid,
        duration_secs: i64,
    ) -> Result<Billing, BillingError> {
        let billing = self
            .store
            .billing_get_by_reference(reference_type, reference_id)
            .await?;

        let result = match end_action(billing.status, reference_type, duration_secs) {
            EndAction::AlreadyEnded => return Ok(billing),
            EndAction::CloseUncharged => {
                self.store
                    .billing_set_status_end(&billing.id, duration_secs as i32)
                    .await
            }
            EndAction::Charge { units } => {
                let account = self.store.account_get(&billing.account_id).await?;
                if billing.rate_token_per_unit > 0 {
                    self.allowances.ensure_current_cycle(&account).await?;
                }

                self.store
                    .billing_finish_usage(&billing, duration_secs as i32, units)
                    .await
                    .map(|(billing, outcome)| {
                        info!(
                            "Billing ended: {} ({}s, {} units, tokens {}, credit {})",
                            billing.id,
                            duration_secs,
                            units,
                            outcome.deduction.tokens_consumed,
                            outcome.deduction.credit_charged
                        );
                        billing
                    })
            }
        };

        match result {
            Ok(billing) => {
                self.publish_billing("billing_updated", &billing).await;
                Ok(billing)
            }
            // A concurrent close finalized the row between our read and
            // the update. Its charge stands; return what it wrote.
            Err(BillingError::Duplicate) => {
                self.store
                    .billing_get_by_reference(reference_type, reference_id)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Charge an instant reference (sms, email, number) in one shot.
    /// A duplicate reference returns the recorded row unchanged.
    pub async fn billing_instant(
        &self,
        customer_id: Uuid,
        reference_type: ReferenceType,
        reference_id: Uuid,
        cost_type: CostType,
        units: i64,
    ) -> Result<Billing, BillingError> {
        let account = self.store.account_get_by_customer_id(&customer_id).await?;

        let (token_per_unit, _) = cost_type.default_rates();
        if token_per_unit > 0 {
            self.allowances.ensure_current_cycle(&account).await?;
        }

        match self
            .store
            .billing_consume_and_record(
                customer_id,
                account.id,
                reference_type,
                reference_id,
                cost_type,
                units,
            )
            .await
        {
            Ok((billing, _)) => {
                self.publish_billing("billing_created", &billing).await;
                Ok(billing)
            }
            Err(BillingError::Duplicate) => {
                info!(
                    "Instant billing already recorded for {} {}",
                    reference_type.as_str(),
                    reference_id
                );
                self.store
                    .billing_get_by_reference(reference_type, &reference_id)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    /// Cheap preflight: would `count` units of this reference type go
    /// through right now? Advisory only; the consume path re-checks
    /// under its row locks.
    pub async fn is_valid_balance(
        &self,
        account_id: &Uuid,
        reference_type: ReferenceType,
        count: i64,
    ) -> Result<bool, BillingError> {
        if count <= 0 {
            return Err(BillingError::Validation(
                "count must be positive".to_string(),
            ));
        }
        if reference_type.is_zero_cost() {
            return Ok(true);
        }

        let account = self.store.account_get(account_id).await?;
        if account.plan_type.bypasses_balance_check() {
            return Ok(true);
        }

        let cost_type = default_cost_type(reference_type);
        let (token_per_unit, credit_per_unit) = cost_type.default_rates();

        let tokens_remaining = if token_per_unit > 0 {
            match self.allowances.get_current(account_id).await {
                Ok(allowance) => allowance.tokens_remaining(),
                // No open cycle yet; the consume path will create one
                // with the full monthly grant.
                Err(BillingError::NotFound) => account.plan_type.monthly_token_grant(),
                Err(e) => return Err(e),
            }
        } else {
            0
        };

        let deduction = compute_deduction(tokens_remaining, count, token_per_unit, credit_per_unit);
        // Strictly-greater: an account at exactly the estimated cost is
        // not cleared, the authoritative check happens at consume time.
        let valid =
            deduction.credit_charged == 0 || account.balance_credit > deduction.credit_charged;
        if !valid {
            warn!(
                "Balance check failed for account {}: required {}, available {}",
                account_id, deduction.credit_charged, account.balance_credit
            );
        }
        Ok(valid)
    }
}

/// What closing a usage window should do, given the row's current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    /// The window is already closed; replayed hangups take this path.
    AlreadyEnded,
    /// Close without touching any balance.
    CloseUncharged,
    /// Consume the allowance and credit for `units` billable units.
    Charge { units: i64 },
}

pub fn end_action(
    status: BillingStatus,
    reference_type: ReferenceType,
    duration_secs: i64,
) -> EndAction {
    if status == BillingStatus::End {
        return EndAction::AlreadyEnded;
    }
    if reference_type.is_zero_cost() {
        return EndAction::CloseUncharged;
    }
    let units = calculate_billable_units(duration_secs);
    if units == 0 {
        // Unanswered or zero-length usage closes without a charge.
        return EndAction::CloseUncharged;
    }
    EndAction::Charge { units }
}

/// Default cost type used when only the reference type is known, e.g.
/// for preflight balance checks.
pub fn default_cost_type(reference_type: ReferenceType) -> CostType {
    match reference_type {
        ReferenceType::Call => CostType::CallPstnOutgoing,
        ReferenceType::CallExtension => CostType::CallExtension,
        ReferenceType::Sms => CostType::Sms,
        ReferenceType::Email => CostType::Email,
        ReferenceType::Number => CostType::NumberPurchase,
        ReferenceType::CreditFreeTier => CostType::TopUp,
        ReferenceType::Adjustment => CostType::Adjustment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cost_type_mapping_covers_reference_types() {
        assert_eq!(
            default_cost_type(ReferenceType::Call),
            CostType::CallPstnOutgoing
        );
        assert_eq!(
            default_cost_type(ReferenceType::CallExtension),
            CostType::CallExtension
        );
        assert_eq!(default_cost_type(ReferenceType::Sms), CostType::Sms);
        assert_eq!(
            default_cost_type(ReferenceType::Number),
            CostType::NumberPurchase
        );
    }

    #[test]
    fn ended_window_is_never_recharged() {
        // A second hangup for the same call must not reach the charge
        // path regardless of the replayed duration.
        assert_eq!(
            end_action(BillingStatus::End, ReferenceType::Call, 150),
            EndAction::AlreadyEnded
        );
        assert_eq!(
            end_action(BillingStatus::End, ReferenceType::Call, 0),
            EndAction::AlreadyEnded
        );
    }

    #[test]
    fn zero_cost_windows_close_uncharged() {
        assert_eq!(
            end_action(BillingStatus::Progressing, ReferenceType::CallExtension, 600),
            EndAction::CloseUncharged
        );
    }

    #[test]
    fn unanswered_calls_close_uncharged() {
        assert_eq!(
            end_action(BillingStatus::Progressing, ReferenceType::Call, 0),
            EndAction::CloseUncharged
        );
        assert_eq!(
            end_action(BillingStatus::Progressing, ReferenceType::Call, -30),
            EndAction::CloseUncharged
        );
    }

    #[test]
    fn connected_calls_charge_rounded_up_minutes() {
        assert_eq!(
            end_action(BillingStatus::Progressing, ReferenceType::Call, 61),
            EndAction::Charge { units: 2 }
        );
        assert_eq!(
            end_action(BillingStatus::Progressing, ReferenceType::Call, 60),
            EndAction::Charge { units: 1 }
        );
    }
}
