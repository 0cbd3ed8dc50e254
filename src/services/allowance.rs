// src/services/allowance.rs
use tracing::info;
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::allowance::compute_cycle_dates;
use crate::models::{Account, Allowance};
use crate::store::Store;

/// New `tokens_total` after a signed adjustment, or `Validation` when
/// the pool would go negative. Evaluated under the row lock in the
/// store so the guard never sees a stale total.
pub fn checked_tokens_total(tokens_total: i64, delta: i64) -> Result<i64, BillingError> {
    let new_total = tokens_total + delta;
    if new_total < 0 {
        return Err(BillingError::Validation(format!(
            "tokens_total cannot go negative: {} {:+}",
            tokens_total, delta
        )));
    }
    Ok(new_total)
}

/// Manages monthly token cycles. Cycle creation is idempotent: two
/// concurrent callers both end up observing the same row, whichever of
/// them actually inserted it.
pub struct AllowanceEngine {
    store: Store,
}

impl AllowanceEngine {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Get the cycle covering now, creating it with the plan's monthly
    /// grant if missing. A lost insert race is swallowed; the re-read
    /// after it is mandatory so every caller returns the winning row.
    pub async fn ensure_current_cycle(&self, account: &Account) -> Result<Allowance, BillingError> {
        let now = self.store.clock().now();

        match self.store.allowance_get_current(&account.id, now).await {
            Ok(allowance) => return Ok(allowance),
            Err(BillingError::NotFound) => {}
            Err(e) => return Err(e),
        }

        let (cycle_start, cycle_end) = compute_cycle_dates(now);
        let grant = account.plan_type.monthly_token_grant();

        match self
            .store
            .allowance_create(account.customer_id, account.id, cycle_start, cycle_end, grant)
            .await
        {
            Ok(allowance) => Ok(allowance),
            Err(BillingError::Duplicate) => {
                info!(
                    "Allowance cycle already created by a concurrent writer for account {}",
                    account.id
                );
                self.store.allowance_get_current(&account.id, now).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(&self, allowance_id: &Uuid) -> Result<Allowance, BillingError> {
        self.store.allowance_get(allowance_id).await
    }

    pub async fn get_current(&self, account_id: &Uuid) -> Result<Allowance, BillingError> {
        let now = self.store.clock().now();
        self.store.allowance_get_current(account_id, now).await
    }

    pub async fn list(
        &self,
        account_id: &Uuid,
        limit: i64,
        token: Option<chrono::DateTime<chrono::Utc>>,
    ) -> Result<Vec<Allowance>, BillingError> {
        self.store.allowance_list(account_id, limit, token).await
    }

    /// Grow the cycle's pool. Only `tokens_total` moves; consumption
    /// history stays intact.
    pub async fn add_tokens(
        &self,
        allowance_id: &Uuid,
        amount: i64,
    ) -> Result<Allowance, BillingError> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        self.store
            .allowance_adjust_tokens_total(allowance_id, amount)
            .await
    }

    /// Shrink the cycle's pool. Rejects a shrink below zero.
    pub async fn subtract_tokens(
        &self,
        allowance_id: &Uuid,
        amount: i64,
    ) -> Result<Allowance, BillingError> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        self.store
            .allowance_adjust_tokens_total(allowance_id, -amount)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_adjustments_are_relative() {
        // Two +100 adjustments applied in sequence both land; the second
        // one starts from the first one's result, not a shared snapshot.
        let after_first = checked_tokens_total(1_000, 100).unwrap();
        assert_eq!(after_first, 1_100);
        assert_eq!(checked_tokens_total(after_first, 100).unwrap(), 1_200);
    }

    #[test]
    fn shrink_below_zero_is_rejected() {
        assert_eq!(checked_tokens_total(500, -500).unwrap(), 0);
        let err = checked_tokens_total(500, -501).unwrap_err();
        assert!(matches!(err, BillingError::Validation(_)));
    }
}
