// src/services/credit_sweeper.rs
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::billing::{CostType, ReferenceType, TransactionType};
use crate::models::PlanType;
use crate::services::allowance::AllowanceEngine;
use crate::store::accounts::BalanceAdjustment;
use crate::store::Store;

/// Namespace for deterministic free-tier top-up references.
const FREE_CREDIT_NAMESPACE: Uuid = Uuid::from_u128(0x8f1c_42d7_9b3a_4e06_a5d2_7c48_91e0_b36f);

/// Monthly free-tier grant in micro-dollars.
pub const FREE_TIER_MONTHLY_CREDIT: i64 = 1_000_000;

const SWEEP_PAGE_SIZE: i64 = 100;

pub struct SweepSummary {
    pub topped_up: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Periodic sweep granting free-tier accounts their monthly credit and
/// opening the month's allowance cycle. The ledger reference is derived
/// from the account and month, so re-running a sweep mid-month is a
/// no-op: the unique reference index rejects the second grant.
pub struct CreditSweeper {
    store: Store,
    allowances: Arc<AllowanceEngine>,
}

/// One reference per account per calendar month.
pub fn free_credit_reference(account_id: &Uuid, at: DateTime<Utc>) -> Uuid {
    let name = format!("{}:{:04}-{:02}", account_id, at.year(), at.month());
    Uuid::new_v5(&FREE_CREDIT_NAMESPACE, name.as_bytes())
}

impl CreditSweeper {
    pub fn new(store: Store, allowances: Arc<AllowanceEngine>) -> Self {
        Self { store, allowances }
    }

    /// Walk the free-tier accounts once. A failure on one account is
    /// logged and does not stop the sweep.
    pub async fn run_once(&self) -> Result<SweepSummary, BillingError> {
        let now = self.store.clock().now();
        let mut summary = SweepSummary {
            topped_up: 0,
            skipped: 0,
            failed: 0,
        };

        let mut token: Option<DateTime<Utc>> = None;
        loop {
            let page = self
                .store
                .account_list_by_plan(PlanType::Free, SWEEP_PAGE_SIZE, token)
                .await?;
            if page.is_empty() {
                break;
            }
            token = page.last().and_then(|a| a.tm_create);

            for account in &page {
                match self.top_up_account(account, now).await {
                    Ok(true) => summary.topped_up += 1,
                    Ok(false) => summary.skipped += 1,
                    Err(e) => {
                        error!("Free-tier sweep failed for account {}: {}", account.id, e);
                        summary.failed += 1;
                    }
                }
            }

            if page.len() < SWEEP_PAGE_SIZE as usize {
                break;
            }
        }

        info!(
            "Free-tier sweep done: {} topped up, {} skipped, {} failed",
            summary.topped_up, summary.skipped, summary.failed
        );
        Ok(summary)
    }

    async fn top_up_account(
        &self,
        account: &crate::models::Account,
        now: DateTime<Utc>,
    ) -> Result<bool, BillingError> {
        self.allowances.ensure_current_cycle(account).await?;

        let reference_id = free_credit_reference(&account.id, now);
        match self
            .store
            .account_adjust_with_ledger(
                &account.id,
                BalanceAdjustment {
                    transaction_type: TransactionType::TopUp,
                    reference_type: ReferenceType::CreditFreeTier,
                    reference_id,
                    cost_type: CostType::TopUp,
                    delta_credit: FREE_TIER_MONTHLY_CREDIT,
                    delta_token: 0,
                    check_sufficiency: false,
                },
            )
            .await
        {
            Ok((_, billing)) => {
                info!(
                    "Free-tier credit granted to account {} (billing {})",
                    account.id, billing.id
                );
                Ok(true)
            }
            // Already granted this month.
            Err(BillingError::Duplicate) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reference_is_stable_within_a_month() {
        let account_id = Uuid::new_v4();
        let early = Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2026, 5, 31, 23, 59, 59).unwrap();
        assert_eq!(
            free_credit_reference(&account_id, early),
            free_credit_reference(&account_id, late)
        );
    }

    #[test]
    fn reference_differs_across_months_and_accounts() {
        let account_id = Uuid::new_v4();
        let may = Utc.with_ymd_and_hms(2026, 5, 15, 0, 0, 0).unwrap();
        let june = Utc.with_ymd_and_hms(2026, 6, 15, 0, 0, 0).unwrap();
        assert_ne!(
            free_credit_reference(&account_id, may),
            free_credit_reference(&account_id, june)
        );

        let other = Uuid::new_v4();
        assert_ne!(
            free_credit_reference(&account_id, may),
            free_credit_reference(&other, may)
        );
    }
}
