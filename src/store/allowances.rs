// src/store/allowances.rs
use chrono::{DateTime, Utc};
use deadpool_postgres::Transaction;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::BillingError;
use crate::models::Allowance;
use crate::services::allowance::checked_tokens_total;
use crate::services::deduction::{authorize_deduction, compute_deduction, Deduction};
use crate::store::accounts::row_to_account;
use crate::store::{map_db_err, Store};

const ALLOWANCE_COLS: &str = "id, customer_id, account_id, cycle_start, cycle_end, \
     tokens_total, tokens_used, tm_create, tm_update, tm_delete";

pub(crate) fn row_to_allowance(row: &tokio_postgres::Row) -> Allowance {
    Allowance {
        id: row.get(0),
        customer_id: row.get(1),
        account_id: row.get(2),
        cycle_start: row.get(3),
        cycle_end: row.get(4),
        tokens_total: row.get(5),
        tokens_used: row.get(6),
        tm_create: row.get(7),
        tm_update: row.get(8),
        tm_delete: row.get(9),
    }
}

impl Store {
    /// Insert a new cycle. Loses the race to a concurrent creator with
    /// `Duplicate` via the unique index on `(account_id, cycle_start)`.
    pub async fn allowance_create(
        &self,
        customer_id: Uuid,
        account_id: Uuid,
        cycle_start: DateTime<Utc>,
        cycle_end: DateTime<Utc>,
        tokens_total: i64,
    ) -> Result<Allowance, BillingError> {
        let id = Uuid::new_v4();
        let now = self.clock.now();

        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_one(
                &*format!(
                    "INSERT INTO billing_allowances
                     (id, customer_id, account_id, cycle_start, cycle_end,
                      tokens_total, tokens_used, tm_create, tm_update)
                     VALUES ($1, $2, $3, $4, $5, $6, 0, $7, $7)
                     RETURNING {}",
                    ALLOWANCE_COLS
                ),
                &[
                    &id,
                    &customer_id,
                    &account_id,
                    &cycle_start,
                    &cycle_end,
                    &tokens_total,
                    &now,
                ],
            )
            .await
            .map_err(map_db_err)?;

        let allowance = row_to_allowance(&row);
        info!(
            "Allowance cycle created: {} for account {} ({} tokens)",
            allowance.id, account_id, tokens_total
        );
        Ok(allowance)
    }

    pub async fn allowance_get(&self, allowance_id: &Uuid) -> Result<Allowance, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_allowances WHERE id = $1 AND tm_delete IS NULL",
                    ALLOWANCE_COLS
                ),
                &[&allowance_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        Ok(row_to_allowance(&row))
    }

    /// The cycle covering `at` for the account, if any.
    pub async fn allowance_get_current(
        &self,
        account_id: &Uuid,
        at: DateTime<Utc>,
    ) -> Result<Allowance, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_allowances
                     WHERE account_id = $1
                       AND cycle_start <= $2 AND cycle_end > $2
                       AND tm_delete IS NULL
                     ORDER BY cycle_start DESC
                     LIMIT 1",
                    ALLOWANCE_COLS
                ),
                &[&account_id, &at],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        Ok(row_to_allowance(&row))
    }

    pub async fn allowance_list(
        &self,
        account_id: &Uuid,
        limit: i64,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Allowance>, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let cursor = token.unwrap_or_else(|| self.clock.now());
        let rows = client
            .query(
                &*format!(
                    "SELECT {} FROM billing_allowances
                     WHERE account_id = $1 AND tm_delete IS NULL AND tm_create < $2
                     ORDER BY tm_create DESC
                     LIMIT $3",
                    ALLOWANCE_COLS
                ),
                &[&account_id, &cursor, &limit],
            )
            .await?;

        Ok(rows.iter().map(row_to_allowance).collect())
    }

    /// Move `tokens_total` by a signed delta under a row lock, so two
    /// concurrent adjustments both land and the negative-total guard
    /// checks the current value, not a stale read.
    pub async fn allowance_adjust_tokens_total(
        &self,
        allowance_id: &Uuid,
        delta: i64,
    ) -> Result<Allowance, BillingError> {
        let now = self.clock.now();
        let mut client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let transaction = client.transaction().await.map_err(BillingError::Database)?;

        let row = transaction
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_allowances
                     WHERE id = $1 AND tm_delete IS NULL
                     FOR UPDATE",
                    ALLOWANCE_COLS
                ),
                &[&allowance_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        let allowance = row_to_allowance(&row);
        let new_total = match checked_tokens_total(allowance.tokens_total, delta) {
            Ok(total) => total,
            Err(e) => {
                transaction.rollback().await.ok();
                return Err(e);
            }
        };

        let row = transaction
            .query_one(
                &*format!(
                    "UPDATE billing_allowances
                     SET tokens_total = $1, tm_update = $2
                     WHERE id = $3
                     RETURNING {}",
                    ALLOWANCE_COLS
                ),
                &[&new_total, &now, &allowance_id],
            )
            .await?;

        transaction.commit().await.map_err(BillingError::Database)?;

        Ok(row_to_allowance(&row))
    }
}

/// Outcome of an atomic consumption, with post-mutation rows. The
/// allowance is absent for cost types that never touch the token pool.
pub struct ConsumeOutcome {
    pub deduction: Deduction,
    pub allowance: Option<Allowance>,
    pub account: crate::models::Account,
}

/// Consume `units` of usage inside an open transaction. Locks the cycle
/// row first, then the account row; callers must keep that order.
///
/// The account credit check is skipped for unlimited plans. On an
/// insufficient balance the caller must roll back.
pub(crate) async fn consume_tokens_tx(
    transaction: &Transaction<'_>,
    account_id: &Uuid,
    units: i64,
    token_per_unit: i64,
    credit_per_unit: i64,
    at: DateTime<Utc>,
) -> Result<ConsumeOutcome, BillingError> {
    let allowance_row = transaction
        .query_opt(
            &*format!(
                "SELECT {} FROM billing_allowances
                 WHERE account_id = $1
                   AND cycle_start <= $2 AND cycle_end > $2
                   AND tm_delete IS NULL
                 ORDER BY cycle_start DESC
                 LIMIT 1
                 FOR UPDATE",
                ALLOWANCE_COLS
            ),
            &[&account_id, &at],
        )
        .await?;

    // Token-ineligible cost types do not require an open cycle.
    let allowance = match allowance_row {
        Some(row) => Some(row_to_allowance(&row)),
        None if token_per_unit > 0 => return Err(BillingError::NotFound),
        None => None,
    };

    let account_row = transaction
        .query_opt(
            "SELECT id, customer_id, name, detail, plan_type, balance_credit,
                    balance_token, payment_type, payment_method, tm_create, tm_update, tm_delete
             FROM billing_accounts
             WHERE id = $1 AND tm_delete IS NULL
             FOR UPDATE",
            &[&account_id],
        )
        .await?
        .ok_or(BillingError::NotFound)?;

    let account = row_to_account(&account_row);

    let tokens_remaining = allowance.as_ref().map(|a| a.tokens_remaining()).unwrap_or(0);
    let deduction = compute_deduction(tokens_remaining, units, token_per_unit, credit_per_unit);

    // Authorization happens before any UPDATE, so a refusal leaves both
    // rows exactly as they were locked.
    if let Err(e) = authorize_deduction(
        &deduction,
        account.balance_credit,
        account.plan_type.bypasses_balance_check(),
    ) {
        warn!(
            "Insufficient credit on account {}: required {}, available {}",
            account_id, deduction.credit_charged, account.balance_credit
        );
        return Err(e);
    }

    let allowance = match allowance {
        Some(mut a) if deduction.tokens_consumed > 0 => {
            transaction
                .execute(
                    "UPDATE billing_allowances
                     SET tokens_used = tokens_used + $1, tm_update = $2
                     WHERE id = $3",
                    &[&deduction.tokens_consumed, &at, &a.id],
                )
                .await?;
            a.tokens_used += deduction.tokens_consumed;
            a.tm_update = Some(at);
            Some(a)
        }
        other => other,
    };

    let mut account = account;
    if deduction.credit_charged > 0 {
        transaction
            .execute(
                "UPDATE billing_accounts
                 SET balance_credit = balance_credit - $1, tm_update = $2
                 WHERE id = $3",
                &[&deduction.credit_charged, &at, &account_id],
            )
            .await?;
        account.balance_credit -= deduction.credit_charged;
        account.tm_update = Some(at);
    }

    Ok(ConsumeOutcome {
        deduction,
        allowance,
        account,
    })
}
