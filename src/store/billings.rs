// src/store/billings.rs
use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::cache::CacheKeys;
use crate::error::BillingError;
use crate::models::billing::{Billing, BillingStatus, CostType, ReferenceType, TransactionType};
use crate::store::allowances::{consume_tokens_tx, ConsumeOutcome};
use crate::store::{map_db_err, Store};

const BILLING_COLS: &str = "id, customer_id, account_id, transaction_type, status, \
     reference_type, reference_id, cost_type, rate_token_per_unit, rate_credit_per_unit, \
     usage_duration, billable_units, delta_token, delta_credit, \
     balance_token_after, balance_credit_after, \
     tm_billing_start, tm_billing_end, tm_create, tm_update, tm_delete";

pub(crate) fn row_to_billing(row: &tokio_postgres::Row) -> Billing {
    let transaction_type: String = row.get(3);
    let status: String = row.get(4);
    let reference_type: String = row.get(5);
    let cost_type: String = row.get(7);
    Billing {
        id: row.get(0),
        customer_id: row.get(1),
        account_id: row.get(2),
        transaction_type: TransactionType::from_str(&transaction_type),
        status: BillingStatus::from_str(&status),
        reference_type: ReferenceType::from_str(&reference_type),
        reference_id: row.get(6),
        cost_type: CostType::from_str(&cost_type),
        rate_token_per_unit: row.get(8),
        rate_credit_per_unit: row.get(9),
        usage_duration: row.get(10),
        billable_units: row.get(11),
        delta_token: row.get(12),
        delta_credit: row.get(13),
        balance_token_after: row.get(14),
        balance_credit_after: row.get(15),
        tm_billing_start: row.get(16),
        tm_billing_end: row.get(17),
        tm_create: row.get(18),
        tm_update: row.get(19),
        tm_delete: row.get(20),
    }
}

impl Store {
    /// Open a usage window: one `Progressing` row per reference. A second
    /// start for the same reference loses to the unique index on
    /// `(reference_type, reference_id)` with `Duplicate`.
    pub async fn billing_start_usage(
        &self,
        customer_id: Uuid,
        account_id: Uuid,
        reference_type: ReferenceType,
        reference_id: Uuid,
        cost_type: CostType,
    ) -> Result<Billing, BillingError> {
        let id = Uuid::new_v4();
        let now = self.clock.now();
        let (token_per_unit, credit_per_unit) = cost_type.default_rates();

        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_one(
                &*format!(
                    "INSERT INTO billing_billings
                     (id, customer_id, account_id, transaction_type, status, reference_type,
                      reference_id, cost_type, rate_token_per_unit, rate_credit_per_unit,
                      usage_duration, billable_units, delta_token, delta_credit,
                      balance_token_after, balance_credit_after,
                      tm_billing_start, tm_create, tm_update)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                             0, 0, 0, 0, 0, 0, $11, $11, $11)
                     RETURNING {}",
                    BILLING_COLS
                ),
                &[
                    &id,
                    &customer_id,
                    &account_id,
                    &TransactionType::Usage.as_str(),
                    &BillingStatus::Progressing.as_str(),
                    &reference_type.as_str(),
                    &reference_id,
                    &cost_type.as_str(),
                    &token_per_unit,
                    &credit_per_unit,
                    &now,
                ],
            )
            .await
            .map_err(map_db_err)?;

        let billing = row_to_billing(&row);
        info!(
            "Billing started: {} ({} {})",
            billing.id,
            reference_type.as_str(),
            reference_id
        );
        Ok(billing)
    }

    pub async fn billing_get(&self, billing_id: &Uuid) -> Result<Billing, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_billings WHERE id = $1 AND tm_delete IS NULL",
                    BILLING_COLS
                ),
                &[&billing_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        Ok(row_to_billing(&row))
    }

    pub async fn billing_get_by_reference(
        &self,
        reference_type: ReferenceType,
        reference_id: &Uuid,
    ) -> Result<Billing, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_billings
                     WHERE reference_type = $1 AND reference_id = $2 AND tm_delete IS NULL",
                    BILLING_COLS
                ),
                &[&reference_type.as_str(), &reference_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        Ok(row_to_billing(&row))
    }

    pub async fn billing_list(
        &self,
        customer_id: Option<Uuid>,
        account_id: Option<Uuid>,
        limit: i64,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Billing>, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let cursor = token.unwrap_or_else(|| self.clock.now());
        let rows = client
            .query(
                &*format!(
                    "SELECT {} FROM billing_billings
                     WHERE tm_delete IS NULL
                       AND tm_create < $1
                       AND ($2::uuid IS NULL OR customer_id = $2)
                       AND ($3::uuid IS NULL OR account_id = $3)
                     ORDER BY tm_create DESC
                     LIMIT $4",
                    BILLING_COLS
                ),
                &[&cursor, &customer_id, &account_id, &limit],
            )
            .await?;

        Ok(rows.iter().map(row_to_billing).collect())
    }

    /// Completed ledger rows of one cost type on an account. Resource
    /// limit checks use this to count owned numbers.
    pub async fn billing_count_by_cost_type(
        &self,
        account_id: &Uuid,
        cost_type: CostType,
    ) -> Result<i64, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_one(
                "SELECT COUNT(*) FROM billing_billings
                 WHERE account_id = $1 AND cost_type = $2 AND status = $3
                   AND tm_delete IS NULL",
                &[
                    &account_id,
                    &cost_type.as_str(),
                    &BillingStatus::End.as_str(),
                ],
            )
            .await?;

        Ok(row.get(0))
    }

    /// Close a usage window without charging anything. Used for zero-cost
    /// reference types and zero-duration windows. Only a `progressing`
    /// row matches; a concurrently closed one yields `Duplicate`.
    pub async fn billing_set_status_end(
        &self,
        billing_id: &Uuid,
        duration_secs: i32,
    ) -> Result<Billing, BillingError> {
        let now = self.clock.now();
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "UPDATE billing_billings
                     SET status = $1, usage_duration = $2, tm_billing_end = $3, tm_update = $3
                     WHERE id = $4 AND status = $5 AND tm_delete IS NULL
                     RETURNING {}",
                    BILLING_COLS
                ),
                &[
                    &BillingStatus::End.as_str(),
                    &duration_secs,
                    &now,
                    &billing_id,
                    &BillingStatus::Progressing.as_str(),
                ],
            )
            .await?
            .ok_or(BillingError::Duplicate)?;

        Ok(row_to_billing(&row))
    }

    /// Close a usage window and charge it in one transaction: consume the
    /// allowance, deduct credit, then finalize the row with the applied
    /// deltas and balance snapshots.
    ///
    /// The finalize UPDATE only matches a `progressing` row. When a
    /// concurrent close won the race the consumption rolls back and the
    /// caller gets `Duplicate`, so replayed hangups cannot charge twice.
    pub async fn billing_finish_usage(
        &self,
        billing: &Billing,
        duration_secs: i32,
        units: i64,
    ) -> Result<(Billing, ConsumeOutcome), BillingError> {
        let now = self.clock.now();

        let mut client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let transaction = client.transaction().await.map_err(BillingError::Database)?;

        let outcome = match consume_tokens_tx(
            &transaction,
            &billing.account_id,
            units,
            billing.rate_token_per_unit,
            billing.rate_credit_per_unit,
            now,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                transaction.rollback().await.ok();
                return Err(e);
            }
        };

        let row = transaction
            .query_opt(
                &*format!(
                    "UPDATE billing_billings
                     SET status = $1, usage_duration = $2, billable_units = $3,
                         delta_token = $4, delta_credit = $5,
                         balance_token_after = $6, balance_credit_after = $7,
                         tm_billing_end = $8, tm_update = $8
                     WHERE id = $9 AND status = $10 AND tm_delete IS NULL
                     RETURNING {}",
                    BILLING_COLS
                ),
                &[
                    &BillingStatus::End.as_str(),
                    &duration_secs,
                    &units,
                    &(-outcome.deduction.tokens_consumed),
                    &(-outcome.deduction.credit_charged),
                    &outcome.account.balance_token,
                    &outcome.account.balance_credit,
                    &now,
                    &billing.id,
                    &BillingStatus::Progressing.as_str(),
                ],
            )
            .await?;

        let row = match row {
            Some(row) => row,
            None => {
                transaction.rollback().await.ok();
                return Err(BillingError::Duplicate);
            }
        };

        transaction.commit().await.map_err(BillingError::Database)?;

        // Cleanup Redis AFTER successful commit
        let _ = self.redis.delete(&CacheKeys::account(&billing.account_id)).await;

        let billing = row_to_billing(&row);
        info!(
            "Billing finished: {} ({} units, {} tokens, {} credit)",
            billing.id, units, outcome.deduction.tokens_consumed, outcome.deduction.credit_charged
        );
        Ok((billing, outcome))
    }

    /// Instant charge: consume and write the completed ledger row in one
    /// transaction. A duplicate reference rolls back with `Duplicate`.
    pub async fn billing_consume_and_record(
        &self,
        customer_id: Uuid,
        account_id: Uuid,
        reference_type: ReferenceType,
        reference_id: Uuid,
        cost_type: CostType,
        units: i64,
    ) -> Result<(Billing, ConsumeOutcome), BillingError> {
        let id = Uuid::new_v4();
        let now = self.clock.now();
        let (token_per_unit, credit_per_unit) = cost_type.default_rates();

        let mut client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let transaction = client.transaction().await.map_err(BillingError::Database)?;

        let outcome = match consume_tokens_tx(
            &transaction,
            &account_id,
            units,
            token_per_unit,
            credit_per_unit,
            now,
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                transaction.rollback().await.ok();
                return Err(e);
            }
        };

        let insert = transaction
            .query_one(
                &*format!(
                    "INSERT INTO billing_billings
                     (id, customer_id, account_id, transaction_type, status, reference_type,
                      reference_id, cost_type, rate_token_per_unit, rate_credit_per_unit,
                      usage_duration, billable_units, delta_token, delta_credit,
                      balance_token_after, balance_credit_after,
                      tm_billing_start, tm_billing_end, tm_create, tm_update)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                             0, $11, $12, $13, $14, $15, $16, $16, $16, $16)
                     RETURNING {}",
                    BILLING_COLS
                ),
                &[
                    &id,
                    &customer_id,
                    &account_id,
                    &TransactionType::Usage.as_str(),
                    &BillingStatus::End.as_str(),
                    &reference_type.as_str(),
                    &reference_id,
                    &cost_type.as_str(),
                    &token_per_unit,
                    &credit_per_unit,
                    &units,
                    &(-outcome.deduction.tokens_consumed),
                    &(-outcome.deduction.credit_charged),
                    &outcome.account.balance_token,
                    &outcome.account.balance_credit,
                    &now,
                ],
            )
            .await;

        let row = match insert {
            Ok(row) => row,
            Err(e) => {
                transaction.rollback().await.ok();
                return Err(map_db_err(e));
            }
        };

        transaction.commit().await.map_err(BillingError::Database)?;

        // Cleanup Redis AFTER successful commit
        let _ = self.redis.delete(&CacheKeys::account(&account_id)).await;

        let billing = row_to_billing(&row);
        info!(
            "Instant billing recorded: {} ({} {})",
            billing.id,
            reference_type.as_str(),
            reference_id
        );
        Ok((billing, outcome))
    }
}
