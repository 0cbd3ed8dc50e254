// src/store/accounts.rs
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{CacheKeys, ACCOUNT_CACHE_TTL_SECS};
use crate::error::BillingError;
use crate::models::billing::{Billing, BillingStatus, CostType, ReferenceType, TransactionType};
use crate::models::{Account, PaymentMethod, PaymentType, PlanType};
use crate::store::{map_db_err, Store};

const ACCOUNT_COLS: &str = "id, customer_id, name, detail, plan_type, balance_credit, \
     balance_token, payment_type, payment_method, tm_create, tm_update, tm_delete";

pub(crate) fn row_to_account(row: &tokio_postgres::Row) -> Account {
    let plan_type: String = row.get(4);
    let payment_type: String = row.get(7);
    let payment_method: String = row.get(8);
    Account {
        id: row.get(0),
        customer_id: row.get(1),
        name: row.get(2),
        detail: row.get(3),
        plan_type: PlanType::from_str(&plan_type),
        balance_credit: row.get(5),
        balance_token: row.get(6),
        payment_type: PaymentType::from_str(&payment_type),
        payment_method: PaymentMethod::from_str(&payment_method),
        tm_create: row.get(9),
        tm_update: row.get(10),
        tm_delete: row.get(11),
    }
}

/// Parameters for a balance adjustment applied together with its ledger row.
pub struct BalanceAdjustment {
    pub transaction_type: TransactionType,
    pub reference_type: ReferenceType,
    pub reference_id: Uuid,
    pub cost_type: CostType,
    /// Signed micro-dollar delta on `balance_credit`.
    pub delta_credit: i64,
    /// Signed token delta on `balance_token`.
    pub delta_token: i64,
    /// Reject the adjustment if it would drive a checked balance negative.
    /// Unlimited-plan accounts always pass.
    pub check_sufficiency: bool,
}

impl Store {
    pub async fn account_create(
        &self,
        customer_id: Uuid,
        name: &str,
        detail: &str,
        plan_type: PlanType,
        payment_type: PaymentType,
        payment_method: PaymentMethod,
    ) -> Result<Account, BillingError> {
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
                    "INSERT INTO billing_accounts
                     (id, customer_id, name, detail, plan_type, balance_credit, balance_token,
                      payment_type, payment_method, tm_create, tm_update)
                     VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $7, $8, $8)
                     RETURNING {}",
                    ACCOUNT_COLS
                ),
                &[
                    &id,
                    &customer_id,
                    &name,
                    &detail,
                    &plan_type.as_str(),
                    &payment_type.as_str(),
                    &payment_method.as_str(),
                    &now,
                ],
            )
            .await
            .map_err(map_db_err)?;

        let account = row_to_account(&row);
        info!("Account created: {} (customer {})", account.id, customer_id);
        Ok(account)
    }

    pub async fn account_get(&self, account_id: &Uuid) -> Result<Account, BillingError> {
        let key = CacheKeys::account(account_id);
        if let Ok(Some(cached)) = self.redis.get(&key).await {
            if let Ok(account) = serde_json::from_str::<Account>(&cached) {
                return Ok(account);
            }
        }

        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_accounts WHERE id = $1 AND tm_delete IS NULL",
                    ACCOUNT_COLS
                ),
                &[&account_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        let account = row_to_account(&row);
        if let Ok(serialized) = serde_json::to_string(&account) {
            let _ = self.redis.set(&key, &serialized, ACCOUNT_CACHE_TTL_SECS).await;
        }
        Ok(account)
    }

    pub async fn account_get_by_customer_id(
        &self,
        customer_id: &Uuid,
    ) -> Result<Account, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "SELECT {} FROM billing_accounts
                     WHERE customer_id = $1 AND tm_delete IS NULL
                     ORDER BY tm_create DESC
                     LIMIT 1",
                    ACCOUNT_COLS
                ),
                &[&customer_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        Ok(row_to_account(&row))
    }

    /// Keyset pagination on `tm_create` descending. `token` is the
    /// `tm_create` of the last row from the previous page.
    pub async fn account_list(
        &self,
        limit: i64,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Account>, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let cursor = token.unwrap_or_else(|| self.clock.now());
        let rows = client
            .query(
                &*format!(
                    "SELECT {} FROM billing_accounts
                     WHERE tm_delete IS NULL AND tm_create < $1
                     ORDER BY tm_create DESC
                     LIMIT $2",
                    ACCOUNT_COLS
                ),
                &[&cursor, &limit],
            )
            .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    /// Same keyset pagination restricted to one plan, filtered in SQL so
    /// plan-scoped sweeps never scan the other tiers.
    pub async fn account_list_by_plan(
        &self,
        plan_type: PlanType,
        limit: i64,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Account>, BillingError> {
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let cursor = token.unwrap_or_else(|| self.clock.now());
        let rows = client
            .query(
                &*format!(
                    "SELECT {} FROM billing_accounts
                     WHERE plan_type = $1 AND tm_delete IS NULL AND tm_create < $2
                     ORDER BY tm_create DESC
                     LIMIT $3",
                    ACCOUNT_COLS
                ),
                &[&plan_type.as_str(), &cursor, &limit],
            )
            .await?;

        Ok(rows.iter().map(row_to_account).collect())
    }

    pub async fn account_delete(&self, account_id: &Uuid) -> Result<Account, BillingError> {
        let now = self.clock.now();
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let row = client
            .query_opt(
                &*format!(
                    "UPDATE billing_accounts
                     SET tm_delete = $1, tm_update = $1
                     WHERE id = $2 AND tm_delete IS NULL
                     RETURNING {}",
                    ACCOUNT_COLS
                ),
                &[&now, &account_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        let account = row_to_account(&row);
        let _ = self.redis.delete(&CacheKeys::account(account_id)).await;
        let _ = self
            .redis
            .delete(&CacheKeys::account_by_customer(&account.customer_id))
            .await;
        Ok(account)
    }

    pub async fn account_update_info(
        &self,
        account_id: &Uuid,
        name: &str,
        detail: &str,
    ) -> Result<Account, BillingError> {
        self.account_update(
            account_id,
            "name = $1, detail = $2",
            &[&name, &detail],
        )
        .await
    }

    /// Change the plan tier. Takes effect on the next allowance cycle;
    /// the current cycle keeps its grant.
    pub async fn account_update_plan(
        &self,
        account_id: &Uuid,
        plan_type: PlanType,
    ) -> Result<Account, BillingError> {
        self.account_update(account_id, "plan_type = $1", &[&plan_type.as_str()])
            .await
    }

    pub async fn account_update_payment(
        &self,
        account_id: &Uuid,
        payment_type: PaymentType,
        payment_method: PaymentMethod,
    ) -> Result<Account, BillingError> {
        self.account_update(
            account_id,
            "payment_type = $1, payment_method = $2",
            &[&payment_type.as_str(), &payment_method.as_str()],
        )
        .await
    }

    async fn account_update(
        &self,
        account_id: &Uuid,
        set_clause: &str,
        values: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Account, BillingError> {
        let now = self.clock.now();
        let client = self
            .db_pool
            .get()
            .await
            .map_err(BillingError::Pool)?;

        let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = values.to_vec();
        params.push(&now);
        params.push(&account_id);

        let row = client
            .query_opt(
                &*format!(
                    "UPDATE billing_accounts
                     SET {}, tm_update = ${}
                     WHERE id = ${} AND tm_delete IS NULL
                     RETURNING {}",
                    set_clause,
                    values.len() + 1,
                    values.len() + 2,
                    ACCOUNT_COLS
                ),
                &params,
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        let account = row_to_account(&row);
        let _ = self.redis.delete(&CacheKeys::account(account_id)).await;
        info!("Account updated: {}", account_id);
        Ok(account)
    }

    /// Apply a balance adjustment and record its ledger row in one
    /// transaction. The account row is locked for the duration so the
    /// snapshot columns on the ledger row are exact.
    pub async fn account_adjust_with_ledger(
        &self,
        account_id: &Uuid,
        adj: BalanceAdjustment,
    ) -> Result<(Account, Billing), BillingError> {
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
                    "SELECT {} FROM billing_accounts
                     WHERE id = $1 AND tm_delete IS NULL
                     FOR UPDATE",
                    ACCOUNT_COLS
                ),
                &[&account_id],
            )
            .await?
            .ok_or(BillingError::NotFound)?;

        let account = row_to_account(&row);

        if adj.check_sufficiency && !account.plan_type.bypasses_balance_check() {
            if adj.delta_credit < 0 && account.balance_credit + adj.delta_credit < 0 {
                transaction.rollback().await.ok();
                warn!(
                    "Insufficient credit on account {}: required {}, available {}",
                    account_id, -adj.delta_credit, account.balance_credit
                );
                return Err(BillingError::InsufficientBalance {
                    required: -adj.delta_credit,
                    available: account.balance_credit,
                });
            }
            if adj.delta_token < 0 && account.balance_token + adj.delta_token < 0 {
                transaction.rollback().await.ok();
                return Err(BillingError::InsufficientBalance {
                    required: -adj.delta_token,
                    available: account.balance_token,
                });
            }
        }

        let new_credit = account.balance_credit + adj.delta_credit;
        let new_token = account.balance_token + adj.delta_token;

        transaction
            .execute(
                "UPDATE billing_accounts
                 SET balance_credit = $1, balance_token = $2, tm_update = $3
                 WHERE id = $4",
                &[&new_credit, &new_token, &now, &account_id],
            )
            .await?;

        let billing_id = Uuid::new_v4();
        let insert = transaction
            .execute(
                "INSERT INTO billing_billings
                 (id, customer_id, account_id, transaction_type, status, reference_type,
                  reference_id, cost_type, rate_token_per_unit, rate_credit_per_unit,
                  usage_duration, billable_units, delta_token, delta_credit,
                  balance_token_after, balance_credit_after,
                  tm_billing_start, tm_billing_end, tm_create, tm_update)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 0, 0, 0, 1,
                         $9, $10, $11, $12, $13, $13, $13, $13)",
                &[
                    &billing_id,
                    &account.customer_id,
                    &account_id,
                    &adj.transaction_type.as_str(),
                    &BillingStatus::End.as_str(),
                    &adj.reference_type.as_str(),
                    &adj.reference_id,
                    &adj.cost_type.as_str(),
                    &adj.delta_token,
                    &adj.delta_credit,
                    &new_token,
                    &new_credit,
                    &now,
                ],
            )
            .await;

        if let Err(e) = insert {
            transaction.rollback().await.ok();
            return Err(map_db_err(e));
        }

        transaction.commit().await.map_err(BillingError::Database)?;

        // Cleanup Redis AFTER successful commit
        let _ = self.redis.delete(&CacheKeys::account(account_id)).await;

        let mut updated = account.clone();
        updated.balance_credit = new_credit;
        updated.balance_token = new_token;
        updated.tm_update = Some(now);

        let billing = Billing {
            id: billing_id,
            customer_id: account.customer_id,
            account_id: *account_id,
            transaction_type: adj.transaction_type,
            status: BillingStatus::End,
            reference_type: adj.reference_type,
            reference_id: adj.reference_id,
            cost_type: adj.cost_type,
            rate_token_per_unit: 0,
            rate_credit_per_unit: 0,
            usage_duration: 0,
            billable_units: 1,
            delta_token: adj.delta_token,
            delta_credit: adj.delta_credit,
            balance_token_after: new_token,
            balance_credit_after: new_credit,
            tm_billing_start: Some(now),
            tm_billing_end: Some(now),
            tm_create: Some(now),
            tm_update: Some(now),
            tm_delete: None,
        };

        info!(
            "Balance adjusted on account {}: credit {:+}, token {:+} (billing {})",
            account_id, adj.delta_credit, adj.delta_token, billing_id
        );

        Ok((updated, billing))
    }
}
