// src/services/accounts.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::BillingError;
use crate::events::{Event, EventPublisher};
use crate::models::billing::{Billing, CostType, ReferenceType, TransactionType};
use crate::models::{Account, PaymentMethod, PaymentType, PlanType, ResourceType};
use crate::store::accounts::BalanceAdjustment;
use crate::store::Store;

/// Source of current resource counts for plan-limit checks. Inventories
/// live in other services; deployments inject whatever lookup they have.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResourceCounter: Send + Sync {
    async fn count(&self, account_id: &Uuid, resource: ResourceType)
        -> Result<i64, BillingError>;
}

/// Counter backed by the billing ledger: a number counts as owned once
/// its purchase row is recorded.
pub struct LedgerResourceCounter {
    store: Store,
}

impl LedgerResourceCounter {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ResourceCounter for LedgerResourceCounter {
    async fn count(
        &self,
        account_id: &Uuid,
        resource: ResourceType,
    ) -> Result<i64, BillingError> {
        match resource {
            ResourceType::Number => {
                self.store
                    .billing_count_by_cost_type(account_id, CostType::NumberPurchase)
                    .await
            }
        }
    }
}

pub struct AccountService {
    store: Store,
    publisher: Arc<dyn EventPublisher>,
    counter: Arc<dyn ResourceCounter>,
}

impl AccountService {
    pub fn new(
        store: Store,
        publisher: Arc<dyn EventPublisher>,
        counter: Arc<dyn ResourceCounter>,
    ) -> Self {
        Self {
            store,
            publisher,
            counter,
        }
    }

    pub async fn create(
        &self,
        customer_id: Uuid,
        name: &str,
        detail: &str,
        plan_type: PlanType,
        payment_type: PaymentType,
        payment_method: PaymentMethod,
    ) -> Result<Account, BillingError> {
        let account = self
            .store
            .account_create(customer_id, name, detail, plan_type, payment_type, payment_method)
            .await?;
        self.publish_updated("account_created", &account).await;
        Ok(account)
    }

    pub async fn get(&self, account_id: &Uuid) -> Result<Account, BillingError> {
        self.store.account_get(account_id).await
    }

    pub async fn get_by_customer_id(&self, customer_id: &Uuid) -> Result<Account, BillingError> {
        self.store.account_get_by_customer_id(customer_id).await
    }

    pub async fn list(
        &self,
        limit: i64,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Account>, BillingError> {
        self.store.account_list(limit, token).await
    }

    pub async fn update_info(
        &self,
        account_id: &Uuid,
        name: &str,
        detail: &str,
    ) -> Result<Account, BillingError> {
        let account = self.store.account_update_info(account_id, name, detail).await?;
        self.publish_updated("account_updated", &account).await;
        Ok(account)
    }

    /// Move the account to another plan tier. The running allowance
    /// cycle keeps its grant; the new tier applies from the next cycle.
    pub async fn update_plan(
        &self,
        account_id: &Uuid,
        plan_type: PlanType,
    ) -> Result<Account, BillingError> {
        let account = self.store.account_update_plan(account_id, plan_type).await?;
        self.publish_updated("account_updated", &account).await;
        Ok(account)
    }

    pub async fn update_payment(
        &self,
        account_id: &Uuid,
        payment_type: PaymentType,
        payment_method: PaymentMethod,
    ) -> Result<Account, BillingError> {
        let account = self
            .store
            .account_update_payment(account_id, payment_type, payment_method)
            .await?;
        self.publish_updated("account_updated", &account).await;
        Ok(account)
    }

    pub async fn delete(&self, account_id: &Uuid) -> Result<Account, BillingError> {
        let account = self.store.account_delete(account_id).await?;
        self.publish_updated("account_deleted", &account).await;
        Ok(account)
    }

    /// Would acquiring one more resource of this kind stay within the
    /// account's plan cap? Deleted accounts resolve to `NotFound`.
    pub async fn is_valid_resource_limit(
        &self,
        account_id: &Uuid,
        resource: ResourceType,
    ) -> Result<bool, BillingError> {
        let account = self.store.account_get(account_id).await?;
        if account.plan_type.resource_limit(resource).is_none() {
            return Ok(true);
        }

        let current = self.counter.count(account_id, resource).await?;
        let valid = account.plan_type.allows_resource(resource, current);
        if !valid {
            warn!(
                "Resource limit reached on account {}: {:?} count {} at plan {}",
                account_id,
                resource,
                current,
                account.plan_type.as_str()
            );
        }
        Ok(valid)
    }

    /// Top up the credit balance and write the matching ledger row.
    pub async fn add_balance(
        &self,
        account_id: &Uuid,
        amount: i64,
    ) -> Result<(Account, Billing), BillingError> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        let (account, billing) = self
            .store
            .account_adjust_with_ledger(
                account_id,
                BalanceAdjustment {
                    transaction_type: TransactionType::TopUp,
                    reference_type: ReferenceType::Adjustment,
                    reference_id: Uuid::new_v4(),
                    cost_type: CostType::TopUp,
                    delta_credit: amount,
                    delta_token: 0,
                    check_sufficiency: false,
                },
            )
            .await?;
        self.publish_updated("account_updated", &account).await;
        Ok((account, billing))
    }

    /// Deduct from the credit balance with a sufficiency check.
    /// Unlimited-plan accounts may overdraft.
    pub async fn subtract_balance(
        &self,
        account_id: &Uuid,
        amount: i64,
    ) -> Result<(Account, Billing), BillingError> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        let (account, billing) = self
            .store
            .account_adjust_with_ledger(
                account_id,
                BalanceAdjustment {
                    transaction_type: TransactionType::Adjustment,
                    reference_type: ReferenceType::Adjustment,
                    reference_id: Uuid::new_v4(),
                    cost_type: CostType::Adjustment,
                    delta_credit: -amount,
                    delta_token: 0,
                    check_sufficiency: true,
                },
            )
            .await?;
        self.publish_updated("account_updated", &account).await;
        Ok((account, billing))
    }

    /// Grant tokens directly on the account balance with a ledger row.
    pub async fn add_tokens(
        &self,
        account_id: &Uuid,
        amount: i64,
    ) -> Result<(Account, Billing), BillingError> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        let (account, billing) = self
            .store
            .account_adjust_with_ledger(
                account_id,
                BalanceAdjustment {
                    transaction_type: TransactionType::TopUp,
                    reference_type: ReferenceType::Adjustment,
                    reference_id: Uuid::new_v4(),
                    cost_type: CostType::TopUp,
                    delta_credit: 0,
                    delta_token: amount,
                    check_sufficiency: false,
                },
            )
            .await?;
        self.publish_updated("account_updated", &account).await;
        Ok((account, billing))
    }

    pub async fn subtract_tokens(
        &self,
        account_id: &Uuid,
        amount: i64,
    ) -> Result<(Account, Billing), BillingError> {
        if amount <= 0 {
            return Err(BillingError::Validation(
                "amount must be positive".to_string(),
            ));
        }
        let (account, billing) = self
            .store
            .account_adjust_with_ledger(
                account_id,
                BalanceAdjustment {
                    transaction_type: TransactionType::Adjustment,
                    reference_type: ReferenceType::Adjustment,
                    reference_id: Uuid::new_v4(),
                    cost_type: CostType::Adjustment,
                    delta_credit: 0,
                    delta_token: -amount,
                    check_sufficiency: true,
                },
            )
            .await?;
        self.publish_updated("account_updated", &account).await;
        Ok((account, billing))
    }

    // Publication is best effort; a dropped notification never rolls
    // back a committed balance change.
    async fn publish_updated(&self, event_type: &str, account: &Account) {
        let data = match serde_json::to_value(account) {
            Ok(data) => data,
            Err(e) => {
                error!("Failed to serialize account event: {}", e);
                return;
            }
        };
        let event = Event {
            event_type: event_type.to_string(),
            publisher: "billing-manager".to_string(),
            data_type: "account".to_string(),
            data,
        };
        if let Err(e) = self.publisher.publish(&event).await {
            error!("Failed to publish {} for account {}: {}", event_type, account.id, e);
        } else {
            info!("Published {} for account {}", event_type, account.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn limit_check_combines_injected_count_with_plan_cap() {
        let mut counter = MockResourceCounter::new();
        counter
            .expect_count()
            .withf(|_, resource| *resource == ResourceType::Number)
            .returning(|_, _| Ok(5));

        let account_id = Uuid::new_v4();
        let current = counter
            .count(&account_id, ResourceType::Number)
            .await
            .unwrap();
        assert_eq!(current, 5);

        // Basic caps numbers at 5, professional at 20.
        assert!(!PlanType::Basic.allows_resource(ResourceType::Number, current));
        assert!(PlanType::Professional.allows_resource(ResourceType::Number, current));
    }
}
