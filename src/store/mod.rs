// src/store/mod.rs
pub mod accounts;
pub mod allowances;
pub mod billings;
pub mod failed_events;

use std::sync::Arc;

use tokio_postgres::error::SqlState;

use crate::cache::RedisClient;
use crate::clock::Clock;
use crate::database::DbPool;
use crate::error::BillingError;

/// Persistence layer over Postgres with a Redis read cache. All balance
/// mutations go through explicit transactions; rows are locked with
/// `FOR UPDATE` and locks are always taken in the same order (allowance
/// cycle first, then account) so concurrent writers cannot deadlock.
#[derive(Clone)]
pub struct Store {
    pub(crate) db_pool: DbPool,
    pub(crate) redis: RedisClient,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Store {
    pub fn new(db_pool: DbPool, redis: RedisClient, clock: Arc<dyn Clock>) -> Self {
        Self {
            db_pool,
            redis,
            clock,
        }
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

/// Translate unique-constraint violations into `Duplicate` so callers can
/// treat lost insert races as benign.
pub(crate) fn map_db_err(e: tokio_postgres::Error) -> BillingError {
    if let Some(db_err) = e.as_db_error() {
        if db_err.code() == &SqlState::UNIQUE_VIOLATION {
            return BillingError::Duplicate;
        }
    }
    BillingError::Database(e)
}
