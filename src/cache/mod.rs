// src/cache/mod.rs
pub mod redis_client;

pub use redis_client::RedisClient;

use uuid::Uuid;

/// TTL for cached account rows.
pub const ACCOUNT_CACHE_TTL_SECS: usize = 300;

/// Helper for generating consistent cache keys
pub struct CacheKeys;

impl CacheKeys {
    /// Key for an account row: `account:{uuid}`
    pub fn account(account_id: &Uuid) -> String {
        format!("account:{}", account_id)
    }

    /// Key for the customer-to-account mapping: `account_by_customer:{uuid}`
    pub fn account_by_customer(customer_id: &Uuid) -> String {
        format!("account_by_customer:{}", customer_id)
    }
}
