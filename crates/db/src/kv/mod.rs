//! Key-value substrate with optional per-key TTL. Values are opaque strings;
//! there are no cross-key transactions and no compare-and-swap.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the live value for `key`; expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, KvError>;

    /// Replaces the value for `key`. `None` keeps the entry until deleted.
    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError>;

    /// Removes `key`. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), KvError>;

    /// Drops every expired entry and returns how many were removed. Stores
    /// that expire entries on their own keep the default.
    async fn purge_expired(&self) -> Result<u64, KvError> {
        Ok(0)
    }
}

pub(crate) fn expiry_millis(now_millis: i64, ttl: Option<Duration>) -> Option<i64> {
    ttl.map(|ttl| now_millis.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)))
}
