pub mod connection;
pub mod history;
pub mod kv;
pub mod migrations;
pub mod rate_limit;

pub use connection::{connect_with_settings, DbPool};
pub use history::HistoryStore;
pub use kv::{InMemoryKeyValueStore, KeyValueStore, KvError, SqliteKeyValueStore};
pub use rate_limit::{RateDecision, RateLimiter};
