use std::sync::Arc;
use std::time::Duration;

use curhat_core::{Clock, SystemClock};

use super::{expiry_millis, KeyValueStore, KvError};
use crate::DbPool;

/// Durable store over the `kv_entries` table. Expired rows are invisible to
/// reads and removed by [`KeyValueStore::purge_expired`].
pub struct SqliteKeyValueStore {
    pool: DbPool,
    clock: Arc<dyn Clock>,
}

impl SqliteKeyValueStore {
    pub fn new(pool: DbPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: DbPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait::async_trait]
impl KeyValueStore for SqliteKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let value = sqlx::query_scalar::<_, String>(
            "SELECT value FROM kv_entries
             WHERE key = ? AND (expires_at_ms IS NULL OR expires_at_ms > ?)",
        )
        .bind(key)
        .bind(self.clock.now_millis())
        .fetch_optional(&self.pool)
        .await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at_ms = expiry_millis(self.clock.now_millis(), ttl);
        sqlx::query(
            "INSERT INTO kv_entries (key, value, expires_at_ms) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at_ms = excluded.expires_at_ms",
        )
        .bind(key)
        .bind(value)
        .bind(expires_at_ms)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        sqlx::query("DELETE FROM kv_entries WHERE key = ?").bind(key).execute(&self.pool).await?;
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, KvError> {
        let result = sqlx::query(
            "DELETE FROM kv_entries WHERE expires_at_ms IS NOT NULL AND expires_at_ms <= ?",
        )
        .bind(self.clock.now_millis())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use curhat_core::ManualClock;

    use super::SqliteKeyValueStore;
    use crate::kv::KeyValueStore;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    #[tokio::test]
    async fn put_upserts_and_get_reads_back() {
        let store = SqliteKeyValueStore::new(setup().await);

        store.put("history:1", "[]".to_string(), None).await.expect("put");
        store.put("history:1", "[1]".to_string(), None).await.expect("upsert");

        assert_eq!(store.get("history:1").await.expect("get"), Some("[1]".to_string()));
        assert_eq!(store.get("history:2").await.expect("get missing"), None);
    }

    #[tokio::test]
    async fn expired_rows_are_hidden_then_purged() {
        let clock = Arc::new(ManualClock::new(1_000));
        let pool = setup().await;
        let store = SqliteKeyValueStore::with_clock(pool.clone(), clock.clone());

        store
            .put("ratelimit:7", "1000".to_string(), Some(Duration::from_secs(3)))
            .await
            .expect("put");
        store.put("keep", "v".to_string(), None).await.expect("put");

        clock.advance(Duration::from_secs(3));
        assert_eq!(store.get("ratelimit:7").await.expect("get"), None);

        let purged = store.purge_expired().await.expect("purge");
        assert_eq!(purged, 1);

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM kv_entries")
            .fetch_one(&pool)
            .await
            .expect("count");
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let store = SqliteKeyValueStore::new(setup().await);
        store.put("k", "v".to_string(), None).await.expect("put");

        store.delete("k").await.expect("delete");
        store.delete("k").await.expect("delete again");
        assert_eq!(store.get("k").await.expect("get"), None);
    }
}
