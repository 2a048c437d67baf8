use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use curhat_core::{Clock, SystemClock};

use super::{expiry_millis, KeyValueStore, KvError};

#[derive(Clone, Debug)]
struct Entry {
    value: String,
    expires_at_ms: Option<i64>,
}

impl Entry {
    fn is_live(&self, now_millis: i64) -> bool {
        self.expires_at_ms.map(|expires_at| expires_at > now_millis).unwrap_or(true)
    }
}

/// Process-local store. Expired entries are dropped lazily on access.
pub struct InMemoryKeyValueStore {
    entries: RwLock<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl Default for InMemoryKeyValueStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl InMemoryKeyValueStore {
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { entries: RwLock::new(HashMap::new()), clock }
    }

    #[cfg(test)]
    async fn live_len(&self) -> usize {
        let now = self.clock.now_millis();
        self.entries.read().await.values().filter(|entry| entry.is_live(now)).count()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryKeyValueStore {
    async fn get(&self, key: &str) -> Result<Option<String>, KvError> {
        let now = self.clock.now_millis();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
                Some(_) => {}
            }
        }

        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| !entry.is_live(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn put(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), KvError> {
        let expires_at_ms = expiry_millis(self.clock.now_millis(), ttl);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at_ms });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), KvError> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64, KvError> {
        let now = self.clock.now_millis();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok((before - entries.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use curhat_core::ManualClock;

    use super::InMemoryKeyValueStore;
    use crate::kv::KeyValueStore;

    #[tokio::test]
    async fn put_get_delete_round_trip() {
        let store = InMemoryKeyValueStore::default();

        store.put("ping", "ok".to_string(), None).await.expect("put");
        assert_eq!(store.get("ping").await.expect("get"), Some("ok".to_string()));

        store.delete("ping").await.expect("delete");
        assert_eq!(store.get("ping").await.expect("get after delete"), None);
        store.delete("ping").await.expect("deleting twice is fine");
    }

    #[tokio::test]
    async fn entries_expire_after_their_ttl() {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = InMemoryKeyValueStore::with_clock(clock.clone());

        store.put("short", "v".to_string(), Some(Duration::from_secs(5))).await.expect("put");
        store.put("forever", "v".to_string(), None).await.expect("put");

        clock.advance(Duration::from_millis(4_999));
        assert!(store.get("short").await.expect("get").is_some());

        clock.advance(Duration::from_millis(1));
        assert!(store.get("short").await.expect("get").is_none());
        assert!(store.get("forever").await.expect("get").is_some());
        assert_eq!(store.live_len().await, 1);
    }

    #[tokio::test]
    async fn put_replaces_value_and_ttl() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryKeyValueStore::with_clock(clock.clone());

        store.put("k", "old".to_string(), Some(Duration::from_millis(10))).await.expect("put");
        store.put("k", "new".to_string(), None).await.expect("put");
        clock.advance(Duration::from_secs(60));

        assert_eq!(store.get("k").await.expect("get"), Some("new".to_string()));
    }

    #[tokio::test]
    async fn purge_frees_expired_keys_nobody_reads_again() {
        let clock = Arc::new(ManualClock::new(0));
        let store = InMemoryKeyValueStore::with_clock(clock.clone());

        for index in 0..1_000 {
            store
                .put(&format!("ratelimit:{index}"), "0".to_string(), Some(Duration::from_secs(3)))
                .await
                .expect("put");
        }
        clock.advance(Duration::from_secs(24 * 60 * 60));
        store.put("history:1", "[]".to_string(), Some(Duration::from_secs(60))).await.expect("put");

        assert_eq!(store.entries.read().await.len(), 1_001);
        assert_eq!(store.purge_expired().await.expect("purge"), 1_000);
        assert_eq!(store.entries.read().await.len(), 1);
        assert_eq!(store.live_len().await, 1);
        assert!(store.get("history:1").await.expect("get").is_some());
    }
}
