use std::sync::Arc;
use std::time::Duration;

use curhat_db::KeyValueStore;
use tokio::task::JoinHandle;

/// Periodically drops expired store entries. A zero interval disables the
/// sweeper.
pub fn spawn_expiry_sweeper(
    store: Arc<dyn KeyValueStore>,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if every.is_zero() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.purge_expired().await {
                Ok(removed) => tracing::debug!(
                    event_name = "system.store.sweep",
                    removed,
                    "expired entries purged"
                ),
                Err(error) => tracing::warn!(
                    event_name = "system.store.sweep_failed",
                    error = %error,
                    "expired entry sweep failed"
                ),
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use curhat_core::ManualClock;
    use curhat_db::{InMemoryKeyValueStore, KeyValueStore};

    use super::spawn_expiry_sweeper;

    #[tokio::test]
    async fn sweeper_purges_the_in_memory_store() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        store.put("ratelimit:1", "0".to_string(), Some(Duration::from_secs(3))).await.expect("put");
        store.put("history:1", "[]".to_string(), None).await.expect("put");
        clock.advance(Duration::from_secs(60));

        let handle = spawn_expiry_sweeper(store.clone(), Duration::from_millis(10))
            .expect("sweeper should start");
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(store.purge_expired().await.expect("purge"), 0, "sweeper already purged");
        assert!(store.get("history:1").await.expect("get").is_some());
    }

    #[test]
    fn zero_interval_disables_the_sweeper() {
        let store = Arc::new(InMemoryKeyValueStore::default());
        assert!(spawn_expiry_sweeper(store, Duration::ZERO).is_none());
    }
}
