use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use curhat_core::{Clock, UserId};

use crate::kv::KeyValueStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub wait_millis: u64,
}

impl RateDecision {
    pub fn allowed() -> Self {
        Self { allowed: true, wait_millis: 0 }
    }

    pub fn wait(wait_millis: u64) -> Self {
        Self { allowed: false, wait_millis }
    }
}

/// Per-user cooldown gate. The mark is the timestamp of the last processed
/// message, stored with a TTL equal to the cooldown so absence means "not
/// cooling down".
///
/// The read and the write are separate store calls. Two messages from the
/// same user arriving together can both observe "allowed" before either
/// mark lands; the store offers no compare-and-swap to close that gap.
///
/// Store failures fail open: the message is allowed and the failure logged.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, cooldown: Duration) -> Self {
        Self { store, clock, cooldown }
    }

    pub fn key(user_id: &UserId) -> String {
        format!("ratelimit:{}", user_id.0)
    }

    pub async fn check_and_mark(&self, user_id: &UserId) -> RateDecision {
        if self.cooldown.is_zero() {
            return RateDecision::allowed();
        }

        let now = self.clock.now_millis();
        if let Some(last_mark) = self.read_mark(user_id).await {
            let elapsed = now.saturating_sub(last_mark);
            let window = i64::try_from(self.cooldown.as_millis()).unwrap_or(i64::MAX);
            if (0..window).contains(&elapsed) {
                return RateDecision::wait(u64::try_from(window - elapsed).unwrap_or(u64::MAX));
            }
        }

        self.write_mark(user_id, now).await;
        RateDecision::allowed()
    }

    /// Opens a fresh cooldown window starting now.
    pub async fn mark(&self, user_id: &UserId) {
        if self.cooldown.is_zero() {
            return;
        }
        self.write_mark(user_id, self.clock.now_millis()).await;
    }

    async fn read_mark(&self, user_id: &UserId) -> Option<i64> {
        let raw = match self.store.get(&Self::key(user_id)).await {
            Ok(raw) => raw?,
            Err(error) => {
                warn!(
                    event_name = "store.rate_limit.read_failed",
                    user_id = %user_id,
                    error = %error,
                    "rate limit mark unreadable; allowing message"
                );
                return None;
            }
        };

        match raw.trim().parse::<i64>() {
            Ok(mark) => Some(mark),
            Err(_) => {
                warn!(
                    event_name = "store.rate_limit.corrupt_mark",
                    user_id = %user_id,
                    "rate limit mark is not a timestamp; ignoring it"
                );
                None
            }
        }
    }

    async fn write_mark(&self, user_id: &UserId, now_millis: i64) {
        let result =
            self.store.put(&Self::key(user_id), now_millis.to_string(), Some(self.cooldown)).await;
        if let Err(error) = result {
            warn!(
                event_name = "store.rate_limit.write_failed",
                user_id = %user_id,
                error = %error,
                "rate limit mark was not persisted"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use curhat_core::{ManualClock, UserId};

    use super::{RateDecision, RateLimiter};
    use crate::kv::{InMemoryKeyValueStore, KeyValueStore, KvError};

    fn limiter(cooldown_ms: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(InMemoryKeyValueStore::with_clock(clock.clone()));
        (RateLimiter::new(store, clock.clone(), Duration::from_millis(cooldown_ms)), clock)
    }

    #[tokio::test]
    async fn second_call_inside_window_waits_for_remaining_time() {
        let (limiter, clock) = limiter(3_000);
        let user = UserId("7".to_string());

        assert_eq!(limiter.check_and_mark(&user).await, RateDecision::allowed());

        clock.advance(Duration::from_millis(1_200));
        let decision = limiter.check_and_mark(&user).await;
        assert!(!decision.allowed);
        assert_eq!(decision.wait_millis, 1_800);

        clock.advance(Duration::from_millis(1_800));
        assert!(limiter.check_and_mark(&user).await.allowed);
    }

    #[tokio::test]
    async fn rejected_call_does_not_extend_the_window() {
        let (limiter, clock) = limiter(3_000);
        let user = UserId("7".to_string());

        assert!(limiter.check_and_mark(&user).await.allowed);
        clock.advance(Duration::from_millis(2_000));
        assert!(!limiter.check_and_mark(&user).await.allowed);
        clock.advance(Duration::from_millis(1_000));
        assert!(limiter.check_and_mark(&user).await.allowed);
    }

    #[tokio::test]
    async fn users_are_limited_independently() {
        let (limiter, _) = limiter(3_000);

        assert!(limiter.check_and_mark(&UserId("1".to_string())).await.allowed);
        assert!(limiter.check_and_mark(&UserId("2".to_string())).await.allowed);
        assert!(!limiter.check_and_mark(&UserId("1".to_string())).await.allowed);
    }

    #[tokio::test]
    async fn explicit_mark_opens_a_new_window() {
        let (limiter, clock) = limiter(3_000);
        let user = UserId("7".to_string());

        limiter.mark(&user).await;
        clock.advance(Duration::from_millis(500));
        assert_eq!(limiter.check_and_mark(&user).await, RateDecision::wait(2_500));
    }

    #[tokio::test]
    async fn zero_cooldown_never_limits() {
        let (limiter, _) = limiter(0);
        let user = UserId("7".to_string());

        assert!(limiter.check_and_mark(&user).await.allowed);
        assert!(limiter.check_and_mark(&user).await.allowed);
    }

    struct BrokenStore;

    #[async_trait]
    impl KeyValueStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, KvError> {
            Err(KvError::Unavailable("offline".to_string()))
        }

        async fn put(
            &self,
            _key: &str,
            _value: String,
            _ttl: Option<Duration>,
        ) -> Result<(), KvError> {
            Err(KvError::Unavailable("offline".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), KvError> {
            Err(KvError::Unavailable("offline".to_string()))
        }
    }

    #[tokio::test]
    async fn store_failures_fail_open() {
        let limiter = RateLimiter::new(
            Arc::new(BrokenStore),
            Arc::new(ManualClock::new(0)),
            Duration::from_secs(3),
        );
        let user = UserId("7".to_string());

        assert!(limiter.check_and_mark(&user).await.allowed);
        assert!(limiter.check_and_mark(&user).await.allowed);
    }
}
