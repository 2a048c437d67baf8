use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use curhat_core::{ConversationHistory, ConversationTurn, UserId};

use crate::kv::{KeyValueStore, KvError};

/// Per-user conversation memory on top of the KV substrate. Each user owns
/// one key holding the JSON turn list; the whole list is replaced on save.
#[derive(Clone)]
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    max_turns: usize,
    ttl: Duration,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, max_turns: usize, ttl: Duration) -> Self {
        Self { store, max_turns, ttl }
    }

    pub fn key(user_id: &UserId) -> String {
        format!("history:{}", user_id.0)
    }

    /// Missing, unreadable and malformed payloads all load as an empty history.
    pub async fn load(&self, user_id: &UserId) -> ConversationHistory {
        let raw = match self.store.get(&Self::key(user_id)).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ConversationHistory::new(),
            Err(error) => {
                warn!(
                    event_name = "store.history.read_failed",
                    user_id = %user_id,
                    error = %error,
                    "history read failed; continuing with empty history"
                );
                return ConversationHistory::new();
            }
        };

        match serde_json::from_str::<ConversationHistory>(&raw) {
            Ok(history) => history,
            Err(error) => {
                warn!(
                    event_name = "store.history.corrupt_payload",
                    user_id = %user_id,
                    error = %error,
                    "stored history is malformed; treating it as empty"
                );
                ConversationHistory::new()
            }
        }
    }

    pub fn append(
        &self,
        history: &ConversationHistory,
        turn: ConversationTurn,
    ) -> ConversationHistory {
        history.appended(turn, self.max_turns)
    }

    pub async fn save(
        &self,
        user_id: &UserId,
        history: &ConversationHistory,
    ) -> Result<(), KvError> {
        let payload = serde_json::to_string(history)
            .map_err(|error| KvError::Unavailable(format!("history encoding failed: {error}")))?;
        self.store.put(&Self::key(user_id), payload, Some(self.ttl)).await
    }

    pub async fn reset(&self, user_id: &UserId) -> Result<(), KvError> {
        self.store.delete(&Self::key(user_id)).await
    }
}
