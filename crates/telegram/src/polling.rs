use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info, warn};

use curhat_core::config::UserIdentity;
use curhat_core::IncomingMessage;

use crate::update::Update;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("update fetch failed: {0}")]
    Fetch(String),
    #[error("update batch rejected by bot api: {0}")]
    Rejected(String),
    #[error("update batch could not be decoded: {0}")]
    Decode(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated before the runner stops. `None` keeps
    /// retrying at `max_delay_ms` for as long as the process runs.
    pub max_retries: Option<u32>,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: None, base_delay_ms: 500, max_delay_ms: 30_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// A source of update batches. Passing `offset` acknowledges every update
/// below it. `Ok(None)` means the source is closed.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn next_batch(&self, offset: Option<i64>) -> Result<Option<Vec<Update>>, TransportError>;
}

/// Receives parsed messages. Must return promptly; processing belongs in a
/// separate task.
pub trait MessageSink: Send + Sync {
    fn accept(&self, message: IncomingMessage);
}

/// Long-polls `getUpdates`.
pub struct BotApiUpdateSource {
    client: reqwest::Client,
    api_base_url: String,
    bot_token: SecretString,
    poll_timeout_secs: u64,
}

impl BotApiUpdateSource {
    pub fn new(
        client: reqwest::Client,
        api_base_url: &str,
        bot_token: SecretString,
        poll_timeout_secs: u64,
    ) -> Self {
        Self {
            client,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            bot_token,
            poll_timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize)]
struct GetUpdatesResponse {
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
    #[serde(default)]
    description: Option<String>,
}

fn decode_batch(body: &str) -> Result<Vec<Update>, TransportError> {
    let response: GetUpdatesResponse =
        serde_json::from_str(body).map_err(|error| TransportError::Decode(error.to_string()))?;
    if !response.ok {
        return Err(TransportError::Rejected(
            response.description.unwrap_or_else(|| "no description".to_string()),
        ));
    }
    Ok(response.result)
}

#[async_trait]
impl UpdateSource for BotApiUpdateSource {
    async fn next_batch(&self, offset: Option<i64>) -> Result<Option<Vec<Update>>, TransportError> {
        let url =
            format!("{}/bot{}/getUpdates", self.api_base_url, self.bot_token.expose_secret());
        let response = self
            .client
            .post(url)
            .timeout(Duration::from_secs(self.poll_timeout_secs + 10))
            .json(&json!({
                "offset": offset,
                "timeout": self.poll_timeout_secs,
                "allowed_updates": ["message"],
            }))
            .send()
            .await
            .map_err(|error| TransportError::Fetch(error.without_url().to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|error| TransportError::Fetch(error.without_url().to_string()))?;
        decode_batch(&body).map(Some)
    }
}

pub struct PollingRunner {
    source: Arc<dyn UpdateSource>,
    sink: Arc<dyn MessageSink>,
    identity: UserIdentity,
    reconnect_policy: ReconnectPolicy,
}

impl PollingRunner {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        sink: Arc<dyn MessageSink>,
        identity: UserIdentity,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { source, sink, identity, reconnect_policy }
    }

    /// Pumps updates until the source closes or consecutive failures exceed
    /// a bounded retry budget. Neither case is an error for the process.
    pub async fn start(&self) -> Result<()> {
        let mut offset: Option<i64> = None;
        let mut failures: u32 = 0;

        loop {
            match self.source.next_batch(offset).await {
                Ok(Some(batch)) => {
                    failures = 0;
                    for update in batch {
                        offset = Some(offset.map_or(update.update_id + 1, |current| {
                            current.max(update.update_id + 1)
                        }));
                        self.forward(update);
                    }
                }
                Ok(None) => {
                    info!(event_name = "ingress.telegram.source_closed", "update source closed");
                    return Ok(());
                }
                Err(transport_error) => {
                    warn!(
                        attempt = failures,
                        max_retries = ?self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "telegram polling failed"
                    );

                    if let Some(max_retries) =
                        self.reconnect_policy.max_retries.filter(|max| failures >= *max)
                    {
                        warn!(
                            max_retries,
                            "telegram polling retries exhausted; stopping runner without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(failures);
                    failures = failures.saturating_add(1);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }

    fn forward(&self, update: Update) {
        let update_id = update.update_id;
        let Some(message) = update.into_incoming(self.identity) else {
            debug!(
                event_name = "ingress.telegram.update_skipped",
                update_id,
                "update carries no text message"
            );
            return;
        };

        info!(
            event_name = "ingress.telegram.update_received",
            correlation_id = message.correlation_id.as_deref().unwrap_or_default(),
            chat_id = %message.chat_id,
            user_id = %message.user_id,
            "received telegram message"
        );
        self.sink.accept(message);
    }
}
