use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use curhat_core::config::ProviderConfig;
use curhat_core::ConversationHistory;

use crate::llm::{ProviderFailure, ReplyProvider};
use crate::offline::OfflineResponder;
use crate::providers::{build_provider, ProviderSetupError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplySource {
    Provider(String),
    Offline,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainReply {
    pub text: String,
    pub source: ReplySource,
}

struct ProviderLink {
    provider: Arc<dyn ReplyProvider>,
    timeout: Duration,
}

/// Ordered providers, each bounded by its own timeout, ending in the
/// offline responder. The first non-empty text wins; a timed-out call is
/// dropped and its output never used.
pub struct ProviderChain {
    links: Vec<ProviderLink>,
    offline: OfflineResponder,
}

impl Default for ProviderChain {
    fn default() -> Self {
        Self::offline_only()
    }
}

impl ProviderChain {
    pub fn offline_only() -> Self {
        Self { links: Vec::new(), offline: OfflineResponder }
    }

    pub fn from_config(
        client: reqwest::Client,
        providers: &[ProviderConfig],
    ) -> Result<Self, ProviderSetupError> {
        let mut chain = Self::offline_only();
        for config in providers {
            let provider = build_provider(client.clone(), config)?;
            chain = chain.with_provider(provider, Duration::from_millis(config.timeout_ms));
        }
        Ok(chain)
    }

    pub fn with_provider(mut self, provider: Arc<dyn ReplyProvider>, timeout: Duration) -> Self {
        self.links.push(ProviderLink { provider, timeout });
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.links.iter().map(|link| link.provider.name()).collect()
    }

    pub async fn generate(
        &self,
        prompt: &str,
        message: &str,
        history: &ConversationHistory,
        correlation_id: &str,
    ) -> ChainReply {
        for (position, link) in self.links.iter().enumerate() {
            let provider = link.provider.name();
            let started = Instant::now();

            match attempt(link, prompt).await {
                Ok(text) => {
                    info!(
                        event_name = "provider.reply_generated",
                        correlation_id,
                        provider,
                        attempt = position + 1,
                        latency_ms = started.elapsed().as_millis() as u64,
                        "provider produced a reply"
                    );
                    return ChainReply { text, source: ReplySource::Provider(provider.to_string()) };
                }
                Err(failure) => {
                    warn!(
                        event_name = "provider.attempt_failed",
                        correlation_id,
                        provider,
                        attempt = position + 1,
                        failure_class = failure.failure_class(),
                        error = %failure,
                        "provider failed; trying next"
                    );
                }
            }
        }

        info!(
            event_name = "provider.offline_fallback",
            correlation_id,
            providers_tried = self.links.len(),
            "falling back to offline responder"
        );
        ChainReply { text: self.offline.respond(message, history), source: ReplySource::Offline }
    }
}

async fn attempt(link: &ProviderLink, prompt: &str) -> Result<String, ProviderFailure> {
    let text = tokio::time::timeout(link.timeout, link.provider.generate(prompt))
        .await
        .map_err(|_| ProviderFailure::Timeout(link.timeout))??;

    if text.trim().is_empty() {
        return Err(ProviderFailure::EmptyPayload);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use curhat_core::ConversationHistory;

    use super::{ProviderChain, ReplySource};
    use crate::llm::{ProviderFailure, ReplyProvider};

    enum Script {
        Reply(&'static str),
        Fail(fn() -> ProviderFailure),
        Hang,
    }

    struct ScriptedProvider {
        name: &'static str,
        script: Script,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(name: &'static str, script: Script) -> Arc<Self> {
            Arc::new(Self { name, script, calls: AtomicUsize::new(0) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ReplyProvider for ScriptedProvider {
        fn name(&self) -> &str {
            self.name
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderFailure> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.script {
                Script::Reply(text) => Ok((*text).to_string()),
                Script::Fail(make) => Err(make()),
                Script::Hang => {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok("too late".to_string())
                }
            }
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn second_provider_answers_when_first_fails() {
        let first = ScriptedProvider::new("primary", Script::Fail(|| ProviderFailure::Status(503)));
        let second = ScriptedProvider::new("secondary", Script::Reply("X"));
        let chain = ProviderChain::offline_only()
            .with_provider(first.clone(), TIMEOUT)
            .with_provider(second.clone(), TIMEOUT);

        let reply = chain.generate("prompt", "hai", &ConversationHistory::new(), "test").await;

        assert_eq!(reply.text, "X");
        assert_eq!(reply.source, ReplySource::Provider("secondary".to_string()));
        assert_eq!(first.calls(), 1, "no retries inside one provider");
    }

    #[tokio::test]
    async fn first_success_stops_the_chain() {
        let first = ScriptedProvider::new("primary", Script::Reply("dari primary"));
        let second = ScriptedProvider::new("secondary", Script::Reply("dari secondary"));
        let chain = ProviderChain::offline_only()
            .with_provider(first, TIMEOUT)
            .with_provider(second.clone(), TIMEOUT);

        let reply = chain.generate("prompt", "hai", &ConversationHistory::new(), "test").await;

        assert_eq!(reply.text, "dari primary");
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn timeouts_and_empty_text_fall_through_to_offline() {
        let hanging = ScriptedProvider::new("primary", Script::Hang);
        let blank = ScriptedProvider::new("secondary", Script::Reply("   "));
        let broken = ScriptedProvider::new(
            "tertiary",
            Script::Fail(|| ProviderFailure::Transport("reset".into())),
        );
        let chain = ProviderChain::offline_only()
            .with_provider(hanging.clone(), TIMEOUT)
            .with_provider(blank.clone(), TIMEOUT)
            .with_provider(broken.clone(), TIMEOUT);

        let reply = chain.generate("prompt", "hai", &ConversationHistory::new(), "test").await;

        assert_eq!(reply.source, ReplySource::Offline);
        assert!(!reply.text.is_empty());
        assert_eq!((hanging.calls(), blank.calls(), broken.calls()), (1, 1, 1));
    }

    #[tokio::test]
    async fn empty_chain_is_offline_only() {
        let chain = ProviderChain::default();
        assert!(chain.provider_names().is_empty());

        let reply = chain.generate("prompt", "hai", &ConversationHistory::new(), "test").await;
        assert_eq!(reply.source, ReplySource::Offline);
    }
}
