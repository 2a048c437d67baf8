use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use curhat_core::config::{AppConfig, RateLimitPolicy};
use curhat_core::domain::conversation::truncate_chars;
use curhat_core::{
    ApplicationError, ChatId, Clock, ConversationTurn, IncomingMessage, ReplySender,
};
use curhat_db::{HistoryStore, KeyValueStore, KvError, RateLimiter};

use crate::chain::{ProviderChain, ReplySource};
use crate::commands::Command;
use crate::guardrails::SafetyClassifier;
use crate::prompt::{PromptBuilder, PromptError};

pub const APOLOGY_TEXT: &str = "Maaf, aku lagi error sebentar. Coba ulang ya \u{1f64f}";
pub const DEFER_NOTICE_TEXT: &str =
    "Sebentar ya, aku baca pelan-pelan dulu pesan kamu \u{1f642}";

#[derive(Clone, Debug)]
pub struct OrchestratorSettings {
    pub max_message_chars: usize,
    pub max_reply_chars: usize,
    pub rate_limit_policy: RateLimitPolicy,
    pub persona: String,
    pub crisis_response: String,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_message_chars: config.conversation.max_message_chars,
            max_reply_chars: config.conversation.max_reply_chars,
            rate_limit_policy: config.rate_limit.policy,
            persona: config.persona.instructions.clone(),
            crisis_response: config.persona.crisis_response.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplyKind {
    Command,
    TooLong,
    Crisis,
    RateLimited,
    Generated { provider: String },
    Offline,
    Apology,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: ChatId,
    pub text: String,
    pub kind: ReplyKind,
}

#[derive(Debug, Error)]
enum PipelineError {
    #[error("history reset failed: {0}")]
    Reset(#[from] KvError),
    #[error("prompt rendering failed: {0}")]
    Prompt(#[from] PromptError),
}

impl From<PipelineError> for ApplicationError {
    fn from(error: PipelineError) -> Self {
        match error {
            PipelineError::Reset(source) => Self::Persistence(source.to_string()),
            PipelineError::Prompt(source) => Self::Internal(source.to_string()),
        }
    }
}

/// Turns one inbound message into at most one reply.
///
/// Order per message: command, length, safety, rate limit, history, prompt,
/// provider chain, history update. Each check may answer directly and skip
/// everything after it. Concurrent messages share nothing but the KV store.
pub struct Orchestrator {
    settings: OrchestratorSettings,
    classifier: SafetyClassifier,
    history: HistoryStore,
    limiter: RateLimiter,
    prompts: PromptBuilder,
    chain: ProviderChain,
    sender: Arc<dyn ReplySender>,
}

impl Orchestrator {
    pub fn new(
        settings: OrchestratorSettings,
        classifier: SafetyClassifier,
        history: HistoryStore,
        limiter: RateLimiter,
        prompts: PromptBuilder,
        chain: ProviderChain,
        sender: Arc<dyn ReplySender>,
    ) -> Self {
        Self { settings, classifier, history, limiter, prompts, chain, sender }
    }

    pub fn from_config(
        config: &AppConfig,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        chain: ProviderChain,
        sender: Arc<dyn ReplySender>,
    ) -> Result<Self, PromptError> {
        let history = HistoryStore::new(
            store.clone(),
            config.conversation.max_turns,
            Duration::from_secs(config.conversation.history_ttl_secs),
        );
        let limiter =
            RateLimiter::new(store, clock, Duration::from_millis(config.rate_limit.cooldown_ms));

        Ok(Self::new(
            OrchestratorSettings::from_config(config),
            SafetyClassifier::new(&config.persona.crisis_keywords),
            history,
            limiter,
            PromptBuilder::new(config.conversation.max_turn_chars)?,
            chain,
            sender,
        ))
    }

    /// Runs the pipeline without delivering the result. Internal faults
    /// become the apology reply; `None` means the input carried no text.
    pub async fn handle(&self, message: &IncomingMessage) -> Option<Reply> {
        let correlation_id = correlation_id_for(message);

        match self.run(message, &correlation_id).await {
            Ok(reply) => reply,
            Err(fault) => {
                let fault = ApplicationError::from(fault);
                error!(
                    event_name = "pipeline.internal_fault",
                    correlation_id = %correlation_id,
                    chat_id = %message.chat_id,
                    user_id = %message.user_id,
                    error_class = fault.error_class(),
                    error = %fault,
                    "message pipeline failed; sending apology"
                );
                Some(self.apology(message.chat_id.clone()))
            }
        }
    }

    /// Handles and delivers one message.
    pub async fn dispatch(&self, message: &IncomingMessage) {
        if let Some(reply) = self.handle(message).await {
            self.deliver(&reply).await;
        }
    }

    /// Fire-and-continue entry for transports. The pipeline runs in its own
    /// task so a panic there still yields the apology.
    pub fn spawn_dispatch(self: &Arc<Self>, message: IncomingMessage) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);

        tokio::spawn(async move {
            let chat_id = message.chat_id.clone();
            let pipeline = Arc::clone(&orchestrator);
            let outcome = tokio::spawn(async move { pipeline.handle(&message).await }).await;

            let reply = match outcome {
                Ok(reply) => reply,
                Err(join_error) => {
                    error!(
                        event_name = "pipeline.task_failed",
                        chat_id = %chat_id,
                        error = %join_error,
                        "message task aborted; sending apology"
                    );
                    Some(orchestrator.apology(chat_id))
                }
            };

            if let Some(reply) = reply {
                orchestrator.deliver(&reply).await;
            }
        })
    }

    async fn run(
        &self,
        message: &IncomingMessage,
        correlation_id: &str,
    ) -> Result<Option<Reply>, PipelineError> {
        let chat_id = &message.chat_id;
        let user_id = &message.user_id;
        let text = message.raw_text.trim();

        if text.is_empty() {
            info!(
                event_name = "pipeline.ignored_empty",
                correlation_id,
                chat_id = %chat_id,
                "message carried no text"
            );
            return Ok(None);
        }

        if let Some(command) = Command::parse(text) {
            if command == Command::Reset {
                self.history.reset(user_id).await?;
            }
            info!(
                event_name = "pipeline.command",
                correlation_id,
                chat_id = %chat_id,
                user_id = %user_id,
                command = command.as_str(),
                "answered command"
            );
            return Ok(Some(self.reply(chat_id, command.reply_text(), ReplyKind::Command)));
        }

        let length = text.chars().count();
        if length > self.settings.max_message_chars {
            info!(
                event_name = "pipeline.too_long",
                correlation_id,
                chat_id = %chat_id,
                user_id = %user_id,
                length,
                limit = self.settings.max_message_chars,
                "message rejected for length"
            );
            let notice = too_long_text(self.settings.max_message_chars);
            return Ok(Some(self.reply(chat_id, &notice, ReplyKind::TooLong)));
        }

        let verdict = self.classifier.classify(text);
        if verdict.is_crisis {
            warn!(
                event_name = "pipeline.crisis",
                correlation_id,
                chat_id = %chat_id,
                user_id = %user_id,
                matched_keyword = verdict.matched_keyword.as_deref().unwrap_or_default(),
                "crisis keyword detected; returning safety message"
            );
            return Ok(Some(self.reply(chat_id, &self.settings.crisis_response, ReplyKind::Crisis)));
        }

        let decision = self.limiter.check_and_mark(user_id).await;
        if !decision.allowed {
            match self.settings.rate_limit_policy {
                RateLimitPolicy::Reject => {
                    info!(
                        event_name = "pipeline.rate_limited",
                        correlation_id,
                        chat_id = %chat_id,
                        user_id = %user_id,
                        wait_ms = decision.wait_millis,
                        "message rejected by cooldown"
                    );
                    let notice = rate_limited_text(decision.wait_millis);
                    return Ok(Some(self.reply(chat_id, &notice, ReplyKind::RateLimited)));
                }
                RateLimitPolicy::Defer => {
                    info!(
                        event_name = "pipeline.deferred",
                        correlation_id,
                        chat_id = %chat_id,
                        user_id = %user_id,
                        wait_ms = decision.wait_millis,
                        "message deferred until cooldown ends"
                    );
                    self.deliver(&self.reply(chat_id, DEFER_NOTICE_TEXT, ReplyKind::RateLimited))
                        .await;
                    tokio::time::sleep(Duration::from_millis(decision.wait_millis)).await;
                    self.limiter.mark(user_id).await;
                }
            }
        }

        let history = self.history.load(user_id).await;
        let prompt = self.prompts.build(&self.settings.persona, &history, text)?;
        let generated = self.chain.generate(&prompt, text, &history, correlation_id).await;
        let reply_text = truncate_chars(generated.text.trim(), self.settings.max_reply_chars);

        let updated = self.history.append(&history, ConversationTurn::user(text));
        let updated =
            self.history.append(&updated, ConversationTurn::assistant(reply_text.clone()));
        if let Err(error) = self.history.save(user_id, &updated).await {
            warn!(
                event_name = "store.history.write_failed",
                correlation_id,
                user_id = %user_id,
                error = %error,
                "history was not persisted; replying anyway"
            );
        }

        let kind = match generated.source {
            ReplySource::Provider(provider) => ReplyKind::Generated { provider },
            ReplySource::Offline => ReplyKind::Offline,
        };
        info!(
            event_name = "pipeline.replied",
            correlation_id,
            chat_id = %chat_id,
            user_id = %user_id,
            kind = ?kind,
            history_len = updated.len(),
            "reply generated"
        );

        Ok(Some(self.reply(chat_id, &reply_text, kind)))
    }

    async fn deliver(&self, reply: &Reply) {
        if let Err(error) = self.sender.send_reply(&reply.chat_id, &reply.text).await {
            error!(
                event_name = "delivery.failed",
                chat_id = %reply.chat_id,
                kind = ?reply.kind,
                error = %error,
                "reply delivery failed"
            );
        }
    }

    fn reply(&self, chat_id: &ChatId, text: &str, kind: ReplyKind) -> Reply {
        Reply { chat_id: chat_id.clone(), text: text.to_string(), kind }
    }

    fn apology(&self, chat_id: ChatId) -> Reply {
        Reply { chat_id, text: APOLOGY_TEXT.to_string(), kind: ReplyKind::Apology }
    }
}

fn correlation_id_for(message: &IncomingMessage) -> String {
    message.correlation_id.clone().unwrap_or_else(|| Uuid::new_v4().to_string())
}

fn too_long_text(limit: usize) -> String {
    format!(
        "Pesan kamu panjang banget \u{1f605} Bisa dipendekin sedikit nggak? (maks {limit} karakter)"
    )
}

fn rate_limited_text(wait_millis: u64) -> String {
    let seconds = wait_millis.div_ceil(1_000).max(1);
    format!("Pelan-pelan ya \u{1f642} Tunggu {seconds} detik lagi, terus kirim pesan kamu lagi.")
}
