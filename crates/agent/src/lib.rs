//! Response orchestration for the curhat companion bot.
//!
//! One inbound message plus the sender's stored history becomes exactly one
//! outbound reply:
//! 1. **Commands** (`commands`) - static texts and `/reset`
//! 2. **Safety triage** (`guardrails`) - crisis keywords short-circuit everything
//! 3. **Rate limiting** - per-user cooldown, reject or defer
//! 4. **Prompting** (`prompt`) - persona, trimmed transcript, new message
//! 5. **Generation** (`chain`) - ordered providers, then the `offline` responder
//!
//! # Key Types
//!
//! - `Orchestrator` - the single entry point (see `runtime` module)
//! - `ReplyProvider` - pluggable trait for Gemini and OpenAI-compatible APIs
//! - `SafetyClassifier` - keyword heuristic, runs before any network call

pub mod chain;
pub mod commands;
pub mod guardrails;
pub mod llm;
pub mod offline;
pub mod prompt;
pub mod providers;
pub mod runtime;

pub use chain::{ChainReply, ProviderChain, ReplySource};
pub use guardrails::{SafetyClassifier, SafetyVerdict};
pub use llm::{ProviderFailure, ReplyProvider};
pub use offline::OfflineResponder;
pub use prompt::{PromptBuilder, PromptError};
pub use runtime::{Orchestrator, OrchestratorSettings, Reply, ReplyKind};
