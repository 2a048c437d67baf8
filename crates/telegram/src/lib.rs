//! Telegram Integration - Bot API transport for curhat
//!
//! - **Updates** (`update`) - webhook/getUpdates payloads → `IncomingMessage`
//! - **Replies** (`sender`) - `sendMessage` implementation of `ReplySender`
//! - **Long polling** (`polling`) - `getUpdates` loop with reconnect backoff
//!
//! # Getting Started
//!
//! 1. Create a bot with @BotFather and copy its token
//! 2. Set `CURHAT_TELEGRAM_BOT_TOKEN`
//! 3. Either register the server's `/webhook` URL with `setWebhook`, or set
//!    `CURHAT_TELEGRAM_MODE=polling` (no public URL needed)
//!
//! # Architecture
//!
//! ```text
//! Telegram → webhook / PollingRunner → MessageSink → Orchestrator
//!                                                        ↓
//!                                  TelegramReplySender ← Reply
//! ```

pub mod polling;
pub mod sender;
pub mod update;

pub use polling::{
    BotApiUpdateSource, MessageSink, PollingRunner, ReconnectPolicy, TransportError, UpdateSource,
};
pub use sender::TelegramReplySender;
pub use update::Update;
