use async_trait::async_trait;
use thiserror::Error;

use crate::domain::message::ChatId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("reply transport failed: {0}")]
    Transport(String),
    #[error("reply rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
}

/// Outbound side of the messaging platform. Failures are reported to the
/// caller, which logs them; nothing is retried.
#[async_trait]
pub trait ReplySender: Send + Sync {
    async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopReplySender;

#[async_trait]
impl ReplySender for NoopReplySender {
    async fn send_reply(&self, _chat_id: &ChatId, _text: &str) -> Result<(), DeliveryError> {
        Ok(())
    }
}
