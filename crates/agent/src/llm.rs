use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Why a provider produced no usable text. Every variant means "try the
/// next provider"; none of them is shown to the user.
#[derive(Debug, Error)]
pub enum ProviderFailure {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("non-success status {0}")]
    Status(u16),
    #[error("response carried no text")]
    EmptyPayload,
    #[error("response could not be parsed: {0}")]
    Malformed(String),
}

impl ProviderFailure {
    pub fn failure_class(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Status(_) => "status",
            Self::EmptyPayload => "empty_payload",
            Self::Malformed(_) => "malformed",
        }
    }
}

impl From<reqwest::Error> for ProviderFailure {
    fn from(error: reqwest::Error) -> Self {
        if let Some(status) = error.status() {
            return Self::Status(status.as_u16());
        }
        if error.is_decode() {
            return Self::Malformed(error.to_string());
        }
        Self::Transport(error.to_string())
    }
}

/// A text-generation capability: one attempt per call, no internal retries.
#[async_trait]
pub trait ReplyProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, ProviderFailure>;
}
