//! HTTP-backed [`ReplyProvider`](crate::llm::ReplyProvider) implementations.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use curhat_core::config::{ProviderConfig, ProviderKind};

use crate::llm::{ProviderFailure, ReplyProvider};

pub mod gemini;
pub mod openai;

pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

const ERROR_BODY_LOG_LIMIT: usize = 512;

#[derive(Debug, Error)]
pub enum ProviderSetupError {
    #[error("provider `{0}` has no api key")]
    MissingApiKey(String),
}

pub fn build_provider(
    client: reqwest::Client,
    config: &ProviderConfig,
) -> Result<Arc<dyn ReplyProvider>, ProviderSetupError> {
    let provider: Arc<dyn ReplyProvider> = match config.kind {
        ProviderKind::Gemini => Arc::new(GeminiProvider::from_config(client, config)?),
        ProviderKind::OpenAi => Arc::new(OpenAiProvider::from_config(client, config)?),
    };
    Ok(provider)
}

/// Sends a prepared request and returns the body of a 2xx response.
pub(crate) async fn send_for_body(
    provider: &str,
    request: reqwest::RequestBuilder,
) -> Result<String, ProviderFailure> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let excerpt: String = body.chars().take(ERROR_BODY_LOG_LIMIT).collect();
        debug!(provider, status = %status, body = %excerpt, "provider returned an error body");
        return Err(ProviderFailure::Status(status.as_u16()));
    }

    Ok(response.text().await?)
}
