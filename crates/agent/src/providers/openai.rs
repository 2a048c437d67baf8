use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use curhat_core::config::ProviderConfig;

use super::{send_for_body, ProviderSetupError};
use crate::llm::{ProviderFailure, ReplyProvider};

/// Any OpenAI-compatible `/chat/completions` endpoint. The whole prompt goes
/// out as a single user message.
pub struct OpenAiProvider {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    model: String,
    api_key: SecretString,
    temperature: f32,
    max_output_tokens: u32,
}

impl OpenAiProvider {
    pub fn from_config(
        client: reqwest::Client,
        config: &ProviderConfig,
    ) -> Result<Self, ProviderSetupError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| ProviderSetupError::MissingApiKey(config.name.clone()))?;

        Ok(Self {
            client,
            name: config.name.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn request_body<'a>(&'a self, prompt: &'a str) -> ChatCompletionRequest<'a> {
        ChatCompletionRequest {
            model: &self.model,
            messages: vec![ChatMessage { role: "user", content: prompt }],
            temperature: self.temperature,
            max_tokens: self.max_output_tokens,
        }
    }
}

#[async_trait]
impl ReplyProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .json(&self.request_body(prompt));

        let body = send_for_body(&self.name, request).await?;
        parse_response(&body)
    }
}

pub fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|error| ProviderFailure::Malformed(error.to_string()))?;

    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .and_then(|message| message.content)
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderFailure::EmptyPayload);
    }
    Ok(text.to_string())
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use curhat_core::config::{ProviderConfig, ProviderKind};

    use super::{parse_response, OpenAiProvider};
    use crate::llm::ProviderFailure;

    #[test]
    fn request_body_uses_chat_completions_shape() {
        let mut config = ProviderConfig::defaults_for("fallback", ProviderKind::OpenAi);
        config.api_key = Some("sk-test".to_string().into());
        config.base_url = "http://localhost:11434/v1/".to_string();
        let provider =
            OpenAiProvider::from_config(reqwest::Client::new(), &config).expect("provider");

        assert_eq!(provider.endpoint, "http://localhost:11434/v1/chat/completions");

        let body = serde_json::to_value(provider.request_body("halo")).expect("serialize");
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "halo");
        assert_eq!(body["max_tokens"], 250);
    }

    #[test]
    fn parses_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":" Aku di sini. "}}]}"#;
        assert_eq!(parse_response(body).expect("text"), "Aku di sini.");
    }

    #[test]
    fn missing_content_is_empty_payload() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(matches!(parse_response(body), Err(ProviderFailure::EmptyPayload)));
        assert!(matches!(parse_response("{}"), Err(ProviderFailure::EmptyPayload)));
    }

    #[test]
    fn missing_api_key_is_a_setup_error() {
        let config = ProviderConfig::defaults_for("fallback", ProviderKind::OpenAi);
        assert!(OpenAiProvider::from_config(reqwest::Client::new(), &config).is_err());
    }
}
