use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use curhat_core::config::ProviderConfig;

use super::{send_for_body, ProviderSetupError};
use crate::llm::{ProviderFailure, ReplyProvider};

/// Google Gemini `generateContent`.
pub struct GeminiProvider {
    client: reqwest::Client,
    name: String,
    endpoint: String,
    api_key: SecretString,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiProvider {
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
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
            api_key,
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        })
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateContentRequest<'a> {
        GenerateContentRequest {
            contents: vec![Content { role: "user", parts: vec![Part { text: prompt }] }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl ReplyProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &str) -> Result<String, ProviderFailure> {
        let request = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", self.api_key.expose_secret())
            .json(&self.request_body(prompt));

        let body = send_for_body(&self.name, request).await?;
        parse_response(&body)
    }
}

/// Concatenates the text parts of the first candidate.
pub fn parse_response(body: &str) -> Result<String, ProviderFailure> {
    let response: GenerateContentResponse = serde_json::from_str(body)
        .map_err(|error| ProviderFailure::Malformed(error.to_string()))?;

    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts.into_iter().filter_map(|part| part.text).collect())
        .unwrap_or_default();

    let text = text.trim();
    if text.is_empty() {
        return Err(ProviderFailure::EmptyPayload);
    }
    Ok(text.to_string())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[cfg(test)]
mod tests {
    use curhat_core::config::{ProviderConfig, ProviderKind};

    use super::{parse_response, GeminiProvider};
    use crate::llm::ProviderFailure;

    fn provider() -> GeminiProvider {
        let mut config = ProviderConfig::defaults_for("primary", ProviderKind::Gemini);
        config.api_key = Some("test-key".to_string().into());
        GeminiProvider::from_config(reqwest::Client::new(), &config).expect("provider")
    }

    #[test]
    fn endpoint_targets_configured_model() {
        assert_eq!(
            provider().endpoint,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn request_body_carries_prompt_and_generation_settings() {
        let body = serde_json::to_value(provider().request_body("USER: hai\nASSISTANT:"))
            .expect("serialize");

        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["text"], "USER: hai\nASSISTANT:");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 250);
        assert!(body["generationConfig"]["temperature"].as_f64().is_some());
    }

    #[test]
    fn parses_first_candidate_text() {
        let body = r#"{"candidates":[{"content":{"parts":[{"text":"  Aku ngerti. "},{"text":"Cerita lagi ya?"}]}}]}"#;
        assert_eq!(parse_response(body).expect("text"), "Aku ngerti. Cerita lagi ya?");
    }

    #[test]
    fn blocked_or_empty_candidates_are_empty_payloads() {
        for body in [
            r#"{"candidates":[]}"#,
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
            r#"{"candidates":[{"finishReason":"SAFETY"}]}"#,
            r#"{"candidates":[{"content":{"parts":[{"text":"   "}]}}]}"#,
        ] {
            assert!(matches!(parse_response(body), Err(ProviderFailure::EmptyPayload)), "{body}");
        }
    }

    #[test]
    fn non_json_is_malformed() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(ProviderFailure::Malformed(_))
        ));
    }
}
