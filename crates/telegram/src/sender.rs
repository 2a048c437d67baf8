use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use curhat_core::{ChatId, DeliveryError, ReplySender};

const ERROR_DETAIL_LIMIT: usize = 512;

/// Delivers replies through the Bot API `sendMessage` method as plain text.
pub struct TelegramReplySender {
    client: reqwest::Client,
    api_base_url: String,
    bot_token: SecretString,
}

impl TelegramReplySender {
    pub fn new(client: reqwest::Client, api_base_url: &str, bot_token: SecretString) -> Self {
        Self { client, api_base_url: api_base_url.trim_end_matches('/').to_string(), bot_token }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.api_base_url, self.bot_token.expose_secret())
    }
}

/// Numeric ids go out as numbers, anything else (e.g. `@channel`) as a string.
fn chat_id_value(chat_id: &ChatId) -> Value {
    chat_id.0.parse::<i64>().map(Value::from).unwrap_or_else(|_| Value::from(chat_id.0.clone()))
}

pub(crate) fn send_message_body(chat_id: &ChatId, text: &str) -> Value {
    json!({ "chat_id": chat_id_value(chat_id), "text": text })
}

#[async_trait]
impl ReplySender for TelegramReplySender {
    async fn send_reply(&self, chat_id: &ChatId, text: &str) -> Result<(), DeliveryError> {
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&send_message_body(chat_id, text))
            .send()
            .await
            .map_err(|error| DeliveryError::Transport(error.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                detail: body.chars().take(ERROR_DETAIL_LIMIT).collect(),
            });
        }

        Ok(())
    }
}
