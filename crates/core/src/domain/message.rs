use serde::{Deserialize, Serialize};

/// Reply destination on the messaging platform.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatId(pub String);

/// History partition key. Distinct from [`ChatId`] even when the values match.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

impl std::fmt::Display for ChatId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub raw_text: String,
    /// Transport-assigned id joined to every pipeline log line. The
    /// pipeline mints one when absent.
    pub correlation_id: Option<String>,
}

impl IncomingMessage {
    pub fn new(
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        raw_text: impl Into<String>,
    ) -> Self {
        Self {
            chat_id: ChatId(chat_id.into()),
            user_id: UserId(user_id.into()),
            raw_text: raw_text.into(),
            correlation_id: None,
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}
