use serde::Deserialize;

use curhat_core::config::UserIdentity;
use curhat_core::IncomingMessage;

/// The subset of a Bot API `Update` the bot reacts to. Unknown fields and
/// update kinds are ignored.
#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub chat: Option<Chat>,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct User {
    pub id: i64,
}

impl Update {
    /// Returns `None` for updates without a text message, a chat, or (with
    /// [`UserIdentity::Sender`]) a sender.
    pub fn into_incoming(self, identity: UserIdentity) -> Option<IncomingMessage> {
        let update_id = self.update_id;
        let message = self.message?;
        let chat_id = message.chat?.id;
        let text = message.text?;
        let sender_id = message.from.map(|user| user.id);

        let user_id = match identity {
            UserIdentity::SenderOrChat => sender_id.unwrap_or(chat_id),
            UserIdentity::Sender => sender_id?,
            UserIdentity::Chat => chat_id,
        };

        Some(
            IncomingMessage::new(chat_id.to_string(), user_id.to_string(), text)
                .with_correlation_id(format!("update-{update_id}")),
        )
    }
}
