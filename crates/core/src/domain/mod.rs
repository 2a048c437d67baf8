pub mod conversation;
pub mod message;

pub use conversation::{ConversationHistory, ConversationTurn, Role};
pub use message::{ChatId, IncomingMessage, UserId};
