//! Core domain for the curhat companion bot: conversation turns and
//! histories, inbound message identities, the reply delivery port, the
//! injectable clock, default persona data and layered configuration.

pub mod clock;
pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod persona;

pub use clock::{Clock, ManualClock, SystemClock};
pub use delivery::{DeliveryError, NoopReplySender, ReplySender};
pub use domain::conversation::{ConversationHistory, ConversationTurn, Role};
pub use domain::message::{ChatId, IncomingMessage, UserId};
pub use errors::ApplicationError;
