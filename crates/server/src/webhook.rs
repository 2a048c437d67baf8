use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::get,
    Router,
};
use curhat_core::config::UserIdentity;
use curhat_telegram::{MessageSink, Update};
use tracing::{debug, info, warn};

pub const WEBHOOK_STATUS_TEXT: &str = "OK - Telegram webhook is running ✅";
pub const NO_MESSAGE_TEXT: &str = "No message";
pub const ACCEPTED_TEXT: &str = "OK";

#[derive(Clone)]
pub struct WebhookState {
    sink: Arc<dyn MessageSink>,
    identity: UserIdentity,
}

pub fn router(sink: Arc<dyn MessageSink>, identity: UserIdentity) -> Router {
    Router::new()
        .route("/webhook", get(status).post(receive))
        .with_state(WebhookState { sink, identity })
}

async fn status() -> &'static str {
    WEBHOOK_STATUS_TEXT
}

/// Acknowledges an update as soon as it is parsed. The reply is produced
/// by the sink in the background.
async fn receive(State(state): State<WebhookState>, body: Bytes) -> (StatusCode, &'static str) {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(error) => {
            warn!(
                event_name = "ingress.webhook.malformed",
                error = %error,
                "rejecting malformed webhook payload"
            );
            return (StatusCode::BAD_REQUEST, "Malformed update");
        }
    };

    let update_id = update.update_id;
    match update.into_incoming(state.identity) {
        Some(message) => {
            info!(
                event_name = "ingress.webhook.accepted",
                correlation_id = message.correlation_id.as_deref().unwrap_or_default(),
                chat_id = %message.chat_id,
                "webhook update accepted"
            );
            state.sink.accept(message);
            (StatusCode::OK, ACCEPTED_TEXT)
        }
        None => {
            debug!(
                event_name = "ingress.webhook.no_message",
                update_id,
                "update carries no text message"
            );
            (StatusCode::OK, NO_MESSAGE_TEXT)
        }
    }
}
