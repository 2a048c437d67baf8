use std::sync::Arc;
use std::time::Duration;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use curhat_db::KeyValueStore;
use serde::Serialize;

const PING_KEY: &str = "health:ping";
const PING_VALUE: &str = "ok";
const PING_TTL: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct HealthState {
    store: Arc<dyn KeyValueStore>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub store: HealthCheck,
    pub checked_at: String,
}

pub fn router(store: Arc<dyn KeyValueStore>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { store })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let store = store_check(state.store.as_ref()).await;
    let ready = store.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "curhat-server runtime initialized".to_string(),
        },
        store,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

/// Writes a ping key and reads it back.
async fn store_check(store: &dyn KeyValueStore) -> HealthCheck {
    if let Err(error) = store.put(PING_KEY, PING_VALUE.to_string(), Some(PING_TTL)).await {
        return HealthCheck { status: "degraded", detail: format!("store write failed: {error}") };
    }

    match store.get(PING_KEY).await {
        Ok(Some(value)) if value == PING_VALUE => {
            HealthCheck { status: "ready", detail: format!("store ping={value}") }
        }
        Ok(other) => HealthCheck {
            status: "degraded",
            detail: format!("store returned unexpected ping value: {other:?}"),
        },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("store read failed: {error}") }
        }
    }
}
