mod bootstrap;
mod dispatch;
mod health;
mod sweeper;
mod webhook;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use curhat_core::config::{AppConfig, LoadOptions, TransportMode};
use curhat_telegram::{BotApiUpdateSource, PollingRunner, ReconnectPolicy};
use tracing_subscriber::EnvFilter;

use crate::dispatch::OrchestratorSink;

fn init_logging(config: &AppConfig) {
    use curhat_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt().with_target(false).with_env_filter(filter);

    match config.logging.format {
        Compact => builder.compact().init(),
        Pretty => builder.pretty().init(),
        Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    let config = AppConfig::load(LoadOptions::default())?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;
    let sink = Arc::new(OrchestratorSink::new(app.orchestrator.clone()));

    sweeper::spawn_expiry_sweeper(
        app.store.clone(),
        Duration::from_secs(app.config.server.sweep_interval_secs),
    );

    let router = health::router(app.store.clone())
        .merge(webhook::router(sink.clone(), app.config.telegram.user_identity));
    let address = format!("{}:{}", app.config.server.bind_address, app.config.server.port);
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind http listener on {address}"))?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        address = %address,
        mode = ?app.config.telegram.mode,
        "curhat-server listening"
    );

    match app.config.telegram.mode {
        TransportMode::Webhook => {
            axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown()).await?;
        }
        TransportMode::Polling => {
            let source = Arc::new(BotApiUpdateSource::new(
                app.http_client.clone(),
                &app.config.telegram.api_base_url,
                app.config.telegram.bot_token.clone(),
                app.config.telegram.poll_timeout_secs,
            ));
            let runner = PollingRunner::new(
                source,
                sink.clone(),
                app.config.telegram.user_identity,
                ReconnectPolicy::default(),
            );
            let server = axum::serve(listener, router).with_graceful_shutdown(wait_for_shutdown());

            tokio::select! {
                result = runner.start() => {
                    result?;
                    tracing::warn!(
                        event_name = "system.server.polling_stopped",
                        correlation_id = "shutdown",
                        "polling runner stopped; shutting down"
                    );
                }
                result = server => result?,
            }
        }
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        in_flight = sink.in_flight(),
        "curhat-server stopping; draining in-flight replies"
    );
    let abandoned =
        sink.drain(Duration::from_secs(app.config.server.graceful_shutdown_secs)).await;
    if abandoned > 0 {
        tracing::warn!(
            event_name = "system.server.drain_timeout",
            correlation_id = "shutdown",
            abandoned,
            "shutdown grace period elapsed with replies still pending"
        );
    }

    if let Some(pool) = &app.db_pool {
        pool.close().await;
    }

    Ok(())
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %error, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(error) => {
                tracing::warn!(error = %error, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
