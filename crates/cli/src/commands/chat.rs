use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use curhat_agent::chain::ProviderChain;
use curhat_agent::{Orchestrator, Reply, ReplyKind};
use curhat_core::config::AppConfig;
use curhat_core::{IncomingMessage, NoopReplySender, SystemClock};
use curhat_db::{
    connect_with_settings, migrations, DbPool, InMemoryKeyValueStore, KeyValueStore,
    SqliteKeyValueStore,
};
use serde::Serialize;

use crate::commands::{current_thread_runtime, load_options, to_json_line, CommandResult};

#[derive(Debug, Serialize)]
struct ChatOutcome {
    command: &'static str,
    status: &'static str,
    reply_kind: String,
    reply: String,
}

/// Runs `text` through the same pipeline the server uses. The reply is
/// printed instead of being sent to Telegram.
pub fn run(config_path: Option<&Path>, chat_id: &str, user_id: &str, text: &str) -> CommandResult {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match current_thread_runtime() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let message = IncomingMessage::new(chat_id, user_id, text);
    match runtime.block_on(handle_once(&config, &message)) {
        Ok(Some(reply)) => CommandResult {
            exit_code: 0,
            output: to_json_line(&ChatOutcome {
                command: "chat",
                status: "ok",
                reply_kind: describe_kind(&reply.kind),
                reply: reply.text,
            }),
        },
        Ok(None) => CommandResult::success("chat", "message carried no text; nothing to answer"),
        Err(error) => CommandResult::failure("chat", "pipeline_setup", format!("{error:#}"), 4),
    }
}

async fn handle_once(
    config: &AppConfig,
    message: &IncomingMessage,
) -> anyhow::Result<Option<Reply>> {
    let (store, pool) = open_store(config).await?;

    let client = reqwest::Client::builder().build().context("failed to build http client")?;
    let chain = ProviderChain::from_config(client, &config.providers)
        .context("failed to assemble provider chain")?;
    let orchestrator = Orchestrator::from_config(
        config,
        store,
        Arc::new(SystemClock),
        chain,
        Arc::new(NoopReplySender),
    )
    .context("failed to prepare prompt template")?;

    let reply = orchestrator.handle(message).await;
    if let Some(pool) = pool {
        pool.close().await;
    }
    Ok(reply)
}

async fn open_store(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn KeyValueStore>, Option<DbPool>)> {
    if config.store.url.trim() == "memory" {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
        return Ok((store, None));
    }

    let pool =
        connect_with_settings(
            &config.store.url,
            config.store.max_connections,
            config.store.timeout_secs,
        )
            .await
            .with_context(|| format!("failed to connect to store `{}`", config.store.url))?;
    migrations::run_pending(&pool).await.context("failed to apply store migrations")?;

    let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(pool.clone()));
    Ok((store, Some(pool)))
}

fn describe_kind(kind: &ReplyKind) -> String {
    match kind {
        ReplyKind::Command => "command".to_string(),
        ReplyKind::TooLong => "too_long".to_string(),
        ReplyKind::Crisis => "crisis".to_string(),
        ReplyKind::RateLimited => "rate_limited".to_string(),
        ReplyKind::Generated { provider } => format!("generated:{provider}"),
        ReplyKind::Offline => "offline".to_string(),
        ReplyKind::Apology => "apology".to_string(),
    }
}
