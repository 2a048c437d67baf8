use std::sync::Arc;

use curhat_agent::chain::ProviderChain;
use curhat_agent::providers::ProviderSetupError;
use curhat_agent::{Orchestrator, PromptError};
use curhat_core::config::{AppConfig, ConfigError, LoadOptions};
use curhat_core::SystemClock;
use curhat_db::{
    connect_with_settings, migrations, DbPool, InMemoryKeyValueStore, KeyValueStore,
    SqliteKeyValueStore,
};
use curhat_telegram::TelegramReplySender;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<dyn KeyValueStore>,
    pub db_pool: Option<DbPool>,
    pub http_client: reqwest::Client,
    pub orchestrator: Arc<Orchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("http client construction failed: {0}")]
    HttpClient(#[source] reqwest::Error),
    #[error("provider setup failed: {0}")]
    Provider(#[from] ProviderSetupError),
    #[error("prompt template setup failed: {0}")]
    Prompt(#[from] PromptError),
}

#[cfg_attr(not(test), allow(dead_code))]
pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        store_url = %config.store.url,
        mode = ?config.telegram.mode,
        "starting application bootstrap"
    );

    let (store, db_pool) = if config.store.url.trim() == "memory" {
        info!(
            event_name = "system.bootstrap.store_selected",
            correlation_id = "bootstrap",
            store = "memory",
            "using in-memory store; history is lost on restart"
        );
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::default());
        (store, None)
    } else {
        let pool = connect_with_settings(
            &config.store.url,
            config.store.max_connections,
            config.store.timeout_secs,
        )
        .await
        .map_err(BootstrapError::DatabaseConnect)?;
        info!(
            event_name = "system.bootstrap.database_connected",
            correlation_id = "bootstrap",
            "database connection established"
        );

        migrations::run_pending(&pool).await.map_err(BootstrapError::Migration)?;
        info!(
            event_name = "system.bootstrap.migrations_applied",
            correlation_id = "bootstrap",
            "database migrations applied"
        );

        let store: Arc<dyn KeyValueStore> = Arc::new(SqliteKeyValueStore::new(pool.clone()));
        (store, Some(pool))
    };

    let http_client = reqwest::Client::builder()
        .user_agent(concat!("curhat/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(BootstrapError::HttpClient)?;

    let chain = ProviderChain::from_config(http_client.clone(), &config.providers)?;
    info!(
        event_name = "system.bootstrap.providers_ready",
        correlation_id = "bootstrap",
        providers = ?chain.provider_names(),
        "provider chain assembled"
    );

    let sender = Arc::new(TelegramReplySender::new(
        http_client.clone(),
        &config.telegram.api_base_url,
        config.telegram.bot_token.clone(),
    ));
    let orchestrator =
        Orchestrator::from_config(&config, store.clone(), Arc::new(SystemClock), chain, sender)?;

    Ok(Application {
        config,
        store,
        db_pool,
        http_client,
        orchestrator: Arc::new(orchestrator),
    })
}
