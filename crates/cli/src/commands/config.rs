use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use curhat_core::config::AppConfig;
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::load_options;

struct ConfigField {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

fn field(
    key: &'static str,
    value: impl Into<String>,
    env_keys: &'static [&'static str],
) -> ConfigField {
    ConfigField { key, value: value.into(), env_keys }
}

pub fn run(config_path: Option<&Path>) -> String {
    let config = match AppConfig::load(load_options(config_path)) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let file_path = detect_config_path(config_path);
    let file_doc = file_path.as_deref().and_then(load_config_file_doc);

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in effective_fields(&config) {
        let source = field_source(&entry, file_doc.as_ref(), file_path.as_deref());
        lines.push(format!("- {} = {} (source: {source})", entry.key, entry.value));
    }

    if config.providers.is_empty() {
        lines.push("- providers = [] (offline responder only)".to_string());
    }
    for (position, provider) in config.providers.iter().enumerate() {
        let api_key = if provider.api_key.is_some() { "<redacted>" } else { "<unset>" };
        lines.push(format!(
            "- providers[{position}] = {} ({:?}, model={}, timeout_ms={}, api_key={api_key})",
            provider.name, provider.kind, provider.model, provider.timeout_ms
        ));
    }

    lines.join("\n")
}

fn effective_fields(config: &AppConfig) -> Vec<ConfigField> {
    vec![
        field("store.url", config.store.url.clone(), &["CURHAT_STORE_URL"]),
        field(
            "store.max_connections",
            config.store.max_connections.to_string(),
            &["CURHAT_STORE_MAX_CONNECTIONS"],
        ),
        field(
            "telegram.bot_token",
            redact_token(config.telegram.bot_token.expose_secret()),
            &["CURHAT_TELEGRAM_BOT_TOKEN", "TELEGRAM_BOT_TOKEN"],
        ),
        field("telegram.mode", format!("{:?}", config.telegram.mode), &["CURHAT_TELEGRAM_MODE"]),
        field(
            "telegram.user_identity",
            format!("{:?}", config.telegram.user_identity),
            &["CURHAT_TELEGRAM_USER_IDENTITY"],
        ),
        field(
            "conversation.max_turns",
            config.conversation.max_turns.to_string(),
            &["CURHAT_CONVERSATION_MAX_TURNS"],
        ),
        field(
            "conversation.max_message_chars",
            config.conversation.max_message_chars.to_string(),
            &["CURHAT_CONVERSATION_MAX_MESSAGE_CHARS"],
        ),
        field(
            "conversation.history_ttl_secs",
            config.conversation.history_ttl_secs.to_string(),
            &["CURHAT_CONVERSATION_HISTORY_TTL_SECS"],
        ),
        field(
            "rate_limit.cooldown_ms",
            config.rate_limit.cooldown_ms.to_string(),
            &["CURHAT_RATE_LIMIT_COOLDOWN_MS"],
        ),
        field(
            "rate_limit.policy",
            format!("{:?}", config.rate_limit.policy),
            &["CURHAT_RATE_LIMIT_POLICY"],
        ),
        field(
            "persona.crisis_keywords",
            format!("{} keywords", config.persona.crisis_keywords.len()),
            &[],
        ),
        field(
            "server.bind_address",
            config.server.bind_address.clone(),
            &["CURHAT_SERVER_BIND_ADDRESS"],
        ),
        field("server.port", config.server.port.to_string(), &["CURHAT_SERVER_PORT"]),
        field(
            "logging.level",
            config.logging.level.clone(),
            &["CURHAT_LOGGING_LEVEL", "CURHAT_LOG_LEVEL"],
        ),
        field(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CURHAT_LOGGING_FORMAT", "CURHAT_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    [PathBuf::from("curhat.toml"), PathBuf::from("config/curhat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: &Path) -> Option<Value> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(entry: &ConfigField, file_doc: Option<&Value>, file_path: Option<&Path>) -> String {
    if let Some(env_key) = entry.env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, entry.key)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

/// Keeps the numeric bot id, hides the secret half.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once(':') {
        Some((bot_id, _)) => format!("{bot_id}:***"),
        None => "<redacted>".to_string(),
    }
}
