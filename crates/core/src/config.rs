use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::persona;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub store: StoreConfig,
    pub telegram: TelegramConfig,
    pub providers: Vec<ProviderConfig>,
    pub conversation: ConversationConfig,
    pub rate_limit: RateLimitConfig,
    pub persona: PersonaConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    pub api_base_url: String,
    pub mode: TransportMode,
    pub user_identity: UserIdentity,
    pub poll_timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub max_turns: usize,
    pub max_turn_chars: usize,
    pub max_message_chars: usize,
    pub max_reply_chars: usize,
    pub history_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct RateLimitConfig {
    pub cooldown_ms: u64,
    pub policy: RateLimitPolicy,
}

#[derive(Clone, Debug)]
pub struct PersonaConfig {
    pub instructions: String,
    pub crisis_keywords: Vec<String>,
    pub crisis_response: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportMode {
    Webhook,
    Polling,
}

/// Which inbound identifier partitions history.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserIdentity {
    /// Sender id, or the chat id when the platform omits the sender.
    SenderOrChat,
    /// Sender id only; messages without a sender are dropped.
    Sender,
    /// Always the chat id.
    Chat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitPolicy {
    /// Tell the user to retry later and drop the message.
    Reject,
    /// Acknowledge, wait out the cooldown, then process the message.
    Defer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "gemini")]
    Gemini,
    #[serde(rename = "openai")]
    OpenAi,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub store_url: Option<String>,
    pub log_level: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_mode: Option<TransportMode>,
    pub rate_limit_policy: Option<RateLimitPolicy>,
    pub cooldown_ms: Option<u64>,
    pub provider_order: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig {
                url: "sqlite://curhat.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            telegram: TelegramConfig {
                bot_token: String::new().into(),
                api_base_url: "https://api.telegram.org".to_string(),
                mode: TransportMode::Webhook,
                user_identity: UserIdentity::SenderOrChat,
                poll_timeout_secs: 30,
            },
            providers: vec![
                ProviderConfig::defaults_for("primary", ProviderKind::Gemini),
                ProviderConfig {
                    model: "gemini-2.0-flash-lite".to_string(),
                    ..ProviderConfig::defaults_for("secondary", ProviderKind::Gemini)
                },
            ],
            conversation: ConversationConfig {
                max_turns: 14,
                max_turn_chars: 1_500,
                max_message_chars: 4_000,
                max_reply_chars: 2_000,
                history_ttl_secs: 86_400,
            },
            rate_limit: RateLimitConfig { cooldown_ms: 3_000, policy: RateLimitPolicy::Reject },
            persona: PersonaConfig {
                instructions: persona::DEFAULT_INSTRUCTIONS.to_string(),
                crisis_keywords: persona::default_crisis_keywords(),
                crisis_response: persona::DEFAULT_CRISIS_RESPONSE.to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
                sweep_interval_secs: 600,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl ProviderConfig {
    pub fn defaults_for(name: &str, kind: ProviderKind) -> Self {
        let (model, base_url) = match kind {
            ProviderKind::Gemini => {
                ("gemini-2.5-flash", "https://generativelanguage.googleapis.com/v1beta")
            }
            ProviderKind::OpenAi => ("gpt-4o-mini", "https://api.openai.com/v1"),
        };

        Self {
            name: name.to_string(),
            kind,
            model: model.to_string(),
            api_key: None,
            base_url: base_url.to_string(),
            timeout_ms: 15_000,
            temperature: 0.8,
            max_output_tokens: 250,
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for TransportMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "webhook" => Ok(Self::Webhook),
            "polling" => Ok(Self::Polling),
            other => Err(ConfigError::Validation(format!(
                "unsupported telegram mode `{other}` (expected webhook|polling)"
            ))),
        }
    }
}

impl std::str::FromStr for UserIdentity {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "sender_or_chat" => Ok(Self::SenderOrChat),
            "sender" => Ok(Self::Sender),
            "chat" => Ok(Self::Chat),
            other => Err(ConfigError::Validation(format!(
                "unsupported user identity `{other}` (expected sender_or_chat|sender|chat)"
            ))),
        }
    }
}

impl std::str::FromStr for RateLimitPolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "defer" => Ok(Self::Defer),
            other => Err(ConfigError::Validation(format!(
                "unsupported rate limit policy `{other}` (expected reject|defer)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("curhat.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        let env_order = config.apply_env_overrides()?;
        let override_order = config.apply_overrides(options.overrides);
        if let Some(order) = override_order.or(env_order) {
            config.apply_provider_order(&order)?;
        }
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(store) = patch.store {
            if let Some(url) = store.url {
                self.store.url = url;
            }
            if let Some(max_connections) = store.max_connections {
                self.store.max_connections = max_connections;
            }
            if let Some(timeout_secs) = store.timeout_secs {
                self.store.timeout_secs = timeout_secs;
            }
        }

        if let Some(telegram) = patch.telegram {
            if let Some(bot_token_value) = telegram.bot_token {
                self.telegram.bot_token = secret_value(bot_token_value);
            }
            if let Some(api_base_url) = telegram.api_base_url {
                self.telegram.api_base_url = api_base_url;
            }
            if let Some(mode) = telegram.mode {
                self.telegram.mode = mode;
            }
            if let Some(user_identity) = telegram.user_identity {
                self.telegram.user_identity = user_identity;
            }
            if let Some(poll_timeout_secs) = telegram.poll_timeout_secs {
                self.telegram.poll_timeout_secs = poll_timeout_secs;
            }
        }

        if let Some(providers) = patch.providers {
            self.providers = providers.into_iter().map(ProviderPatch::into_config).collect();
        }

        if let Some(conversation) = patch.conversation {
            if let Some(max_turns) = conversation.max_turns {
                self.conversation.max_turns = max_turns;
            }
            if let Some(max_turn_chars) = conversation.max_turn_chars {
                self.conversation.max_turn_chars = max_turn_chars;
            }
            if let Some(max_message_chars) = conversation.max_message_chars {
                self.conversation.max_message_chars = max_message_chars;
            }
            if let Some(max_reply_chars) = conversation.max_reply_chars {
                self.conversation.max_reply_chars = max_reply_chars;
            }
            if let Some(history_ttl_secs) = conversation.history_ttl_secs {
                self.conversation.history_ttl_secs = history_ttl_secs;
            }
        }

        if let Some(rate_limit) = patch.rate_limit {
            if let Some(cooldown_ms) = rate_limit.cooldown_ms {
                self.rate_limit.cooldown_ms = cooldown_ms;
            }
            if let Some(policy) = rate_limit.policy {
                self.rate_limit.policy = policy;
            }
        }

        if let Some(persona) = patch.persona {
            if let Some(instructions) = persona.instructions {
                self.persona.instructions = instructions;
            }
            if let Some(crisis_keywords) = persona.crisis_keywords {
                self.persona.crisis_keywords = crisis_keywords;
            }
            if let Some(crisis_response) = persona.crisis_response {
                self.persona.crisis_response = crisis_response;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(sweep_interval_secs) = server.sweep_interval_secs {
                self.server.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    /// Applies `CURHAT_*` variables. Returns the provider order requested
    /// through the environment, if any.
    fn apply_env_overrides(&mut self) -> Result<Option<Vec<String>>, ConfigError> {
        if let Some(value) = read_env("CURHAT_STORE_URL") {
            self.store.url = value;
        }
        if let Some(value) = read_env("CURHAT_STORE_MAX_CONNECTIONS") {
            self.store.max_connections = parse_u32("CURHAT_STORE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_STORE_TIMEOUT_SECS") {
            self.store.timeout_secs = parse_u64("CURHAT_STORE_TIMEOUT_SECS", &value)?;
        }

        let bot_token =
            read_env("CURHAT_TELEGRAM_BOT_TOKEN").or_else(|| read_env("TELEGRAM_BOT_TOKEN"));
        if let Some(value) = bot_token {
            self.telegram.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("CURHAT_TELEGRAM_API_BASE_URL") {
            self.telegram.api_base_url = value;
        }
        if let Some(value) = read_env("CURHAT_TELEGRAM_MODE") {
            self.telegram.mode = value.parse()?;
        }
        if let Some(value) = read_env("CURHAT_TELEGRAM_USER_IDENTITY") {
            self.telegram.user_identity = value.parse()?;
        }
        if let Some(value) = read_env("CURHAT_TELEGRAM_POLL_TIMEOUT_SECS") {
            self.telegram.poll_timeout_secs =
                parse_u64("CURHAT_TELEGRAM_POLL_TIMEOUT_SECS", &value)?;
        }

        let gemini_key = read_env("CURHAT_GEMINI_API_KEY").or_else(|| read_env("GEMINI_API_KEY"));
        if let Some(value) = gemini_key {
            self.fill_missing_api_keys(ProviderKind::Gemini, &value);
        }
        let openai_key = read_env("CURHAT_OPENAI_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = openai_key {
            self.fill_missing_api_keys(ProviderKind::OpenAi, &value);
        }
        if let Some(value) = read_env("CURHAT_PROVIDER_TIMEOUT_MS") {
            let timeout_ms = parse_u64("CURHAT_PROVIDER_TIMEOUT_MS", &value)?;
            for provider in &mut self.providers {
                provider.timeout_ms = timeout_ms;
            }
        }

        if let Some(value) = read_env("CURHAT_CONVERSATION_MAX_TURNS") {
            self.conversation.max_turns = parse_usize("CURHAT_CONVERSATION_MAX_TURNS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_CONVERSATION_MAX_TURN_CHARS") {
            self.conversation.max_turn_chars =
                parse_usize("CURHAT_CONVERSATION_MAX_TURN_CHARS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_CONVERSATION_MAX_MESSAGE_CHARS") {
            self.conversation.max_message_chars =
                parse_usize("CURHAT_CONVERSATION_MAX_MESSAGE_CHARS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_CONVERSATION_MAX_REPLY_CHARS") {
            self.conversation.max_reply_chars =
                parse_usize("CURHAT_CONVERSATION_MAX_REPLY_CHARS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_CONVERSATION_HISTORY_TTL_SECS") {
            self.conversation.history_ttl_secs =
                parse_u64("CURHAT_CONVERSATION_HISTORY_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("CURHAT_RATE_LIMIT_COOLDOWN_MS") {
            self.rate_limit.cooldown_ms = parse_u64("CURHAT_RATE_LIMIT_COOLDOWN_MS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_RATE_LIMIT_POLICY") {
            self.rate_limit.policy = value.parse()?;
        }

        if let Some(value) = read_env("CURHAT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("CURHAT_SERVER_PORT") {
            self.server.port = parse_u16("CURHAT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("CURHAT_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("CURHAT_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("CURHAT_SERVER_SWEEP_INTERVAL_SECS") {
            self.server.sweep_interval_secs =
                parse_u64("CURHAT_SERVER_SWEEP_INTERVAL_SECS", &value)?;
        }

        let log_level = read_env("CURHAT_LOGGING_LEVEL").or_else(|| read_env("CURHAT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("CURHAT_LOGGING_FORMAT").or_else(|| read_env("CURHAT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(read_env("CURHAT_PROVIDER_ORDER").map(|value| split_names(&value)))
    }

    /// Applies programmatic overrides. Returns the requested provider order, if any.
    fn apply_overrides(&mut self, overrides: ConfigOverrides) -> Option<Vec<String>> {
        if let Some(store_url) = overrides.store_url {
            self.store.url = store_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(bot_token) = overrides.telegram_bot_token {
            self.telegram.bot_token = secret_value(bot_token);
        }
        if let Some(mode) = overrides.telegram_mode {
            self.telegram.mode = mode;
        }
        if let Some(policy) = overrides.rate_limit_policy {
            self.rate_limit.policy = policy;
        }
        if let Some(cooldown_ms) = overrides.cooldown_ms {
            self.rate_limit.cooldown_ms = cooldown_ms;
        }

        overrides.provider_order
    }

    fn fill_missing_api_keys(&mut self, kind: ProviderKind, value: &str) {
        for provider in self.providers.iter_mut().filter(|provider| provider.kind == kind) {
            if provider.api_key.is_none() {
                provider.api_key = Some(secret_value(value.to_string()));
            }
        }
    }

    /// Reorders and filters the provider list to exactly `order`.
    fn apply_provider_order(&mut self, order: &[String]) -> Result<(), ConfigError> {
        let mut remaining = std::mem::take(&mut self.providers);
        let mut ordered = Vec::with_capacity(order.len());

        for name in order {
            let Some(index) = remaining.iter().position(|provider| &provider.name == name) else {
                let known = remaining
                    .iter()
                    .chain(ordered.iter())
                    .map(|provider: &ProviderConfig| provider.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(ConfigError::Validation(format!(
                    "provider order names unknown or duplicate provider `{name}` (configured: {known})"
                )));
            };
            ordered.push(remaining.remove(index));
        }

        self.providers = ordered;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_store(&self.store)?;
        validate_telegram(&self.telegram)?;
        validate_providers(&self.providers)?;
        validate_conversation(&self.conversation)?;
        validate_persona(&self.persona)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("curhat.toml"), PathBuf::from("config/curhat.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_store(store: &StoreConfig) -> Result<(), ConfigError> {
    let url = store.url.trim();
    let supported = url == "memory" || url.starts_with("sqlite://") || url.starts_with("sqlite::");
    if !supported {
        return Err(ConfigError::Validation(
            "store.url must be `memory` or a sqlite URL (`sqlite://...` or `sqlite::...`)"
                .to_string(),
        ));
    }

    if store.max_connections == 0 {
        return Err(ConfigError::Validation(
            "store.max_connections must be greater than zero".to_string(),
        ));
    }

    if store.timeout_secs == 0 || store.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "store.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_telegram(telegram: &TelegramConfig) -> Result<(), ConfigError> {
    let bot_token = telegram.bot_token.expose_secret();
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "telegram.bot_token is required. Create a bot with @BotFather and copy the token it gives you".to_string(),
        ));
    }

    let well_formed = bot_token
        .split_once(':')
        .map(|(bot_id, secret)| {
            !bot_id.is_empty()
                && bot_id.bytes().all(|byte| byte.is_ascii_digit())
                && !secret.is_empty()
        })
        .unwrap_or(false);
    if !well_formed {
        return Err(ConfigError::Validation(
            "telegram.bot_token must look like `<bot id>:<secret>` as issued by @BotFather"
                .to_string(),
        ));
    }

    if !is_http_url(&telegram.api_base_url) {
        return Err(ConfigError::Validation(
            "telegram.api_base_url must start with http:// or https://".to_string(),
        ));
    }

    if telegram.poll_timeout_secs == 0 || telegram.poll_timeout_secs > 60 {
        return Err(ConfigError::Validation(
            "telegram.poll_timeout_secs must be in range 1..=60".to_string(),
        ));
    }

    Ok(())
}

fn validate_providers(providers: &[ProviderConfig]) -> Result<(), ConfigError> {
    for (index, provider) in providers.iter().enumerate() {
        let label = format!("providers[{index}]");
        if provider.name.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{label}.name must not be empty")));
        }
        if providers[..index].iter().any(|earlier| earlier.name == provider.name) {
            return Err(ConfigError::Validation(format!(
                "{label}.name `{}` is used by more than one provider",
                provider.name
            )));
        }
        if provider.model.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{label}.model must not be empty")));
        }

        let missing_key = provider
            .api_key
            .as_ref()
            .map(|value| value.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing_key {
            let env_hint = match provider.kind {
                ProviderKind::Gemini => "CURHAT_GEMINI_API_KEY",
                ProviderKind::OpenAi => "CURHAT_OPENAI_API_KEY",
            };
            return Err(ConfigError::Validation(format!(
                "{label}.api_key is required for provider `{}` (set it in the file or via {env_hint})",
                provider.name
            )));
        }

        if !is_http_url(&provider.base_url) {
            return Err(ConfigError::Validation(format!(
                "{label}.base_url must start with http:// or https://"
            )));
        }
        if provider.timeout_ms == 0 || provider.timeout_ms > 120_000 {
            return Err(ConfigError::Validation(format!(
                "{label}.timeout_ms must be in range 1..=120000"
            )));
        }
        if !(0.0..=2.0).contains(&provider.temperature) {
            return Err(ConfigError::Validation(format!(
                "{label}.temperature must be in range 0.0..=2.0"
            )));
        }
        if provider.max_output_tokens == 0 {
            return Err(ConfigError::Validation(format!(
                "{label}.max_output_tokens must be greater than zero"
            )));
        }
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    let limits = [
        ("conversation.max_turns", conversation.max_turns),
        ("conversation.max_turn_chars", conversation.max_turn_chars),
        ("conversation.max_message_chars", conversation.max_message_chars),
        ("conversation.max_reply_chars", conversation.max_reply_chars),
    ];
    if let Some((name, _)) = limits.iter().find(|(_, value)| *value == 0) {
        return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
    }

    if conversation.history_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.history_ttl_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_persona(persona: &PersonaConfig) -> Result<(), ConfigError> {
    if persona.instructions.trim().is_empty() {
        return Err(ConfigError::Validation("persona.instructions must not be empty".to_string()));
    }
    if persona.crisis_response.trim().is_empty() {
        return Err(ConfigError::Validation(
            "persona.crisis_response must not be empty".to_string(),
        ));
    }
    if persona.crisis_keywords.is_empty() {
        return Err(ConfigError::Validation(
            "persona.crisis_keywords must list at least one keyword".to_string(),
        ));
    }
    if persona.crisis_keywords.iter().any(|keyword| keyword.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "persona.crisis_keywords must not contain blank entries".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "server.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn split_names(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    store: Option<StorePatch>,
    telegram: Option<TelegramPatch>,
    providers: Option<Vec<ProviderPatch>>,
    conversation: Option<ConversationPatch>,
    rate_limit: Option<RateLimitPatch>,
    persona: Option<PersonaPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct StorePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TelegramPatch {
    bot_token: Option<String>,
    api_base_url: Option<String>,
    mode: Option<TransportMode>,
    user_identity: Option<UserIdentity>,
    poll_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ProviderPatch {
    name: String,
    kind: ProviderKind,
    model: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    timeout_ms: Option<u64>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
}

impl ProviderPatch {
    fn into_config(self) -> ProviderConfig {
        let mut config = ProviderConfig::defaults_for(&self.name, self.kind);
        if let Some(model) = self.model {
            config.model = model;
        }
        if let Some(api_key_value) = self.api_key {
            config.api_key = Some(secret_value(api_key_value));
        }
        if let Some(base_url) = self.base_url {
            config.base_url = base_url;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.timeout_ms = timeout_ms;
        }
        if let Some(temperature) = self.temperature {
            config.temperature = temperature;
        }
        if let Some(max_output_tokens) = self.max_output_tokens {
            config.max_output_tokens = max_output_tokens;
        }
        config
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    max_turns: Option<usize>,
    max_turn_chars: Option<usize>,
    max_message_chars: Option<usize>,
    max_reply_chars: Option<usize>,
    history_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RateLimitPatch {
    cooldown_ms: Option<u64>,
    policy: Option<RateLimitPolicy>,
}

#[derive(Debug, Default, Deserialize)]
struct PersonaPatch {
    instructions: Option<String>,
    crisis_keywords: Option<Vec<String>>,
    crisis_response: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{
        AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, ProviderKind,
        RateLimitPolicy,
    };

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const BASE_VARS: &[&str] = &["CURHAT_TELEGRAM_BOT_TOKEN", "CURHAT_GEMINI_API_KEY"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn set_base_env() {
        env::set_var("CURHAT_TELEGRAM_BOT_TOKEN", "123456:test-token");
        env::set_var("CURHAT_GEMINI_API_KEY", "gemini-test-key");
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CURHAT_BOT_TOKEN", "777:from-env");
        env::set_var("TEST_CURHAT_GEMINI_KEY", "key-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("curhat.toml");
            fs::write(
                &path,
                r#"
[telegram]
bot_token = "${TEST_CURHAT_BOT_TOKEN}"

[[providers]]
name = "primary"
kind = "gemini"
api_key = "${TEST_CURHAT_GEMINI_KEY}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.telegram.bot_token.expose_secret() == "777:from-env",
                "bot token should be interpolated from environment",
            )?;
            ensure(config.providers.len() == 1, "file provider list replaces the defaults")?;
            ensure(
                config.providers[0]
                    .api_key
                    .as_ref()
                    .map(|key| key.expose_secret() == "key-from-env")
                    .unwrap_or(false),
                "provider api key should be interpolated from environment",
            )?;
            ensure(
                config.providers[0].model == "gemini-2.5-flash",
                "unspecified provider fields fall back to kind defaults",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_CURHAT_BOT_TOKEN", "TEST_CURHAT_GEMINI_KEY"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_base_env();
        env::set_var("CURHAT_LOG_LEVEL", "warn");
        env::set_var("CURHAT_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(BASE_VARS);
        clear_vars(&["CURHAT_LOG_LEVEL", "CURHAT_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_base_env();
        env::set_var("CURHAT_STORE_URL", "sqlite://from-env.db");
        env::set_var("CURHAT_RATE_LIMIT_POLICY", "defer");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("curhat.toml");
            fs::write(
                &path,
                r#"
[store]
url = "sqlite://from-file.db"

[telegram]
bot_token = "1:from-file"

[rate_limit]
cooldown_ms = 500
policy = "reject"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    store_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.store.url == "sqlite://from-override.db",
                "override store url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(
                config.telegram.bot_token.expose_secret() == "123456:test-token",
                "env bot token should win over file and defaults",
            )?;
            ensure(config.rate_limit.cooldown_ms == 500, "file cooldown should beat the default")?;
            ensure(
                config.rate_limit.policy == RateLimitPolicy::Defer,
                "env policy should win over file",
            )?;
            Ok(())
        })();

        clear_vars(BASE_VARS);
        clear_vars(&["CURHAT_STORE_URL", "CURHAT_RATE_LIMIT_POLICY"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CURHAT_TELEGRAM_BOT_TOKEN", "not-a-token");
        env::set_var("CURHAT_GEMINI_API_KEY", "gemini-test-key");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("telegram.bot_token")
            );
            ensure(has_message, "validation failure should mention telegram.bot_token")
        })();

        clear_vars(BASE_VARS);
        result
    }

    #[test]
    fn providers_without_api_key_are_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CURHAT_TELEGRAM_BOT_TOKEN", "123456:test-token");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected missing api key to fail validation".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message)
                    if message.contains("providers[0].api_key")
                        && message.contains("CURHAT_GEMINI_API_KEY")
            );
            ensure(has_message, "validation failure should point at the first provider key")
        })();

        clear_vars(BASE_VARS);
        result
    }

    #[test]
    fn provider_order_reorders_and_filters() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_base_env();
        env::set_var("CURHAT_PROVIDER_ORDER", "secondary");

        let result = (|| -> Result<(), String> {
            let from_env = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            ensure(from_env.providers.len() == 1, "env order keeps only named providers")?;
            ensure(from_env.providers[0].name == "secondary", "env order keeps secondary")?;

            let from_override = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    provider_order: Some(vec!["secondary".to_string(), "primary".to_string()]),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;
            let names: Vec<&str> =
                from_override.providers.iter().map(|provider| provider.name.as_str()).collect();
            ensure(names == ["secondary", "primary"], "override order wins over env order")?;
            ensure(
                from_override
                    .providers
                    .iter()
                    .all(|provider| provider.kind == ProviderKind::Gemini),
                "default chain is gemini only",
            )?;
            Ok(())
        })();

        clear_vars(BASE_VARS);
        clear_vars(&["CURHAT_PROVIDER_ORDER"]);
        result
    }

    #[test]
    fn unknown_provider_in_order_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_base_env();

        let result = (|| -> Result<(), String> {
            let outcome = AppConfig::load(LoadOptions {
                overrides: ConfigOverrides {
                    provider_order: Some(vec!["tertiary".to_string()]),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            });
            let rejected = matches!(
                outcome,
                Err(ConfigError::Validation(ref message)) if message.contains("tertiary")
            );
            ensure(rejected, "unknown provider name should be reported")
        })();

        clear_vars(BASE_VARS);
        result
    }

    #[test]
    fn empty_provider_list_is_allowed_for_offline_only_mode() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("curhat.toml");
            fs::write(
                &path,
                r#"
providers = []

[telegram]
bot_token = "42:offline"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;
            ensure(config.providers.is_empty(), "explicit empty list should be kept")
        })();

        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("CURHAT_TELEGRAM_BOT_TOKEN", "99:bot-secret-value");
        env::set_var("CURHAT_GEMINI_API_KEY", "gemini-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("bot-secret-value"),
                "debug output should not contain bot token",
            )?;
            ensure(
                !debug.contains("gemini-secret-value"),
                "debug output should not contain provider key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(BASE_VARS);
        result
    }
}
