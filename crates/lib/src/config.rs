//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.relay/config.json`) and environment.
//! Environment variables override file values for secrets and the HTTP port.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Gateway server settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Channel settings (Telegram, Messenger).
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// NLU provider (Dialogflow) settings.
    #[serde(default)]
    pub nlu: NluConfig,

    /// Relay behaviour (pacing between outbound messages).
    #[serde(default)]
    pub relay: RelayConfig,
}

/// Gateway bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP port (default 3000). Overridden by PORT env.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bind address (default "0.0.0.0"; the Messenger webhook must be reachable from outside).
    #[serde(default = "default_gateway_bind")]
    pub bind: String,
}

fn default_gateway_port() -> u16 {
    3000
}

fn default_gateway_bind() -> String {
    "0.0.0.0".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            bind: default_gateway_bind(),
        }
    }
}

/// Per-channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub messenger: MessengerChannelConfig,
}

/// Telegram channel config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelegramChannelConfig {
    /// Bot token from BotFather. Overridden by TELEGRAM_BOT_TOKEN env when set.
    pub bot_token: Option<String>,
    /// When set, use webhook mode: Telegram POSTs updates to this URL. If unset, long-poll getUpdates is used.
    pub webhook_url: Option<String>,
    /// Optional secret for webhook verification (X-Telegram-Bot-Api-Secret-Token). Used only when webhook_url is set.
    pub webhook_secret: Option<String>,
}

/// Facebook Messenger channel config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessengerChannelConfig {
    /// Page access token for the Send API. Overridden by MESSENGER_PAGE_ACCESS_TOKEN env.
    pub page_access_token: Option<String>,
    /// Token echoed back during webhook verification. Overridden by MESSENGER_VERIFY_TOKEN env.
    pub verify_token: Option<String>,
    /// App secret for X-Hub-Signature-256 checks. Overridden by MESSENGER_APP_SECRET env.
    pub app_secret: Option<String>,
    /// Graph API version (default "v17.0").
    #[serde(default = "default_graph_api_version")]
    pub api_version: String,
}

fn default_graph_api_version() -> String {
    "v17.0".to_string()
}

impl Default for MessengerChannelConfig {
    fn default() -> Self {
        Self {
            page_access_token: None,
            verify_token: None,
            app_secret: None,
            api_version: default_graph_api_version(),
        }
    }
}

/// Dialogflow ES settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NluConfig {
    /// Google Cloud project id of the agent. Overridden by DIALOGFLOW_PROJECT_ID env.
    pub project_id: Option<String>,
    /// OAuth bearer token for the Dialogflow API. Overridden by DIALOGFLOW_ACCESS_TOKEN env.
    pub access_token: Option<String>,
    /// Query language (default "es"). Overridden by DIALOGFLOW_LANGUAGE_CODE env.
    #[serde(default = "default_language_code")]
    pub language_code: String,
    /// API base URL; override for tests or regional endpoints.
    #[serde(default = "default_nlu_base_url")]
    pub base_url: String,
}

fn default_language_code() -> String {
    "es".to_string()
}

fn default_nlu_base_url() -> String {
    "https://dialogflow.googleapis.com".to_string()
}

impl Default for NluConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            access_token: None,
            language_code: default_language_code(),
            base_url: default_nlu_base_url(),
        }
    }
}

/// Relay pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayConfig {
    /// Pause after each outbound message of a multi-message reply (default 500).
    #[serde(default = "default_message_delay_ms")]
    pub message_delay_ms: u64,
}

fn default_message_delay_ms() -> u64 {
    500
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            message_delay_ms: default_message_delay_ms(),
        }
    }
}

/// Non-empty trimmed env value.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Env value if set, else the trimmed non-empty config value.
fn resolve_secret(env: &str, configured: Option<&String>) -> Option<String> {
    env_value(env).or_else(|| {
        configured
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Resolve the Telegram bot token: env TELEGRAM_BOT_TOKEN overrides config.
pub fn resolve_telegram_token(config: &Config) -> Option<String> {
    resolve_secret(
        "TELEGRAM_BOT_TOKEN",
        config.channels.telegram.bot_token.as_ref(),
    )
}

/// Resolve the Messenger page access token: env MESSENGER_PAGE_ACCESS_TOKEN overrides config.
pub fn resolve_messenger_page_token(config: &Config) -> Option<String> {
    resolve_secret(
        "MESSENGER_PAGE_ACCESS_TOKEN",
        config.channels.messenger.page_access_token.as_ref(),
    )
}

/// Resolve the Messenger verify token: env MESSENGER_VERIFY_TOKEN overrides config.
pub fn resolve_messenger_verify_token(config: &Config) -> Option<String> {
    resolve_secret(
        "MESSENGER_VERIFY_TOKEN",
        config.channels.messenger.verify_token.as_ref(),
    )
}

/// Resolve the Messenger app secret: env MESSENGER_APP_SECRET overrides config.
pub fn resolve_messenger_app_secret(config: &Config) -> Option<String> {
    resolve_secret(
        "MESSENGER_APP_SECRET",
        config.channels.messenger.app_secret.as_ref(),
    )
}

/// Apply environment overrides in place (port, secrets, Dialogflow settings).
/// Called once after loading so the rest of the crate reads a single source.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(port) = env_value("PORT").and_then(|p| p.parse::<u16>().ok()) {
        config.gateway.port = port;
    }
    config.channels.telegram.bot_token = resolve_telegram_token(config);
    config.channels.messenger.page_access_token = resolve_messenger_page_token(config);
    config.channels.messenger.verify_token = resolve_messenger_verify_token(config);
    config.channels.messenger.app_secret = resolve_messenger_app_secret(config);
    config.nlu.project_id = resolve_secret("DIALOGFLOW_PROJECT_ID", config.nlu.project_id.as_ref());
    config.nlu.access_token =
        resolve_secret("DIALOGFLOW_ACCESS_TOKEN", config.nlu.access_token.as_ref());
    if let Some(lang) = env_value("DIALOGFLOW_LANGUAGE_CODE") {
        config.nlu.language_code = lang;
    }
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("RELAY_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".relay").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path (or RELAY_CONFIG_PATH / default). Missing file => default config.
/// Environment overrides are applied. Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let mut config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    apply_env_overrides(&mut config);
    Ok((config, path))
}

/// Write a default config file if none exists. Returns true when a file was created.
pub fn init_config_file(path: &std::path::Path) -> Result<bool> {
    if path.exists() {
        log::debug!("config already exists at {}, skipping", path.display());
        return Ok(false);
    }
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(&Config::default())
        .context("serializing default config")?;
    std::fs::write(path, json)
        .with_context(|| format!("writing default config to {}", path.display()))?;
    log::info!("created default config at {}", path.display());
    Ok(true)
}
