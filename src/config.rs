use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::dedup;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    /// Base URL of the decision backend
    #[serde(default = "default_bot_url")]
    pub bot_url: String,
    /// Name used for @mention detection in groups
    #[serde(default = "default_bot_name")]
    pub bot_name: String,
    /// Port of the health check server
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// Subscribed chats. Empty means discovery mode.
    #[serde(default)]
    pub chat_ids: Vec<String>,
    #[serde(default = "default_dedup_capacity")]
    pub dedup_capacity: usize,
    #[serde(default = "default_backend_timeout_secs")]
    pub backend_timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bot_url: default_bot_url(),
            bot_name: default_bot_name(),
            port: default_port(),
            webhook_secret: None,
            chat_ids: Vec::new(),
            dedup_capacity: default_dedup_capacity(),
            backend_timeout_secs: default_backend_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

fn default_bot_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_bot_name() -> String {
    "Regelebot".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_dedup_capacity() -> usize {
    dedup::DEFAULT_CAPACITY
}

fn default_backend_timeout_secs() -> u64 {
    30
}

/// Split a comma-separated chat id list, dropping blanks.
pub fn parse_chat_ids(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Config {
    /// Load from `path` if it exists, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = if path.exists() {
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?
        } else {
            String::new()
        };

        Self::from_sources(&content, |key| std::env::var(key).ok())
    }

    /// Build a config from TOML `content` and an environment lookup.
    pub fn from_sources<F>(content: &str, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = toml::from_str(content).context("Failed to parse config file")?;

        if let Some(url) = env("BOT_URL") {
            config.gateway.bot_url = url;
        }
        if let Some(name) = env("BOT_NAME") {
            config.gateway.bot_name = name;
        }
        if let Some(port) = env("PORT") {
            config.gateway.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid PORT: {}", port))?;
        }
        if let Some(secret) = env("WEBHOOK_SECRET") {
            config.gateway.webhook_secret = Some(secret);
        }
        // GROUP_ID is the legacy single-chat variable.
        if let Some(raw) = env("CHAT_IDS").or_else(|| env("GROUP_ID")) {
            config.gateway.chat_ids = parse_chat_ids(&raw);
        }
        if let Some(token) = env("TELEGRAM_BOT_TOKEN") {
            config.telegram.bot_token = token;
        }

        config.gateway.chat_ids = config
            .gateway
            .chat_ids
            .iter()
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();

        if config.telegram.bot_token.trim().is_empty() {
            anyhow::bail!("Telegram bot token is not set (telegram.bot_token or TELEGRAM_BOT_TOKEN)");
        }

        Ok(config)
    }
}
