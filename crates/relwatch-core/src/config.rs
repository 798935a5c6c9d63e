//! Relwatch configuration system.
//!
//! TOML file with per-field defaults; secrets may be supplied or overridden
//! through environment variables so tokens stay out of the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{RelwatchError, Result};
use crate::types::ChannelToggles;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelwatchConfig {
    /// Minutes between scheduled release checks.
    #[serde(default = "default_check_interval")]
    pub check_interval_mins: u64,
    /// SQLite database path. Defaults to ~/.relwatch/relwatch.db.
    #[serde(default)]
    pub database: Option<PathBuf>,
    /// Repositories ("owner/name") to start tracking at boot.
    #[serde(default)]
    pub repositories: Vec<String>,
    #[serde(default)]
    pub github: GithubConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

fn default_check_interval() -> u64 {
    30
}

impl Default for RelwatchConfig {
    fn default() -> Self {
        Self {
            check_interval_mins: default_check_interval(),
            database: None,
            repositories: Vec::new(),
            github: GithubConfig::default(),
            delivery: DeliveryConfig::default(),
            notifications: NotificationsConfig::default(),
            gateway: GatewayConfig::default(),
        }
    }
}

impl RelwatchConfig {
    /// Load config from the default path (~/.relwatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RelwatchError::Config(format!("failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| RelwatchError::Config(format!("failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Relwatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".relwatch")
    }

    /// Resolved database path.
    pub fn db_path(&self) -> PathBuf {
        self.database
            .clone()
            .unwrap_or_else(|| Self::home_dir().join("relwatch.db"))
    }

    /// Apply environment-variable overrides. Secrets supplied this way
    /// auto-enable their channel unless the config explicitly disabled it.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(token) = std::env::var("GITHUB_TOKEN")
            && !token.is_empty()
        {
            self.github.token = token;
        }
        if let Ok(mins) = std::env::var("RELWATCH_CHECK_INTERVAL")
            && let Ok(mins) = mins.parse()
        {
            self.check_interval_mins = mins;
        }

        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").unwrap_or_default();
        if !bot_token.is_empty() || !chat_id.is_empty() {
            let telegram = self
                .notifications
                .telegram
                .get_or_insert_with(TelegramChannelConfig::default);
            if !bot_token.is_empty() {
                telegram.bot_token = bot_token;
            }
            if !chat_id.is_empty() {
                telegram.chat_id = chat_id;
            }
        }

        if let Ok(webhook_url) = std::env::var("DISCORD_WEBHOOK_URL")
            && !webhook_url.is_empty()
        {
            let discord = self
                .notifications
                .discord
                .get_or_insert_with(DiscordChannelConfig::default);
            discord.webhook_url = webhook_url;
        }
    }
}

/// GitHub source client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GithubConfig {
    /// Optional API token; raises the unauthenticated rate limit.
    #[serde(default)]
    pub token: String,
    /// Page size for release listings. Also bounds how much a gap fallback
    /// can re-notify.
    #[serde(default = "default_per_page")]
    pub per_page: u8,
}

fn default_per_page() -> u8 {
    10
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            per_page: default_per_page(),
        }
    }
}

/// Delivery behavior shared by all channels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Per-call delivery timeout; a hung channel cannot stall the fan-out.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// One immediate retry per channel per notification before giving up.
    #[serde(default = "bool_true")]
    pub retry_once: bool,
}

fn default_timeout_secs() -> u64 {
    10
}

fn bool_true() -> bool {
    true
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            retry_once: true,
        }
    }
}

/// Notification channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NotificationsConfig {
    /// Channel enablement for projects with no tags assigned.
    #[serde(default = "ChannelToggles::all_enabled")]
    pub default: ChannelToggles,
    #[serde(default)]
    pub telegram: Option<TelegramChannelConfig>,
    #[serde(default)]
    pub discord: Option<DiscordChannelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
}

impl Default for TelegramChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bot_token: String::new(),
            chat_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscordChannelConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    #[serde(default)]
    pub webhook_url: String,
}

impl Default for DiscordChannelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: String::new(),
        }
    }
}

/// Gateway (HTTP API) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
