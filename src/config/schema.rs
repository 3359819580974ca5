use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use super::traits::ChannelConfig;

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level turnwise configuration, loaded from `config.toml`.
///
/// Resolution order: `TURNWISE_CONFIG_DIR` env → `~/.turnwise/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Exchange gateway server configuration (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Exchange wait bounds (`[exchange]`).
    #[serde(default)]
    pub exchange: ExchangeConfig,

    /// Push-based chat channels (`[channels_config]`).
    #[serde(default)]
    pub channels_config: ChannelsConfig,

    /// Remote component endpoint (`[remote]`).
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Static per-component configuration documents (`[components.<id>]`).
    #[serde(default)]
    pub components: BTreeMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_dir()
                .unwrap_or_else(|_| PathBuf::from(".turnwise"))
                .join(CONFIG_FILE_NAME),
            gateway: GatewayConfig::default(),
            exchange: ExchangeConfig::default(),
            channels_config: ChannelsConfig::default(),
            remote: RemoteConfig::default(),
            components: BTreeMap::new(),
        }
    }
}

// ── Gateway ──────────────────────────────────────────────────────

/// Exchange gateway configuration (`[gateway]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Gateway port (default: 8080)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Largest accepted request body in bytes (default: 64 KiB)
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_gateway_port() -> u16 {
    8080
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ── Exchange ─────────────────────────────────────────────────────

/// Wait bounds for exchanges (`[exchange]` section). `0` disables a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Longest an exchange waits for the program to reach a turn boundary.
    #[serde(default = "default_turn_timeout_secs")]
    pub turn_timeout_secs: u64,
    /// Longest an out-of-context escalation waits for the caller's next input.
    #[serde(default = "default_escalation_timeout_secs")]
    pub escalation_timeout_secs: u64,
}

fn default_turn_timeout_secs() -> u64 {
    30
}

fn default_escalation_timeout_secs() -> u64 {
    300
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            turn_timeout_secs: default_turn_timeout_secs(),
            escalation_timeout_secs: default_escalation_timeout_secs(),
        }
    }
}

// ── Channels ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Telegram bot configuration. Overridden by `TELEGRAM_TOKEN`.
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

impl ChannelsConfig {
    /// `(name, description)` of every configured channel.
    pub fn configured(&self) -> Vec<(&'static str, &'static str)> {
        let mut channels = Vec::new();
        if self.telegram.is_some() {
            channels.push((TelegramConfig::name(), TelegramConfig::desc()));
        }
        channels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Usernames (without `@`) or numeric user ids allowed to talk to the
    /// bot. Empty allows everyone.
    #[serde(default)]
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to `getUpdates`.
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

fn default_poll_timeout_secs() -> u64 {
    30
}

impl TelegramConfig {
    pub fn new(bot_token: &str) -> Self {
        Self {
            bot_token: bot_token.to_string(),
            allowed_users: Vec::new(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

impl ChannelConfig for TelegramConfig {
    fn name() -> &'static str {
        "telegram"
    }

    fn desc() -> &'static str {
        "Telegram bot via long-polling getUpdates"
    }
}

// ── Remote components ────────────────────────────────────────────

/// Components served by another exchange endpoint (`[remote]` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote exchange gateway. Overridden by `TURNWISE_REMOTE_URL`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Component ids to register as remote proxies.
    #[serde(default)]
    pub components: Vec<String>,
    /// Per-request HTTP timeout.
    #[serde(default = "default_remote_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_remote_timeout_secs() -> u64 {
    60
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            components: Vec::new(),
            timeout_secs: default_remote_timeout_secs(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".turnwise"))
}

/// Directory holding `config.toml`: `TURNWISE_CONFIG_DIR` when set, else
/// `~/.turnwise`.
pub fn resolve_config_dir() -> Result<PathBuf> {
    match std::env::var("TURNWISE_CONFIG_DIR") {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir)),
        _ => default_config_dir(),
    }
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let dir = resolve_config_dir()?;
        Self::load_or_init_in(&dir).await
    }

    /// Load `config.toml` from `dir`, writing the defaults first if missing.
    pub async fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.max_body_bytes == 0 {
            anyhow::bail!("gateway.max_body_bytes must be greater than 0");
        }
        if let Some(telegram) = &self.channels_config.telegram {
            if telegram.bot_token.trim().is_empty() {
                anyhow::bail!("channels_config.telegram.bot_token must not be empty");
            }
        }
        if !self.remote.components.is_empty() && self.remote_base_url().is_none() {
            anyhow::bail!("remote.base_url is required when remote.components is set");
        }
        for (id, value) in &self.components {
            if !value.is_object() {
                anyhow::bail!("components.{id} must be a table");
            }
        }
        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // Gateway port: TURNWISE_GATEWAY_PORT or PORT
        if let Ok(port_str) =
            std::env::var("TURNWISE_GATEWAY_PORT").or_else(|_| std::env::var("PORT"))
        {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        if let Ok(host) = std::env::var("TURNWISE_GATEWAY_HOST") {
            if !host.is_empty() {
                self.gateway.host = host;
            }
        }

        if let Ok(token) = std::env::var("TELEGRAM_TOKEN") {
            if !token.is_empty() {
                match self.channels_config.telegram.as_mut() {
                    Some(telegram) => telegram.bot_token = token,
                    None => self.channels_config.telegram = Some(TelegramConfig::new(&token)),
                }
            }
        }

        if let Ok(url) = std::env::var("TURNWISE_REMOTE_URL") {
            if !url.is_empty() {
                self.remote.base_url = Some(url);
            }
        }
    }

    /// Trimmed remote base URL, if one is configured.
    pub fn remote_base_url(&self) -> Option<&str> {
        self.remote
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    /// Write the config atomically: temp file, fsync, rename.
    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;
        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }
        Ok(())
    }
}
