//! Configuration management for fixbotd.
//!
//! Loads settings from /etc/fixbot/config.toml or uses defaults.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Config file path
pub const CONFIG_PATH: &str = "/etc/fixbot/config.toml";

/// Bot transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Base URL of the chat platform's bot API
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot credential appended to the API path
    #[serde(default)]
    pub token: String,

    /// Outbound request timeout in seconds
    #[serde(default = "default_bot_timeout")]
    pub timeout_secs: u64,
}

fn default_api_base() -> String {
    "https://bot-api.invalid".to_string()
}

fn default_bot_timeout() -> u64 {
    10
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            token: String::new(),
            timeout_secs: default_bot_timeout(),
        }
    }
}

/// Daemon configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixbotConfig {
    /// Webhook listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite database path (sessions, masters, tickets)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Abandoned sessions are reaped after this many minutes
    #[serde(default = "default_session_ttl")]
    pub session_ttl_minutes: i64,

    #[serde(default)]
    pub bot: BotConfig,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7910".to_string()
}

fn default_db_path() -> String {
    "/var/lib/fixbot/fixbot.db".to_string()
}

fn default_session_ttl() -> i64 {
    120
}

impl Default for FixbotConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            db_path: default_db_path(),
            session_ttl_minutes: default_session_ttl(),
            bot: BotConfig::default(),
        }
    }
}

impl FixbotConfig {
    /// Load config from the default path, falling back to defaults when
    /// the file is missing or unreadable.
    pub fn load() -> Self {
        Self::load_from(CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    warn!("Invalid config at {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Write the current configuration out, creating parent directories.
    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
