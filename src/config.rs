use dotenv::dotenv;
use std::env;
use thiserror::Error;

use crate::logging::LogLevel;

const REQUIRED_VARS: [&str; 2] = ["DISCORD_TOKEN", "DISCORD_CLIENT_ID"];

/// Errors raised while resolving configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
    #[error("{name} must be a numeric id, got {value:?}")]
    InvalidId { name: &'static str, value: String },
}

/// Static bot settings
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Maximum number of commands per minute per user. Declared, not enforced.
    #[allow(dead_code)]
    pub command_rate_limit: u32,
    /// Delete the invoking message after a text command succeeds
    pub delete_command_messages: bool,
    /// Color used for embeds
    pub embed_color: u32,
    /// Presence shown as "Watching ..."
    pub status_name: String,
}

impl BotSettings {
    fn with_prefix(prefix: &str) -> Self {
        BotSettings {
            command_rate_limit: 60,
            delete_command_messages: false,
            embed_color: 0x0099ff,
            status_name: format!("for commands | {}help", prefix),
        }
    }
}

/// Logger settings, resolved before the rest of the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct LogSettings {
    /// Minimum log level, `info` when absent or unparsable
    pub level: LogLevel,
    /// Directory holding the daily log files
    pub dir: String,
}

impl LogSettings {
    /// Read `LOG_LEVEL` and `LOG_DIR` from the `.env` file and environment variables
    pub fn from_env() -> Self {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        LogSettings {
            level: get("LOG_LEVEL")
                .and_then(|level| level.parse().ok())
                .unwrap_or(LogLevel::Info),
            dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
        }
    }
}

/// Configuration for the bot
#[derive(Debug, Clone)]
pub struct Config {
    /// The bot credential token
    pub token: String,
    /// The application (client) id
    pub client_id: u64,
    /// Prefix for text commands
    pub prefix: String,
    /// Guild used to scope structured commands during development
    pub dev_guild_id: Option<u64>,
    pub settings: BotSettings,
}

impl Config {
    /// Load configuration from the `.env` file and environment variables
    ///
    /// # Returns
    /// The Config if successful, or an error naming every missing required variable
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Resolve configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let missing: Vec<&'static str> = REQUIRED_VARS
            .iter()
            .copied()
            .filter(|key| get(*key).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let token = get("DISCORD_TOKEN").unwrap_or_default();
        let client_id = parse_id("DISCORD_CLIENT_ID", &get("DISCORD_CLIENT_ID").unwrap_or_default())?;

        let prefix = get("PREFIX").unwrap_or_else(|| "!".to_string());

        let dev_guild_id = match get("DEV_GUILD_ID") {
            Some(value) => Some(parse_id("DEV_GUILD_ID", &value)?),
            None => None,
        };

        let mut settings = BotSettings::with_prefix(&prefix);
        settings.delete_command_messages = get("DELETE_COMMAND_MESSAGES")
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            token,
            client_id,
            prefix,
            dev_guild_id,
            settings,
        })
    }

    /// Replace the prefix, keeping the presence text in step
    pub fn set_prefix(&mut self, prefix: String) {
        self.settings.status_name = format!("for commands | {}help", prefix);
        self.prefix = prefix;
    }
}

fn parse_id(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidId {
        name,
        value: value.to_string(),
    })
}
