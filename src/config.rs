// Runtime configuration read from the environment (and `.env`).

use crate::core::moderation::{ModerationConfig, RateLimits, SpamRule};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite://data/channel.db";
const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Invalid SPAM_RULES JSON: {0}")]
    InvalidSpamRules(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub store_timeout_secs: u64,
    /// Users allowed to run admin commands
    pub admin_ids: Vec<i64>,
    pub moderation: ModerationConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            store_timeout_secs: DEFAULT_TIMEOUT_SECS,
            admin_ids: Vec::new(),
            moderation: ModerationConfig::default(),
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { name, value: raw }),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any name -> value source. Unset names keep
    /// their defaults; set but malformed values are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ModerationConfig::default();

        let rate_limits = RateLimits {
            per_minute: parse_number(
                &lookup,
                "RATE_LIMIT_PER_MINUTE",
                defaults.rate_limits.per_minute,
            )?,
            per_hour: parse_number(&lookup, "RATE_LIMIT_PER_HOUR", defaults.rate_limits.per_hour)?,
            per_day: parse_number(&lookup, "RATE_LIMIT_PER_DAY", defaults.rate_limits.per_day)?,
        };

        let warning_limit = parse_number(&lookup, "WARNING_LIMIT", defaults.warning_limit)?;
        if warning_limit == 0 {
            return Err(ConfigError::InvalidValue {
                name: "WARNING_LIMIT",
                value: "0".to_string(),
            });
        }

        let banned_words = match lookup("BANNED_WORDS") {
            Some(raw) => split_list(&raw).map(str::to_string).collect(),
            None => defaults.banned_words,
        };

        let spam_rules = match lookup("SPAM_RULES") {
            Some(raw) => serde_json::from_str::<Vec<SpamRule>>(&raw)?,
            None => defaults.spam_rules,
        };

        let admin_ids = match lookup("ADMIN_IDS") {
            Some(raw) => split_list(&raw)
                .map(|id| {
                    id.parse::<i64>().map_err(|_| ConfigError::InvalidValue {
                        name: "ADMIN_IDS",
                        value: raw.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            None => Vec::new(),
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: parse_number(&lookup, "DATABASE_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            store_timeout_secs: parse_number(&lookup, "DATABASE_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            admin_ids,
            moderation: ModerationConfig {
                warning_limit,
                rate_limits,
                banned_words,
                spam_rules,
            },
        })
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }
}
