//! Runtime configuration read from the environment (and `.env` via dotenv).

use std::env;
use std::time::Duration;
use teloxide::types::ChatId;
use thiserror::Error;

pub const DEFAULT_PROMO_CODE: &str = "DATUM10";

/// Errors raised while reading configuration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Circuit breaker settings for operator notification delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierRecoveryConfig {
    /// Consecutive delivery failures before the breaker opens
    pub failure_threshold: u32,
    /// Seconds the breaker stays open
    pub reset_secs: u64,
}

impl Default for NotifierRecoveryConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_secs: 60, // 1 minute
        }
    }
}

/// Administrative bot used to alert operators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminConfig {
    pub bot_token: String,
    pub chat_id: ChatId,
    /// Language of the operator notices
    pub language: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotConfig {
    pub bot_token: String,
    pub database_url: String,
    pub admin: Option<AdminConfig>,
    pub promo_code: String,
    pub session_idle_ttl: Option<Duration>,
    pub seed_demo_catalog: bool,
    pub notifier_recovery: NotifierRecoveryConfig,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Build the configuration from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bot_token = var("TELEGRAM_BOT_TOKEN").ok_or(ConfigError::Missing("TELEGRAM_BOT_TOKEN"))?;
        let database_url = var("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let admin = match (var("TELEGRAM_ADMIN_BOT_TOKEN"), var("TELEGRAM_ADMIN_ID")) {
            (Some(bot_token), Some(admin_id)) => Some(AdminConfig {
                bot_token,
                chat_id: ChatId(parse_value("TELEGRAM_ADMIN_ID", &admin_id)?),
                language: var("ADMIN_LANGUAGE").unwrap_or_else(|| "ru".to_string()),
            }),
            _ => None,
        };

        let session_idle_ttl = var("SESSION_IDLE_TTL_SECS")
            .map(|v| parse_value::<u64>("SESSION_IDLE_TTL_SECS", &v))
            .transpose()?
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let seed_demo_catalog = var("SEED_DEMO_CATALOG")
            .map(|v| parse_bool("SEED_DEMO_CATALOG", &v))
            .transpose()?
            .unwrap_or(false);

        let defaults = NotifierRecoveryConfig::default();
        let notifier_recovery = NotifierRecoveryConfig {
            failure_threshold: var("NOTIFY_FAILURE_THRESHOLD")
                .map(|v| parse_value("NOTIFY_FAILURE_THRESHOLD", &v))
                .transpose()?
                .unwrap_or(defaults.failure_threshold),
            reset_secs: var("NOTIFY_RESET_SECS")
                .map(|v| parse_value("NOTIFY_RESET_SECS", &v))
                .transpose()?
                .unwrap_or(defaults.reset_secs),
        };

        Ok(Self {
            bot_token,
            database_url,
            admin,
            promo_code: var("PROMO_CODE").unwrap_or_else(|| DEFAULT_PROMO_CODE.to_string()),
            session_idle_ttl,
            seed_demo_catalog,
            notifier_recovery,
        })
    }
}

fn parse_value<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        name,
        value: value.to_string(),
    })
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name,
            value: value.to_string(),
        }),
    }
}
