//! Runtime configuration read from the environment

use crate::error::AssistantError;
use crate::state::guest::DEFAULT_GUEST_TTL_DAYS;
use crate::Result;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_DELEGATE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_PORT: u16 = 8080;

/// Placeholder shipped in `.env.example`; treated as no key.
const PLACEHOLDER_API_KEY: &str = "your_gemini_api_key_here";

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Absent means the offline mock delegate is used.
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub delegate_timeout: Duration,
    pub guest_ttl_days: i64,
    pub database_url: Option<String>,
    pub port: u16,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            delegate_timeout: Duration::from_secs(DEFAULT_DELEGATE_TIMEOUT_SECS),
            guest_ttl_days: DEFAULT_GUEST_TTL_DAYS,
            database_url: None,
            port: DEFAULT_PORT,
        }
    }
}

impl AssistantConfig {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let delegate_timeout_secs: u64 =
            parse_var("DELEGATE_TIMEOUT_SECS", get("DELEGATE_TIMEOUT_SECS"))?
                .unwrap_or(DEFAULT_DELEGATE_TIMEOUT_SECS);
        if delegate_timeout_secs == 0 {
            return Err(AssistantError::Config(
                "DELEGATE_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }

        let guest_ttl_days: i64 =
            parse_var("GUEST_TTL_DAYS", get("GUEST_TTL_DAYS"))?.unwrap_or(DEFAULT_GUEST_TTL_DAYS);
        if guest_ttl_days <= 0 {
            return Err(AssistantError::Config(
                "GUEST_TTL_DAYS must be positive".to_string(),
            ));
        }

        let port = parse_var("PORT", get("PORT").or_else(|| get("API_PORT")))?
            .unwrap_or(DEFAULT_PORT);

        Ok(Self {
            gemini_api_key: get("GEMINI_API_KEY").filter(|key| key != PLACEHOLDER_API_KEY),
            gemini_model: get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            delegate_timeout: Duration::from_secs(delegate_timeout_secs),
            guest_ttl_days,
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_URL")),
            port,
        })
    }

    pub fn guest_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(self.guest_ttl_days)
    }
}

fn parse_var<T: FromStr>(name: &str, raw: Option<String>) -> Result<Option<T>> {
    match raw {
        Some(value) => value.parse::<T>().map(Some).map_err(|_| {
            AssistantError::Config(format!("{} has an invalid value: {}", name, value))
        }),
        None => Ok(None),
    }
}
