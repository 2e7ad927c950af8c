use rollup_common::error::{RollupError, RollupResult};
use serde::Deserialize;
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub log_level: String,
    /// Term stamped on every token this node's store assigns.
    pub primary_term: i64,
}

impl AppConfig {
    /// Load configuration from environment variables.
    /// Loads `.env` file if present, then reads required vars.
    pub fn from_env() -> RollupResult<Self> {
        // Best-effort .env load; ignore if missing
        let _ = dotenvy::dotenv();

        let primary_term: i64 = parse_var_or("PRIMARY_TERM", 1)?;
        if primary_term < 1 {
            return Err(RollupError::Config(
                "PRIMARY_TERM must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            database_url: get_var("DATABASE_URL")?,
            host: get_var_or("HOST", "0.0.0.0"),
            port: parse_var_or("PORT", 8080)?,
            log_level: get_var_or("LOG_LEVEL", "info"),
            primary_term,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn get_var(key: &str) -> RollupResult<String> {
    env::var(key).map_err(|_| RollupError::Config(format!("{key} is required but not set")))
}

pub(crate) fn get_var_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_owned())
}

/// Parse an optional variable, falling back to `default` when unset.
/// A set-but-unparseable value is a configuration error.
pub(crate) fn parse_var_or<T>(key: &str, default: T) -> RollupResult<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| RollupError::Config(format!("invalid {key}: {e}"))),
        Err(_) => Ok(default),
    }
}
