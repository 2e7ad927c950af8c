use std::time::Duration;

use rollup_common::error::{RollupError, RollupResult};

use crate::env::parse_var_or;

/// Tuning for the scheduler loop and for each tick's retry behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// How often the set of known jobs is reconciled against running tickers.
    pub poll_interval: Duration,
    /// Attempts at one unit of work before a recoverable error fails the job.
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    /// Re-read cycles a single tick may spend on version conflicts.
    pub max_conflict_retries: u32,
    pub default_page_size: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
            backoff_max: Duration::from_secs(30),
            max_conflict_retries: 3,
            default_page_size: 1000,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> RollupResult<Self> {
        let _ = dotenvy::dotenv();

        let defaults = Self::default();
        let cfg = Self {
            poll_interval: Duration::from_secs(parse_var_or(
                "SCHEDULER_POLL_INTERVAL_SECS",
                defaults.poll_interval.as_secs(),
            )?),
            max_attempts: parse_var_or("TICK_MAX_ATTEMPTS", defaults.max_attempts)?,
            backoff_base: Duration::from_millis(parse_var_or(
                "TICK_BACKOFF_BASE_MS",
                defaults.backoff_base.as_millis() as u64,
            )?),
            backoff_max: Duration::from_millis(parse_var_or(
                "TICK_BACKOFF_MAX_MS",
                defaults.backoff_max.as_millis() as u64,
            )?),
            max_conflict_retries: parse_var_or(
                "TICK_MAX_CONFLICT_RETRIES",
                defaults.max_conflict_retries,
            )?,
            default_page_size: parse_var_or("DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> RollupResult<()> {
        if self.poll_interval.is_zero() {
            return Err(RollupError::Config(
                "SCHEDULER_POLL_INTERVAL_SECS must be positive".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(RollupError::Config(
                "TICK_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }
        if self.backoff_base > self.backoff_max {
            return Err(RollupError::Config(
                "TICK_BACKOFF_BASE_MS must not exceed TICK_BACKOFF_MAX_MS".to_string(),
            ));
        }
        if self.default_page_size == 0 {
            return Err(RollupError::Config(
                "DEFAULT_PAGE_SIZE must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
