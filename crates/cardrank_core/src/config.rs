//! Core runtime configuration.
//!
//! # Responsibility
//! - Hold the tunables shared by storage bootstrap and ranking.
//! - Load overrides from `CARDRANK_*` environment variables.
//!
//! # Invariants
//! - A validated config always yields a rank space able to rebalance.

use crate::logging::{default_log_level, normalize_level};
use crate::rank::lexorank::{RankSpace, DEFAULT_MAX_RANK_LENGTH};
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const ENV_MAX_RANK_LENGTH: &str = "CARDRANK_MAX_RANK_LENGTH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CARDRANK_BUSY_TIMEOUT_MS";
pub const ENV_LOG_LEVEL: &str = "CARDRANK_LOG_LEVEL";

/// Smallest threshold that still leaves one digit of headroom after a
/// two-digit rebalance.
pub const MIN_RANK_LENGTH: usize = 3;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Errors from configuration loading and validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A value could not be parsed for the given key.
    InvalidValue { key: &'static str, value: String },
    /// Rank length threshold is too small to rebalance into.
    RankLengthTooSmall(usize),
    /// Log level is not one of `trace|debug|info|warn|error`.
    InvalidLogLevel(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { key, value } => write!(f, "invalid value `{value}` for {key}"),
            Self::RankLengthTooSmall(value) => write!(
                f,
                "max_rank_length must be at least {MIN_RANK_LENGTH}, got {value}"
            ),
            Self::InvalidLogLevel(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ConfigError {}

/// Runtime configuration for the ordering engine.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Rank length above which a list is rebalanced.
    pub max_rank_length: usize,
    /// How long a writer waits for the SQLite write lock.
    pub busy_timeout_ms: u64,
    /// Log level passed to `init_logging`.
    pub log_level: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            max_rank_length: DEFAULT_MAX_RANK_LENGTH,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            log_level: default_log_level().to_string(),
        }
    }
}

impl CoreConfig {
    /// Builds a config from defaults plus `CARDRANK_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from an arbitrary key lookup, then validates.
    pub fn with_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_MAX_RANK_LENGTH) {
            self.max_rank_length = parse_value(ENV_MAX_RANK_LENGTH, &value)?;
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            self.busy_timeout_ms = parse_value(ENV_BUSY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_LOG_LEVEL) {
            self.log_level = value;
        }
        self.validate()?;
        Ok(self)
    }

    /// Checks value ranges and normalizes the log level.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.max_rank_length < MIN_RANK_LENGTH {
            return Err(ConfigError::RankLengthTooSmall(self.max_rank_length));
        }
        self.log_level = normalize_level(&self.log_level)
            .map_err(|err| ConfigError::InvalidLogLevel(err.to_string()))?
            .to_string();
        Ok(())
    }

    pub fn rank_space(&self) -> RankSpace {
        RankSpace::new(self.max_rank_length)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    })
}
