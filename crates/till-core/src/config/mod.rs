//! Environment-driven client configuration.
//!
//! Every value is optional except the log server URL, which only sync needs.
//! Values are trimmed, blank values fall back to defaults, and numeric
//! settings are range checked.

use std::collections::HashMap;
use std::env;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::sync::SyncSettings;
use crate::util::server_base_url;

const API_BASE_URL: &str = "TILL_API_BASE_URL";
const DB_PATH: &str = "TILL_DB_PATH";
const SYNC_BATCH_SIZE: &str = "TILL_SYNC_BATCH_SIZE";
const SYNC_INTERVAL_SECS: &str = "TILL_SYNC_INTERVAL_SECS";
const IMMEDIATE_TIMEOUT_SECS: &str = "TILL_IMMEDIATE_TIMEOUT_SECS";
const BATCH_TIMEOUT_SECS: &str = "TILL_BATCH_TIMEOUT_SECS";
const PROBE_INTERVAL_SECS: &str = "TILL_PROBE_INTERVAL_SECS";
const RECENT_LIMIT: &str = "TILL_RECENT_LIMIT";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub api_base_url: Option<String>,
    /// Local queue database; callers supply a platform default when unset
    pub db_path: Option<PathBuf>,
    pub sync_batch_size: usize,
    pub sync_interval: Duration,
    pub immediate_timeout: Duration,
    pub batch_timeout: Duration,
    pub probe_interval: Duration,
    /// Size of the session-filtered recent view pushed to subscribers
    pub recent_limit: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            db_path: None,
            sync_batch_size: 10,
            sync_interval: Duration::from_secs(120),
            immediate_timeout: Duration::from_secs(5),
            batch_timeout: Duration::from_secs(10),
            probe_interval: Duration::from_secs(15),
            recent_limit: 50,
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_base_url = optional_trimmed(&lookup, API_BASE_URL)
            .map(|url| {
                server_base_url(&url).ok_or_else(|| {
                    ConfigError::Invalid(format!("{API_BASE_URL} must start with http:// or https://"))
                })
            })
            .transpose()?;

        let db_path = optional_trimmed(&lookup, DB_PATH).map(PathBuf::from);

        let sync_batch_size = ranged(&lookup, SYNC_BATCH_SIZE, defaults.sync_batch_size, 1..=500)?;
        let sync_interval = ranged_secs(&lookup, SYNC_INTERVAL_SECS, defaults.sync_interval, 5..=3_600)?;
        let immediate_timeout = ranged_secs(
            &lookup,
            IMMEDIATE_TIMEOUT_SECS,
            defaults.immediate_timeout,
            1..=60,
        )?;
        let batch_timeout = ranged_secs(&lookup, BATCH_TIMEOUT_SECS, defaults.batch_timeout, 1..=120)?;
        let probe_interval = ranged_secs(&lookup, PROBE_INTERVAL_SECS, defaults.probe_interval, 1..=600)?;
        let recent_limit = ranged(&lookup, RECENT_LIMIT, defaults.recent_limit, 1..=1_000)?;

        Ok(Self {
            api_base_url,
            db_path,
            sync_batch_size,
            sync_interval,
            immediate_timeout,
            batch_timeout,
            probe_interval,
            recent_limit,
        })
    }

    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// The log server URL, required for anything that talks to the server
    pub fn require_api_base_url(&self) -> Result<&str, ConfigError> {
        self.api_base_url
            .as_deref()
            .ok_or(ConfigError::MissingVar(API_BASE_URL))
    }

    pub const fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            batch_size: self.sync_batch_size,
            immediate_timeout: self.immediate_timeout,
            batch_timeout: self.batch_timeout,
        }
    }
}

fn ranged<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = raw.parse::<T>().map_err(|_| invalid())?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn ranged_secs(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: Duration,
    range: RangeInclusive<u64>,
) -> Result<Duration, ConfigError> {
    ranged(lookup, name, default.as_secs(), range).map(Duration::from_secs)
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        ClientConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config, ClientConfig::default());
        assert!(config.require_api_base_url().is_err());
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let config = config(&[
            ("TILL_API_BASE_URL", " https://pos.example.com/ "),
            ("TILL_DB_PATH", "/tmp/till.db"),
            ("TILL_SYNC_BATCH_SIZE", "25"),
            ("TILL_SYNC_INTERVAL_SECS", "60"),
            ("TILL_RECENT_LIMIT", "  "),
        ])
        .unwrap();

        assert_eq!(config.require_api_base_url().unwrap(), "https://pos.example.com");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/till.db")));
        assert_eq!(config.sync_batch_size, 25);
        assert_eq!(config.sync_interval, Duration::from_secs(60));
        assert_eq!(config.recent_limit, 50);
        assert_eq!(config.sync_settings().batch_size, 25);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let err = config(&[("TILL_SYNC_BATCH_SIZE", "0")]).unwrap_err();
        assert!(err.to_string().contains("TILL_SYNC_BATCH_SIZE"));

        let err = config(&[("TILL_SYNC_INTERVAL_SECS", "1")]).unwrap_err();
        assert!(err.to_string().contains("[5, 3600]"));

        assert!(config(&[("TILL_BATCH_TIMEOUT_SECS", "ten")]).is_err());
    }

    #[test]
    fn base_url_requires_http_scheme() {
        let err = config(&[("TILL_API_BASE_URL", "pos.example.com")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
