use std::collections::HashMap;
use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    /// Page size of list endpoints when the request names none
    pub default_list_limit: usize,
    /// Largest `POST /logs/batch` accepted
    pub max_batch_size: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "TILL_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            PathBuf::from(value_or_default(&lookup, "TILL_API_DATABASE_PATH", "till-api.db"));

        let default_list_limit = value_or_default(&lookup, "TILL_API_DEFAULT_LIST_LIMIT", "100")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TILL_API_DEFAULT_LIST_LIMIT must be an integer in [1, 1000]".to_string(),
                )
            })?;
        if !(1..=1_000).contains(&default_list_limit) {
            return Err(ConfigError::Invalid(
                "TILL_API_DEFAULT_LIST_LIMIT must be in [1, 1000]".to_string(),
            ));
        }

        let max_batch_size = value_or_default(&lookup, "TILL_API_MAX_BATCH_SIZE", "500")
            .parse::<usize>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "TILL_API_MAX_BATCH_SIZE must be an integer in [1, 5000]".to_string(),
                )
            })?;
        if !(1..=5_000).contains(&max_batch_size) {
            return Err(ConfigError::Invalid(
                "TILL_API_MAX_BATCH_SIZE must be in [1, 5000]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database_path,
            default_list_limit,
            max_batch_size,
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_path: PathBuf::from(":memory:"),
            default_list_limit: 100,
            max_batch_size: 5,
        }
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_to_empty_environment() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("till-api.db"));
        assert_eq!(config.default_list_limit, 100);
        assert_eq!(config.max_batch_size, 500);
    }

    #[test]
    fn limits_are_range_checked() {
        let err = config(&[("TILL_API_DEFAULT_LIST_LIMIT", "0")]).unwrap_err();
        assert!(err.to_string().contains("TILL_API_DEFAULT_LIST_LIMIT"));

        assert!(config(&[("TILL_API_MAX_BATCH_SIZE", "9000")]).is_err());
        assert!(config(&[("TILL_API_MAX_BATCH_SIZE", "lots")]).is_err());
        assert_eq!(
            config(&[("TILL_API_MAX_BATCH_SIZE", " 50 ")])
                .unwrap()
                .max_batch_size,
            50
        );
    }
}
