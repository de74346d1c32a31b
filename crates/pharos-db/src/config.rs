//! Pricing service configuration.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                    | Default         |
//! |-----------------------------|-----------------|
//! | `PHAROS_DB_PATH`            | `./pharos.db`   |
//! | `PHAROS_DB_MAX_CONNECTIONS` | `5`             |
//! | `PHAROS_CURRENCY_SCALE`     | `2`             |
//! | `PHAROS_CURRENCY_CODE`      | `EUR`           |

use pharos_core::RoundingPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

use crate::pool::DbConfig;

/// Largest supported number of minor-unit digits.
pub const MAX_CURRENCY_SCALE: u32 = 6;

/// Pricing service configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PharosConfig {
    /// SQLite database file, or `:memory:`
    pub db_path: PathBuf,

    /// Connection pool size
    pub db_max_connections: u32,

    /// Minor-unit digits of the pricing currency (2 for EUR, 0 for JPY)
    pub currency_scale: u32,

    /// ISO 4217 code, informational only
    pub currency_code: String,
}

impl PharosConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = PharosConfig {
            db_path: lookup("PHAROS_DB_PATH")
                .unwrap_or_else(|| "./pharos.db".to_string())
                .into(),

            db_max_connections: lookup("PHAROS_DB_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PHAROS_DB_MAX_CONNECTIONS".to_string()))?,

            currency_scale: lookup("PHAROS_CURRENCY_SCALE")
                .unwrap_or_else(|| "2".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PHAROS_CURRENCY_SCALE".to_string()))?,

            currency_code: lookup("PHAROS_CURRENCY_CODE")
                .unwrap_or_else(|| "EUR".to_string())
                .trim()
                .to_ascii_uppercase(),
        };

        if config.db_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingRequired("PHAROS_DB_PATH".to_string()));
        }
        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue("PHAROS_DB_MAX_CONNECTIONS".to_string()));
        }
        if config.currency_scale > MAX_CURRENCY_SCALE {
            return Err(ConfigError::InvalidValue("PHAROS_CURRENCY_SCALE".to_string()));
        }
        if config.currency_code.len() != 3
            || !config.currency_code.chars().all(|c| c.is_ascii_uppercase())
        {
            return Err(ConfigError::InvalidValue("PHAROS_CURRENCY_CODE".to_string()));
        }

        Ok(config)
    }

    /// Rounding policy for the configured currency.
    pub fn rounding_policy(&self) -> RoundingPolicy {
        RoundingPolicy::new(self.currency_scale)
    }

    /// Database configuration for the configured path.
    pub fn db_config(&self) -> DbConfig {
        if self.db_path.as_os_str() == ":memory:" {
            DbConfig::in_memory()
        } else {
            DbConfig::new(self.db_path.clone()).max_connections(self.db_max_connections)
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = PharosConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.db_path, PathBuf::from("./pharos.db"));
        assert_eq!(config.db_max_connections, 5);
        assert_eq!(config.rounding_policy().scale(), 2);
        assert_eq!(config.currency_code, "EUR");
    }

    #[test]
    fn test_overrides_and_memory_db() {
        let config = PharosConfig::from_lookup(lookup(&[
            ("PHAROS_DB_PATH", ":memory:"),
            ("PHAROS_CURRENCY_SCALE", "0"),
            ("PHAROS_CURRENCY_CODE", "jpy"),
        ]))
        .unwrap();

        assert_eq!(config.currency_code, "JPY");
        assert_eq!(config.rounding_policy().scale(), 0);
        assert!(config.db_config().is_in_memory());
    }

    #[test]
    fn test_invalid_values() {
        let err = PharosConfig::from_lookup(lookup(&[("PHAROS_CURRENCY_SCALE", "two")]));
        assert!(matches!(
            err,
            Err(ConfigError::InvalidValue(ref key)) if key == "PHAROS_CURRENCY_SCALE"
        ));

        assert!(PharosConfig::from_lookup(lookup(&[("PHAROS_CURRENCY_SCALE", "9")])).is_err());
        assert!(PharosConfig::from_lookup(lookup(&[("PHAROS_DB_MAX_CONNECTIONS", "0")])).is_err());
        assert!(PharosConfig::from_lookup(lookup(&[("PHAROS_CURRENCY_CODE", "EURO")])).is_err());
        assert!(matches!(
            PharosConfig::from_lookup(lookup(&[("PHAROS_DB_PATH", "")])),
            Err(ConfigError::MissingRequired(_))
        ));
    }
}
