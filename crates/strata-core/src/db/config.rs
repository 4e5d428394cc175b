use crate::db::error::RequestError;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// StoreConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Keep every delta set so reads can travel back in time.
    pub keep_all_versions: bool,
    pub default_scan_limit: u32,
    pub max_scan_limit: u32,
    pub max_get_keys: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keep_all_versions: true,
            default_scan_limit: 100,
            max_scan_limit: 10_000,
            max_get_keys: 1_000,
        }
    }
}

impl StoreConfig {
    /// Latest-state-only store: no history, no time travel.
    #[must_use]
    pub fn without_history() -> Self {
        Self {
            keep_all_versions: false,
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        if config.default_scan_limit == 0 || config.default_scan_limit > config.max_scan_limit {
            return Err(ConfigError::DefaultLimit {
                default: config.default_scan_limit,
                max: config.max_scan_limit,
            });
        }

        Ok(config)
    }

    /// Resolve a requested scan limit against the configured bounds.
    pub(crate) const fn scan_limit(&self, requested: Option<u32>) -> Result<usize, RequestError> {
        match requested {
            None => Ok(self.default_scan_limit as usize),
            Some(limit) if limit == 0 || limit > self.max_scan_limit => {
                Err(RequestError::LimitOutOfRange {
                    limit,
                    max: self.max_scan_limit,
                })
            }
            Some(limit) => Ok(limit as usize),
        }
    }

    pub(crate) const fn check_keys(&self, count: usize) -> Result<(), RequestError> {
        if count > self.max_get_keys {
            return Err(RequestError::TooManyKeys {
                count,
                max: self.max_get_keys,
            });
        }

        Ok(())
    }
}

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid store config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("default scan limit {default} must be within 1..={max}")]
    DefaultLimit { default: u32, max: u32 },
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = StoreConfig::from_json(r#"{ "keep_all_versions": false }"#).unwrap();

        assert!(!config.keep_all_versions);
        assert_eq!(config.default_scan_limit, 100);
        assert_eq!(config.max_get_keys, 1_000);
    }

    #[test]
    fn inconsistent_limits_are_rejected() {
        let err = StoreConfig::from_json(r#"{ "default_scan_limit": 50, "max_scan_limit": 10 }"#)
            .unwrap_err();

        assert!(matches!(err, ConfigError::DefaultLimit { .. }));
        assert!(StoreConfig::from_json("[").is_err());
    }

    #[test]
    fn scan_limits_are_bounded() {
        let config = StoreConfig::default();

        assert_eq!(config.scan_limit(None), Ok(100));
        assert_eq!(config.scan_limit(Some(5)), Ok(5));
        assert!(config.scan_limit(Some(0)).is_err());
        assert!(config.scan_limit(Some(10_001)).is_err());
        assert!(config.check_keys(1_001).is_err());
    }
}
