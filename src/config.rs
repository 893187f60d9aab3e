//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Directory for the rolling log file.
    pub log_dir: PathBuf,
    /// Minimum classifier confidence before a request counts as resolved.
    pub confidence_threshold: f32,
    /// Per-request handler timeout.
    pub request_timeout: Duration,
    /// Maximum number of files hashed by a single directory scan.
    pub scan_limit: usize,
    /// Maximum number of past interactions summarized by a memory query.
    pub recall_limit: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./data/brainsaver.db"),
            log_dir: PathBuf::from("./data/logs"),
            confidence_threshold: 0.3,
            request_timeout: Duration::from_secs(10),
            scan_limit: 5_000,
            recall_limit: 10,
        }
    }
}

impl AssistantConfig {
    /// Build a configuration from `BRAINSAVER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("BRAINSAVER_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("BRAINSAVER_LOG_DIR") {
            config.log_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("BRAINSAVER_CONFIDENCE_THRESHOLD") {
            let threshold: f32 = parse_value("BRAINSAVER_CONFIDENCE_THRESHOLD", &raw)?;
            if !(0.0..=1.0).contains(&threshold) {
                return Err(ConfigError::InvalidValue {
                    key: "BRAINSAVER_CONFIDENCE_THRESHOLD".into(),
                    message: format!("{threshold} is outside 0.0..=1.0"),
                });
            }
            config.confidence_threshold = threshold;
        }
        if let Some(raw) = lookup("BRAINSAVER_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = parse_value("BRAINSAVER_REQUEST_TIMEOUT_SECS", &raw)?;
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "BRAINSAVER_REQUEST_TIMEOUT_SECS".into(),
                    message: "timeout must be at least one second".into(),
                });
            }
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(raw) = lookup("BRAINSAVER_SCAN_LIMIT") {
            config.scan_limit = parse_value("BRAINSAVER_SCAN_LIMIT", &raw)?;
        }
        if let Some(raw) = lookup("BRAINSAVER_RECALL_LIMIT") {
            config.recall_limit = parse_value("BRAINSAVER_RECALL_LIMIT", &raw)?;
        }

        Ok(config)
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_set() {
        let config = AssistantConfig::from_lookup(|_| None).unwrap();
        assert!((config.confidence_threshold - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.recall_limit, 10);
    }

    #[test]
    fn reads_overrides() {
        let config = AssistantConfig::from_lookup(lookup_from(&[
            ("BRAINSAVER_DB_PATH", "/tmp/x.db"),
            ("BRAINSAVER_CONFIDENCE_THRESHOLD", "0.5"),
            ("BRAINSAVER_REQUEST_TIMEOUT_SECS", "3"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert!((config.confidence_threshold - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.request_timeout, Duration::from_secs(3));
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let err = AssistantConfig::from_lookup(lookup_from(&[(
            "BRAINSAVER_CONFIDENCE_THRESHOLD",
            "1.5",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_garbage_numbers() {
        let err =
            AssistantConfig::from_lookup(lookup_from(&[("BRAINSAVER_SCAN_LIMIT", "lots")]))
                .unwrap_err();
        assert!(err.to_string().contains("BRAINSAVER_SCAN_LIMIT"));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(
            AssistantConfig::from_lookup(lookup_from(&[(
                "BRAINSAVER_REQUEST_TIMEOUT_SECS",
                "0"
            )]))
            .is_err()
        );
    }
}
