//! Statistics gathering configuration.

use crate::error::{Result, StatsError};
use ofstats_types::StatisticsKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default interval between polling passes.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;

/// Default bound on one statistics pull.
pub const DEFAULT_PULL_TIMEOUT_MS: u64 = 10_000;

/// Configuration of periodic statistics gathering for a device.
///
/// Every field has a default, so an empty YAML document is valid.
///
/// ```
/// use ofstats::StatisticsConfig;
/// use ofstats_types::StatisticsKind;
///
/// let config = StatisticsConfig::from_yaml_str("poll_interval_ms: 500\nkinds: [FLOW, PORT]").unwrap();
/// assert!(config.polling_enabled);
/// assert_eq!(config.kinds, vec![StatisticsKind::Flow, StatisticsKind::Port]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticsConfig {
    /// Master switch for periodic gathering.
    pub polling_enabled: bool,
    /// Interval between polling passes.
    pub poll_interval_ms: u64,
    /// Bound on one pull; a pull still collecting after this is cancelled.
    pub pull_timeout_ms: u64,
    /// Kinds gathered by one polling pass, in order.
    pub kinds: Vec<StatisticsKind>,
}

impl Default for StatisticsConfig {
    fn default() -> Self {
        Self {
            polling_enabled: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            pull_timeout_ms: DEFAULT_PULL_TIMEOUT_MS,
            // Configuration before counters, so ids are known before their statistics.
            kinds: vec![
                StatisticsKind::GroupDesc,
                StatisticsKind::Group,
                StatisticsKind::MeterConfig,
                StatisticsKind::Meter,
                StatisticsKind::Flow,
                StatisticsKind::Table,
                StatisticsKind::Port,
                StatisticsKind::Queue,
            ],
        }
    }
}

impl StatisticsConfig {
    /// Parses and validates a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: StatisticsConfig = serde_yaml::from_str(yaml)
            .map_err(|e| StatsError::config(format!("invalid YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(StatsError::config("poll_interval_ms must be greater than 0"));
        }
        if self.pull_timeout_ms == 0 {
            return Err(StatsError::config("pull_timeout_ms must be greater than 0"));
        }
        if self.kinds.is_empty() {
            return Err(StatsError::config("kinds must not be empty"));
        }

        let mut seen = HashSet::new();
        for kind in &self.kinds {
            if *kind == StatisticsKind::Description {
                return Err(StatsError::config(
                    "DESCRIPTION is static device data and cannot be polled",
                ));
            }
            if !seen.insert(*kind) {
                return Err(StatsError::config(format!("duplicate kind {}", kind)));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn pull_timeout(&self) -> Duration {
        Duration::from_millis(self.pull_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_default_is_valid() {
        let config = StatisticsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.kinds.len(), 8);
        assert_eq!(config.kinds[0], StatisticsKind::GroupDesc);
        assert_eq!(config.pull_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = StatisticsConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config, StatisticsConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        let cases = [
            "poll_interval_ms: 0",
            "pull_timeout_ms: 0",
            "kinds: []",
            "kinds: [FLOW, PORT, FLOW]",
            "kinds: [DESCRIPTION]",
        ];
        for yaml in cases {
            let err = StatisticsConfig::from_yaml_str(yaml).unwrap_err();
            assert!(matches!(err, StatsError::Config(_)), "{}: {}", yaml, err);
        }
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(StatisticsConfig::from_yaml_str("kinds: [AGGREGATE]").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "polling_enabled: false").unwrap();
        writeln!(file, "kinds: [GROUP_DESC, GROUP]").unwrap();

        let config = StatisticsConfig::load(file.path()).unwrap();
        assert!(!config.polling_enabled);
        assert_eq!(config.kinds, vec![StatisticsKind::GroupDesc, StatisticsKind::Group]);
        assert_eq!(config.poll_interval_ms, DEFAULT_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = StatisticsConfig::load("/nonexistent/ofstats.yaml").unwrap_err();
        assert!(matches!(err, StatsError::Io(_)));
    }
}
