use crate::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// How broker and topic config alterations are sent to the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigAlterMode {
    /// Probe the cluster and prefer incremental alteration when supported
    #[default]
    Auto,
    Incremental,
    /// Whole-resource replacement of the dynamic config set
    NonIncremental,
}

/// Options that control how definitions are applied
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ApplyOptions {
    /// Compute and report changes without executing them
    pub dry_run: bool,

    /// Keep applying the remaining definitions after one fails
    pub continue_on_error: bool,

    /// Send operations with the cluster-side validate-only flag
    pub validate_only: bool,

    pub config_alter_mode: ConfigAlterMode,

    /// Overrides every topic's `reassignmentAwaitTimeoutSec`
    #[serde(with = "optional_secs", rename = "reassignmentAwaitTimeoutSec")]
    pub reassignment_await_timeout: Option<Duration>,

    /// Delay between two reassignment progress checks
    #[serde(with = "secs", rename = "reassignmentPollIntervalSec")]
    pub reassignment_poll_interval: Duration,

    /// Balance new replicas against the replicas of every other topic
    pub balance_across_topics: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            continue_on_error: false,
            validate_only: false,
            config_alter_mode: ConfigAlterMode::Auto,
            reassignment_await_timeout: None,
            reassignment_poll_interval: Duration::from_secs(5),
            balance_across_topics: false,
        }
    }
}

impl ApplyOptions {
    /// Options for previewing changes only
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Default::default()
        }
    }

    /// Options for applying every definition even when some fail
    pub fn continue_on_error() -> Self {
        Self {
            continue_on_error: true,
            ..Default::default()
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| ReconcileError::Parse(format!("invalid apply options: {}", e)))
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ReconcileError::Parse(format!("cannot read options file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
    }

    /// Await timeout for a topic, given the timeout its definition declares
    pub fn await_timeout_for(&self, declared_secs: u64) -> Duration {
        self.reassignment_await_timeout
            .unwrap_or_else(|| Duration::from_secs(declared_secs))
    }
}

mod secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod optional_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(duration) => serializer.serialize_some(&duration.as_secs()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ApplyOptions::default();
        assert!(!options.dry_run);
        assert_eq!(options.config_alter_mode, ConfigAlterMode::Auto);
        assert_eq!(options.reassignment_poll_interval, Duration::from_secs(5));
        assert_eq!(options.await_timeout_for(30), Duration::from_secs(30));
    }

    #[test]
    fn test_presets() {
        assert!(ApplyOptions::dry_run().dry_run);
        assert!(ApplyOptions::continue_on_error().continue_on_error);
        assert!(!ApplyOptions::continue_on_error().dry_run);
    }

    #[test]
    fn test_from_yaml() {
        let yaml = "dryRun: true\nconfigAlterMode: nonIncremental\nreassignmentAwaitTimeoutSec: 120\n";
        let options = ApplyOptions::from_yaml_str(yaml).unwrap();
        assert!(options.dry_run);
        assert_eq!(options.config_alter_mode, ConfigAlterMode::NonIncremental);
        assert_eq!(options.reassignment_await_timeout, Some(Duration::from_secs(120)));
        assert_eq!(options.await_timeout_for(5), Duration::from_secs(120));
        assert_eq!(options.reassignment_poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_yaml_is_parse_error() {
        let err = ApplyOptions::from_yaml_str("dryRun: [").unwrap_err();
        assert!(matches!(err, ReconcileError::Parse(_)));
    }
}
