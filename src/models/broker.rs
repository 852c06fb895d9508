use super::{deserialize_configs, BrokerId, RackId};
use crate::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A live broker as reported by cluster metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterBroker {
    pub id: BrokerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack: Option<RackId>,
}

impl ClusterBroker {
    pub fn new(id: BrokerId, rack: Option<&str>) -> Self {
        Self {
            id,
            rack: rack.filter(|r| !r.is_empty()).map(str::to_string),
        }
    }
}

/// Desired dynamic configuration of one broker (`broker`) or of the
/// cluster-wide default (`brokers`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BrokerSpec {
    #[serde(default, deserialize_with = "deserialize_configs")]
    pub configs: BTreeMap<String, Option<String>>,
    #[serde(default)]
    pub delete_undefined_configs: bool,
}

pub type BrokersSpec = BrokerSpec;

impl BrokerSpec {
    pub fn validate(&self) -> Result<()> {
        if self.configs.keys().any(|k| k.trim().is_empty()) {
            return Err(ReconcileError::Validation(
                "config names must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Config keys with a concrete value
    pub fn set_configs(&self) -> BTreeMap<String, String> {
        self.configs
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_rack_is_none() {
        assert_eq!(ClusterBroker::new(1, Some("")).rack, None);
        assert_eq!(ClusterBroker::new(1, Some("az1")).rack.as_deref(), Some("az1"));
    }

    #[test]
    fn test_broker_spec_parse() {
        let spec: BrokerSpec =
            serde_yaml::from_str("configs:\n  log.cleaner.threads: 2\n").unwrap();
        assert_eq!(spec.configs["log.cleaner.threads"].as_deref(), Some("2"));
        assert!(!spec.delete_undefined_configs);
        assert!(spec.validate().is_ok());
    }
}
