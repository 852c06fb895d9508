use super::{Assignment, BrokerId, ClusterBroker, PartitionIndex, RackId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where the effective value of a config entry comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfigSource {
    DynamicTopicConfig,
    DynamicBrokerConfig,
    DynamicDefaultBrokerConfig,
    DynamicBrokerLoggerConfig,
    StaticBrokerConfig,
    DefaultConfig,
    Unknown,
}

impl ConfigSource {
    /// Only dynamically set values can be altered or deleted remotely
    pub fn is_dynamic(&self) -> bool {
        matches!(
            self,
            ConfigSource::DynamicTopicConfig
                | ConfigSource::DynamicBrokerConfig
                | ConfigSource::DynamicDefaultBrokerConfig
                | ConfigSource::DynamicBrokerLoggerConfig
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigEntry {
    pub name: String,
    pub value: Option<String>,
    #[serde(default)]
    pub is_sensitive: bool,
    #[serde(default)]
    pub read_only: bool,
    pub source: ConfigSource,
}

impl ConfigEntry {
    pub fn new(name: &str, value: &str, source: ConfigSource) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.to_string()),
            is_sensitive: false,
            read_only: false,
            source,
        }
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.is_sensitive = true;
        self.value = None;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub exists: bool,
    pub partitions: Assignment,
}

/// An in-flight partition reassignment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionReassignment {
    pub partition: PartitionIndex,
    pub replicas: Vec<BrokerId>,
    #[serde(default)]
    pub adding_replicas: Vec<BrokerId>,
    #[serde(default)]
    pub removing_replicas: Vec<BrokerId>,
}

/// Brokers and topic placement as reported by the cluster
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMetadata {
    pub brokers: Vec<ClusterBroker>,
    #[serde(default)]
    pub topics: BTreeMap<String, TopicMetadata>,
}

impl ClusterMetadata {
    pub fn broker_ids(&self) -> Vec<BrokerId> {
        let mut ids: Vec<BrokerId> = self.brokers.iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    pub fn has_broker(&self, id: BrokerId) -> bool {
        self.brokers.iter().any(|b| b.id == id)
    }

    pub fn rack_of(&self, id: BrokerId) -> Option<&str> {
        self.brokers
            .iter()
            .find(|b| b.id == id)
            .and_then(|b| b.rack.as_deref())
    }

    /// Brokers grouped by rack, each list sorted; brokers without a rack are left out
    pub fn brokers_by_rack(&self) -> BTreeMap<RackId, Vec<BrokerId>> {
        let mut rack_mapping: BTreeMap<RackId, Vec<BrokerId>> = BTreeMap::new();
        for broker in &self.brokers {
            if let Some(rack) = &broker.rack {
                rack_mapping.entry(rack.clone()).or_default().push(broker.id);
            }
        }
        for ids in rack_mapping.values_mut() {
            ids.sort_unstable();
        }
        rack_mapping
    }

    pub fn topic(&self, name: &str) -> Option<&TopicMetadata> {
        self.topics.get(name).filter(|t| t.exists)
    }

    /// Replica counts per broker across every described topic except `exclude`
    pub fn replica_counts_excluding(&self, exclude: &str) -> BTreeMap<BrokerId, usize> {
        let mut counts = BTreeMap::new();
        for (name, topic) in &self.topics {
            if name == exclude || !topic.exists {
                continue;
            }
            for broker in topic.partitions.iter().flatten() {
                *counts.entry(*broker).or_insert(0) += 1;
            }
        }
        counts
    }
}
