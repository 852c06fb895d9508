//! The cluster collaborator: everything the reconcilers need from the
//! wire-protocol client, expressed as one async trait.

use crate::actions::ConfigOperation;
use crate::models::{
    AclEntry, AclEntryGroup, AclResource, AclResourceType, Assignment, BrokerId, ClusterMetadata,
    ConfigEntry, PartitionIndex, PartitionReassignment, ResourceAcls,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// An error reported by the cluster, carrying the protocol error code
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{name} (code {code}): {message}")]
pub struct ClusterError {
    pub code: i16,
    pub name: String,
    pub message: String,
}

impl ClusterError {
    pub fn new(code: i16, name: &str, message: impl Into<String>) -> Self {
        Self {
            code,
            name: name.to_string(),
            message: message.into(),
        }
    }

    pub fn unknown_topic(topic: &str) -> Self {
        Self::new(3, "UNKNOWN_TOPIC_OR_PARTITION", format!("topic '{}' does not exist", topic))
    }

    pub fn unsupported_version(api: ApiKey) -> Self {
        Self::new(35, "UNSUPPORTED_VERSION", format!("{} is not supported", api))
    }

    pub fn topic_already_exists(topic: &str) -> Self {
        Self::new(36, "TOPIC_ALREADY_EXISTS", format!("topic '{}' already exists", topic))
    }

    pub fn invalid_partitions(message: impl Into<String>) -> Self {
        Self::new(37, "INVALID_PARTITIONS", message)
    }

    pub fn invalid_replica_assignment(message: impl Into<String>) -> Self {
        Self::new(39, "INVALID_REPLICA_ASSIGNMENT", message)
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(40, "INVALID_CONFIG", message)
    }
}

pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

/// Admin APIs whose support is probed before use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiKey {
    DescribeAcls = 29,
    CreateAcls = 30,
    DeleteAcls = 31,
    DescribeConfigs = 32,
    AlterConfigs = 33,
    CreatePartitions = 37,
    IncrementalAlterConfigs = 44,
    AlterPartitionReassignments = 45,
    ListPartitionReassignments = 46,
}

impl fmt::Display for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} (key {})", self, *self as i16)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfigResourceType {
    Topic,
    Broker,
    BrokerLogger,
}

/// Target of a config describe/alter call; the cluster-wide broker default
/// is the broker resource with an empty name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResource {
    pub resource_type: ConfigResourceType,
    pub name: String,
}

impl ConfigResource {
    pub fn topic(name: &str) -> Self {
        Self {
            resource_type: ConfigResourceType::Topic,
            name: name.to_string(),
        }
    }

    pub fn broker(id: BrokerId) -> Self {
        Self {
            resource_type: ConfigResourceType::Broker,
            name: id.to_string(),
        }
    }

    pub fn broker_default() -> Self {
        Self {
            resource_type: ConfigResourceType::Broker,
            name: String::new(),
        }
    }

    pub fn is_broker_default(&self) -> bool {
        self.resource_type == ConfigResourceType::Broker && self.name.is_empty()
    }
}

impl fmt::Display for ConfigResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.resource_type {
            ConfigResourceType::Topic => write!(f, "topic {}", self.name),
            ConfigResourceType::Broker if self.name.is_empty() => write!(f, "broker defaults"),
            ConfigResourceType::Broker => write!(f, "broker {}", self.name),
            ConfigResourceType::BrokerLogger => write!(f, "broker logger {}", self.name),
        }
    }
}

/// How a new topic's replicas are laid out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopicLayout {
    Uniform {
        partitions: usize,
        replication_factor: usize,
    },
    Explicit(Assignment),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTopicRequest {
    pub name: String,
    pub configs: BTreeMap<String, String>,
    pub layout: TopicLayout,
}

/// Remote operations the reconcilers depend on
#[async_trait]
pub trait ClusterAdmin: Send + Sync {
    /// Brokers plus placement of the named topics (all topics for `None`).
    /// Missing topics are reported with `exists: false` unless
    /// `error_on_missing` is set.
    async fn describe_metadata(
        &self,
        topics: Option<&[String]>,
        error_on_missing: bool,
    ) -> ClusterResult<ClusterMetadata>;

    async fn describe_configs(&self, resource: &ConfigResource) -> ClusterResult<Vec<ConfigEntry>>;

    async fn alter_configs(
        &self,
        resource: &ConfigResource,
        ops: &[ConfigOperation],
        incremental: bool,
        validate_only: bool,
    ) -> ClusterResult<()>;

    async fn describe_acls(&self, resource: &AclResource) -> ClusterResult<Vec<AclEntryGroup>>;

    async fn describe_all_acls(
        &self,
        resource_type: AclResourceType,
    ) -> ClusterResult<Vec<ResourceAcls>>;

    async fn create_acls(&self, resource: &AclResource, entries: &[AclEntry]) -> ClusterResult<()>;

    async fn delete_acls(&self, resource: &AclResource, entries: &[AclEntry]) -> ClusterResult<()>;

    async fn create_topic(&self, request: &CreateTopicRequest, validate_only: bool) -> ClusterResult<()>;

    async fn create_partitions(
        &self,
        topic: &str,
        new_count: usize,
        new_assignments: &Assignment,
        validate_only: bool,
    ) -> ClusterResult<()>;

    async fn alter_partition_assignments(
        &self,
        topic: &str,
        rows: &BTreeMap<PartitionIndex, Vec<BrokerId>>,
    ) -> ClusterResult<()>;

    async fn list_partition_reassignments(
        &self,
        topic: &str,
        partitions: &[PartitionIndex],
    ) -> ClusterResult<Vec<PartitionReassignment>>;

    async fn probe_support(&self, api: ApiKey) -> ClusterResult<bool>;
}
