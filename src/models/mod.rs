// Type aliases used across models
pub type BrokerId = i32;
pub type RackId = String;
pub type PartitionIndex = usize;

/// Replica list per partition, indexed by partition; position 0 is the preferred leader
pub type Assignment = Vec<Vec<BrokerId>>;

/// Rack analogue of [`Assignment`], only used to constrain broker choice
pub type RackAssignment = Vec<Vec<RackId>>;

// Module declarations
mod acl;
mod assignment;
mod broker;
mod cluster;
mod definition;
mod topic;

// Re-exports
pub use acl::{
    AclEntry, AclEntryGroup, AclOperation, AclResource, AclResourceType, AclSpec, PatternType,
    PermissionType, ResourceAcls,
};
pub use assignment::{changed_rows, rack_rows, replication_factor};
pub use broker::{BrokerSpec, BrokersSpec, ClusterBroker};
pub use cluster::{ClusterMetadata, ConfigEntry, ConfigSource, PartitionReassignment, TopicMetadata};
pub use definition::{
    DefinitionHeader, DocumentFormat, Metadata, ResourceDefinition, ResourceKind,
    KNOWN_API_VERSIONS,
};
pub use topic::TopicSpec;

pub(crate) use definition::deserialize_configs;
