//! In-memory cluster for testing.
//!
//! `MockCluster` implements [`ClusterAdmin`] over plain collections: topics
//! with their replica rows, dynamic configs per resource, static broker
//! configs, ACL bindings and in-flight reassignments that finish after a
//! configurable number of progress checks. Every call is recorded so tests
//! can assert on what was sent.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::actions::{ConfigOpType, ConfigOperation};
use crate::cluster::{
    ApiKey, ClusterAdmin, ClusterError, ClusterResult, ConfigResource, ConfigResourceType,
    CreateTopicRequest, TopicLayout,
};
use crate::models::{
    AclEntry, AclEntryGroup, AclResource, AclResourceType, Assignment, BrokerId, ClusterBroker,
    ClusterMetadata, ConfigEntry, ConfigSource, PartitionIndex, PartitionReassignment,
    ResourceAcls, TopicMetadata,
};

/// A recorded collaborator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub method: &'static str,
    pub target: String,
}

impl MockCall {
    /// Whether the call changes cluster state
    pub fn is_mutation(&self) -> bool {
        !["describe", "list", "probe"]
            .iter()
            .any(|prefix| self.method.starts_with(prefix))
    }
}

#[derive(Debug, Clone)]
struct InFlight {
    reassignment: PartitionReassignment,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct ClusterState {
    brokers: Vec<ClusterBroker>,
    topics: BTreeMap<String, Assignment>,
    dynamic_configs: HashMap<ConfigResource, BTreeMap<String, String>>,
    static_broker_configs: BTreeMap<String, (String, bool)>,
    topic_defaults: BTreeMap<String, String>,
    sensitive_keys: HashSet<String>,
    acls: BTreeMap<AclResource, BTreeSet<AclEntry>>,
    reassignments: BTreeMap<(String, PartitionIndex), InFlight>,
    reassignment_polls: u32,
    unsupported: HashSet<ApiKey>,
    failures: HashMap<&'static str, ClusterError>,
    calls: Vec<MockCall>,
}

impl ClusterState {
    fn record(&mut self, method: &'static str, target: impl Into<String>) -> ClusterResult<()> {
        self.calls.push(MockCall {
            method,
            target: target.into(),
        });
        match self.failures.remove(method) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn topic_rows(&self, topic: &str) -> ClusterResult<&Assignment> {
        self.topics
            .get(topic)
            .ok_or_else(|| ClusterError::unknown_topic(topic))
    }

    fn broker_ids(&self) -> Vec<BrokerId> {
        let mut ids: Vec<BrokerId> = self.brokers.iter().map(|b| b.id).collect();
        ids.sort_unstable();
        ids
    }

    fn entry(&self, name: &str, value: &str, source: ConfigSource) -> ConfigEntry {
        let entry = ConfigEntry::new(name, value, source);
        if self.sensitive_keys.contains(name) {
            entry.sensitive()
        } else {
            entry
        }
    }

    fn dynamic(&self, resource: &ConfigResource) -> impl Iterator<Item = (&String, &String)> {
        self.dynamic_configs.get(resource).into_iter().flatten()
    }
}

/// In-memory [`ClusterAdmin`]
#[derive(Debug, Default)]
pub struct MockCluster {
    state: RwLock<ClusterState>,
}

impl MockCluster {
    pub fn new(brokers: &[(BrokerId, Option<&str>)]) -> Self {
        let mut cluster = Self::default();
        cluster.state.get_mut().brokers = brokers
            .iter()
            .map(|(id, rack)| ClusterBroker::new(*id, *rack))
            .collect();
        cluster
    }

    /// Brokers `1..=count` without racks
    pub fn with_brokers(count: BrokerId) -> Self {
        let brokers: Vec<(BrokerId, Option<&str>)> = (1..=count).map(|id| (id, None)).collect();
        Self::new(&brokers)
    }

    pub fn with_topic(mut self, name: &str, assignment: Assignment) -> Self {
        self.state.get_mut().topics.insert(name.to_string(), assignment);
        self
    }

    /// Set a dynamic config value on a topic or broker resource
    pub fn with_config(mut self, resource: ConfigResource, name: &str, value: &str) -> Self {
        self.state
            .get_mut()
            .dynamic_configs
            .entry(resource)
            .or_default()
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_static_broker_config(mut self, name: &str, value: &str, read_only: bool) -> Self {
        self.state
            .get_mut()
            .static_broker_configs
            .insert(name.to_string(), (value.to_string(), read_only));
        self
    }

    /// A cluster-wide default every topic reports unless overridden
    pub fn with_topic_default(mut self, name: &str, value: &str) -> Self {
        self.state
            .get_mut()
            .topic_defaults
            .insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_sensitive_key(mut self, name: &str) -> Self {
        self.state.get_mut().sensitive_keys.insert(name.to_string());
        self
    }

    pub fn with_acls(mut self, resource: AclResource, entries: Vec<AclEntry>) -> Self {
        self.state
            .get_mut()
            .acls
            .entry(resource)
            .or_default()
            .extend(entries);
        self
    }

    /// Reassignments started through this cluster stay in flight for
    /// `polls` progress checks
    pub fn with_reassignment_polls(mut self, polls: u32) -> Self {
        self.state.get_mut().reassignment_polls = polls;
        self
    }

    pub fn with_reassignment_in_progress(
        mut self,
        topic: &str,
        reassignment: PartitionReassignment,
        polls: u32,
    ) -> Self {
        self.state.get_mut().reassignments.insert(
            (topic.to_string(), reassignment.partition),
            InFlight {
                reassignment,
                polls_left: polls,
            },
        );
        self
    }

    pub fn without_support(mut self, api: ApiKey) -> Self {
        self.state.get_mut().unsupported.insert(api);
        self
    }

    /// Make the next call of `method` fail with `err`
    pub async fn fail_next(&self, method: &'static str, err: ClusterError) {
        self.state.write().await.failures.insert(method, err);
    }

    pub async fn calls(&self) -> Vec<MockCall> {
        self.state.read().await.calls.clone()
    }

    pub async fn mutations(&self) -> Vec<MockCall> {
        self.calls()
            .await
            .into_iter()
            .filter(MockCall::is_mutation)
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.write().await.calls.clear();
    }

    pub async fn topic_assignment(&self, topic: &str) -> Option<Assignment> {
        self.state.read().await.topics.get(topic).cloned()
    }

    pub async fn config_value(&self, resource: &ConfigResource, name: &str) -> Option<String> {
        self.state
            .read()
            .await
            .dynamic_configs
            .get(resource)
            .and_then(|configs| configs.get(name))
            .cloned()
    }

    pub async fn acl_entries(&self, resource: &AclResource) -> Vec<AclEntry> {
        self.state
            .read()
            .await
            .acls
            .get(resource)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn reassignments_in_flight(&self) -> usize {
        self.state.read().await.reassignments.len()
    }
}

fn round_robin_rows(brokers: &[BrokerId], first: usize, count: usize, rf: usize) -> Assignment {
    (first..first + count)
        .map(|p| (0..rf).map(|r| brokers[(p + r) % brokers.len()]).collect())
        .collect()
}

fn check_rows(brokers: &[BrokerId], rows: &Assignment) -> ClusterResult<()> {
    match rows.iter().flatten().find(|b| !brokers.contains(b)) {
        Some(unknown) => Err(ClusterError::invalid_replica_assignment(format!(
            "broker {} is not part of the cluster",
            unknown
        ))),
        None => Ok(()),
    }
}

#[async_trait]
impl ClusterAdmin for MockCluster {
    async fn describe_metadata(
        &self,
        topics: Option<&[String]>,
        error_on_missing: bool,
    ) -> ClusterResult<ClusterMetadata> {
        let mut state = self.state.write().await;
        state.record("describe_metadata", topics.map(|t| t.join(",")).unwrap_or_default())?;

        let names: Vec<String> = match topics {
            Some(names) => names.to_vec(),
            None => state.topics.keys().cloned().collect(),
        };
        let mut described = BTreeMap::new();
        for name in names {
            let metadata = match state.topics.get(&name) {
                Some(rows) => TopicMetadata {
                    exists: true,
                    partitions: rows.clone(),
                },
                None if error_on_missing => return Err(ClusterError::unknown_topic(&name)),
                None => TopicMetadata::default(),
            };
            described.insert(name, metadata);
        }
        Ok(ClusterMetadata {
            brokers: state.brokers.clone(),
            topics: described,
        })
    }

    async fn describe_configs(&self, resource: &ConfigResource) -> ClusterResult<Vec<ConfigEntry>> {
        let mut state = self.state.write().await;
        state.record("describe_configs", resource.to_string())?;
        let state = &*state;

        let mut entries = Vec::new();
        match resource.resource_type {
            ConfigResourceType::Topic => {
                state.topic_rows(&resource.name)?;
                for (name, value) in state.dynamic(resource) {
                    entries.push(state.entry(name, value, ConfigSource::DynamicTopicConfig));
                }
                for (name, value) in &state.topic_defaults {
                    if !entries.iter().any(|e| &e.name == name) {
                        entries.push(state.entry(name, value, ConfigSource::DefaultConfig));
                    }
                }
            }
            ConfigResourceType::Broker if resource.is_broker_default() => {
                for (name, value) in state.dynamic(resource) {
                    entries.push(state.entry(name, value, ConfigSource::DynamicDefaultBrokerConfig));
                }
            }
            ConfigResourceType::Broker | ConfigResourceType::BrokerLogger => {
                let known = state
                    .brokers
                    .iter()
                    .any(|b| b.id.to_string() == resource.name);
                if !known {
                    return Err(ClusterError::new(
                        42,
                        "INVALID_REQUEST",
                        format!("unknown broker {}", resource.name),
                    ));
                }
                for (name, value) in state.dynamic(resource) {
                    entries.push(state.entry(name, value, ConfigSource::DynamicBrokerConfig));
                }
                for (name, value) in state.dynamic(&ConfigResource::broker_default()) {
                    if !entries.iter().any(|e| &e.name == name) {
                        entries.push(state.entry(name, value, ConfigSource::DynamicDefaultBrokerConfig));
                    }
                }
                for (name, (value, read_only)) in &state.static_broker_configs {
                    if !entries.iter().any(|e| &e.name == name) {
                        let entry = state.entry(name, value, ConfigSource::StaticBrokerConfig);
                        entries.push(if *read_only { entry.read_only() } else { entry });
                    }
                }
            }
        }
        Ok(entries)
    }

    async fn alter_configs(
        &self,
        resource: &ConfigResource,
        ops: &[ConfigOperation],
        incremental: bool,
        validate_only: bool,
    ) -> ClusterResult<()> {
        let mut state = self.state.write().await;
        let method = if incremental {
            "incremental_alter_configs"
        } else {
            "alter_configs"
        };
        state.record(method, resource.to_string())?;
        if incremental && state.unsupported.contains(&ApiKey::IncrementalAlterConfigs) {
            return Err(ClusterError::unsupported_version(ApiKey::IncrementalAlterConfigs));
        }
        if resource.resource_type == ConfigResourceType::Topic {
            state.topic_rows(&resource.name)?;
        }
        if let Some(op) = ops.iter().find(|op| {
            op.op == ConfigOpType::Set
                && matches!(state.static_broker_configs.get(&op.name), Some((_, true)))
        }) {
            return Err(ClusterError::invalid_config(format!(
                "cannot update read-only config {}",
                op.name
            )));
        }
        if validate_only {
            return Ok(());
        }

        let configs = state.dynamic_configs.entry(resource.clone()).or_default();
        if !incremental {
            configs.clear();
        }
        for op in ops {
            match (&op.op, &op.value) {
                (ConfigOpType::Set, Some(value)) => {
                    configs.insert(op.name.clone(), value.clone());
                }
                _ => {
                    configs.remove(&op.name);
                }
            }
        }
        Ok(())
    }

    async fn describe_acls(&self, resource: &AclResource) -> ClusterResult<Vec<AclEntryGroup>> {
        let mut state = self.state.write().await;
        state.record("describe_acls", resource.name.clone())?;
        Ok(state
            .acls
            .get(resource)
            .map(|entries| entries.iter().cloned().map(AclEntryGroup::from).collect())
            .unwrap_or_default())
    }

    async fn describe_all_acls(
        &self,
        resource_type: AclResourceType,
    ) -> ClusterResult<Vec<ResourceAcls>> {
        let mut state = self.state.write().await;
        state.record("describe_all_acls", resource_type.to_string())?;
        Ok(state
            .acls
            .iter()
            .filter(|(resource, entries)| resource.resource_type == resource_type && !entries.is_empty())
            .map(|(resource, entries)| ResourceAcls {
                resource: resource.clone(),
                groups: entries.iter().cloned().map(AclEntryGroup::from).collect(),
            })
            .collect())
    }

    async fn create_acls(&self, resource: &AclResource, entries: &[AclEntry]) -> ClusterResult<()> {
        let mut state = self.state.write().await;
        state.record("create_acls", resource.name.clone())?;
        state
            .acls
            .entry(resource.clone())
            .or_default()
            .extend(entries.iter().cloned());
        Ok(())
    }

    async fn delete_acls(&self, resource: &AclResource, entries: &[AclEntry]) -> ClusterResult<()> {
        let mut state = self.state.write().await;
        state.record("delete_acls", resource.name.clone())?;
        if let Some(existing) = state.acls.get_mut(resource) {
            for entry in entries {
                existing.remove(entry);
            }
        }
        Ok(())
    }

    async fn create_topic(&self, request: &CreateTopicRequest, validate_only: bool) -> ClusterResult<()> {
        let mut state = self.state.write().await;
        state.record("create_topic", request.name.clone())?;
        if state.topics.contains_key(&request.name) {
            return Err(ClusterError::topic_already_exists(&request.name));
        }

        let brokers = state.broker_ids();
        let rows = match &request.layout {
            TopicLayout::Uniform {
                partitions,
                replication_factor,
            } => {
                if *replication_factor > brokers.len() {
                    return Err(ClusterError::new(
                        38,
                        "INVALID_REPLICATION_FACTOR",
                        format!(
                            "replication factor {} larger than the {} available brokers",
                            replication_factor,
                            brokers.len()
                        ),
                    ));
                }
                round_robin_rows(&brokers, 0, *partitions, *replication_factor)
            }
            TopicLayout::Explicit(rows) => {
                check_rows(&brokers, rows)?;
                rows.clone()
            }
        };
        if validate_only {
            return Ok(());
        }

        state.topics.insert(request.name.clone(), rows);
        if !request.configs.is_empty() {
            state
                .dynamic_configs
                .insert(ConfigResource::topic(&request.name), request.configs.clone());
        }
        Ok(())
    }

    async fn create_partitions(
        &self,
        topic: &str,
        new_count: usize,
        new_assignments: &Assignment,
        validate_only: bool,
    ) -> ClusterResult<()> {
        let mut state = self.state.write().await;
        state.record("create_partitions", topic)?;
        let brokers = state.broker_ids();
        let current = state.topic_rows(topic)?.clone();
        if new_count <= current.len() {
            return Err(ClusterError::invalid_partitions(format!(
                "topic {} already has {} partitions",
                topic,
                current.len()
            )));
        }

        let added = new_count - current.len();
        let rows = if new_assignments.is_empty() {
            let rf = current.first().map(Vec::len).unwrap_or(1);
            round_robin_rows(&brokers, current.len(), added, rf)
        } else if new_assignments.len() != added {
            return Err(ClusterError::invalid_replica_assignment(format!(
                "{} assignments given for {} new partitions",
                new_assignments.len(),
                added
            )));
        } else {
            check_rows(&brokers, new_assignments)?;
            new_assignments.clone()
        };
        if validate_only {
            return Ok(());
        }

        if let Some(existing) = state.topics.get_mut(topic) {
            existing.extend(rows);
        }
        Ok(())
    }

    async fn alter_partition_assignments(
        &self,
        topic: &str,
        rows: &BTreeMap<PartitionIndex, Vec<BrokerId>>,
    ) -> ClusterResult<()> {
        let mut state = self.state.write().await;
        state.record("alter_partition_assignments", topic)?;
        let brokers = state.broker_ids();
        let current = state.topic_rows(topic)?.clone();
        let polls = state.reassignment_polls;

        for (partition, replicas) in rows {
            let Some(previous) = current.get(*partition) else {
                return Err(ClusterError::unknown_topic(&format!("{}-{}", topic, partition)));
            };
            check_rows(&brokers, &vec![replicas.clone()])?;
            if polls > 0 {
                let reassignment = PartitionReassignment {
                    partition: *partition,
                    replicas: replicas.clone(),
                    adding_replicas: replicas.iter().copied().filter(|b| !previous.contains(b)).collect(),
                    removing_replicas: previous.iter().copied().filter(|b| !replicas.contains(b)).collect(),
                };
                state.reassignments.insert(
                    (topic.to_string(), *partition),
                    InFlight {
                        reassignment,
                        polls_left: polls,
                    },
                );
            }
        }

        if let Some(existing) = state.topics.get_mut(topic) {
            for (partition, replicas) in rows {
                existing[*partition] = replicas.clone();
            }
        }
        Ok(())
    }

    async fn list_partition_reassignments(
        &self,
        topic: &str,
        partitions: &[PartitionIndex],
    ) -> ClusterResult<Vec<PartitionReassignment>> {
        let mut state = self.state.write().await;
        state.record("list_partition_reassignments", topic)?;

        let mut listed = Vec::new();
        for ((name, partition), in_flight) in state.reassignments.iter_mut() {
            if name != topic || !(partitions.is_empty() || partitions.contains(partition)) {
                continue;
            }
            listed.push(in_flight.reassignment.clone());
            in_flight.polls_left = in_flight.polls_left.saturating_sub(1);
        }
        state.reassignments.retain(|_, in_flight| in_flight.polls_left > 0);
        Ok(listed)
    }

    async fn probe_support(&self, api: ApiKey) -> ClusterResult<bool> {
        let mut state = self.state.write().await;
        state.record("probe_support", api.to_string())?;
        Ok(!state.unsupported.contains(&api))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_topic_round_robin() {
        let cluster = MockCluster::with_brokers(3);
        let request = CreateTopicRequest {
            name: "events".to_string(),
            configs: BTreeMap::new(),
            layout: TopicLayout::Uniform {
                partitions: 3,
                replication_factor: 2,
            },
        };
        cluster.create_topic(&request, false).await.unwrap();
        assert_eq!(
            cluster.topic_assignment("events").await,
            Some(vec![vec![1, 2], vec![2, 3], vec![3, 1]])
        );
        let err = cluster.create_topic(&request, false).await.unwrap_err();
        assert_eq!(err.code, 36);
    }

    #[tokio::test]
    async fn test_reassignment_clears_after_polls() {
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2]])
            .with_reassignment_polls(2);
        let rows = BTreeMap::from([(0, vec![1, 3])]);
        cluster.alter_partition_assignments("events", &rows).await.unwrap();

        let first = cluster.list_partition_reassignments("events", &[0]).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].adding_replicas, vec![3]);
        assert_eq!(first[0].removing_replicas, vec![2]);
        assert_eq!(cluster.list_partition_reassignments("events", &[0]).await.unwrap().len(), 1);
        assert!(cluster.list_partition_reassignments("events", &[0]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broker_configs_report_sources() {
        let cluster = MockCluster::with_brokers(1)
            .with_config(ConfigResource::broker(1), "log.cleaner.threads", "2")
            .with_config(ConfigResource::broker_default(), "log.retention.ms", "100")
            .with_static_broker_config("broker.id", "1", true);
        let entries = cluster.describe_configs(&ConfigResource::broker(1)).await.unwrap();
        let source = |name: &str| entries.iter().find(|e| e.name == name).map(|e| e.source);
        assert_eq!(source("log.cleaner.threads"), Some(ConfigSource::DynamicBrokerConfig));
        assert_eq!(source("log.retention.ms"), Some(ConfigSource::DynamicDefaultBrokerConfig));
        assert_eq!(source("broker.id"), Some(ConfigSource::StaticBrokerConfig));
    }

    #[tokio::test]
    async fn test_injected_failure_is_consumed() {
        let cluster = MockCluster::with_brokers(1);
        cluster
            .fail_next("describe_metadata", ClusterError::new(31, "CLUSTER_AUTHORIZATION_FAILED", "denied"))
            .await;
        assert!(cluster.describe_metadata(None, false).await.is_err());
        assert!(cluster.describe_metadata(None, false).await.is_ok());
        assert!(cluster.mutations().await.is_empty());
    }
}
