use super::{
    check_read_only, execute_plan, pending_deletions, plan_config_changes, resolve_incremental,
    Document, Reconcile, ReconcileContext,
};
use crate::actions::{Action, ActionPlan, AssignmentReason};
use crate::cluster::{ClusterAdmin, ConfigResource, CreateTopicRequest, TopicLayout};
use crate::diff::config_view;
use crate::models::*;
use crate::options::ApplyOptions;
use crate::planner::{
    add_partitions, add_partitions_with_rack_constraints, alter_replication_factor, copy_assignment, rebalance,
    rebalance_with_rack_constraints, sync_rack_constraints,
};
use crate::reassignment::await_reassignments;
use crate::{ReconcileError, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::debug;

/// Live state of one topic and the brokers it can be placed on
#[derive(Debug, Clone)]
pub struct TopicRemote {
    pub metadata: ClusterMetadata,
    /// `None` when the topic does not exist yet
    pub assignment: Option<Assignment>,
    pub configs: Vec<ConfigEntry>,
    pub in_flight: Vec<PartitionReassignment>,
    pub incremental: bool,
}

pub struct TopicReconciler<'a, A: ?Sized> {
    context: ReconcileContext<'a, A>,
    document: Document<'a>,
}

impl<'a, A: ClusterAdmin + ?Sized> TopicReconciler<'a, A> {
    pub fn new(context: ReconcileContext<'a, A>, document: Document<'a>) -> Self {
        Self { context, document }
    }

    /// Replica counts of the other topics, when balancing across topics
    fn seed(&self, topic: &str, remote: &TopicRemote) -> BTreeMap<BrokerId, usize> {
        if self.context.options.balance_across_topics {
            remote.metadata.replica_counts_excluding(topic)
        } else {
            BTreeMap::new()
        }
    }

    fn create_action(&self, name: &str, spec: &TopicSpec, remote: &TopicRemote) -> Action {
        let layout = if let Some(assignments) = &spec.assignments {
            TopicLayout::Explicit(assignments.clone())
        } else if let Some(racks) = &spec.rack_assignments {
            TopicLayout::Explicit(rebalance_with_rack_constraints(
                &vec![Vec::new(); spec.partitions],
                racks,
                &remote.metadata.brokers_by_rack(),
                &self.seed(name, remote),
            ))
        } else {
            TopicLayout::Uniform {
                partitions: spec.partitions,
                replication_factor: spec.replication_factor,
            }
        };
        Action::CreateTopic(CreateTopicRequest {
            name: name.to_string(),
            configs: spec.set_configs(),
            layout,
        })
    }

    /// Planned rows for the partitions that already exist
    fn plan_existing(
        &self,
        spec: &TopicSpec,
        remote: &TopicRemote,
        current: &Assignment,
        seed: &BTreeMap<BrokerId, usize>,
    ) -> (Assignment, AssignmentReason) {
        let brokers = remote.metadata.broker_ids();
        if let Some(explicit) = &spec.assignments {
            let rows = explicit.iter().take(current.len()).cloned().collect();
            return (rows, AssignmentReason::ExplicitAssignment);
        }
        if let Some(racks) = &spec.rack_assignments {
            let racks: RackAssignment = racks.iter().take(current.len()).cloned().collect();
            let by_rack = remote.metadata.brokers_by_rack();
            let rows = if replication_factor(current) == spec.replication_factor {
                sync_rack_constraints(current, &racks, &by_rack, seed)
            } else {
                rebalance_with_rack_constraints(current, &racks, &by_rack, seed)
            };
            return (rows, AssignmentReason::RackConstraints);
        }
        if replication_factor(current) != spec.replication_factor {
            let resized = alter_replication_factor(current, spec.replication_factor, &brokers);
            return (rebalance(&resized, seed, &brokers), AssignmentReason::ReplicationFactor);
        }
        if current.iter().flatten().any(|b| !remote.metadata.has_broker(*b)) {
            return (rebalance(current, seed, &brokers), AssignmentReason::UnknownBrokers);
        }
        (copy_assignment(current), AssignmentReason::ReplicationFactor)
    }

    /// Rows for partitions `current.len()..spec.partitions`
    fn plan_new_partitions(
        &self,
        spec: &TopicSpec,
        remote: &TopicRemote,
        planned: &Assignment,
        seed: &BTreeMap<BrokerId, usize>,
    ) -> Assignment {
        if let Some(explicit) = &spec.assignments {
            return explicit.iter().skip(planned.len()).cloned().collect();
        }
        match &spec.rack_assignments {
            Some(racks) => {
                let racks: RackAssignment = racks.iter().skip(planned.len()).cloned().collect();
                add_partitions_with_rack_constraints(planned, &racks, &remote.metadata.brokers_by_rack(), seed)
            }
            None => {
                let brokers = remote.metadata.broker_ids();
                add_partitions(planned, spec.partitions, spec.replication_factor, seed, &brokers)
            }
        }
    }
}

fn cross_invalid(message: String) -> ReconcileError {
    ReconcileError::CrossValidation(message)
}

fn pending_rows(plan: &ActionPlan) -> Option<&BTreeMap<PartitionIndex, Vec<BrokerId>>> {
    plan.actions.iter().find_map(|action| match action {
        Action::AlterAssignments { rows, .. } => Some(rows),
        _ => None,
    })
}

#[async_trait]
impl<'a, A: ClusterAdmin + ?Sized> Reconcile for TopicReconciler<'a, A> {
    type Spec = TopicSpec;
    type Remote = TopicRemote;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Topic
    }

    fn document(&self) -> Document<'_> {
        self.document
    }

    fn options(&self) -> &ApplyOptions {
        self.context.options
    }

    fn validate(&self, definition: &ResourceDefinition<TopicSpec>) -> Result<()> {
        definition.spec.validate()
    }

    async fn fetch(&self, definition: &ResourceDefinition<TopicSpec>) -> Result<TopicRemote> {
        let admin = self.context.admin;
        let name = definition.name();
        let names = [name.to_string()];
        let topics = if self.context.options.balance_across_topics {
            None
        } else {
            Some(&names[..])
        };

        let metadata = admin
            .describe_metadata(topics, false)
            .await
            .map_err(ReconcileError::fetch(format!("metadata of topic {}", name)))?;
        let assignment = metadata.topic(name).map(|topic| copy_assignment(&topic.partitions));

        let mut remote = TopicRemote {
            metadata,
            assignment,
            configs: Vec::new(),
            in_flight: Vec::new(),
            incremental: true,
        };
        if remote.assignment.is_none() {
            debug!(topic = %name, "Topic does not exist yet");
            return Ok(remote);
        }

        remote.configs = admin
            .describe_configs(&ConfigResource::topic(name))
            .await
            .map_err(ReconcileError::fetch(format!("configs of topic {}", name)))?;
        remote.in_flight = admin
            .list_partition_reassignments(name, &[])
            .await
            .map_err(ReconcileError::fetch(format!("reassignments of topic {}", name)))?;
        remote.incremental = resolve_incremental(admin, self.context.options.config_alter_mode).await?;
        Ok(remote)
    }

    fn cross_validate(&self, definition: &ResourceDefinition<TopicSpec>, remote: &TopicRemote) -> Result<()> {
        let spec = &definition.spec;
        let brokers = remote.metadata.broker_ids();
        if spec.replication_factor > brokers.len() {
            return Err(cross_invalid(format!(
                "replicationFactor {} exceeds the {} live brokers",
                spec.replication_factor,
                brokers.len()
            )));
        }

        if let Some(assignments) = &spec.assignments {
            if let Some(unknown) = assignments.iter().flatten().find(|b| !remote.metadata.has_broker(**b)) {
                return Err(cross_invalid(format!("assignments reference unknown broker {}", unknown)));
            }
        }

        if let Some(racks) = &spec.rack_assignments {
            let by_rack = remote.metadata.brokers_by_rack();
            for (partition, row) in racks.iter().enumerate() {
                let mut demand: BTreeMap<&str, usize> = BTreeMap::new();
                for rack in row {
                    *demand.entry(rack.as_str()).or_insert(0) += 1;
                }
                for (rack, needed) in demand {
                    let available = by_rack.get(rack).map(Vec::len).unwrap_or(0);
                    if available == 0 {
                        return Err(cross_invalid(format!("rack '{}' has no brokers", rack)));
                    }
                    if needed > available {
                        return Err(cross_invalid(format!(
                            "partition {} needs {} replicas in rack '{}' which has {} brokers",
                            partition, needed, rack, available
                        )));
                    }
                }
            }
        }

        check_read_only(&spec.configs, &remote.configs)
    }

    fn build_ops(&self, definition: &ResourceDefinition<TopicSpec>, remote: &TopicRemote) -> Result<ActionPlan> {
        let spec = &definition.spec;
        let name = definition.name();
        let Some(current) = &remote.assignment else {
            return Ok(ActionPlan::new(vec![self.create_action(name, spec, remote)]));
        };

        let mut plan = ActionPlan::default();
        if let Some(action) = plan_config_changes(
            ConfigResource::topic(name),
            &spec.configs,
            &remote.configs,
            ConfigSource::DynamicTopicConfig,
            spec.delete_undefined_configs,
            remote.incremental,
        )? {
            plan.push(action);
        }

        if spec.partitions < current.len() {
            return Err(ReconcileError::Refusal(format!(
                "topic {} has {} partitions; partitions can only be increased, not to {}",
                name,
                current.len(),
                spec.partitions
            )));
        }

        let seed = self.seed(name, remote);
        let (planned, reason) = self.plan_existing(spec, remote, current, &seed);
        let changed = changed_rows(current, &planned);
        let adds_partitions = spec.partitions > current.len();

        if !remote.in_flight.is_empty() && (adds_partitions || !changed.is_empty()) {
            let partitions: Vec<PartitionIndex> = remote.in_flight.iter().map(|r| r.partition).collect();
            return Err(ReconcileError::Refusal(format!(
                "partition reassignments of topic {} are still in progress: {:?}",
                name, partitions
            )));
        }

        if adds_partitions {
            plan.push(Action::CreatePartitions {
                topic: name.to_string(),
                count: spec.partitions,
                new_assignments: self.plan_new_partitions(spec, remote, &planned, &seed),
            });
        }
        if !changed.is_empty() {
            plan.push(Action::AlterAssignments {
                topic: name.to_string(),
                rows: changed,
                reason,
            });
        }
        Ok(plan)
    }

    fn views(
        &self,
        definition: &ResourceDefinition<TopicSpec>,
        remote: &TopicRemote,
        plan: &ActionPlan,
    ) -> (Value, Value) {
        let spec = &definition.spec;
        let pending = pending_rows(plan);
        let local_configs = spec.set_configs();

        let mut local = json!({
            "partitions": spec.partitions,
            "replicationFactor": spec.replication_factor,
            "configs": local_configs,
        });
        if let Some(assignments) = &spec.assignments {
            local["assignments"] = json!(assignments);
        } else if let (Some(rows), Some(current)) = (pending, &remote.assignment) {
            let mut planned = current.clone();
            for (partition, row) in rows {
                planned[*partition] = row.clone();
            }
            local["assignments"] = json!(planned);
        }
        if let Some(racks) = &spec.rack_assignments {
            local["rackAssignments"] = json!(racks);
        }

        let Some(current) = &remote.assignment else {
            return (Value::Null, local);
        };
        let keys = local_configs
            .keys()
            .map(String::as_str)
            .chain(pending_deletions(plan));
        let mut shown = json!({
            "partitions": current.len(),
            "replicationFactor": replication_factor(current),
            "configs": config_view(&remote.configs, keys),
        });
        if spec.assignments.is_some() || pending.is_some() {
            shown["assignments"] = json!(current);
        }
        if spec.rack_assignments.is_some() {
            shown["rackAssignments"] = json!(rack_rows(current, |b| remote.metadata.rack_of(b)));
        }
        (shown, local)
    }

    async fn execute_ops(
        &self,
        definition: &ResourceDefinition<TopicSpec>,
        _remote: &TopicRemote,
        plan: &ActionPlan,
    ) -> Result<Value> {
        let options = self.context.options;
        execute_plan(self.context.admin, plan, options.validate_only).await?;
        let Some(rows) = pending_rows(plan) else {
            return Ok(Value::Null);
        };
        if options.validate_only {
            return Ok(Value::Null);
        }

        let partitions: Vec<PartitionIndex> = rows.keys().copied().collect();
        let outcome = await_reassignments(
            self.context.admin,
            definition.name(),
            &partitions,
            options.await_timeout_for(definition.spec.reassignment_await_timeout_sec),
            options.reassignment_poll_interval,
            self.context.clock,
        )
        .await?;
        Ok(serde_json::to_value(&outcome).unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use crate::reassignment::ManualClock;
    use crate::reconciler::run_reconcile;

    async fn reconcile(cluster: &MockCluster, options: &ApplyOptions, yaml: &str) -> crate::reconciler::ApplyResult {
        let clock = ManualClock::new();
        let context = ReconcileContext::new(cluster, options, &clock);
        run_reconcile(&TopicReconciler::new(context, Document::yaml(yaml))).await
    }

    fn topic_yaml(spec: &str) -> String {
        format!("apiVersion: v1\nkind: topic\nmetadata:\n  name: events\nspec:\n{}", spec)
    }

    #[tokio::test]
    async fn test_create_uniform_topic() {
        let cluster = MockCluster::with_brokers(3);
        let yaml = topic_yaml("  partitions: 3\n  replicationFactor: 2\n  configs:\n    retention.ms: 1000\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert!(result.applied);
        assert_eq!(result.remote, Value::Null);
        assert!(result.diff.contains("+partitions: 3"));
        assert_eq!(cluster.topic_assignment("events").await.map(|a| a.len()), Some(3));
        assert_eq!(
            cluster.config_value(&ConfigResource::topic("events"), "retention.ms").await.as_deref(),
            Some("1000")
        );
    }

    #[tokio::test]
    async fn test_converged_topic_is_noop() {
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2], vec![2, 3], vec![3, 1]])
            .with_config(ConfigResource::topic("events"), "retention.ms", "1000");
        let yaml = topic_yaml("  partitions: 3\n  replicationFactor: 2\n  configs:\n    retention.ms: 1000\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert!(!result.applied);
        assert_eq!(result.diff, "");
        assert!(cluster.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_partition_decrease_refused() {
        let cluster = MockCluster::with_brokers(2).with_topic("events", vec![vec![1], vec![2]]);
        let yaml = topic_yaml("  partitions: 1\n  replicationFactor: 1\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;
        assert!(matches!(result.failure, Some(ReconcileError::Refusal(_))));
        assert!(cluster.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_replication_factor_decrease() {
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2, 3], vec![2, 3, 1], vec![3, 1, 2]]);
        let yaml = topic_yaml("  partitions: 3\n  replicationFactor: 2\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert!(result.applied);
        assert_eq!(
            cluster.topic_assignment("events").await,
            Some(vec![vec![1, 2], vec![2, 3], vec![3, 1]])
        );
    }

    #[tokio::test]
    async fn test_add_partitions_balanced_against_existing() {
        let cluster = MockCluster::with_brokers(3).with_topic("events", vec![vec![1, 2], vec![2, 3], vec![3, 1]]);
        let yaml = topic_yaml("  partitions: 6\n  replicationFactor: 2\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(
            cluster.topic_assignment("events").await,
            Some(vec![
                vec![1, 2],
                vec![2, 3],
                vec![3, 1],
                vec![1, 2],
                vec![2, 3],
                vec![3, 1]
            ])
        );
        let methods: Vec<&str> = cluster.mutations().await.iter().map(|c| c.method).collect();
        assert_eq!(methods, vec!["create_partitions"]);
    }

    #[tokio::test]
    async fn test_unknown_broker_replaced() {
        let cluster = MockCluster::with_brokers(3).with_topic("events", vec![vec![1, 4], vec![2, 1], vec![4, 2]]);
        let yaml = topic_yaml("  partitions: 3\n  replicationFactor: 2\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(
            cluster.topic_assignment("events").await,
            Some(vec![vec![1, 3], vec![2, 1], vec![3, 2]])
        );
    }

    #[tokio::test]
    async fn test_rack_constraints_synced() {
        let cluster = MockCluster::new(&[(1, Some("a")), (2, Some("a")), (3, Some("b")), (4, Some("b"))])
            .with_topic("events", vec![vec![1, 2], vec![2, 1], vec![3, 4]]);
        let yaml = topic_yaml(
            "  partitions: 3\n  replicationFactor: 2\n  rackAssignments:\n    - [a, b]\n    - [a, b]\n    - [b, a]\n",
        );
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(
            cluster.topic_assignment("events").await,
            Some(vec![vec![1, 3], vec![2, 4], vec![3, 1]])
        );
        assert!(result.diff.contains("rackAssignments"));
    }

    #[tokio::test]
    async fn test_rack_capacity_checked() {
        let cluster = MockCluster::new(&[(1, Some("a")), (2, Some("b"))]);
        let yaml = topic_yaml("  partitions: 1\n  replicationFactor: 2\n  rackAssignments:\n    - [a, a]\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;
        assert!(matches!(result.failure, Some(ReconcileError::CrossValidation(_))));
    }

    #[tokio::test]
    async fn test_dry_run_reports_without_mutating() {
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2], vec![2, 3], vec![3, 1]])
            .with_config(ConfigResource::topic("events"), "retention.ms", "2000");
        let yaml = topic_yaml("  partitions: 3\n  replicationFactor: 2\n  configs:\n    retention.ms: 1000\n");
        let result = reconcile(&cluster, &ApplyOptions::dry_run(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert!(!result.applied);
        assert!(result.diff.contains("-  retention.ms: '2000'"));
        assert!(result.diff.contains("+  retention.ms: '1000'"));
        assert!(cluster.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn test_in_flight_reassignment_blocks_moves() {
        let in_flight = PartitionReassignment {
            partition: 0,
            replicas: vec![1, 2],
            adding_replicas: vec![2],
            removing_replicas: vec![],
        };
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2]])
            .with_reassignment_in_progress("events", in_flight, 10);
        let yaml = topic_yaml("  partitions: 2\n  replicationFactor: 2\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;
        assert!(matches!(result.failure, Some(ReconcileError::Refusal(_))));
    }

    #[tokio::test]
    async fn test_reassignment_awaited_after_move() {
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2, 3], vec![2, 3, 1], vec![3, 1, 2]])
            .with_reassignment_polls(2);
        let yaml = topic_yaml("  partitions: 3\n  replicationFactor: 2\n  reassignmentAwaitTimeoutSec: 60\n");
        let result = reconcile(&cluster, &ApplyOptions::default(), &yaml).await;

        assert!(result.is_success(), "{:?}", result.error);
        assert_eq!(result.data["timedOut"], json!(false));
        assert_eq!(cluster.reassignments_in_flight().await, 0);
    }
}
