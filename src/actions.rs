use crate::cluster::{ConfigResource, CreateTopicRequest, TopicLayout};
use crate::models::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigOpType {
    Set,
    Delete,
}

/// One config change; produced fresh on every reconciliation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigOperation {
    pub name: String,
    pub value: Option<String>,
    pub op: ConfigOpType,
}

impl ConfigOperation {
    pub fn set(name: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            value: Some(value.to_string()),
            op: ConfigOpType::Set,
        }
    }

    pub fn delete(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            op: ConfigOpType::Delete,
        }
    }

    pub fn is_delete(&self) -> bool {
        self.op == ConfigOpType::Delete
    }
}

impl fmt::Display for ConfigOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.op, &self.value) {
            (ConfigOpType::Set, Some(value)) => write!(f, "set {}={}", self.name, value),
            (ConfigOpType::Set, None) => write!(f, "set {}", self.name),
            (ConfigOpType::Delete, _) => write!(f, "delete {}", self.name),
        }
    }
}

/// Why a topic's replica placement is being changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AssignmentReason {
    ExplicitAssignment,
    RackConstraints,
    ReplicationFactor,
    UnknownBrokers,
}

/// A pending remote operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "action")]
pub enum Action {
    CreateTopic(CreateTopicRequest),

    AlterConfigs {
        resource: ConfigResource,
        ops: Vec<ConfigOperation>,
        incremental: bool,
    },

    /// Grow a topic to `count` partitions
    CreatePartitions {
        topic: String,
        count: usize,
        new_assignments: Assignment,
    },

    /// Move the replicas of the listed partitions
    AlterAssignments {
        topic: String,
        rows: BTreeMap<PartitionIndex, Vec<BrokerId>>,
        reason: AssignmentReason,
    },

    CreateAcls {
        resource: AclResource,
        entries: Vec<AclEntry>,
    },

    DeleteAcls {
        resource: AclResource,
        entries: Vec<AclEntry>,
    },
}

impl Action {
    /// Whether executing this action starts partition data movement
    pub fn moves_replicas(&self) -> bool {
        matches!(self, Action::AlterAssignments { .. })
    }

    /// Get the brokers affected by this action
    pub fn affected_brokers(&self) -> Vec<BrokerId> {
        let mut brokers: Vec<BrokerId> = match self {
            Action::CreateTopic(CreateTopicRequest {
                layout: TopicLayout::Explicit(assignment),
                ..
            }) => assignment.iter().flatten().copied().collect(),
            Action::CreatePartitions {
                new_assignments, ..
            } => new_assignments.iter().flatten().copied().collect(),
            Action::AlterAssignments { rows, .. } => rows.values().flatten().copied().collect(),
            _ => Vec::new(),
        };
        brokers.sort_unstable();
        brokers.dedup();
        brokers
    }

    /// Get a human-readable description
    pub fn description(&self) -> String {
        match self {
            Action::CreateTopic(request) => match &request.layout {
                TopicLayout::Uniform {
                    partitions,
                    replication_factor,
                } => format!(
                    "Create topic {} with {} partitions, replication factor {} and {} configs",
                    request.name,
                    partitions,
                    replication_factor,
                    request.configs.len()
                ),
                TopicLayout::Explicit(assignment) => format!(
                    "Create topic {} with assignment {:?} and {} configs",
                    request.name,
                    assignment,
                    request.configs.len()
                ),
            },
            Action::AlterConfigs {
                resource,
                ops,
                incremental,
            } => format!(
                "Alter configs of {} ({}): {}",
                resource,
                if *incremental { "incremental" } else { "full replacement" },
                ops.iter().map(|op| op.to_string()).collect::<Vec<_>>().join(", ")
            ),
            Action::CreatePartitions {
                topic,
                count,
                new_assignments,
            } => format!(
                "Increase partitions of {} to {} (new replicas {:?})",
                topic, count, new_assignments
            ),
            Action::AlterAssignments {
                topic,
                rows,
                reason,
            } => format!(
                "Reassign {} partitions of {} ({:?}): {:?}",
                rows.len(),
                topic,
                reason,
                rows
            ),
            Action::CreateAcls { resource, entries } => format!(
                "Create {} ACL entries on {} {}",
                entries.len(),
                resource.resource_type,
                resource.name
            ),
            Action::DeleteAcls { resource, entries } => format!(
                "Delete {} ACL entries on {} {}",
                entries.len(),
                resource.resource_type,
                resource.name
            ),
        }
    }
}

/// The ordered set of actions one reconciliation wants to execute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    pub actions: Vec<Action>,
}

impl ActionPlan {
    pub fn new(actions: Vec<Action>) -> Self {
        Self { actions }
    }

    pub fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    /// Check if this plan is empty
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn moves_replicas(&self) -> bool {
        self.actions.iter().any(Action::moves_replicas)
    }

    /// Get summary statistics
    pub fn summary(&self) -> PlanSummary {
        let mut summary = PlanSummary {
            total_actions: self.actions.len(),
            ..Default::default()
        };
        for action in &self.actions {
            match action {
                Action::CreateTopic(_) => summary.creates += 1,
                Action::AlterConfigs { ops, .. } => summary.config_changes += ops.len(),
                Action::CreatePartitions { .. } => summary.partition_increases += 1,
                Action::AlterAssignments { rows, .. } => summary.reassigned_partitions += rows.len(),
                Action::CreateAcls { entries, .. } => summary.acls_created += entries.len(),
                Action::DeleteAcls { entries, .. } => summary.acls_deleted += entries.len(),
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSummary {
    pub total_actions: usize,
    pub creates: usize,
    pub config_changes: usize,
    pub partition_increases: usize,
    pub reassigned_partitions: usize,
    pub acls_created: usize,
    pub acls_deleted: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Total Actions: {}, Creates: {}, Config Changes: {}, Reassigned Partitions: {}, ACLs: +{} -{}",
            self.total_actions,
            self.creates,
            self.config_changes,
            self.reassigned_partitions,
            self.acls_created,
            self.acls_deleted
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_operation_display() {
        assert_eq!(ConfigOperation::set("retention.ms", "1000").to_string(), "set retention.ms=1000");
        assert_eq!(ConfigOperation::delete("retention.ms").to_string(), "delete retention.ms");
    }

    #[test]
    fn test_plan_summary() {
        let plan = ActionPlan::new(vec![
            Action::AlterConfigs {
                resource: ConfigResource::topic("events"),
                ops: vec![ConfigOperation::set("a", "1"), ConfigOperation::delete("b")],
                incremental: true,
            },
            Action::AlterAssignments {
                topic: "events".to_string(),
                rows: BTreeMap::from([(0, vec![1, 2]), (2, vec![3, 1])]),
                reason: AssignmentReason::ReplicationFactor,
            },
        ]);
        let summary = plan.summary();
        assert_eq!(summary.total_actions, 2);
        assert_eq!(summary.config_changes, 2);
        assert_eq!(summary.reassigned_partitions, 2);
        assert!(plan.moves_replicas());
        assert_eq!(plan.actions[1].affected_brokers(), vec![1, 2, 3]);
    }

    #[test]
    fn test_descriptions() {
        let action = Action::CreateTopic(CreateTopicRequest {
            name: "events".to_string(),
            configs: BTreeMap::new(),
            layout: TopicLayout::Uniform {
                partitions: 3,
                replication_factor: 2,
            },
        });
        assert_eq!(
            action.description(),
            "Create topic events with 3 partitions, replication factor 2 and 0 configs"
        );
        assert!(ActionPlan::default().is_empty());
    }
}
