use super::{deserialize_configs, Assignment, RackAssignment};
use crate::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Desired state of a single topic
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TopicSpec {
    #[serde(default, deserialize_with = "deserialize_configs")]
    pub configs: BTreeMap<String, Option<String>>,
    pub partitions: usize,
    pub replication_factor: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignments: Option<Assignment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rack_assignments: Option<RackAssignment>,
    #[serde(default)]
    pub delete_undefined_configs: bool,
    #[serde(default)]
    pub reassignment_await_timeout_sec: u64,
}

impl TopicSpec {
    pub fn new(partitions: usize, replication_factor: usize) -> Self {
        Self {
            partitions,
            replication_factor,
            ..Default::default()
        }
    }

    /// Field-level invariants, checked before any remote call
    pub fn validate(&self) -> Result<()> {
        if self.partitions == 0 {
            return Err(invalid("partitions must be at least 1"));
        }
        if self.replication_factor == 0 {
            return Err(invalid("replicationFactor must be at least 1"));
        }
        if self.configs.keys().any(|k| k.trim().is_empty()) {
            return Err(invalid("config names must not be empty"));
        }
        if self.assignments.is_some() && self.rack_assignments.is_some() {
            return Err(invalid(
                "assignments and rackAssignments are mutually exclusive",
            ));
        }

        if let Some(assignments) = &self.assignments {
            self.check_shape("assignments", assignments.iter().map(Vec::len))?;
            for (partition, row) in assignments.iter().enumerate() {
                let unique: HashSet<_> = row.iter().collect();
                if unique.len() != row.len() {
                    return Err(invalid(&format!(
                        "assignments row for partition {} repeats a broker: {:?}",
                        partition, row
                    )));
                }
            }
        }

        if let Some(racks) = &self.rack_assignments {
            self.check_shape("rackAssignments", racks.iter().map(Vec::len))?;
            if racks.iter().flatten().any(|rack| rack.trim().is_empty()) {
                return Err(invalid("rackAssignments entries must not be empty"));
            }
        }

        Ok(())
    }

    fn check_shape(&self, field: &str, row_lengths: impl ExactSizeIterator<Item = usize>) -> Result<()> {
        if row_lengths.len() != self.partitions {
            return Err(invalid(&format!(
                "{} has {} rows but partitions is {}",
                field,
                row_lengths.len(),
                self.partitions
            )));
        }
        for (partition, len) in row_lengths.enumerate() {
            if len != self.replication_factor {
                return Err(invalid(&format!(
                    "{} row for partition {} has {} replicas but replicationFactor is {}",
                    field, partition, len, self.replication_factor
                )));
            }
        }
        Ok(())
    }

    /// Config keys with a concrete value, as sent on topic creation
    pub fn set_configs(&self) -> BTreeMap<String, String> {
        self.configs
            .iter()
            .filter_map(|(k, v)| v.as_ref().map(|v| (k.clone(), v.clone())))
            .collect()
    }
}

fn invalid(msg: &str) -> ReconcileError {
    ReconcileError::Validation(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camel_case_with_numeric_configs() {
        let yaml = r#"
partitions: 3
replicationFactor: 2
deleteUndefinedConfigs: true
configs:
  retention.ms: 604800000
  cleanup.policy: compact
  min.insync.replicas: null
"#;
        let spec: TopicSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.partitions, 3);
        assert_eq!(spec.replication_factor, 2);
        assert!(spec.delete_undefined_configs);
        assert_eq!(spec.configs["retention.ms"].as_deref(), Some("604800000"));
        assert_eq!(spec.configs["min.insync.replicas"], None);
        assert_eq!(spec.set_configs().len(), 2);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_rejected() {
        let yaml = "partitions: 1\nreplicationFactor: 1\nreplicas: 3\n";
        assert!(serde_yaml::from_str::<TopicSpec>(yaml).is_err());
    }

    #[test]
    fn test_assignments_shape_checked() {
        let mut spec = TopicSpec::new(2, 2);
        spec.assignments = Some(vec![vec![1, 2]]);
        assert!(spec.validate().is_err());

        spec.assignments = Some(vec![vec![1, 2], vec![3]]);
        assert!(spec.validate().is_err());

        spec.assignments = Some(vec![vec![1, 2], vec![3, 3]]);
        assert!(spec.validate().is_err());

        spec.assignments = Some(vec![vec![1, 2], vec![3, 1]]);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_assignments_and_racks_exclusive() {
        let mut spec = TopicSpec::new(1, 1);
        spec.assignments = Some(vec![vec![1]]);
        spec.rack_assignments = Some(vec![vec!["a".to_string()]]);
        assert!(matches!(spec.validate(), Err(ReconcileError::Validation(_))));
    }

    #[test]
    fn test_empty_rack_rejected() {
        let mut spec = TopicSpec::new(1, 2);
        spec.rack_assignments = Some(vec![vec!["a".to_string(), "".to_string()]]);
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_zero_partitions_rejected() {
        assert!(TopicSpec::new(0, 1).validate().is_err());
        assert!(TopicSpec::new(1, 0).validate().is_err());
    }
}
