//! Minimal Set/Delete operations between a desired config map and the
//! configs observed on a resource.

use crate::actions::{ConfigOpType, ConfigOperation};
use crate::models::ConfigEntry;
use crate::{ReconcileError, Result};
use std::collections::BTreeMap;

/// Compute the config operations that turn `remote` into `local`.
///
/// `remote_values` holds every effective value of the resource;
/// `remote_entries` holds the entries that may be deleted (only their
/// dynamic ones ever are). A `None` local value asks for the key to be
/// dynamically unset. With `non_incremental` the alteration replaces the
/// whole dynamic config set, so unchanged dynamic keys are re-sent.
pub fn build_config_ops(
    local: &BTreeMap<String, Option<String>>,
    remote_values: &BTreeMap<String, Option<String>>,
    remote_entries: &[ConfigEntry],
    delete_undefined: bool,
    non_incremental: bool,
) -> Vec<ConfigOperation> {
    let dynamic = |name: &str| {
        remote_entries
            .iter()
            .any(|entry| entry.name == name && entry.source.is_dynamic())
    };

    let mut ops = Vec::new();
    for (name, value) in local {
        match value {
            Some(value) => {
                let unchanged = remote_values.get(name).and_then(Option::as_deref) == Some(value.as_str());
                if !unchanged || (non_incremental && dynamic(name)) {
                    ops.push(ConfigOperation::set(name, value));
                }
            }
            None if dynamic(name) => ops.push(ConfigOperation::delete(name)),
            None => {}
        }
    }

    if delete_undefined || non_incremental {
        for entry in remote_entries {
            if entry.source.is_dynamic()
                && !local.contains_key(&entry.name)
                && !ops.iter().any(|op| op.name == entry.name)
            {
                ops.push(ConfigOperation::delete(&entry.name));
            }
        }
    }

    ops
}

/// Effective value per key, as reported by the cluster
pub fn config_values(entries: &[ConfigEntry]) -> BTreeMap<String, Option<String>> {
    entries
        .iter()
        .map(|entry| (entry.name.clone(), entry.value.clone()))
        .collect()
}

/// Whether executing `op` would change what the cluster reports
pub fn is_effective(op: &ConfigOperation, remote_values: &BTreeMap<String, Option<String>>) -> bool {
    match op.op {
        ConfigOpType::Delete => true,
        ConfigOpType::Set => remote_values.get(&op.name).cloned().flatten() != op.value,
    }
}

pub fn has_effective_changes(
    ops: &[ConfigOperation],
    remote_values: &BTreeMap<String, Option<String>>,
) -> bool {
    ops.iter().any(|op| is_effective(op, remote_values))
}

/// Refuse to delete keys the definition never mentioned unless deletion of
/// undefined keys was requested
pub fn check_deletions_allowed(
    ops: &[ConfigOperation],
    local: &BTreeMap<String, Option<String>>,
    delete_undefined: bool,
) -> Result<()> {
    if delete_undefined {
        return Ok(());
    }
    let undefined: Vec<&str> = ops
        .iter()
        .filter(|op| op.is_delete() && !local.contains_key(&op.name))
        .map(|op| op.name.as_str())
        .collect();
    if undefined.is_empty() {
        Ok(())
    } else {
        Err(ReconcileError::Refusal(format!(
            "the following configs would be removed: {}; set deleteUndefinedConfigs to allow it",
            undefined.join(", ")
        )))
    }
}

/// Names of `Set` operations that target read-only keys
pub fn read_only_targets<'a>(ops: &'a [ConfigOperation], remote_entries: &[ConfigEntry]) -> Vec<&'a str> {
    ops.iter()
        .filter(|op| op.op == ConfigOpType::Set)
        .filter(|op| remote_entries.iter().any(|e| e.name == op.name && e.read_only))
        .map(|op| op.name.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ConfigSource;

    fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, Option<String>> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Some(v.to_string())))
            .collect()
    }

    fn topic_entries(pairs: &[(&str, &str)]) -> Vec<ConfigEntry> {
        pairs
            .iter()
            .map(|(k, v)| ConfigEntry::new(k, v, ConfigSource::DynamicTopicConfig))
            .collect()
    }

    #[test]
    fn test_changed_value_is_set() {
        let local = values(&[("retention.ms", "1000")]);
        let remote = values(&[("retention.ms", "2000")]);
        let ops = build_config_ops(&local, &remote, &topic_entries(&[("retention.ms", "2000")]), false, false);
        assert_eq!(ops, vec![ConfigOperation::set("retention.ms", "1000")]);
    }

    #[test]
    fn test_unchanged_key_only_resent_when_non_incremental() {
        let local = values(&[("cleanup.policy", "compact")]);
        let remote = values(&[("cleanup.policy", "compact")]);
        let entries = topic_entries(&[("cleanup.policy", "compact")]);

        assert!(build_config_ops(&local, &remote, &entries, false, false).is_empty());
        let ops = build_config_ops(&local, &remote, &entries, false, true);
        assert_eq!(ops, vec![ConfigOperation::set("cleanup.policy", "compact")]);
        assert!(!has_effective_changes(&ops, &remote));
    }

    #[test]
    fn test_undefined_dynamic_keys_deleted() {
        let local = values(&[("retention.ms", "1000")]);
        let remote = values(&[("retention.ms", "1000"), ("segment.ms", "10"), ("min.insync.replicas", "1")]);
        let mut entries = topic_entries(&[("retention.ms", "1000"), ("segment.ms", "10")]);
        entries.push(ConfigEntry::new("min.insync.replicas", "1", ConfigSource::StaticBrokerConfig));

        assert!(build_config_ops(&local, &remote, &entries, false, false).is_empty());
        let ops = build_config_ops(&local, &remote, &entries, true, false);
        assert_eq!(ops, vec![ConfigOperation::delete("segment.ms")]);
    }

    #[test]
    fn test_null_value_deletes_dynamic_key_only() {
        let mut local = BTreeMap::new();
        local.insert("segment.ms".to_string(), None);
        local.insert("retention.bytes".to_string(), None);
        let remote = values(&[("segment.ms", "10"), ("retention.bytes", "-1")]);
        let mut entries = topic_entries(&[("segment.ms", "10")]);
        entries.push(ConfigEntry::new("retention.bytes", "-1", ConfigSource::DefaultConfig));

        let ops = build_config_ops(&local, &remote, &entries, false, false);
        assert_eq!(ops, vec![ConfigOperation::delete("segment.ms")]);
        assert!(check_deletions_allowed(&ops, &local, false).is_ok());
    }

    #[test]
    fn test_non_incremental_deletion_refused() {
        let local = values(&[("retention.ms", "1000")]);
        let remote = values(&[("retention.ms", "2000"), ("segment.ms", "10")]);
        let entries = topic_entries(&[("retention.ms", "2000"), ("segment.ms", "10")]);

        let ops = build_config_ops(&local, &remote, &entries, false, true);
        assert!(ops.contains(&ConfigOperation::delete("segment.ms")));
        let err = check_deletions_allowed(&ops, &local, false).unwrap_err();
        assert!(matches!(err, ReconcileError::Refusal(_)));
        assert!(check_deletions_allowed(&ops, &local, true).is_ok());
    }

    #[test]
    fn test_sensitive_remote_value_always_set() {
        let local = values(&[("sasl.jaas.config", "secret")]);
        let mut remote = BTreeMap::new();
        remote.insert("sasl.jaas.config".to_string(), None);
        let entries = vec![
            ConfigEntry::new("sasl.jaas.config", "", ConfigSource::DynamicBrokerConfig).sensitive(),
        ];
        let ops = build_config_ops(&local, &remote, &entries, false, false);
        assert_eq!(ops.len(), 1);
        assert!(is_effective(&ops[0], &remote));
    }

    #[test]
    fn test_read_only_targets() {
        let ops = vec![ConfigOperation::set("broker.id", "3"), ConfigOperation::delete("x")];
        let entries = vec![ConfigEntry::new("broker.id", "1", ConfigSource::StaticBrokerConfig).read_only()];
        assert_eq!(read_only_targets(&ops, &entries), vec!["broker.id"]);
    }
}
