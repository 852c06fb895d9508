use super::{Assignment, BrokerId, PartitionIndex, RackAssignment};
use std::collections::BTreeMap;

/// Replication factor of an assignment, read from its first row
pub fn replication_factor(assignment: &Assignment) -> usize {
    assignment.first().map(Vec::len).unwrap_or(0)
}

/// Rows of `planned` that differ from `current`, keyed by partition
pub fn changed_rows(current: &Assignment, planned: &Assignment) -> BTreeMap<PartitionIndex, Vec<BrokerId>> {
    planned
        .iter()
        .enumerate()
        .filter(|(partition, row)| current.get(*partition) != Some(*row))
        .map(|(partition, row)| (partition, row.clone()))
        .collect()
}

/// Translate broker rows into rack rows; brokers without a rack map to ""
pub fn rack_rows<'a, F>(assignment: &Assignment, rack_of: F) -> RackAssignment
where
    F: Fn(BrokerId) -> Option<&'a str>,
{
    assignment
        .iter()
        .map(|row| {
            row.iter()
                .map(|b| rack_of(*b).unwrap_or_default().to_string())
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_changed_rows() {
        let current = vec![vec![1, 2], vec![2, 3], vec![3, 1]];
        let planned = vec![vec![1, 2], vec![3, 2], vec![3, 1]];
        let changed = changed_rows(&current, &planned);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[&1], vec![3, 2]);
    }

    #[test]
    fn test_rack_rows() {
        let racks = rack_rows(&vec![vec![1, 2]], |b| if b == 1 { Some("a") } else { None });
        assert_eq!(racks, vec![vec!["a".to_string(), "".to_string()]]);
    }

    #[test]
    fn test_replication_factor() {
        assert_eq!(replication_factor(&vec![vec![1, 2, 3]]), 3);
        assert_eq!(replication_factor(&vec![]), 0);
    }
}
