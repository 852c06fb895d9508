use super::load::{least_populous_broker, most_populous_broker, BrokerLoad, Slot};
use crate::models::{Assignment, BrokerId};
use std::collections::BTreeMap;

/// Change every row to `target_rf` replicas.
///
/// Shrinking drops, one replica per partition per pass, the replica on the
/// broker holding the most replicas. Growing appends, one replica per
/// partition per pass, the least populous unused broker (leader counts for
/// an empty row, replica counts otherwise).
pub fn alter_replication_factor(
    assignment: &Assignment,
    target_rf: usize,
    brokers: &[BrokerId],
) -> Assignment {
    if assignment.iter().all(|row| row.len() == target_rf) {
        return assignment.clone();
    }

    let mut rows = assignment.clone();
    let mut load = BrokerLoad::from_assignment(&rows, &BTreeMap::new());
    shrink_rows(&mut rows, target_rf, &mut load);
    grow_rows(&mut rows, target_rf, brokers, &mut load);
    rows
}

/// Rows for partitions `assignment.len()..target_partitions`, balanced
/// against the existing rows and the supplied cluster counts
pub fn add_partitions(
    assignment: &Assignment,
    target_partitions: usize,
    target_rf: usize,
    cluster_replica_counts: &BTreeMap<BrokerId, usize>,
    brokers: &[BrokerId],
) -> Assignment {
    let mut load = BrokerLoad::from_assignment(assignment, cluster_replica_counts);
    let mut new_rows: Assignment = vec![Vec::new(); target_partitions.saturating_sub(assignment.len())];
    grow_rows(&mut new_rows, target_rf, brokers, &mut load);
    new_rows
}

fn shrink_rows(rows: &mut Assignment, target_rf: usize, load: &mut BrokerLoad) {
    while rows.iter().any(|row| row.len() > target_rf) {
        for row in rows.iter_mut().filter(|row| row.len() > target_rf) {
            if let Some(position) = most_populous_broker(row, load) {
                let broker = row.remove(position);
                load.remove(broker, Slot::at(position));
            }
        }
    }
}

pub(crate) fn grow_rows(
    rows: &mut Assignment,
    target_rf: usize,
    brokers: &[BrokerId],
    load: &mut BrokerLoad,
) {
    while rows.iter().any(|row| row.len() < target_rf) {
        let mut placed = false;
        for row in rows.iter_mut().filter(|row| row.len() < target_rf) {
            let slot = Slot::at(row.len());
            let unused: Vec<BrokerId> = brokers
                .iter()
                .copied()
                .filter(|b| !row.contains(b))
                .collect();
            let last_used = row.last().copied().unwrap_or(0);
            if let Some(broker) = least_populous_broker(&unused, load.counts(slot), last_used) {
                row.push(broker);
                load.add(broker, slot);
                placed = true;
            }
        }
        if !placed {
            // fewer brokers than replicas requested
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decrease_replication_factor() {
        let assignment = vec![vec![1, 2, 3], vec![2, 3, 1], vec![3, 1, 2]];
        let result = alter_replication_factor(&assignment, 2, &[1, 2, 3]);
        assert_eq!(result, vec![vec![1, 2], vec![2, 3], vec![3, 1]]);
    }

    #[test]
    fn test_increase_from_empty_is_round_robin() {
        let assignment = vec![vec![], vec![], vec![]];
        let result = alter_replication_factor(&assignment, 3, &[1, 2, 3]);
        assert_eq!(result, vec![vec![1, 2, 3], vec![2, 3, 1], vec![3, 1, 2]]);
    }

    #[test]
    fn test_increase_from_existing_rows() {
        let assignment = vec![vec![1], vec![2], vec![3], vec![4]];
        let result = alter_replication_factor(&assignment, 3, &[1, 2, 3, 4]);
        assert_eq!(
            result,
            vec![vec![1, 2, 3], vec![2, 3, 4], vec![3, 4, 1], vec![4, 1, 2]]
        );
    }

    #[test]
    fn test_unchanged_when_already_at_target() {
        let assignment = vec![vec![2, 1], vec![1, 2]];
        assert_eq!(alter_replication_factor(&assignment, 2, &[1, 2, 3]), assignment);
    }

    #[test]
    fn test_add_partitions_continues_round_robin() {
        let assignment = vec![vec![1, 2], vec![2, 3], vec![3, 1]];
        let new_rows = add_partitions(&assignment, 6, 2, &BTreeMap::new(), &[1, 2, 3]);
        assert_eq!(new_rows, vec![vec![1, 2], vec![2, 3], vec![3, 1]]);
    }

    #[test]
    fn test_add_partitions_avoids_loaded_brokers() {
        let assignment = vec![vec![1, 2], vec![2, 3], vec![3, 1]];
        let seed = BTreeMap::from([(1, 10)]);
        let new_rows = add_partitions(&assignment, 5, 2, &seed, &[1, 2, 3]);
        assert_eq!(new_rows, vec![vec![1, 3], vec![2, 3]]);
    }

    #[test]
    fn test_add_partitions_none_requested() {
        let assignment = vec![vec![1], vec![2]];
        assert!(add_partitions(&assignment, 2, 1, &BTreeMap::new(), &[1, 2]).is_empty());
    }

    #[test]
    fn test_balanced_increase() {
        let brokers = [1, 2, 3, 4, 5];
        let result = alter_replication_factor(&vec![Vec::new(); 12], 3, &brokers);
        let load = BrokerLoad::from_assignment(&result, &BTreeMap::new());
        let replicas: Vec<usize> = brokers.iter().map(|b| load.replicas(*b)).collect();
        let leaders: Vec<usize> = brokers.iter().map(|b| load.leaders(*b)).collect();
        assert!(replicas.iter().max().unwrap() - replicas.iter().min().unwrap() <= 1);
        assert!(leaders.iter().max().unwrap() - leaders.iter().min().unwrap() <= 1);
    }
}
