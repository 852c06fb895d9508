use super::load::{least_populous_broker, BrokerLoad, Slot};
use crate::models::{Assignment, BrokerId, RackAssignment, RackId};
use std::collections::{BTreeMap, HashMap};

/// Invert a rack mapping into broker → rack
fn rack_index(brokers_by_rack: &BTreeMap<RackId, Vec<BrokerId>>) -> HashMap<BrokerId, &str> {
    brokers_by_rack
        .iter()
        .flat_map(|(rack, ids)| ids.iter().map(move |id| (*id, rack.as_str())))
        .collect()
}

/// Move every replica whose broker is outside the rack declared for its
/// slot onto the least populous eligible broker of that rack.
///
/// Slots are visited partition by partition, position by position. A slot
/// may take any broker of its rack except those fixed in earlier positions
/// of the row and those in later positions that already conform.
pub fn sync_rack_constraints(
    assignment: &Assignment,
    rack_constraints: &RackAssignment,
    brokers_by_rack: &BTreeMap<RackId, Vec<BrokerId>>,
    cluster_replica_counts: &BTreeMap<BrokerId, usize>,
) -> Assignment {
    let rack_of = rack_index(brokers_by_rack);
    let mut rows = assignment.clone();
    let mut load = BrokerLoad::from_assignment(&rows, cluster_replica_counts);

    for (row, racks) in rows.iter_mut().zip(rack_constraints) {
        for position in 0..row.len().min(racks.len()) {
            let wanted = racks[position].as_str();
            let current = row[position];
            if rack_of.get(&current).copied() == Some(wanted) {
                continue;
            }

            let taken: Vec<BrokerId> = row
                .iter()
                .enumerate()
                .filter(|(other, broker)| {
                    *other < position
                        || (*other > position
                            && racks.get(*other).map(String::as_str) == rack_of.get(*broker).copied())
                })
                .map(|(_, broker)| *broker)
                .collect();
            let candidates: Vec<BrokerId> = brokers_by_rack
                .get(wanted)
                .map(|ids| ids.iter().copied().filter(|id| !taken.contains(id)).collect())
                .unwrap_or_default();

            let slot = Slot::at(position);
            let last_used = if position > 0 { row[position - 1] } else { 0 };
            if let Some(broker) = least_populous_broker(&candidates, load.counts(slot), last_used) {
                load.remove(current, slot);
                load.add(broker, slot);
                row[position] = broker;
            }
        }
    }

    rows
}

/// Rows for new partitions placed straight into their declared racks.
///
/// Each slot takes the least populous broker of its rack not already in
/// the row, counted against `assignment` (leaders included) and the
/// supplied cluster counts.
pub fn add_partitions_with_rack_constraints(
    assignment: &Assignment,
    new_rack_rows: &RackAssignment,
    brokers_by_rack: &BTreeMap<RackId, Vec<BrokerId>>,
    cluster_replica_counts: &BTreeMap<BrokerId, usize>,
) -> Assignment {
    let mut load = BrokerLoad::from_assignment(assignment, cluster_replica_counts);
    let mut new_rows = Vec::with_capacity(new_rack_rows.len());
    for racks in new_rack_rows {
        let mut row: Vec<BrokerId> = Vec::with_capacity(racks.len());
        for (position, rack) in racks.iter().enumerate() {
            let candidates: Vec<BrokerId> = brokers_by_rack
                .get(rack)
                .map(|ids| ids.iter().copied().filter(|id| !row.contains(id)).collect())
                .unwrap_or_default();
            let slot = Slot::at(position);
            let last_used = row.last().copied().unwrap_or(0);
            if let Some(broker) = least_populous_broker(&candidates, load.counts(slot), last_used) {
                load.add(broker, slot);
                row.push(broker);
            }
        }
        new_rows.push(row);
    }
    new_rows
}

#[cfg(test)]
mod tests {
    use super::*;

    fn racks(rows: &[&[&str]]) -> RackAssignment {
        rows.iter()
            .map(|row| row.iter().map(|r| r.to_string()).collect())
            .collect()
    }

    fn two_racks() -> BTreeMap<RackId, Vec<BrokerId>> {
        BTreeMap::from([("a".to_string(), vec![1, 2]), ("b".to_string(), vec![3, 4])])
    }

    #[test]
    fn test_moves_only_misplaced_replicas() {
        let assignment = vec![vec![1, 2], vec![2, 1], vec![3, 4]];
        let constraints = racks(&[&["a", "b"], &["a", "b"], &["b", "a"]]);
        let result = sync_rack_constraints(&assignment, &constraints, &two_racks(), &BTreeMap::new());
        assert_eq!(result, vec![vec![1, 3], vec![2, 4], vec![3, 1]]);
    }

    #[test]
    fn test_conforming_assignment_untouched() {
        let assignment = vec![vec![1, 3], vec![4, 2]];
        let constraints = racks(&[&["a", "b"], &["b", "a"]]);
        let result = sync_rack_constraints(&assignment, &constraints, &two_racks(), &BTreeMap::new());
        assert_eq!(result, assignment);
    }

    #[test]
    fn test_new_partitions_balanced_within_racks() {
        let existing = vec![vec![1, 3], vec![4, 2], vec![2, 4]];
        let constraints = racks(&[&["a", "b"], &["b", "a"]]);
        let added = add_partitions_with_rack_constraints(&existing, &constraints, &two_racks(), &BTreeMap::new());
        assert_eq!(added, vec![vec![1, 3], vec![3, 1]]);

        let mut replicas: BTreeMap<BrokerId, usize> = BTreeMap::new();
        for broker in existing.iter().chain(&added).flatten() {
            *replicas.entry(*broker).or_insert(0) += 1;
        }
        assert_eq!(replicas, BTreeMap::from([(1, 3), (2, 2), (3, 3), (4, 2)]));
    }

    #[test]
    fn test_later_misplaced_broker_does_not_block_earlier_slot() {
        let by_rack = BTreeMap::from([("a".to_string(), vec![1]), ("b".to_string(), vec![3])]);
        let result = sync_rack_constraints(
            &vec![vec![3, 1]],
            &racks(&[&["a", "b"]]),
            &by_rack,
            &BTreeMap::new(),
        );
        assert_eq!(result, vec![vec![1, 3]]);
    }
}
