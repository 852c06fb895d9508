use super::load::{least_populous_broker, BrokerLoad, Slot};
use super::rack_aware::sync_rack_constraints;
use super::replication::alter_replication_factor;
use crate::models::{Assignment, BrokerId, RackAssignment, RackId};
use std::collections::BTreeMap;

/// Re-spread replicas evenly over `brokers`.
///
/// Replicas on brokers outside `brokers` are moved first. After that, a
/// replica moves to an unused broker holding at least two fewer replicas,
/// and preferred leaders are swapped within their rows to even out
/// leadership, until a pass changes nothing. The result is a fixed point:
/// rebalancing it again returns it unchanged.
pub fn rebalance(
    assignment: &Assignment,
    cluster_replica_counts: &BTreeMap<BrokerId, usize>,
    brokers: &[BrokerId],
) -> Assignment {
    let mut rows = assignment.clone();
    if brokers.is_empty() {
        return rows;
    }

    let mut load = BrokerLoad::from_assignment(&rows, cluster_replica_counts);
    let eligible = |_: usize, _: usize| brokers.to_vec();
    respread(&mut rows, &mut load, &eligible, Pass::Misplaced);
    loop {
        let moved = respread(&mut rows, &mut load, &eligible, Pass::Spread);
        let swapped = even_out_leaders(&mut rows, &mut load);
        if !moved && !swapped {
            break;
        }
    }
    rows
}

/// Rebalance under per-slot rack constraints: normalize row lengths, move
/// misplaced replicas into their racks, then even out load inside each rack
pub fn rebalance_with_rack_constraints(
    assignment: &Assignment,
    rack_constraints: &RackAssignment,
    brokers_by_rack: &BTreeMap<RackId, Vec<BrokerId>>,
    cluster_replica_counts: &BTreeMap<BrokerId, usize>,
) -> Assignment {
    let target_rf = rack_constraints.first().map(Vec::len).unwrap_or(0);
    let mut all_brokers: Vec<BrokerId> = brokers_by_rack.values().flatten().copied().collect();
    all_brokers.sort_unstable();

    let sized = alter_replication_factor(assignment, target_rf, &all_brokers);
    let mut rows = sync_rack_constraints(&sized, rack_constraints, brokers_by_rack, cluster_replica_counts);
    let mut load = BrokerLoad::from_assignment(&rows, cluster_replica_counts);

    let eligible = |partition: usize, position: usize| {
        rack_at(rack_constraints, partition, position)
            .and_then(|rack| brokers_by_rack.get(rack))
            .cloned()
            .unwrap_or_default()
    };
    while respread(&mut rows, &mut load, &eligible, Pass::Spread) {}
    rows
}

fn rack_at(constraints: &RackAssignment, partition: usize, position: usize) -> Option<&str> {
    constraints
        .get(partition)
        .and_then(|racks| racks.get(position))
        .map(String::as_str)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    /// Only slots whose broker is not eligible
    Misplaced,
    /// Misplaced slots plus moves that narrow the replica spread
    Spread,
}

/// One pass over every slot; returns whether anything moved
fn respread<E>(rows: &mut Assignment, load: &mut BrokerLoad, eligible: &E, pass: Pass) -> bool
where
    E: Fn(usize, usize) -> Vec<BrokerId>,
{
    let mut moved = false;
    for partition in 0..rows.len() {
        for position in 0..rows[partition].len() {
            let current = rows[partition][position];
            let eligible_brokers = eligible(partition, position);
            let valid = eligible_brokers.contains(&current);
            if valid && pass == Pass::Misplaced {
                continue;
            }

            let row = &rows[partition];
            let unused: Vec<BrokerId> = eligible_brokers
                .into_iter()
                .filter(|b| !row.contains(b))
                .filter(|b| !valid || load.replicas(*b) + 1 < load.replicas(current))
                .collect();
            let slot = Slot::at(position);
            let last_used = if position > 0 { row[position - 1] } else { 0 };
            let Some(target) = least_populous_broker(&unused, load.counts(slot), last_used) else {
                continue;
            };

            load.remove(current, slot);
            load.add(target, slot);
            rows[partition][position] = target;
            moved = true;
        }
    }
    moved
}

/// Swap an overloaded preferred leader with the least leading follower of
/// its row; returns whether anything was swapped
fn even_out_leaders(rows: &mut Assignment, load: &mut BrokerLoad) -> bool {
    let mut swapped = false;
    for row in rows.iter_mut() {
        let Some(&leader) = row.first() else {
            continue;
        };
        let follower = (1..row.len())
            .filter(|&position| load.leaders(row[position]) + 1 < load.leaders(leader))
            .min_by_key(|&position| (load.leaders(row[position]), position));
        if let Some(position) = follower {
            load.transfer_leadership(leader, row[position]);
            row.swap(0, position);
            swapped = true;
        }
    }
    swapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_assignment_is_noop() {
        let assignment = vec![vec![1, 2], vec![2, 3], vec![3, 1]];
        assert_eq!(rebalance(&assignment, &BTreeMap::new(), &[1, 2, 3]), assignment);
    }

    #[test]
    fn test_replaces_unknown_broker() {
        let assignment = vec![vec![1, 4], vec![2, 1], vec![4, 2]];
        let result = rebalance(&assignment, &BTreeMap::new(), &[1, 2, 3]);
        assert_eq!(result, vec![vec![1, 3], vec![2, 1], vec![3, 2]]);
    }

    #[test]
    fn test_spreads_onto_idle_broker() {
        let assignment = vec![vec![1, 2], vec![1, 2], vec![1, 2]];
        let result = rebalance(&assignment, &BTreeMap::new(), &[1, 2, 3]);
        assert_eq!(result, vec![vec![3, 2], vec![1, 3], vec![2, 1]]);
    }

    #[test]
    fn test_skewed_rows_reach_even_spread() {
        let assignment = vec![vec![1, 4], vec![1, 2], vec![1, 2], vec![1, 2]];
        let result = rebalance(&assignment, &BTreeMap::new(), &[1, 2, 3, 4]);
        assert_eq!(result, vec![vec![3, 4], vec![4, 3], vec![2, 1], vec![1, 2]]);
        assert_eq!(rebalance(&result, &BTreeMap::new(), &[1, 2, 3, 4]), result);
    }

    #[test]
    fn test_rack_rebalance_from_short_rows() {
        let by_rack =
            BTreeMap::from([("a".to_string(), vec![1, 2]), ("b".to_string(), vec![3, 4])]);
        let constraints: RackAssignment = vec![
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string(), "a".to_string()],
            vec!["a".to_string(), "b".to_string()],
        ];
        let result = rebalance_with_rack_constraints(
            &vec![vec![1], vec![2], vec![3]],
            &constraints,
            &by_rack,
            &BTreeMap::new(),
        );
        assert_eq!(result, vec![vec![1, 3], vec![4, 2], vec![2, 4]]);
    }

    #[test]
    fn test_rack_rebalance_from_empty_rows() {
        let by_rack =
            BTreeMap::from([("a".to_string(), vec![1, 2]), ("b".to_string(), vec![3, 4])]);
        let ab = vec!["a".to_string(), "b".to_string()];
        let ba = vec!["b".to_string(), "a".to_string()];
        let constraints = vec![ab.clone(), ba.clone(), ab, ba];
        let result =
            rebalance_with_rack_constraints(&vec![Vec::new(); 4], &constraints, &by_rack, &BTreeMap::new());
        assert_eq!(result, vec![vec![1, 3], vec![3, 2], vec![2, 4], vec![4, 1]]);
    }
}
