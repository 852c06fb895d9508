use crate::models::{Assignment, BrokerId};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Which counter governs a replica slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Leader,
    Follower,
}

impl Slot {
    pub fn at(position: usize) -> Self {
        if position == 0 {
            Slot::Leader
        } else {
            Slot::Follower
        }
    }
}

/// Leader and replica counts per broker.
///
/// Owned by a single planner call; every placement decision reads it and
/// every move updates it, so later slots see the effect of earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerLoad {
    leaders: BTreeMap<BrokerId, usize>,
    replicas: BTreeMap<BrokerId, usize>,
}

impl BrokerLoad {
    /// Count the replicas of `assignment`, on top of externally supplied
    /// replica counts (e.g. other topics sharing the brokers)
    pub fn from_assignment(assignment: &Assignment, seed: &BTreeMap<BrokerId, usize>) -> Self {
        let mut load = Self {
            leaders: BTreeMap::new(),
            replicas: seed.clone(),
        };
        for row in assignment {
            for (position, broker) in row.iter().enumerate() {
                load.add(*broker, Slot::at(position));
            }
        }
        load
    }

    pub fn leaders(&self, broker: BrokerId) -> usize {
        self.leaders.get(&broker).copied().unwrap_or(0)
    }

    pub fn replicas(&self, broker: BrokerId) -> usize {
        self.replicas.get(&broker).copied().unwrap_or(0)
    }

    /// The counter that decides placement for `slot`
    pub fn counts(&self, slot: Slot) -> &BTreeMap<BrokerId, usize> {
        match slot {
            Slot::Leader => &self.leaders,
            Slot::Follower => &self.replicas,
        }
    }

    pub fn add(&mut self, broker: BrokerId, slot: Slot) {
        *self.replicas.entry(broker).or_insert(0) += 1;
        if slot == Slot::Leader {
            *self.leaders.entry(broker).or_insert(0) += 1;
        }
    }

    pub fn remove(&mut self, broker: BrokerId, slot: Slot) {
        if let Some(count) = self.replicas.get_mut(&broker) {
            *count = count.saturating_sub(1);
        }
        if slot == Slot::Leader {
            if let Some(count) = self.leaders.get_mut(&broker) {
                *count = count.saturating_sub(1);
            }
        }
    }

    /// Hand leadership of one partition from `from` to `to` without moving data
    pub fn transfer_leadership(&mut self, from: BrokerId, to: BrokerId) {
        if let Some(count) = self.leaders.get_mut(&from) {
            *count = count.saturating_sub(1);
        }
        *self.leaders.entry(to).or_insert(0) += 1;
    }
}

fn round_robin_order(
    a: BrokerId,
    b: BrokerId,
    counts: &BTreeMap<BrokerId, usize>,
    last_used: BrokerId,
) -> Ordering {
    let count = |id: BrokerId| counts.get(&id).copied().unwrap_or(0);
    count(a)
        .cmp(&count(b))
        .then_with(|| match (a > last_used, b > last_used) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (true, true) => a.cmp(&b),
            (false, false) => {
                // wrap around: the farthest below last_used is the lowest id
                let da = i64::from(last_used) - i64::from(a);
                let db = i64::from(last_used) - i64::from(b);
                db.cmp(&da)
            }
        })
        .then_with(|| a.cmp(&b))
}

/// Pick the least loaded candidate, continuing the round-robin after
/// `last_used` (0 when nothing was placed yet) among equally loaded brokers
pub fn least_populous_broker(
    candidates: &[BrokerId],
    counts: &BTreeMap<BrokerId, usize>,
    last_used: BrokerId,
) -> Option<BrokerId> {
    let mut sorted = candidates.to_vec();
    sorted.sort_by(|a, b| round_robin_order(*a, *b, counts, last_used));
    sorted.first().copied()
}

/// Position in `row` of the replica whose broker holds the most replicas;
/// ties go to the later position
pub fn most_populous_broker(row: &[BrokerId], load: &BrokerLoad) -> Option<usize> {
    row.iter()
        .enumerate()
        .max_by(|(pa, a), (pb, b)| load.replicas(**a).cmp(&load.replicas(**b)).then(pa.cmp(pb)))
        .map(|(position, _)| position)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(BrokerId, usize)]) -> BTreeMap<BrokerId, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_least_loaded_wins() {
        let c = counts(&[(1, 3), (2, 1), (3, 2)]);
        assert_eq!(least_populous_broker(&[1, 2, 3], &c, 0), Some(2));
    }

    #[test]
    fn test_round_robin_continues_after_last_used() {
        let c = counts(&[]);
        assert_eq!(least_populous_broker(&[1, 2, 3, 4], &c, 2), Some(3));
        assert_eq!(least_populous_broker(&[1, 2, 4], &c, 2), Some(4));
    }

    #[test]
    fn test_round_robin_wraps_to_lowest() {
        let c = counts(&[]);
        assert_eq!(least_populous_broker(&[1, 3], &c, 5), Some(1));
        assert_eq!(least_populous_broker(&[3, 2, 1], &c, 3), Some(1));
    }

    #[test]
    fn test_empty_candidates() {
        assert_eq!(least_populous_broker(&[], &counts(&[]), 0), None);
    }

    #[test]
    fn test_most_populous_prefers_later_position_on_ties() {
        let load = BrokerLoad::from_assignment(&vec![vec![1, 2, 3]], &BTreeMap::new());
        assert_eq!(most_populous_broker(&[1, 2, 3], &load), Some(2));

        let load = BrokerLoad::from_assignment(&vec![vec![1, 2], vec![2]], &BTreeMap::new());
        assert_eq!(most_populous_broker(&[2, 1], &load), Some(0));
    }

    #[test]
    fn test_load_counts_leaders_and_seeds() {
        let seed = counts(&[(3, 5)]);
        let load = BrokerLoad::from_assignment(&vec![vec![1, 2], vec![2, 3]], &seed);
        assert_eq!(load.leaders(1), 1);
        assert_eq!(load.leaders(2), 1);
        assert_eq!(load.leaders(3), 0);
        assert_eq!(load.replicas(2), 2);
        assert_eq!(load.replicas(3), 6);
    }
}
