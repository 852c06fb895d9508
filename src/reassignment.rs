//! Waiting for partition reassignments to finish.
//!
//! The loop polls the cluster at a fixed interval and reports progress
//! only when the number of partitions still moving changes. Reaching the
//! timeout is not an error: the caller gets the partitions still in
//! flight and decides what to show.

use crate::cluster::ClusterAdmin;
use crate::models::{PartitionIndex, PartitionReassignment};
use crate::{ReconcileError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, warn};

/// Time source for the await loop
#[async_trait]
pub trait PollClock: Send + Sync {
    /// Time elapsed since the clock was created
    fn now(&self) -> Duration;

    async fn sleep(&self, duration: Duration);
}

/// Wall-clock time through the tokio timer
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            start: tokio::time::Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PollClock for TokioClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// A clock that only moves when slept on
#[derive(Debug, Default)]
pub struct ManualClock {
    elapsed_ms: AtomicU64,
    sleeps: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn sleeps(&self) -> u64 {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PollClock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms.load(Ordering::SeqCst))
    }

    async fn sleep(&self, duration: Duration) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        self.advance(duration);
    }
}

/// Emitted whenever the number of partitions still moving changes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReassignmentProgress {
    pub elapsed_secs: u64,
    pub remaining: usize,
    pub partitions: Vec<PartitionIndex>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwaitOutcome {
    /// Reassignments still in flight when the loop returned
    pub remaining: Vec<PartitionReassignment>,
    pub timed_out: bool,
    pub events: Vec<ReassignmentProgress>,
}

fn progress(elapsed: Duration, in_flight: &[PartitionReassignment]) -> ReassignmentProgress {
    ReassignmentProgress {
        elapsed_secs: elapsed.as_secs(),
        remaining: in_flight.len(),
        partitions: in_flight.iter().map(|r| r.partition).collect(),
    }
}

/// Poll `topic` until none of `partitions` is being reassigned or
/// `timeout` elapses. A zero timeout reports the current state once.
pub async fn await_reassignments<A, C>(
    admin: &A,
    topic: &str,
    partitions: &[PartitionIndex],
    timeout: Duration,
    interval: Duration,
    clock: &C,
) -> Result<AwaitOutcome>
where
    A: ClusterAdmin + ?Sized,
    C: PollClock + ?Sized,
{
    let list = move || async move {
        admin
            .list_partition_reassignments(topic, partitions)
            .await
            .map_err(ReconcileError::fetch(format!("reassignments of topic {}", topic)))
    };

    let start = clock.now();
    let mut in_flight = list().await?;
    let mut outcome = AwaitOutcome::default();
    if in_flight.is_empty() {
        return Ok(outcome);
    }

    info!(topic = %topic, remaining = in_flight.len(), "Partition reassignments in progress");
    outcome.events.push(progress(Duration::ZERO, &in_flight));
    if timeout.is_zero() {
        outcome.remaining = in_flight;
        return Ok(outcome);
    }

    loop {
        let elapsed = clock.now().saturating_sub(start);
        if elapsed >= timeout {
            warn!(
                topic = %topic,
                remaining = in_flight.len(),
                timeout_secs = timeout.as_secs(),
                "Timed out waiting for partition reassignments"
            );
            outcome.remaining = in_flight;
            outcome.timed_out = true;
            return Ok(outcome);
        }

        clock.sleep(interval.min(timeout - elapsed)).await;
        let next = list().await?;
        if next.len() != in_flight.len() {
            let elapsed = clock.now().saturating_sub(start);
            info!(topic = %topic, remaining = next.len(), elapsed_secs = elapsed.as_secs(), "Reassignment progress");
            outcome.events.push(progress(elapsed, &next));
        }
        in_flight = next;
        if in_flight.is_empty() {
            return Ok(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockCluster;
    use std::collections::BTreeMap;

    async fn moving_cluster(polls: u32) -> MockCluster {
        let cluster = MockCluster::with_brokers(3)
            .with_topic("events", vec![vec![1, 2], vec![2, 3]])
            .with_reassignment_polls(polls);
        let rows = BTreeMap::from([(0, vec![1, 3]), (1, vec![2, 1])]);
        cluster.alter_partition_assignments("events", &rows).await.unwrap();
        cluster
    }

    #[tokio::test]
    async fn test_waits_until_done() {
        let cluster = moving_cluster(3).await;
        let clock = ManualClock::new();
        let outcome = await_reassignments(
            &cluster,
            "events",
            &[0, 1],
            Duration::from_secs(60),
            Duration::from_secs(5),
            &clock,
        )
        .await
        .unwrap();

        assert!(!outcome.timed_out);
        assert!(outcome.remaining.is_empty());
        let remaining: Vec<usize> = outcome.events.iter().map(|e| e.remaining).collect();
        assert_eq!(remaining, vec![2, 0]);
        assert_eq!(clock.now(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn test_timeout_is_not_an_error() {
        let cluster = moving_cluster(100).await;
        let clock = ManualClock::new();
        let outcome = await_reassignments(
            &cluster,
            "events",
            &[0, 1],
            Duration::from_secs(12),
            Duration::from_secs(5),
            &clock,
        )
        .await
        .unwrap();

        assert!(outcome.timed_out);
        assert_eq!(outcome.remaining.len(), 2);
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(clock.now(), Duration::from_secs(12));
        assert_eq!(clock.sleeps(), 3);
    }

    #[tokio::test]
    async fn test_zero_timeout_reports_once() {
        let cluster = moving_cluster(100).await;
        let clock = ManualClock::new();
        let outcome =
            await_reassignments(&cluster, "events", &[0, 1], Duration::ZERO, Duration::from_secs(5), &clock)
                .await
                .unwrap();

        assert!(!outcome.timed_out);
        assert_eq!(outcome.remaining.len(), 2);
        assert_eq!(clock.sleeps(), 0);
    }

    #[tokio::test]
    async fn test_nothing_in_flight() {
        let cluster = MockCluster::with_brokers(1).with_topic("events", vec![vec![1]]);
        let clock = ManualClock::new();
        let outcome = await_reassignments(
            &cluster,
            "events",
            &[0],
            Duration::from_secs(30),
            Duration::from_secs(5),
            &clock,
        )
        .await
        .unwrap();
        assert_eq!(outcome, AwaitOutcome::default());
    }
}
