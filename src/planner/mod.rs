//! Replica placement.
//!
//! Pure functions computing replica-to-broker assignments for replication
//! factor changes, partition additions, rack constraints and rebalancing.
//! Inputs are assumed validated: rectangular rows, known broker ids and
//! non-empty candidate sets.

use crate::models::Assignment;

// Module declarations
mod distribution;
mod load;
mod rack_aware;
mod replication;

// Re-exports
pub use distribution::{rebalance, rebalance_with_rack_constraints};
pub use load::{least_populous_broker, most_populous_broker, BrokerLoad, Slot};
pub use rack_aware::{add_partitions_with_rack_constraints, sync_rack_constraints};
pub use replication::{add_partitions, alter_replication_factor};

/// Deep copy of an assignment; rows obtained from remote state are copied
/// before any planner call reshapes them
pub fn copy_assignment(assignment: &Assignment) -> Assignment {
    assignment.iter().map(|row| row.to_vec()).collect()
}
