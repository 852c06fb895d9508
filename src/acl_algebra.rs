//! Set operations over ACL entry groups. Comparisons always work on atomic
//! entries; grouping only compacts output.

use crate::models::{AclEntry, AclEntryGroup};
use std::collections::BTreeSet;

/// Expand groups into their atomic entries, first appearance order, no
/// duplicates
pub fn explode(groups: &[AclEntryGroup]) -> Vec<AclEntry> {
    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    for group in groups {
        for principal in &group.principals {
            for host in &group.hosts {
                for operation in &group.operations {
                    let entry = AclEntry {
                        principal: principal.clone(),
                        host: host.clone(),
                        operation: *operation,
                        permission_type: group.permission_type,
                    };
                    if seen.insert(entry.clone()) {
                        entries.push(entry);
                    }
                }
            }
        }
    }
    entries
}

/// Split the atomic entries of `a` into those missing from `b` (the patch)
/// and those present in `b` (the intersection)
pub fn diff_patch_intersection(
    a: &[AclEntryGroup],
    b: &[AclEntryGroup],
) -> (Vec<AclEntry>, Vec<AclEntry>) {
    let others: BTreeSet<AclEntry> = explode(b).into_iter().collect();
    explode(a).into_iter().partition(|entry| !others.contains(entry))
}

/// Merge groups that differ in exactly one of principals, hosts and
/// operations, until no more merges happen
pub fn merge_groups(groups: &[AclEntryGroup]) -> Vec<AclEntryGroup> {
    let mut groups = groups.to_vec();
    loop {
        let before = groups.len();
        let mut merged = Vec::with_capacity(before);
        let mut remaining = groups;
        while !remaining.is_empty() {
            let mut current = remaining.remove(0);
            let mut rest = Vec::with_capacity(remaining.len());
            for other in remaining {
                match try_merge(&current, &other) {
                    Some(group) => current = group,
                    None => rest.push(other),
                }
            }
            merged.push(current);
            remaining = rest;
        }
        groups = merged;
        if groups.len() == before {
            return groups;
        }
    }
}

fn try_merge(a: &AclEntryGroup, b: &AclEntryGroup) -> Option<AclEntryGroup> {
    if a.permission_type != b.permission_type {
        return None;
    }
    let principals = same_set(&a.principals, &b.principals);
    let hosts = same_set(&a.hosts, &b.hosts);
    let operations = same_set(&a.operations, &b.operations);

    let mut group = a.clone();
    match (principals, hosts, operations) {
        (false, true, true) => group.principals = union(&a.principals, &b.principals),
        (true, false, true) => group.hosts = union(&a.hosts, &b.hosts),
        (true, true, false) => group.operations = union(&a.operations, &b.operations),
        _ => return None,
    }
    Some(group)
}

fn same_set<T: Ord>(a: &[T], b: &[T]) -> bool {
    a.iter().collect::<BTreeSet<_>>() == b.iter().collect::<BTreeSet<_>>()
}

fn union<T: Clone + PartialEq>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(a.len() + b.len());
    for item in a.iter().chain(b) {
        if !out.contains(item) {
            out.push(item.clone());
        }
    }
    out
}
