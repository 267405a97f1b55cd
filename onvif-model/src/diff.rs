//! Roster diffing.
//!
//! Successive roster snapshots are compared by identity key. The result drives
//! subscription churn on every hot-reload, so the function is pure and its
//! output depends only on its inputs.

use crate::device::Device;

/// Operations needed to move from one roster snapshot to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct RosterDiff<T> {
    /// Items whose key only exists in the next snapshot
    pub added: Vec<T>,
    /// Items whose key only exists in the previous snapshot
    pub removed: Vec<T>,
    /// Next-snapshot values of items whose key exists in both but whose value changed
    pub updated: Vec<T>,
}

impl<T> Default for RosterDiff<T> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            removed: Vec::new(),
            updated: Vec::new(),
        }
    }
}

impl<T> RosterDiff<T> {
    /// True when applying the diff would change nothing.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.updated.is_empty()
    }

    /// Total number of operations in the diff.
    pub fn len(&self) -> usize {
        self.added.len() + self.removed.len() + self.updated.len()
    }
}

/// Diff two snapshots by an identity key.
///
/// For each previous item the first next item with the same key is its
/// counterpart. Items without a counterpart are removed; items whose
/// counterpart differs are updated (carrying the next value); next items whose
/// key is absent from the previous snapshot are added. Duplicate keys are a
/// caller error and are not validated here.
pub fn diff_by_key<T, K, F>(previous: &[T], next: &[T], key: F) -> RosterDiff<T>
where
    T: Clone + PartialEq,
    K: PartialEq,
    F: Fn(&T) -> K,
{
    let mut diff = RosterDiff::default();

    for prev_item in previous {
        let prev_key = key(prev_item);
        match next.iter().find(|candidate| key(candidate) == prev_key) {
            Some(next_item) if next_item != prev_item => diff.updated.push(next_item.clone()),
            Some(_) => {}
            None => diff.removed.push(prev_item.clone()),
        }
    }

    diff.added = next
        .iter()
        .filter(|next_item| {
            let next_key = key(next_item);
            !previous.iter().any(|prev_item| key(prev_item) == next_key)
        })
        .cloned()
        .collect();

    diff
}

/// Diff two device rosters keyed by device name.
pub fn diff_roster(previous: &[Device], next: &[Device]) -> RosterDiff<Device> {
    diff_by_key(previous, next, |device| device.name.clone())
}
