//! Fork counting.
//!
//! Two repositories are forks of each other when they share a storage root.
//! A record's fork count is, summed over its roots, the number of other
//! records listing the same root. A pair sharing two roots is counted twice
//! on each side.

use std::collections::HashMap;

use crate::model::{ExportRecord, RepositoryRecord, RootId};

/// Number of records listing each storage root.
#[derive(Debug, Clone, Default)]
pub struct ForkIndex {
    members: HashMap<RootId, u64>,
}

impl ForkIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one record by its distinct roots.
    pub fn add<'a>(&mut self, roots: impl IntoIterator<Item = &'a RootId>) {
        for root in roots {
            *self.members.entry(root.clone()).or_default() += 1;
        }
    }

    /// Index the input records. Records without a HEAD reference are
    /// rejected by the processor and left out.
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a RepositoryRecord>) -> Self {
        let mut index = Self::new();
        for record in records.into_iter().filter(|r| r.head_root().is_some()) {
            index.add(&record.roots());
        }
        index
    }

    /// Fork count of a registered record with the given distinct roots.
    pub fn fork_count<'a>(&self, roots: impl IntoIterator<Item = &'a RootId>) -> u64 {
        roots
            .into_iter()
            .map(|root| self.members.get(root).map_or(0, |n| n.saturating_sub(1)))
            .sum()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Set `forks` on every record from the roots of all the given records.
pub fn assign_fork_counts(records: &mut [ExportRecord]) {
    let mut index = ForkIndex::new();
    for record in records.iter() {
        index.add(&record.roots);
    }
    for record in records.iter_mut() {
        record.forks = index.fork_count(&record.roots);
    }
}
