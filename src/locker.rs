//! Per-root mutual exclusion.
//!
//! Two repositories backed by the same storage root must never hold
//! transactional views on it at the same time. The [`ResourceLocker`] hands
//! out one [`RootLock`] per root id, created the first time the id is asked
//! for and shared by every later caller.
//!
//! Locks are never removed. The key space is the set of roots of a single
//! run, so the registry is bounded by the input and dropped with it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use dashmap::DashMap;
use tracing::debug;

use crate::model::RootId;

/// Registry of per-root locks.
#[derive(Debug, Default)]
pub struct ResourceLocker {
    locks: DashMap<RootId, Arc<RootLock>>,
}

impl ResourceLocker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the lock for `root`, registering it if this is the first request.
    pub fn acquire(&self, root: &RootId) -> Arc<RootLock> {
        self.locks
            .entry(root.clone())
            .or_insert_with(|| Arc::new(RootLock::new(root.clone())))
            .clone()
    }

    /// Number of roots that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Mutex guarding one storage root.
#[derive(Debug)]
pub struct RootLock {
    root: RootId,
    mutex: Mutex<()>,
}

impl RootLock {
    fn new(root: RootId) -> Self {
        Self {
            root,
            mutex: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &RootId {
        &self.root
    }

    /// Block until the root is free. The root is released when the guard
    /// is dropped.
    pub fn lock(&self) -> RootGuard<'_> {
        debug!(root = %self.root, "lock");
        // Guards no data, so poisoning is ignored.
        let guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        RootGuard {
            root: &self.root,
            _guard: guard,
        }
    }
}

/// Held access to a storage root.
pub struct RootGuard<'a> {
    root: &'a RootId,
    _guard: MutexGuard<'a, ()>,
}

impl Drop for RootGuard<'_> {
    fn drop(&mut self) {
        debug!(root = %self.root, "unlock");
    }
}
