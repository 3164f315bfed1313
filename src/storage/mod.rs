//! Storage collaborators.
//!
//! Two seams are defined here:
//!
//! - [`RepositoryStore`]: the database of repository records, queried by
//!   status with optional pagination and read through a forward-only cursor.
//! - [`Transactioner`]: the rooted object storage. Every access to a root
//!   goes through a [`RootedView`], a read-only transactional view that is
//!   always rolled back and never committed.
//!
//! Backends: [`ManifestStore`] reads records from a JSON manifest,
//! [`GitTransactioner`] serves roots from git repositories on disk and the
//! [`memory`] module provides in-memory versions of both seams.

mod git;
mod manifest;
pub mod memory;

pub use git::GitTransactioner;
pub use manifest::ManifestStore;

use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::error::StorageError;
use crate::model::{CommitId, FetchStatus, RepositoryRecord, RootId};

pub type Result<T> = std::result::Result<T, StorageError>;

/// Forward-only cursor over query results.
pub type RecordCursor = Box<dyn Iterator<Item = Result<RepositoryRecord>> + Send>;

/// Filter and pagination of a store query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepositoryQuery {
    pub status: Option<FetchStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl RepositoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find_by_status(mut self, status: FetchStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn matches(&self, record: &RepositoryRecord) -> bool {
        self.status.map_or(true, |s| s == record.status)
    }
}

/// Source of repository records.
pub trait RepositoryStore: Send + Sync {
    /// Total number of records matching the filter, ignoring pagination.
    fn count(&self, query: &RepositoryQuery) -> Result<u64>;

    /// Iterate over the matching records, with pagination applied.
    fn find(&self, query: &RepositoryQuery) -> Result<RecordCursor>;
}

/// A remote configured in a storage root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    pub name: String,
    pub urls: Vec<String>,
}

/// A reference stored in a root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefInfo {
    pub name: String,
    pub is_tag: bool,
}

/// A file in a commit's tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    /// Path relative to the tree root, `/` separated.
    pub path: String,
    pub contents: Vec<u8>,
}

/// Read-only transactional view of one storage root.
pub trait RootedView: Send {
    fn root(&self) -> &RootId;

    /// Remotes from the root's configuration.
    fn remotes(&self) -> Result<Vec<Remote>>;

    /// Resolve a reference (following symbolic references) to a commit.
    fn resolve_reference(&self, name: &str) -> Result<CommitId>;

    /// Every reference stored in the root.
    fn references(&self) -> Result<Vec<RefInfo>>;

    /// Flat list of the files in the tree of `commit`.
    fn tree_files(&self, commit: &CommitId) -> Result<Vec<TreeFile>>;

    /// Number of commits reachable from `commit`, itself included.
    fn count_commits_from(&self, commit: &CommitId) -> Result<u64>;

    /// Number of distinct commits reachable from any branch reference.
    fn count_branch_commits(&self) -> Result<u64>;

    /// Discard the view. Must be idempotent; every other call afterwards
    /// fails with [`StorageError::RolledBack`].
    fn rollback(&mut self) -> Result<()>;
}

/// Opens views on storage roots.
pub trait Transactioner: Send + Sync {
    fn begin(&self, root: &RootId) -> Result<Box<dyn RootedView>>;

    /// Name of the physical storage unit backing `root`.
    fn storage_name(&self, root: &RootId) -> String {
        format!("{root}.siva")
    }
}

/// Rolls the wrapped view back when dropped.
pub struct ViewGuard {
    view: Box<dyn RootedView>,
}

impl ViewGuard {
    pub fn begin(txer: &dyn Transactioner, root: &RootId) -> Result<Self> {
        Ok(Self {
            view: txer.begin(root)?,
        })
    }
}

impl Deref for ViewGuard {
    type Target = dyn RootedView;

    fn deref(&self) -> &Self::Target {
        self.view.as_ref()
    }
}

impl DerefMut for ViewGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.view.as_mut()
    }
}

impl Drop for ViewGuard {
    fn drop(&mut self) {
        if let Err(err) = self.view.rollback() {
            warn!(root = %self.view.root(), err = %err, "unable to roll back view");
        }
    }
}
