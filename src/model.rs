//! Data model shared by the store, the processor and the exporter.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::license::LicenseGuess;

/// Name of the record reference that points at a repository's primary root.
pub const HEAD_REFERENCE: &str = "refs/heads/HEAD";

/// Identifier of a storage root: the hash of the initial commit shared by
/// every fork stored in it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootId(String);

impl RootId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RootId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex identifier of a commit inside a storage root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fetch status of a repository in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchStatus {
    Pending,
    Fetching,
    Fetched,
    NotFound,
    AuthRequired,
}

/// A reference of a repository record, tagged with the root it was built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReference {
    pub name: String,
    pub root: RootId,
}

/// A repository as described by the store. Read-only to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub id: String,
    pub status: FetchStatus,
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default)]
    pub references: Vec<RecordReference>,
}

impl RepositoryRecord {
    /// Root of the HEAD reference, if the record has one.
    pub fn head_root(&self) -> Option<&RootId> {
        self.references
            .iter()
            .find(|r| r.name == HEAD_REFERENCE)
            .map(|r| &r.root)
    }

    /// Every distinct root referenced by the record, sorted.
    pub fn roots(&self) -> BTreeSet<RootId> {
        self.references.iter().map(|r| r.root.clone()).collect()
    }
}

/// Naive usage of a language, computed from raw file contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LanguageUsage {
    pub files: u64,
    pub bytes: u64,
    pub lines: u64,
}

/// Blank/code/comment classification of a language's lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineCounts {
    pub blank: u64,
    pub code: u64,
    pub comments: u64,
}

impl LineCounts {
    pub fn add(&mut self, other: LineCounts) {
        self.blank += other.blank;
        self.code += other.code;
        self.comments += other.comments;
    }
}

/// Usage and line classification of one language.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Language {
    pub usage: LanguageUsage,
    pub lines: LineCounts,
}

/// One output row. Built by a single worker, immutable once handed off.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExportRecord {
    pub url: String,
    /// Storage roots the repository touches, sorted.
    pub roots: Vec<RootId>,
    /// Storage unit file names parallel to `roots`.
    pub storage_files: Vec<String>,
    pub files: u64,
    /// Keyed by language name, so iteration is in sorted order.
    pub languages: BTreeMap<String, Language>,
    pub head_commits: u64,
    /// Commits summed over every root the repository touches.
    pub commits: u64,
    pub branches: u64,
    pub forks: u64,
    pub license: LicenseGuess,
}
