//! Error types for the export pipeline.
//!
//! Errors are split by blast radius: [`ExportError`] aborts the whole run,
//! [`ProcessError`] only aborts the repository being processed, and
//! [`LicenseError`] is local to license discovery.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::model::RootId;

/// Failures raised by the repository store and the storage transactioner.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    #[error("invalid manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("unknown storage root: {0}")]
    UnknownRoot(RootId),

    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("view on root {0} was already rolled back")]
    RolledBack(RootId),
}

/// Recoverable failure while processing a single repository.
///
/// These are logged and counted, never propagated past the worker.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("repository has no HEAD")]
    NoHead,

    #[error("repository has no endpoints")]
    NoEndpoints,

    #[error("unable to guess the repository from config for repo: {0}")]
    UnknownRemote(String),

    #[error("storage error on root {root}: {source}")]
    Storage {
        root: RootId,
        #[source]
        source: StorageError,
    },

    #[error("unable to write files to temp dir: {0}")]
    Scratch(#[source] io::Error),

    #[error("can't analyze files: {0}")]
    LineCount(#[source] io::Error),
}

impl ProcessError {
    pub fn storage(root: &RootId, source: StorageError) -> Self {
        Self::Storage {
            root: root.clone(),
            source,
        }
    }
}

/// Fatal failure that stops the whole export.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("unable to query repositories: {0}")]
    Store(#[source] StorageError),

    #[error("unable to prepare output {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to write csv {what}: {source}")]
    Write {
        what: &'static str,
        #[source]
        source: io::Error,
    },
}

/// License discovery failures. Unrecognized text is not an I/O failure.
#[derive(Error, Debug)]
pub enum LicenseError {
    #[error("license: unable to find any license file")]
    NoLicenseFile,

    #[error("license: could not guess license type")]
    Unrecognized,

    #[error("license: multiple license files found: {0:?}")]
    MultipleLicenses(Vec<PathBuf>),

    #[error("license: unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
