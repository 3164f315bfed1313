//! Per-repository extraction.
//!
//! A [`RepositoryProcessor`] turns one [`RepositoryRecord`] into an
//! [`ExportRecord`]. It works in two phases:
//!
//! 1. Under the lock of the HEAD root, in a single view: resolve the
//!    repository's HEAD, list its files, compute language usage and line
//!    counts, count the commits reachable from HEAD and guess the license.
//! 2. For every root the repository references, under that root's lock and
//!    in a fresh view: count the commits of every branch stored in the root
//!    and the branches belonging to this repository.
//!
//! Views are always rolled back before their root is unlocked. Every error
//! is returned to the caller, which is expected to log it and move on.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tempfile::TempDir;
use tracing::{debug, error};

use crate::analysis::{CommentAwareCounter, ExtensionDetector, LanguageDetector, LineCounter};
use crate::error::ProcessError;
use crate::license::{LicenseCatalog, LicenseGuess};
use crate::locker::ResourceLocker;
use crate::model::{
    ExportRecord, Language, LanguageUsage, LineCounts, RepositoryRecord, RootId,
};
use crate::storage::{RootedView, Transactioner, TreeFile, ViewGuard};

/// Endpoints on this host are preferred as the repository URL.
const PREFERRED_HOST: &str = "github.com";

type Result<T> = std::result::Result<T, ProcessError>;

/// The analysis collaborators used by the processor.
#[derive(Clone)]
pub struct Analyzers {
    pub detector: Arc<dyn LanguageDetector>,
    pub lines: Arc<dyn LineCounter>,
    pub licenses: Arc<LicenseCatalog>,
}

impl Default for Analyzers {
    fn default() -> Self {
        Self {
            detector: Arc::new(ExtensionDetector::new()),
            lines: Arc::new(CommentAwareCounter::new()),
            licenses: Arc::new(LicenseCatalog::new()),
        }
    }
}

pub struct RepositoryProcessor<'a> {
    record: &'a RepositoryRecord,
    txer: &'a dyn Transactioner,
    locker: &'a ResourceLocker,
    analyzers: &'a Analyzers,
}

impl<'a> RepositoryProcessor<'a> {
    pub fn new(
        record: &'a RepositoryRecord,
        txer: &'a dyn Transactioner,
        locker: &'a ResourceLocker,
        analyzers: &'a Analyzers,
    ) -> Self {
        Self {
            record,
            txer,
            locker,
            analyzers,
        }
    }

    pub fn process(&self) -> Result<ExportRecord> {
        let id = &self.record.id;
        debug!(repo = %id, "start processing repository");
        let start = Instant::now();

        let head_root = self.record.head_root().ok_or(ProcessError::NoHead)?.clone();
        let url = canonical_url(&self.record.endpoints).ok_or(ProcessError::NoEndpoints)?;

        let mut data = {
            let lock = self.locker.acquire(&head_root);
            let _guard = lock.lock();
            let view = self.begin(&head_root)?;
            self.head_data(&view, url)?
        };

        let roots: Vec<RootId> = self.record.roots().into_iter().collect();
        for root in &roots {
            debug!(repo = %data.url, root = %root, "processing root");
            let (commits, branches) = self.root_totals(root)?;
            data.commits += commits;
            data.branches += branches;
            debug!(repo = %data.url, root = %root, "finished processing root");
        }

        data.storage_files = roots.iter().map(|r| self.txer.storage_name(r)).collect();
        data.storage_files.sort();
        data.roots = roots;

        debug!(repo = %id, elapsed = ?start.elapsed(), "finished processing repository");
        Ok(data)
    }

    fn begin(&self, root: &RootId) -> Result<ViewGuard> {
        ViewGuard::begin(self.txer, root).map_err(|e| ProcessError::storage(root, e))
    }

    /// Everything that is read from the HEAD commit.
    fn head_data(&self, view: &ViewGuard, url: String) -> Result<ExportRecord> {
        let root = view.root().clone();
        let storage = |e| ProcessError::storage(&root, e);

        let identity = self.identity(&**view)?;
        let head = view
            .resolve_reference(&format!("refs/heads/HEAD/{identity}"))
            .map_err(storage)?;

        let files = view.tree_files(&head).map_err(storage)?;
        let usage = self.language_usage(&files);

        let scratch = write_to_temp_dir(&files).map_err(ProcessError::Scratch)?;
        let lines = self
            .analyzers
            .lines
            .count(scratch.path(), &scratch_paths(scratch.path(), &files))
            .map_err(ProcessError::LineCount)?;
        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            error!(dir = %scratch_path.display(), err = %e, "unable to remove temp dir");
        }

        let head_commits = view.count_commits_from(&head).map_err(storage)?;
        let license = self.license(&files);

        Ok(ExportRecord {
            url,
            files: files.len() as u64,
            languages: merge_language_data(usage, lines),
            head_commits,
            license,
            ..ExportRecord::default()
        })
    }

    /// Commits of every branch in the root and branches of this repository.
    fn root_totals(&self, root: &RootId) -> Result<(u64, u64)> {
        let lock = self.locker.acquire(root);
        let _guard = lock.lock();
        let view = self.begin(root)?;
        let storage = |e| ProcessError::storage(root, e);

        let identity = self.identity(&*view)?;
        let commits = view.count_branch_commits().map_err(storage)?;
        let suffix = format!("/{identity}");
        let branches = view
            .references()
            .map_err(storage)?
            .iter()
            .filter(|r| !r.is_tag && r.name.ends_with(&suffix))
            .count() as u64;

        Ok((commits, branches))
    }

    /// Name of the remote, in this root, that matches one of the record's
    /// endpoints.
    fn identity(&self, view: &dyn RootedView) -> Result<String> {
        let remotes = view
            .remotes()
            .map_err(|e| ProcessError::storage(view.root(), e))?;
        remotes
            .into_iter()
            .find(|remote| {
                remote
                    .urls
                    .iter()
                    .any(|u| self.record.endpoints.iter().any(|e| e == u))
            })
            .map(|remote| remote.name)
            .ok_or_else(|| ProcessError::UnknownRemote(self.record.id.clone()))
    }

    fn language_usage(&self, files: &[TreeFile]) -> HashMap<String, LanguageUsage> {
        let mut usage: HashMap<String, LanguageUsage> = HashMap::new();
        for file in files {
            let Some(lang) = self.analyzers.detector.detect(&file.path, &file.contents) else {
                continue;
            };
            let entry = usage.entry(lang).or_default();
            entry.files += 1;
            entry.bytes += file.contents.len() as u64;
            entry.lines += file.contents.split(|b| *b == b'\n').count() as u64;
        }
        usage
    }

    /// Classify the first license file in listing order.
    fn license(&self, files: &[TreeFile]) -> LicenseGuess {
        let catalog = &self.analyzers.licenses;
        match files.iter().find(|f| catalog.is_license_file(&f.path)) {
            Some(file) => {
                let guess = catalog.guess(&String::from_utf8_lossy(&file.contents));
                debug!(repo = %self.record.id, file = %file.path, ?guess, "license");
                guess
            }
            None => LicenseGuess::Missing,
        }
    }
}

/// First endpoint on the preferred host, or the first endpoint.
pub fn canonical_url(endpoints: &[String]) -> Option<String> {
    endpoints
        .iter()
        .find(|e| e.contains(PREFERRED_HOST))
        .or_else(|| endpoints.first())
        .cloned()
}

/// Union of both maps; a language missing on one side gets zeroes there.
pub fn merge_language_data(
    usage: HashMap<String, LanguageUsage>,
    mut lines: HashMap<String, LineCounts>,
) -> BTreeMap<String, Language> {
    let mut merged: BTreeMap<String, Language> = BTreeMap::new();
    for (lang, usage) in usage {
        let lines = lines.remove(&lang).unwrap_or_default();
        merged.insert(lang, Language { usage, lines });
    }
    for (lang, lines) in lines {
        merged.insert(
            lang,
            Language {
                usage: LanguageUsage::default(),
                lines,
            },
        );
    }
    merged
}

/// Only plain relative paths are written to the scratch directory.
fn is_safe_path(path: &str) -> bool {
    !path.is_empty() && Path::new(path).components().all(|c| matches!(c, Component::Normal(_)))
}

fn scratch_paths(base: &Path, files: &[TreeFile]) -> Vec<PathBuf> {
    files
        .iter()
        .filter(|f| is_safe_path(&f.path))
        .map(|f| base.join(&f.path))
        .collect()
}

/// Write the files into a fresh temp dir. The directory is removed when the
/// returned handle is dropped, including when this function fails.
fn write_to_temp_dir(files: &[TreeFile]) -> io::Result<TempDir> {
    let dir = tempfile::Builder::new().prefix("forkstat").tempdir()?;
    for file in files {
        if !is_safe_path(&file.path) {
            debug!(path = %file.path, "skipping unsafe path");
            continue;
        }
        let path = dir.path().join(&file.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, &file.contents)?;
    }
    Ok(dir)
}
