//! In-memory storage backend.
//!
//! Roots are assembled with [`MemoryRoot`]'s builder methods and registered
//! on a [`MemoryTransactioner`]. The transactioner keeps per-root view
//! statistics (open views, peak concurrent views, rollbacks) so callers can
//! check that views are always released.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;

use super::{RefInfo, Remote, Result, RootedView, Transactioner, TreeFile};
use crate::error::StorageError;
use crate::model::{CommitId, RootId};

#[derive(Debug, Clone, Default)]
struct MemoryCommit {
    parents: Vec<CommitId>,
    files: Vec<TreeFile>,
}

/// Contents of one storage root.
#[derive(Debug, Clone, Default)]
pub struct MemoryRoot {
    remotes: Vec<Remote>,
    references: BTreeMap<String, CommitId>,
    commits: HashMap<CommitId, MemoryCommit>,
}

impl MemoryRoot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a remote with a single URL, or another URL to an existing remote.
    pub fn remote(mut self, name: &str, url: &str) -> Self {
        match self.remotes.iter_mut().find(|r| r.name == name) {
            Some(remote) => remote.urls.push(url.to_string()),
            None => self.remotes.push(Remote {
                name: name.to_string(),
                urls: vec![url.to_string()],
            }),
        }
        self
    }

    /// Add a commit with its parents and the full file tree at that commit.
    pub fn commit(mut self, id: &str, parents: &[&str], files: &[(&str, &str)]) -> Self {
        let commit = MemoryCommit {
            parents: parents.iter().map(|p| CommitId::new(*p)).collect(),
            files: files
                .iter()
                .map(|(path, contents)| TreeFile {
                    path: path.to_string(),
                    contents: contents.as_bytes().to_vec(),
                })
                .collect(),
        };
        self.commits.insert(CommitId::new(id), commit);
        self
    }

    pub fn reference(mut self, name: &str, target: &str) -> Self {
        self.references
            .insert(name.to_string(), CommitId::new(target));
        self
    }

    fn reachable(&self, starts: &[CommitId]) -> Result<HashSet<CommitId>> {
        let mut seen = HashSet::new();
        let mut stack: Vec<CommitId> = starts.to_vec();
        while let Some(id) = stack.pop() {
            if seen.contains(&id) {
                continue;
            }
            let commit = self
                .commits
                .get(&id)
                .ok_or_else(|| StorageError::ObjectNotFound(id.to_string()))?;
            stack.extend(commit.parents.iter().cloned());
            seen.insert(id);
        }
        Ok(seen)
    }
}

#[derive(Debug, Default)]
struct ViewStats {
    open: AtomicUsize,
    peak: AtomicUsize,
    rollbacks: AtomicUsize,
}

/// Transactioner over in-memory roots.
#[derive(Debug, Default)]
pub struct MemoryTransactioner {
    roots: RwLock<HashMap<RootId, Arc<MemoryRoot>>>,
    stats: DashMap<RootId, Arc<ViewStats>>,
    latency: Option<Duration>,
}

impl MemoryTransactioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `latency` whenever a view is opened and on every read, to
    /// widen the window in which concurrent views could overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn insert(&self, id: RootId, root: MemoryRoot) {
        let mut roots = self.roots.write().unwrap_or_else(|e| e.into_inner());
        roots.insert(id, Arc::new(root));
    }

    fn stats(&self, root: &RootId) -> Arc<ViewStats> {
        self.stats.entry(root.clone()).or_default().clone()
    }

    /// Views currently open on `root`.
    pub fn open_views(&self, root: &RootId) -> usize {
        self.stats(root).open.load(Ordering::SeqCst)
    }

    /// Highest number of views that were open on `root` at the same time.
    pub fn peak_open_views(&self, root: &RootId) -> usize {
        self.stats(root).peak.load(Ordering::SeqCst)
    }

    /// Number of views on `root` that have been rolled back.
    pub fn rollbacks(&self, root: &RootId) -> usize {
        self.stats(root).rollbacks.load(Ordering::SeqCst)
    }
}

impl Transactioner for MemoryTransactioner {
    fn begin(&self, root: &RootId) -> Result<Box<dyn RootedView>> {
        let data = {
            let roots = self.roots.read().unwrap_or_else(|e| e.into_inner());
            roots
                .get(root)
                .cloned()
                .ok_or_else(|| StorageError::UnknownRoot(root.clone()))?
        };

        let stats = self.stats(root);
        let open = stats.open.fetch_add(1, Ordering::SeqCst) + 1;
        stats.peak.fetch_max(open, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }

        Ok(Box::new(MemoryView {
            root: root.clone(),
            data,
            stats,
            latency: self.latency,
            rolled_back: false,
        }))
    }
}

struct MemoryView {
    root: RootId,
    data: Arc<MemoryRoot>,
    stats: Arc<ViewStats>,
    latency: Option<Duration>,
    rolled_back: bool,
}

impl MemoryView {
    fn check(&self) -> Result<&MemoryRoot> {
        if self.rolled_back {
            return Err(StorageError::RolledBack(self.root.clone()));
        }
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
        Ok(&self.data)
    }
}

impl RootedView for MemoryView {
    fn root(&self) -> &RootId {
        &self.root
    }

    fn remotes(&self) -> Result<Vec<Remote>> {
        Ok(self.check()?.remotes.clone())
    }

    fn resolve_reference(&self, name: &str) -> Result<CommitId> {
        self.check()?
            .references
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::ReferenceNotFound(name.to_string()))
    }

    fn references(&self) -> Result<Vec<RefInfo>> {
        Ok(self
            .check()?
            .references
            .keys()
            .map(|name| RefInfo {
                name: name.clone(),
                is_tag: name.starts_with("refs/tags/"),
            })
            .collect())
    }

    fn tree_files(&self, commit: &CommitId) -> Result<Vec<TreeFile>> {
        self.check()?
            .commits
            .get(commit)
            .map(|c| c.files.clone())
            .ok_or_else(|| StorageError::ObjectNotFound(commit.to_string()))
    }

    fn count_commits_from(&self, commit: &CommitId) -> Result<u64> {
        let data = self.check()?;
        Ok(data.reachable(std::slice::from_ref(commit))?.len() as u64)
    }

    fn count_branch_commits(&self) -> Result<u64> {
        let data = self.check()?;
        let heads: Vec<CommitId> = data
            .references
            .iter()
            .filter(|(name, _)| !name.starts_with("refs/tags/"))
            .map(|(_, target)| target.clone())
            .collect();
        Ok(data.reachable(&heads)?.len() as u64)
    }

    fn rollback(&mut self) -> Result<()> {
        if !self.rolled_back {
            self.rolled_back = true;
            self.stats.open.fetch_sub(1, Ordering::SeqCst);
            self.stats.rollbacks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_root() -> MemoryRoot {
        MemoryRoot::new()
            .remote("origin", "https://github.com/a/b")
            .commit("c1", &[], &[("README", "hi\n")])
            .commit("c2", &["c1"], &[("README", "hi\n"), ("main.go", "package main\n")])
            .commit("c3", &["c1"], &[("README", "fork\n")])
            .reference("refs/heads/HEAD/origin", "c2")
            .reference("refs/heads/fork/other", "c3")
            .reference("refs/tags/v1/origin", "c1")
    }

    #[test]
    fn test_view_reads() {
        let txer = MemoryTransactioner::new();
        let root = RootId::new("aaa");
        txer.insert(root.clone(), sample_root());

        let view = txer.begin(&root).unwrap();
        let head = view.resolve_reference("refs/heads/HEAD/origin").unwrap();
        assert_eq!(head, CommitId::new("c2"));
        assert_eq!(view.tree_files(&head).unwrap().len(), 2);
        assert_eq!(view.count_commits_from(&head).unwrap(), 2);
        assert_eq!(view.count_branch_commits().unwrap(), 3);
        assert_eq!(view.references().unwrap().iter().filter(|r| r.is_tag).count(), 1);
        assert!(matches!(
            view.resolve_reference("refs/heads/nope"),
            Err(StorageError::ReferenceNotFound(_))
        ));
    }

    #[test]
    fn test_rollback_is_idempotent() {
        let txer = MemoryTransactioner::new();
        let root = RootId::new("aaa");
        txer.insert(root.clone(), sample_root());

        let mut view = txer.begin(&root).unwrap();
        assert_eq!(txer.open_views(&root), 1);
        view.rollback().unwrap();
        view.rollback().unwrap();
        assert_eq!(txer.open_views(&root), 0);
        assert_eq!(txer.rollbacks(&root), 1);
        assert!(matches!(view.remotes(), Err(StorageError::RolledBack(_))));
    }

    #[test]
    fn test_unknown_root() {
        let txer = MemoryTransactioner::new();
        assert!(matches!(
            txer.begin(&RootId::new("missing")),
            Err(StorageError::UnknownRoot(_))
        ));
    }

    #[test]
    fn test_missing_parent_is_an_error() {
        let txer = MemoryTransactioner::new();
        let root = RootId::new("aaa");
        txer.insert(
            root.clone(),
            MemoryRoot::new()
                .commit("c2", &["gone"], &[])
                .reference("refs/heads/master/x", "c2"),
        );
        let view = txer.begin(&root).unwrap();
        assert!(view.count_commits_from(&CommitId::new("c2")).is_err());
    }
}
