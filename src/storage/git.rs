//! git2 backed rooted storage.
//!
//! Every storage root is a git repository (bare or not) stored in a common
//! directory under the root hash, either as `<hash>` or `<hash>.git`. Remotes
//! in the repository configuration name the forks stored in it, and fork
//! references are suffixed with the remote name (`refs/heads/HEAD/<remote>`).
//!
//! git has no transactions for readers: a view is an open repository handle
//! and rolling back closes it.

use std::path::{Path, PathBuf};

use git2::{ErrorCode, ObjectType, Oid, Repository, TreeWalkMode, TreeWalkResult};
use tracing::debug;

use super::{RefInfo, Remote, Result, RootedView, Transactioner, TreeFile};
use crate::error::StorageError;
use crate::model::{CommitId, RootId};

/// Opens views on per-root git repositories under a base directory.
#[derive(Debug, Clone)]
pub struct GitTransactioner {
    base: PathBuf,
}

impl GitTransactioner {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    fn root_path(&self, root: &RootId) -> Option<PathBuf> {
        [
            self.base.join(root.as_str()),
            self.base.join(format!("{root}.git")),
        ]
        .into_iter()
        .find(|p| p.exists())
    }
}

impl Transactioner for GitTransactioner {
    fn begin(&self, root: &RootId) -> Result<Box<dyn RootedView>> {
        let path = self
            .root_path(root)
            .ok_or_else(|| StorageError::UnknownRoot(root.clone()))?;
        let repo = Repository::open(&path)?;
        debug!(root = %root, path = %path.display(), "opened root");
        Ok(Box::new(GitView {
            root: root.clone(),
            repo: Some(repo),
        }))
    }

    fn storage_name(&self, root: &RootId) -> String {
        self.root_path(root)
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| root.to_string())
    }
}

struct GitView {
    root: RootId,
    repo: Option<Repository>,
}

impl GitView {
    fn repo(&self) -> Result<&Repository> {
        self.repo
            .as_ref()
            .ok_or_else(|| StorageError::RolledBack(self.root.clone()))
    }

    fn commit_oid(commit: &CommitId) -> Result<Oid> {
        Oid::from_str(commit.as_str())
            .map_err(|_| StorageError::ObjectNotFound(commit.to_string()))
    }
}

impl RootedView for GitView {
    fn root(&self) -> &RootId {
        &self.root
    }

    fn remotes(&self) -> Result<Vec<Remote>> {
        let repo = self.repo()?;
        let mut remotes = Vec::new();
        for name in repo.remotes()?.iter().flatten() {
            let remote = repo.find_remote(name)?;
            let urls = [remote.url(), remote.pushurl()]
                .into_iter()
                .flatten()
                .map(str::to_string)
                .collect();
            remotes.push(Remote {
                name: name.to_string(),
                urls,
            });
        }
        Ok(remotes)
    }

    fn resolve_reference(&self, name: &str) -> Result<CommitId> {
        let reference = match self.repo()?.find_reference(name) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(StorageError::ReferenceNotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let commit = reference.peel_to_commit()?;
        Ok(CommitId::new(commit.id().to_string()))
    }

    fn references(&self) -> Result<Vec<RefInfo>> {
        let mut refs = Vec::new();
        for reference in self.repo()?.references()? {
            let reference = reference?;
            if let Some(name) = reference.name() {
                refs.push(RefInfo {
                    name: name.to_string(),
                    is_tag: reference.is_tag(),
                });
            }
        }
        Ok(refs)
    }

    fn tree_files(&self, commit: &CommitId) -> Result<Vec<TreeFile>> {
        let repo = self.repo()?;
        let tree = repo.find_commit(Self::commit_oid(commit)?)?.tree()?;

        let mut blobs = Vec::new();
        tree.walk(TreeWalkMode::PreOrder, |dir, entry| {
            if entry.kind() == Some(ObjectType::Blob) {
                if let Some(name) = entry.name() {
                    blobs.push((format!("{dir}{name}"), entry.id()));
                }
            }
            TreeWalkResult::Ok
        })?;

        blobs
            .into_iter()
            .map(|(path, id)| -> Result<TreeFile> {
                let blob = repo.find_blob(id)?;
                Ok(TreeFile {
                    path,
                    contents: blob.content().to_vec(),
                })
            })
            .collect()
    }

    fn count_commits_from(&self, commit: &CommitId) -> Result<u64> {
        let mut walk = self.repo()?.revwalk()?;
        walk.push(Self::commit_oid(commit)?)?;
        let mut count = 0;
        for oid in walk {
            oid?;
            count += 1;
        }
        Ok(count)
    }

    fn count_branch_commits(&self) -> Result<u64> {
        let repo = self.repo()?;
        let mut walk = repo.revwalk()?;
        for reference in repo.references()? {
            let reference = reference?;
            if reference.is_tag() {
                continue;
            }
            match reference.peel_to_commit() {
                Ok(commit) => walk.push(commit.id())?,
                Err(e) => debug!(
                    root = %self.root,
                    reference = reference.name().unwrap_or("?"),
                    err = %e,
                    "skipping reference not pointing at a commit"
                ),
            }
        }
        let mut count = 0;
        for oid in walk {
            oid?;
            count += 1;
        }
        Ok(count)
    }

    fn rollback(&mut self) -> Result<()> {
        self.repo = None;
        Ok(())
    }
}
