//!   Core Git repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps
//!  `git2::Repository` with thread-safe access and provides the handful of
//!  primitives the wiki needs: open/init, history checks, tree snapshots,
//!  raw object writes and commits built on top of HEAD.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::{Index, IndexEntry, IndexTime, Repository};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::storage::blob::{self, BlobHandle};
use crate::storage::commit::{self, CommitBuilder, CommitInfo};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::tree::TreeHandle;
use crate::storage::types::{BlobId, CommitId, GitSignature, StageEntry, TreeId, BLOB_MODE};

/// The main Git repository wrapper.
///
/// Clone this to share across threads - it uses Arc internally.
#[derive(Clone)]
pub struct RepositoryHandle {
    inner: Arc<RepositoryInner>,
}

struct RepositoryInner {
    repo: Mutex<Repository>,
    /// held by writers for their whole read-check-write sequence
    writer: Mutex<()>,
    path: PathBuf,
    signature: Option<GitSignature>,
}

/// the tree at HEAD when it was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub commit_id: CommitId,
    pub tree_id: TreeId,
}

impl RepositoryHandle {
    /// Open an existing repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open(path).map_err(|e| StorageError::unavailable(path, e))?;
        debug!(path = %path.display(), "opened repository");
        Ok(Self::wrap(repo, path))
    }

    /// Initialize a new, empty repository, creating the directory if needed.
    ///
    /// No commit is made: the repository starts without history.
    pub fn init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path).map_err(|e| StorageError::unavailable(path, e))?;
        let repo = Repository::init(path).map_err(|e| StorageError::unavailable(path, e))?;
        info!(path = %path.display(), "initialized empty repository");
        Ok(Self::wrap(repo, path))
    }

    /// Open or initialize a repository.
    pub fn open_or_init(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        if path.join(".git").exists() || path.join("HEAD").is_file() {
            Self::open(path)
        } else {
            Self::init(path)
        }
    }

    fn wrap(repo: Repository, path: &Path) -> Self {
        Self {
            inner: Arc::new(RepositoryInner {
                repo: Mutex::new(repo),
                writer: Mutex::new(()),
                path: path.to_path_buf(),
                signature: None,
            }),
        }
    }

    /// Set the signature for commits.
    ///
    /// Must be called before the handle is cloned.
    pub fn with_signature(mut self, signature: GitSignature) -> StorageResult<Self> {
        let inner = Arc::get_mut(&mut self.inner).ok_or_else(|| {
            StorageError::Internal("cannot change the signature of a shared repository".into())
        })?;
        inner.signature = Some(signature);
        Ok(self)
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Execute a function with exclusive access to the repository.
    pub fn with_repo<F, T>(&self, f: F) -> StorageResult<T>
    where
        F: FnOnce(&Repository) -> StorageResult<T>,
    {
        let repo = self.inner.repo.lock();
        f(&repo)
    }

    /// Take the writer lock.
    ///
    /// Only one writer per process runs at a time; hold the guard across the
    /// whole lookup-then-commit sequence.
    pub fn writer(&self) -> MutexGuard<'_, ()> {
        self.inner.writer.lock()
    }

    /// The working directory pages are written into.
    pub fn workdir(&self) -> StorageResult<PathBuf> {
        self.with_repo(|repo| {
            repo.workdir()
                .map(Path::to_path_buf)
                .ok_or_else(|| StorageError::NoWorkingDirectory(self.inner.path.clone()))
        })
    }

    // ==================== History ====================

    /// True iff at least one reference points at a commit.
    pub fn has_history(&self) -> StorageResult<bool> {
        self.with_repo(|repo| {
            for reference in repo.references()? {
                if reference?.peel_to_commit().is_ok() {
                    return Ok(true);
                }
            }
            Ok(false)
        })
    }

    /// Current HEAD commit, or `None` while HEAD is unborn.
    pub fn head(&self) -> StorageResult<Option<CommitId>> {
        self.with_repo(head_commit)
    }

    /// The tree at HEAD.
    ///
    /// Fails with `NoHistory` before the first commit; check `has_history`
    /// first.
    pub fn current_tree(&self) -> StorageResult<TreeSnapshot> {
        self.with_repo(|repo| {
            let commit_id = head_commit(repo)?.ok_or(StorageError::NoHistory)?;
            let commit = repo.find_commit(commit_id.raw())?;
            Ok(TreeSnapshot {
                commit_id,
                tree_id: TreeId::new(commit.tree_id()),
            })
        })
    }

    /// Every blob in a snapshot, depth-first.
    pub fn list_blobs(&self, snapshot: &TreeSnapshot) -> StorageResult<Vec<BlobHandle>> {
        self.with_repo(|repo| {
            let tree = TreeHandle::new(repo.find_tree(snapshot.tree_id.raw())?);
            let blobs = tree.blobs()?;
            debug!(tree = %snapshot.tree_id, count = blobs.len(), "walked tree");
            Ok(blobs)
        })
    }

    /// The blob at `path` in a snapshot, if any.
    pub fn find_blob(&self, snapshot: &TreeSnapshot, path: &Path) -> StorageResult<Option<BlobHandle>> {
        self.with_repo(|repo| {
            let tree = TreeHandle::new(repo.find_tree(snapshot.tree_id.raw())?);
            tree.blob_at(path)
        })
    }

    // ==================== Objects ====================

    /// Store raw bytes as a new object.
    ///
    /// Touches neither the index nor the working tree, and creates no commit.
    pub fn write_object(&self, bytes: &[u8]) -> StorageResult<BlobId> {
        self.with_repo(|repo| blob::write_blob(repo, bytes))
    }

    /// Read an object's bytes.
    pub fn read_object(&self, id: BlobId) -> StorageResult<Vec<u8>> {
        self.with_repo(|repo| blob::read_blob(repo, id))
    }

    // ==================== Commits ====================

    /// Stage `entries` on top of HEAD's tree and commit them.
    ///
    /// The tree is built in memory from the HEAD that becomes the parent, so
    /// it always carries everything that parent has. HEAD is advanced only if
    /// it still points at that parent; otherwise the commit fails with
    /// `ConcurrentModification` and nothing is left staged. The first commit
    /// of a repository has no parent.
    pub fn stage_and_commit(&self, entries: &[StageEntry], message: &str) -> StorageResult<CommitInfo> {
        self.with_repo(|repo| {
            let parent = head_commit(repo)?;
            self.commit_onto(repo, parent, entries, message)
        })
    }

    fn commit_onto(
        &self,
        repo: &Repository,
        parent: Option<CommitId>,
        entries: &[StageEntry],
        message: &str,
    ) -> StorageResult<CommitInfo> {
        let mut index = Index::new()?;
        if let Some(parent) = parent {
            index.read_tree(&repo.find_commit(parent.raw())?.tree()?)?;
        }
        for entry in entries {
            stage(repo, &mut index, entry)?;
        }
        let tree_id = TreeId::new(index.write_tree_to(repo)?);

        let mut builder = CommitBuilder::new(repo)
            .tree(tree_id)
            .message(message)
            .signature(self.signature(repo))
            .update_ref("HEAD");
        if let Some(parent) = parent {
            builder = builder.parent(parent);
        }
        let id = builder.commit()?;

        info!(commit = %id.short(), msg = message, "committed");
        sync_index(repo, tree_id);
        commit::get_commit(repo, id)
    }

    /// configured signature, then git config identity, then the fallback
    fn signature(&self, repo: &Repository) -> GitSignature {
        if let Some(sig) = &self.inner.signature {
            return sig.clone();
        }
        match repo.signature() {
            Ok(sig) => match (sig.name(), sig.email()) {
                (Some(name), Some(email)) => GitSignature::new(name, email),
                _ => GitSignature::gitwiki(),
            },
            Err(_) => GitSignature::gitwiki(),
        }
    }

    /// Commit log from HEAD, newest first.
    pub fn history(&self, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let head = match head_commit(repo)? {
                Some(head) => head,
                None => return Ok(Vec::new()),
            };
            let iter = commit::history(repo, head)?;
            match limit {
                Some(n) => iter.take(n).collect(),
                None => iter.collect(),
            }
        })
    }

    /// Commits from HEAD that changed the blob at `path`, newest first.
    pub fn path_history(&self, path: &Path, limit: Option<usize>) -> StorageResult<Vec<CommitInfo>> {
        self.with_repo(|repo| {
            let head = match head_commit(repo)? {
                Some(head) => head,
                None => return Ok(Vec::new()),
            };

            let mut commits = Vec::new();
            for info in commit::history(repo, head)?.first_parent_only() {
                let info = info?;
                if commit::changes_path(repo, info.id, path)? {
                    commits.push(info);
                    if limit.is_some_and(|n| commits.len() >= n) {
                        break;
                    }
                }
            }
            Ok(commits)
        })
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> StorageResult<usize> {
        self.with_repo(|repo| match head_commit(repo)? {
            Some(head) => {
                let mut revwalk = repo.revwalk()?;
                revwalk.push(head.raw())?;
                Ok(revwalk.count())
            }
            None => Ok(0),
        })
    }
}

/// HEAD's commit, `None` while the branch is unborn
fn head_commit(repo: &Repository) -> StorageResult<Option<CommitId>> {
    let head = match repo.head() {
        Ok(head) => head,
        Err(e) if e.code() == git2::ErrorCode::UnbornBranch || e.code() == git2::ErrorCode::NotFound => {
            return Ok(None)
        }
        Err(e) => return Err(StorageError::Git(e)),
    };
    let commit = head.peel_to_commit()?;
    Ok(Some(CommitId::new(commit.id())))
}

fn stage(repo: &Repository, index: &mut Index, entry: &StageEntry) -> StorageResult<()> {
    let (blob, mode) = match entry {
        StageEntry::WorkingFile { path } => {
            let workdir = repo
                .workdir()
                .ok_or_else(|| StorageError::NoWorkingDirectory(repo.path().to_path_buf()))?;
            let bytes = std::fs::read(workdir.join(path))?;
            (blob::write_blob(repo, &bytes)?, BLOB_MODE)
        }
        StageEntry::Object { blob, mode, .. } => (*blob, *mode),
    };

    index.add(&IndexEntry {
        ctime: IndexTime::new(0, 0),
        mtime: IndexTime::new(0, 0),
        dev: 0,
        ino: 0,
        mode,
        uid: 0,
        gid: 0,
        // only used for stat caching
        file_size: 0,
        id: blob.raw(),
        flags: 0,
        flags_extended: 0,
        path: index_path(entry.path())?.into_bytes(),
    })?;
    Ok(())
}

/// Mirror a committed tree into the on-disk index.
///
/// Commits never read the on-disk index, so a failure here (usually another
/// process holding `index.lock`) is only logged.
fn sync_index(repo: &Repository, tree_id: TreeId) {
    let result = repo.find_tree(tree_id.raw()).and_then(|tree| {
        let mut index = repo.index()?;
        index.read_tree(&tree)?;
        index.write()
    });
    if let Err(e) = result {
        warn!(tree = %tree_id, error = %e, "on-disk index not refreshed");
    }
}

/// index paths always use forward slashes
fn index_path(path: &Path) -> StorageResult<String> {
    let parts: Option<Vec<&str>> = path.components().map(|c| c.as_os_str().to_str()).collect();
    parts
        .map(|parts| parts.join("/"))
        .ok_or_else(|| StorageError::Internal(format!("non-utf8 path: {}", path.display())))
}
