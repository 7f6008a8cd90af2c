//!  Commit creation and history traversal
//!
//!  commits are the atomic units of change in Git. In gitwiki:
//! - creating a page is one commit
//! - every content-changing edit is one commit
//! - a page's history is the list of commits that changed its blob
//!
//! this module handles commit creation, history walking and per-path change
//! detection

use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use git2::{Oid, Repository, Revwalk, Sort, Tree};
use serde::Serialize;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{CommitId, GitSignature, TreeId};

/// information about a commit
#[derive(Debug, Clone, Serialize)]
pub struct CommitInfo {
    pub id: CommitId,
    pub tree_id: TreeId,
    pub parent_ids: Vec<CommitId>,
    pub message: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: DateTime<Utc>,
}

impl CommitInfo {
    /// create CommitInfo from a git2::Commit
    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Self {
        let author = commit.author();
        let time = commit.time();
        let timestamp = Utc
            .timestamp_opt(time.seconds(), 0)
            .single()
            .unwrap_or_else(Utc::now);

        Self {
            id: CommitId::new(commit.id()),
            tree_id: TreeId::new(commit.tree_id()),
            parent_ids: commit.parent_ids().map(CommitId::new).collect(),
            message: commit.message().unwrap_or("").to_string(),
            author_name: author.name().unwrap_or("Unknown").to_string(),
            author_email: author.email().unwrap_or("unknown@unknown").to_string(),
            timestamp,
        }
    }

    /// true for the root commit of the repository
    pub fn is_root(&self) -> bool {
        self.parent_ids.is_empty()
    }

    /// get the first (or only) parent
    pub fn first_parent(&self) -> Option<CommitId> {
        self.parent_ids.first().copied()
    }

    /// get a short summary of the commit (first line of message)
    pub fn summary(&self) -> &str {
        summary_line(&self.message)
    }
}

/// builder for creating commits with a fluent interface
pub struct CommitBuilder<'a> {
    repo: &'a Repository,
    tree_id: Option<TreeId>,
    parents: Vec<CommitId>,
    message: String,
    signature: GitSignature,
    update_ref: Option<String>,
}

impl<'a> CommitBuilder<'a> {
    /// create a new CommitBuilder
    pub fn new(repo: &'a Repository) -> Self {
        Self {
            repo,
            tree_id: None,
            parents: Vec::new(),
            message: String::new(),
            signature: GitSignature::gitwiki(),
            update_ref: None,
        }
    }

    /// set the tree for this commit
    pub fn tree(mut self, tree_id: TreeId) -> Self {
        self.tree_id = Some(tree_id);
        self
    }

    /// add a parent commit
    pub fn parent(mut self, parent: CommitId) -> Self {
        self.parents.push(parent);
        self
    }

    /// set the commit message
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// set the author/committer signature
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = signature;
        self
    }

    /// update a ref to point to this commit
    pub fn update_ref(mut self, refname: impl Into<String>) -> Self {
        self.update_ref = Some(refname.into());
        self
    }

    /// create the commit and return its ID
    ///
    /// when a ref is updated it only moves if it still points at the first
    /// parent (or, for a root commit, does not exist yet); anything else
    /// comes back as `ConcurrentModification` and the ref is left alone.
    pub fn commit(self) -> StorageResult<CommitId> {
        let tree_id = self
            .tree_id
            .ok_or_else(|| StorageError::Internal("commit requires a tree".to_string()))?;

        let tree = self.repo.find_tree(tree_id.raw())?;
        let sig = self.signature.to_git2_signature()?;

        let parent_commits: Vec<git2::Commit<'_>> = self
            .parents
            .iter()
            .map(|id| self.repo.find_commit(id.raw()))
            .collect::<Result<_, _>>()?;

        let parent_refs: Vec<&git2::Commit<'_>> = parent_commits.iter().collect();

        let oid = self
            .repo
            .commit(None, &sig, &sig, &self.message, &tree, &parent_refs)?;
        let id = CommitId::new(oid);

        if let Some(refname) = &self.update_ref {
            let log = if self.parents.is_empty() {
                format!("commit (initial): {}", summary_line(&self.message))
            } else {
                format!("commit: {}", summary_line(&self.message))
            };
            advance_ref(self.repo, refname, self.parents.first().copied(), id, &log)?;
        }

        Ok(id)
    }
}

/// move `refname` (following a symbolic ref to its target) from `expected`
/// to `new`
///
/// `expected == None` means the ref must not exist yet.
fn advance_ref(
    repo: &Repository,
    refname: &str,
    expected: Option<CommitId>,
    new: CommitId,
    log: &str,
) -> StorageResult<()> {
    let target = match repo.find_reference(refname) {
        Ok(reference) => reference
            .symbolic_target()
            .unwrap_or(refname)
            .to_string(),
        Err(e) if e.code() == git2::ErrorCode::NotFound => refname.to_string(),
        Err(e) => return Err(StorageError::Git(e)),
    };

    // the compare runs under the ref's lock; a zero id means "must not exist"
    let current = expected.map(|id| id.raw()).unwrap_or_else(Oid::zero);
    match repo.reference_matching(&target, new.raw(), true, current, log) {
        Ok(_) => Ok(()),
        Err(e) if is_ref_race(&e) => Err(StorageError::ConcurrentModification { branch: target }),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// errors git reports when a ref moved, appeared or was locked under us
fn is_ref_race(e: &git2::Error) -> bool {
    matches!(
        e.code(),
        git2::ErrorCode::Modified
            | git2::ErrorCode::Exists
            | git2::ErrorCode::NotFound
            | git2::ErrorCode::Locked
    )
}

fn summary_line(message: &str) -> &str {
    message.lines().next().unwrap_or(message)
}

/// get information about a commit
pub fn get_commit(repo: &Repository, id: CommitId) -> StorageResult<CommitInfo> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;

    Ok(CommitInfo::from_git2(&commit))
}

/// check whether a commit changed the entry at `path`
///
/// compares the entry against the first parent; a root commit changes every
/// path it contains.
pub fn changes_path(repo: &Repository, id: CommitId, path: &Path) -> StorageResult<bool> {
    let commit = repo
        .find_commit(id.raw())
        .map_err(|_| StorageError::CommitNotFound(id.to_string()))?;

    let current = entry_id(&commit.tree()?, path)?;
    let previous = match commit.parents().next() {
        Some(parent) => entry_id(&parent.tree()?, path)?,
        None => None,
    };

    Ok(current != previous)
}

fn entry_id(tree: &Tree<'_>, path: &Path) -> StorageResult<Option<Oid>> {
    match tree.get_path(path) {
        Ok(entry) => Ok(Some(entry.id())),
        Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
        Err(e) => Err(StorageError::Git(e)),
    }
}

/// iterate over commit history starting from a commit
pub struct HistoryIterator<'repo> {
    repo: &'repo Repository,
    revwalk: Revwalk<'repo>,
}

impl<'repo> HistoryIterator<'repo> {
    /// create a new history iterator
    pub fn new(repo: &'repo Repository, start: CommitId) -> StorageResult<Self> {
        let mut revwalk = repo.revwalk()?;
        revwalk.push(start.raw())?;
        revwalk.set_sorting(Sort::TIME | Sort::TOPOLOGICAL)?;

        Ok(Self { repo, revwalk })
    }

    /// only follow first parents (linear history through merges)
    pub fn first_parent_only(mut self) -> Self {
        self.revwalk.simplify_first_parent().ok();
        self
    }
}

impl<'repo> Iterator for HistoryIterator<'repo> {
    type Item = StorageResult<CommitInfo>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.revwalk.next()? {
            Ok(oid) => match self.repo.find_commit(oid) {
                Ok(commit) => Some(Ok(CommitInfo::from_git2(&commit))),
                Err(e) => Some(Err(StorageError::Git(e))),
            },
            Err(e) => Some(Err(StorageError::Git(e))),
        }
    }
}

/// get history for a commit
pub fn history(repo: &Repository, start: CommitId) -> StorageResult<HistoryIterator<'_>> {
    HistoryIterator::new(repo, start)
}

/// message formatting for page operations
pub struct CommitMessage;

impl CommitMessage {
    /// message for the commit that brings a page into existence
    pub fn page_created(name: &str) -> String {
        format!("Page ({}) is created.", name)
    }

    /// message for a content change, keyed by the page's file name
    pub fn page_updated(file_name: &str) -> String {
        format!("Updated: {}", file_name)
    }
}
