//! Pages and page names.

use std::fmt;
use std::io;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::api::{WikiError, WikiResult};
use crate::storage::{
    BlobHandle, BlobId, BlobOrigin, CommitInfo, CommitMessage, RepositoryHandle, StageEntry,
    TreeSnapshot,
};

/// A validated page name.
///
/// Names become file paths inside the working tree, so anything that could
/// escape it or land inside `.git` is rejected. Forward slashes are allowed
/// so that nested pages found by traversal can be addressed again.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageName(String);

impl PageName {
    /// longest accepted name, in bytes
    const MAX_LEN: usize = 255;

    /// create a new PageName, validating the input
    pub fn new(name: impl Into<String>) -> Result<Self, InvalidNameError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    fn validate(name: &str) -> Result<(), InvalidNameError> {
        if name.is_empty() {
            return Err(InvalidNameError::Empty);
        }

        if name.len() > Self::MAX_LEN {
            return Err(InvalidNameError::TooLong(name.len()));
        }

        for (i, c) in name.chars().enumerate() {
            if c == '\\' || c.is_control() {
                return Err(InvalidNameError::InvalidCharacter { char: c, position: i });
            }
        }

        for segment in name.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(InvalidNameError::InvalidPath(name.to_string()));
            }
            if segment.eq_ignore_ascii_case(".git") {
                return Err(InvalidNameError::Reserved(segment.to_string()));
            }
        }

        Ok(())
    }

    /// get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }

}

impl fmt::Display for PageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for PageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for PageName {
    type Err = InvalidNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// error type for invalid page names
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidNameError {
    Empty,
    TooLong(usize),
    InvalidCharacter { char: char, position: usize },
    Reserved(String),
    InvalidPath(String),
}

impl fmt::Display for InvalidNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "name cannot be empty"),
            Self::TooLong(len) => write!(f, "name too long: {} bytes", len),
            Self::InvalidCharacter { char, position } => {
                write!(f, "invalid character {:?} at position {}", char, position)
            }
            Self::Reserved(name) => write!(f, "'{}' is a reserved name", name),
            Self::InvalidPath(path) => write!(f, "invalid path: '{}'", path),
        }
    }
}

impl std::error::Error for InvalidNameError {}

/// One page: a blob in the repository plus what it takes to edit it.
///
/// A page is a snapshot of the tree it was resolved from. It does not notice
/// commits made elsewhere; only its own successful writes move it forward.
#[derive(Clone)]
pub struct Page {
    blob: BlobHandle,
    repo: RepositoryHandle,
    extension: String,
}

impl Page {
    pub(crate) fn new(blob: BlobHandle, repo: RepositoryHandle, extension: impl Into<String>) -> Self {
        Self {
            blob,
            repo,
            extension: extension.into(),
        }
    }

    /// The page name: its path without the configured extension.
    pub fn name(&self) -> String {
        let file_name = self.file_name();
        let suffix = format!(".{}", self.extension);
        match file_name.strip_suffix(&suffix) {
            Some(stem) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        }
    }

    /// The path inside the repository, extension included.
    pub fn file_name(&self) -> String {
        slash_path(self.blob.path())
    }

    pub fn path(&self) -> &Path {
        self.blob.path()
    }

    pub fn blob_id(&self) -> BlobId {
        self.blob.id()
    }

    /// false only while the page's blob has not been committed yet
    pub fn is_committed(&self) -> bool {
        self.blob.origin() == BlobOrigin::Tree
    }

    /// The page's bytes as of its snapshot.
    ///
    /// An unreadable blob gives `None` rather than an error, so one broken
    /// object can't take down a page view.
    pub fn content(&self) -> Option<Vec<u8>> {
        match self.repo.read_object(self.blob.id()) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(page = %self, error = %e, "page content unreadable");
                None
            }
        }
    }

    /// `content` decoded as UTF-8, replacing invalid sequences
    pub fn content_string(&self) -> Option<String> {
        self.content()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Replace the page's content and commit it.
    ///
    /// Content equal to the page's current content is a no-op and returns
    /// `None`. Otherwise the file is written into the working tree, staged
    /// from there, and committed as `Updated: <file>`; the page then points
    /// at the committed blob. If the commit fails the working file is put
    /// back the way it was.
    pub fn update_content(&mut self, new: impl AsRef<[u8]>) -> WikiResult<Option<CommitInfo>> {
        let new = new.as_ref();
        let repo = self.repo.clone();
        let _writer = repo.writer();

        if self.content().as_deref() == Some(new) {
            debug!(page = %self, "content unchanged, nothing to commit");
            return Ok(None);
        }

        let target = repo.workdir()?.join(self.blob.path());
        let previous = match std::fs::read(&target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, new)?;

        let message = CommitMessage::page_updated(&self.file_name());
        match self.commit_entry(self.blob.stage_working_file(), &message) {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                restore_working_file(&target, previous.as_deref());
                Err(e)
            }
        }
    }

    /// Commits that changed this page, newest first.
    pub fn history(&self, limit: Option<usize>) -> WikiResult<Vec<CommitInfo>> {
        Ok(self.repo.path_history(self.blob.path(), limit)?)
    }

    /// Commit the page's blob as it stands, staged straight from the object
    /// database whatever its origin.
    ///
    /// Callers hold the repository's writer lock.
    pub(crate) fn commit(&mut self, message: &str) -> WikiResult<CommitInfo> {
        self.commit_entry(self.blob.stage_object(), message)
    }

    fn commit_entry(&mut self, entry: StageEntry, message: &str) -> WikiResult<CommitInfo> {
        let info = self.repo.stage_and_commit(&[entry], message)?;
        let snapshot = TreeSnapshot {
            commit_id: info.id,
            tree_id: info.tree_id,
        };
        self.blob = self
            .repo
            .find_blob(&snapshot, self.blob.path())?
            .ok_or_else(|| WikiError::Internal(format!("{} missing after commit", self)))?;
        Ok(info)
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_name())
    }
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("path", &self.blob.path())
            .field("blob", &self.blob.id())
            .field("origin", &self.blob.origin())
            .finish()
    }
}

/// undo an uncommitted working-tree write
fn restore_working_file(target: &Path, previous: Option<&[u8]>) {
    let result = match previous {
        Some(bytes) => std::fs::write(target, bytes),
        None => std::fs::remove_file(target),
    };
    if let Err(e) = result {
        warn!(path = %target.display(), error = %e, "working file not restored");
    }
}

/// repository paths always use forward slashes, whatever the platform
fn slash_path(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}
