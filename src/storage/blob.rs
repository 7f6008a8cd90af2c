//! Blob operations for page storage.
//!
//! Each page is one blob. A blob handle either points at an entry of a
//! committed tree, or at a freshly written object that no tree or index
//! refers to yet.

use std::path::{Path, PathBuf};

use git2::Repository;

use crate::storage::error::StorageResult;
use crate::storage::types::{StageEntry, BLOB_MODE};
pub(crate) use crate::storage::types::BlobId;

/// where a blob handle came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobOrigin {
    /// an entry of the tree at some commit
    Tree,
    /// written to the object database, not yet part of any tree
    Detached,
}

/// an immutable reference to versioned file content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    id: BlobId,
    /// path relative to the repository root
    path: PathBuf,
    mode: u32,
    origin: BlobOrigin,
}

impl BlobHandle {
    /// a handle for an entry found while walking a tree
    pub(crate) fn from_tree(id: BlobId, path: impl Into<PathBuf>, mode: u32) -> Self {
        Self {
            id,
            path: path.into(),
            mode,
            origin: BlobOrigin::Tree,
        }
    }

    /// a handle for an object that has no tree entry yet
    pub(crate) fn detached(id: BlobId, path: impl Into<PathBuf>) -> Self {
        Self {
            id,
            path: path.into(),
            mode: BLOB_MODE,
            origin: BlobOrigin::Detached,
        }
    }

    pub fn id(&self) -> BlobId {
        self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn origin(&self) -> BlobOrigin {
        self.origin
    }

    /// stage this exact object under its path
    pub fn stage_object(&self) -> StageEntry {
        StageEntry::Object {
            blob: self.id,
            path: self.path.clone(),
            mode: self.mode,
        }
    }

    /// stage whatever the working tree holds at this path
    pub fn stage_working_file(&self) -> StageEntry {
        StageEntry::WorkingFile {
            path: self.path.clone(),
        }
    }
}

/// write raw bytes as a blob to the repository
///
/// returns the blob ID (SHA-1 hash of the content)
pub fn write_blob(repo: &Repository, bytes: &[u8]) -> StorageResult<BlobId> {
    let oid = repo.blob(bytes)?;
    Ok(BlobId::new(oid))
}

/// read a blob's content from the repository
pub fn read_blob(repo: &Repository, blob_id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo.find_blob(blob_id.raw())?;
    Ok(blob.content().to_vec())
}
