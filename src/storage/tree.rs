//! tree operations for page lookup.
//!
//! in Git, a tree is a directory. In gitwiki every blob reachable from the
//! root tree is a page; pages normally sit at the root, but nested trees are
//! walked too if someone put them there.

use std::path::Path;

use git2::{ObjectType, Tree, TreeWalkMode, TreeWalkResult};

use crate::storage::blob::{BlobHandle, BlobId};
use crate::storage::error::{StorageError, StorageResult};

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are made.
#[derive(Debug)]
pub struct TreeHandle<'repo> {
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    /// create a TreeHandle from a git2::Tree
    pub(crate) fn new(tree: Tree<'repo>) -> Self {
        Self { tree }
    }

    /// every blob in the tree, depth-first, parents before children
    pub fn blobs(&self) -> StorageResult<Vec<BlobHandle>> {
        let mut blobs = Vec::new();
        self.tree.walk(TreeWalkMode::PreOrder, |root, entry| {
            if entry.kind() != Some(ObjectType::Blob) {
                return TreeWalkResult::Ok;
            }
            // names that aren't valid UTF-8 can't be mapped back to a page name
            if let Some(name) = entry.name() {
                blobs.push(BlobHandle::from_tree(
                    BlobId::new(entry.id()),
                    format!("{}{}", root, name),
                    entry.filemode() as u32,
                ));
            }
            TreeWalkResult::Ok
        })?;
        Ok(blobs)
    }

    /// resolve a path to a blob
    ///
    /// returns `None` when nothing lives at `path`; an entry that is a
    /// directory is an error, since it can never be a page.
    pub fn blob_at(&self, path: &Path) -> StorageResult<Option<BlobHandle>> {
        let entry = match self.tree.get_path(path) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };

        if entry.kind() != Some(ObjectType::Blob) {
            return Err(StorageError::UnexpectedEntryType {
                path: path.to_path_buf(),
                expected: "blob (file)".to_string(),
                found: format!("{:?}", entry.kind()),
            });
        }

        Ok(Some(BlobHandle::from_tree(
            BlobId::new(entry.id()),
            path,
            entry.filemode() as u32,
        )))
    }
}
