//! storage layer for gitwiki
//!
//! this module is the only place that talks to git2. The wiki layer above
//! sees a repository handle with a few primitives and never touches the
//! object database, index or refs directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     RepositoryHandle                        │
//! │     (open/init, history, snapshots, objects, commits)       │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │    blob     │       │   commit    │
//!  │ (traversal) │       │  (content)  │       │  (history)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use gitwiki::storage::{RepositoryHandle, StageEntry};
//!
//! let repo = RepositoryHandle::open_or_init("./wiki")?;
//! assert!(!repo.has_history()?);
//!
//! let blob = repo.write_object(b"# Home")?;
//! let entry = StageEntry::Object { blob, path: "Home.md".into(), mode: BLOB_MODE };
//! repo.stage_and_commit(&[entry], "Page (Home) is created.")?;
//!
//! let tree = repo.current_tree()?;
//! let home = repo.find_blob(&tree, "Home.md".as_ref())?;
//! ```

mod blob;
mod commit;
mod error;
mod repository;
mod tree;
mod types;

// Re-export public API
pub use blob::{BlobHandle, BlobOrigin};
pub use commit::{CommitInfo, CommitMessage};
pub use error::{StorageError, StorageResult};
pub use repository::{RepositoryHandle, TreeSnapshot};
pub use tree::TreeHandle;
pub use types::{BlobId, CommitId, GitSignature, StageEntry, TreeId, BLOB_MODE};
