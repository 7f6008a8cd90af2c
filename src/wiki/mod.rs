//! Page layer: names, pages, lookup and the `Wiki` handle.
//!
//! Everything here goes through `storage::RepositoryHandle`; nothing in this
//! module touches git2 directly.

mod api;
mod index;
mod page;

pub use api::{Wiki, WikiConfig, WikiError, WikiResult};
pub use index::{PageIndex, PageLookup};
pub use page::{InvalidNameError, Page, PageName};
