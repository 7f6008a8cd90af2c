//! Name to page resolution.
//!
//! `PageIndex` is the only place that knows how a page name maps to a path
//! (`<name>.<extension>`) and how the current tree is searched.

use std::path::PathBuf;

use tracing::{debug, info};

use super::api::{WikiError, WikiResult};
use super::page::{Page, PageName};
use crate::storage::{BlobHandle, CommitMessage, RepositoryHandle, StorageError, TreeSnapshot};

/// outcome of resolving a name against the current tree
#[derive(Debug)]
pub enum PageLookup {
    Found(Page),
    NotFound(PageName),
}

impl PageLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, PageLookup::Found(_))
    }
}

/// Resolves and creates pages in one repository.
#[derive(Clone)]
pub struct PageIndex {
    repo: RepositoryHandle,
    extension: String,
}

impl PageIndex {
    pub fn new(repo: RepositoryHandle, extension: impl Into<String>) -> Self {
        Self {
            repo,
            extension: extension.into(),
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn repository(&self) -> &RepositoryHandle {
        &self.repo
    }

    /// storage path for a page name
    pub fn path_for(&self, name: &PageName) -> PathBuf {
        PathBuf::from(format!("{}.{}", name, self.extension))
    }

    /// Every page in the current tree, depth-first.
    ///
    /// A repository without commits has no pages.
    pub fn find_all(&self) -> WikiResult<Vec<Page>> {
        let snapshot = match self.snapshot()? {
            Some(snapshot) => snapshot,
            None => return Ok(Vec::new()),
        };
        let pages = self
            .repo
            .list_blobs(&snapshot)?
            .into_iter()
            .map(|blob| Page::new(blob, self.repo.clone(), self.extension.as_str()))
            .collect();
        Ok(pages)
    }

    /// Resolve a name against the current tree.
    pub fn lookup(&self, name: &PageName) -> WikiResult<PageLookup> {
        let snapshot = match self.snapshot()? {
            Some(snapshot) => snapshot,
            None => return Ok(PageLookup::NotFound(name.clone())),
        };
        let path = self.path_for(name);
        match self.repo.find_blob(&snapshot, &path)? {
            Some(blob) => {
                debug!(page = %name, commit = %snapshot.commit_id.short(), "resolved page");
                Ok(PageLookup::Found(Page::new(blob, self.repo.clone(), self.extension.as_str())))
            }
            None => Ok(PageLookup::NotFound(name.clone())),
        }
    }

    /// the tree at HEAD, or `None` when there is nothing to traverse yet
    fn snapshot(&self) -> WikiResult<Option<TreeSnapshot>> {
        if !self.repo.has_history()? {
            return Ok(None);
        }
        // other refs may have commits while HEAD itself is still unborn
        match self.repo.current_tree() {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(StorageError::NoHistory) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolve a name, failing with `PageNotFound` when it has no entry.
    pub fn find(&self, name: &PageName) -> WikiResult<Page> {
        match self.lookup(name)? {
            PageLookup::Found(page) => Ok(page),
            PageLookup::NotFound(name) => Err(WikiError::PageNotFound(name)),
        }
    }

    /// Resolve a name, creating and committing the page if it is absent.
    ///
    /// Creation writes `initial_content` straight into the object database,
    /// stages it from there and commits `Page (<name>) is created.`. The
    /// writer lock is held throughout, so two callers in one process can't
    /// both create the same page.
    pub fn find_or_create(&self, name: &PageName, initial_content: &[u8]) -> WikiResult<Page> {
        let _writer = self.repo.writer();

        match self.lookup(name)? {
            PageLookup::Found(page) => Ok(page),
            PageLookup::NotFound(name) => {
                let blob = self.repo.write_object(initial_content)?;
                let handle = BlobHandle::detached(blob, self.path_for(&name));
                let mut page = Page::new(handle, self.repo.clone(), self.extension.as_str());

                let commit = page.commit(&CommitMessage::page_created(name.as_str()))?;
                info!(page = %name, commit = %commit.id.short(), "created page");
                Ok(page)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn setup(extension: &str) -> (TempDir, PageIndex) {
        let dir = TempDir::new().unwrap();
        let repo = RepositoryHandle::open_or_init(dir.path()).unwrap();
        (dir, PageIndex::new(repo, extension))
    }

    fn name(s: &str) -> PageName {
        PageName::new(s).unwrap()
    }

    #[test]
    fn test_empty_repository() {
        let (_dir, index) = setup("md");
        assert!(index.find_all().unwrap().is_empty());
        assert!(!index.lookup(&name("Home")).unwrap().is_found());
        assert!(matches!(index.find(&name("Home")), Err(WikiError::PageNotFound(n)) if n == name("Home")));
    }

    #[test]
    fn test_path_for() {
        let (_dir, index) = setup("md");
        assert_eq!(index.path_for(&name("Home")), PathBuf::from("Home.md"));

        let (_dir, index) = setup("txt");
        assert_eq!(index.path_for(&name("Home")), PathBuf::from("Home.txt"));
    }

    #[test]
    fn test_find_or_create_then_find() {
        let (_dir, index) = setup("md");
        let created = index.find_or_create(&name("Home"), b"# Welcome").unwrap();
        assert!(created.is_committed());
        assert_eq!(created.name(), "Home");

        let found = index.find(&name("Home")).unwrap();
        assert_eq!(found.name(), "Home");
        assert_eq!(found.content().unwrap(), b"# Welcome");
        assert_eq!(found.blob_id(), created.blob_id());
    }

    #[test]
    fn test_find_or_create_existing_does_not_commit() {
        let (_dir, index) = setup("md");
        index.find_or_create(&name("Home"), b"first").unwrap();
        let again = index.find_or_create(&name("Home"), b"second").unwrap();

        assert_eq!(again.content().unwrap(), b"first");
        assert_eq!(index.repository().commit_count().unwrap(), 1);
    }

    #[test]
    fn test_created_commit_message() {
        let (_dir, index) = setup("md");
        index.find_or_create(&name("Home"), b"").unwrap();
        let history = index.repository().history(None).unwrap();
        assert_eq!(history[0].summary(), "Page (Home) is created.");
    }

    #[test]
    fn test_find_all_lists_every_page_once() {
        let (_dir, index) = setup("md");
        for (n, body) in [("A", "alpha"), ("B", "beta"), ("C", "gamma")] {
            index.find_or_create(&name(n), body.as_bytes()).unwrap();
        }

        let pages = index.find_all().unwrap();
        assert_eq!(pages.len(), 3);
        let names: BTreeSet<String> = pages.iter().map(Page::name).collect();
        assert_eq!(names, ["A", "B", "C"].iter().map(|s| s.to_string()).collect());
    }

    #[test]
    fn test_extension_decides_which_file_resolves() {
        let dir = TempDir::new().unwrap();
        let repo = RepositoryHandle::open_or_init(dir.path()).unwrap();
        let markdown = PageIndex::new(repo.clone(), "md");
        let text = PageIndex::new(repo, "txt");

        markdown.find_or_create(&name("Home"), b"markdown").unwrap();
        assert!(!text.lookup(&name("Home")).unwrap().is_found());

        text.find_or_create(&name("Home"), b"text").unwrap();
        assert_eq!(markdown.find(&name("Home")).unwrap().content().unwrap(), b"markdown");
        assert_eq!(text.find(&name("Home")).unwrap().content().unwrap(), b"text");
        assert_eq!(text.find(&name("Home")).unwrap().path(), std::path::Path::new("Home.txt"));
    }

    #[test]
    fn test_nested_page_round_trip() {
        let (_dir, index) = setup("md");
        index.find_or_create(&name("notes/Todo"), b"todo").unwrap();

        let pages = index.find_all().unwrap();
        assert_eq!(pages.len(), 1);
        let listed = name(&pages[0].name());
        assert_eq!(index.find(&listed).unwrap().content().unwrap(), b"todo");
    }

    #[test]
    fn test_directory_in_place_of_page_is_error() {
        let (_dir, index) = setup("md");
        index.find_or_create(&name("dir.md/Inner"), b"").unwrap();
        let result = index.find(&name("dir"));
        assert!(matches!(result, Err(WikiError::Storage(_))));
    }
}
