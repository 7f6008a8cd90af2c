//! Wiki API - the handle the boundary layer (HTTP, CLI) talks to.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::index::{PageIndex, PageLookup};
use super::page::{InvalidNameError, Page, PageName};
use crate::storage::{CommitInfo, GitSignature, RepositoryHandle, StorageError};

/// Result type for wiki operations.
pub type WikiResult<T> = Result<T, WikiError>;

/// Wiki errors.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Page ({0}) is not found")]
    PageNotFound(PageName),

    #[error("invalid page name: {0}")]
    InvalidPageName(#[from] InvalidNameError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl WikiError {
    /// true when the named page simply doesn't exist yet
    pub fn is_not_found(&self) -> bool {
        matches!(self, WikiError::PageNotFound(_))
    }
}

/// Wiki configuration options.
#[derive(Debug, Clone)]
pub struct WikiConfig {
    /// Path to the repository directory.
    pub repository: PathBuf,
    /// File extension for page files, without the dot.
    pub extension: String,
    /// Name of the page served as the front page.
    pub homepage: String,
    /// Author for commits; falls back to the git config identity.
    pub signature: Option<GitSignature>,
}

impl Default for WikiConfig {
    fn default() -> Self {
        Self {
            repository: PathBuf::from("wiki"),
            extension: "md".into(),
            homepage: "Home".into(),
            signature: None,
        }
    }
}

impl WikiConfig {
    pub const ENV_REPOSITORY: &'static str = "GITWIKI_REPOSITORY";
    pub const ENV_EXTENSION: &'static str = "GITWIKI_EXTENSION";
    pub const ENV_HOMEPAGE: &'static str = "GITWIKI_HOMEPAGE";
    pub const ENV_AUTHOR_NAME: &'static str = "GITWIKI_AUTHOR_NAME";
    pub const ENV_AUTHOR_EMAIL: &'static str = "GITWIKI_AUTHOR_EMAIL";

    /// Create a new configuration with the given repository path.
    pub fn new(repository: impl Into<PathBuf>) -> Self {
        Self {
            repository: repository.into(),
            ..Default::default()
        }
    }

    /// Defaults overlaid with `GITWIKI_*` environment variables.
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values looked up by environment variable name.
    pub fn overlay<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(repository) = lookup(Self::ENV_REPOSITORY) {
            self.repository = repository.into();
        }
        if let Some(extension) = lookup(Self::ENV_EXTENSION) {
            self.extension = extension;
        }
        if let Some(homepage) = lookup(Self::ENV_HOMEPAGE) {
            self.homepage = homepage;
        }
        // an author needs both halves
        if let (Some(name), Some(email)) = (lookup(Self::ENV_AUTHOR_NAME), lookup(Self::ENV_AUTHOR_EMAIL)) {
            self.signature = Some(GitSignature::new(name, email));
        }
        self
    }

    /// Set the repository path.
    pub fn repository(mut self, path: impl Into<PathBuf>) -> Self {
        self.repository = path.into();
        self
    }

    /// Set the page file extension.
    pub fn extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Set the homepage name.
    pub fn homepage(mut self, homepage: impl Into<String>) -> Self {
        self.homepage = homepage.into();
        self
    }

    /// Set the commit author.
    pub fn signature(mut self, signature: GitSignature) -> Self {
        self.signature = Some(signature);
        self
    }

    /// Check the configuration, returning the parsed homepage name.
    pub fn validate(&self) -> WikiResult<PageName> {
        if self.extension.is_empty() {
            return Err(WikiError::InvalidConfig("file extension cannot be empty".into()));
        }
        if self.extension.contains(['.', '/', '\\']) {
            return Err(WikiError::InvalidConfig(format!(
                "file extension must not contain '.', '/' or '\\': {:?}",
                self.extension
            )));
        }
        PageName::new(self.homepage.as_str())
            .map_err(|e| WikiError::InvalidConfig(format!("homepage {:?}: {}", self.homepage, e)))
    }
}

/// The wiki handle.
///
/// Build one at startup and hand clones to whatever serves requests.
#[derive(Clone)]
pub struct Wiki {
    config: WikiConfig,
    homepage: PageName,
    index: PageIndex,
}

impl Wiki {
    /// Open or create the wiki described by `config`.
    pub fn open(config: WikiConfig) -> WikiResult<Self> {
        let homepage = config.validate()?;

        let mut repo = RepositoryHandle::open_or_init(&config.repository)?;
        if let Some(signature) = &config.signature {
            repo = repo.with_signature(signature.clone())?;
        }
        info!(
            repository = %config.repository.display(),
            extension = %config.extension,
            homepage = %homepage,
            "wiki opened"
        );

        let index = PageIndex::new(repo, config.extension.as_str());
        Ok(Self {
            config,
            homepage,
            index,
        })
    }

    /// Open or create a wiki from its three settings.
    pub fn new(
        repository: impl AsRef<Path>,
        extension: impl Into<String>,
        homepage: impl Into<String>,
    ) -> WikiResult<Self> {
        Self::open(
            WikiConfig::new(repository.as_ref())
                .extension(extension)
                .homepage(homepage),
        )
    }

    /// Every page in the current tree.
    pub fn find_all(&self) -> WikiResult<Vec<Page>> {
        self.index.find_all()
    }

    /// Resolve a page name without treating absence as an error.
    pub fn lookup(&self, name: &str) -> WikiResult<PageLookup> {
        self.index.lookup(&PageName::new(name)?)
    }

    /// Resolve a page, failing with `PageNotFound` if it doesn't exist.
    pub fn find(&self, name: &str) -> WikiResult<Page> {
        self.index.find(&PageName::new(name)?)
    }

    /// Resolve a page, creating it with `content` if it doesn't exist.
    pub fn find_or_create(&self, name: &str, content: impl AsRef<[u8]>) -> WikiResult<Page> {
        self.index.find_or_create(&PageName::new(name)?, content.as_ref())
    }

    /// The configured front page.
    pub fn homepage(&self) -> WikiResult<Page> {
        self.index.find(&self.homepage)
    }

    pub fn homepage_name(&self) -> &PageName {
        &self.homepage
    }

    pub fn extension(&self) -> &str {
        self.index.extension()
    }

    /// Commit log of the whole wiki, newest first.
    pub fn history(&self, limit: Option<usize>) -> WikiResult<Vec<CommitInfo>> {
        Ok(self.index.repository().history(limit)?)
    }

    /// Number of commits reachable from HEAD.
    pub fn commit_count(&self) -> WikiResult<usize> {
        Ok(self.index.repository().commit_count()?)
    }

    pub fn repository(&self) -> &RepositoryHandle {
        self.index.repository()
    }

    /// Get the configuration.
    pub fn config(&self) -> &WikiConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn open_wiki() -> (TempDir, Wiki) {
        let dir = TempDir::new().unwrap();
        let wiki = Wiki::new(dir.path().join("pages"), "md", "Home").unwrap();
        (dir, wiki)
    }

    #[test]
    fn test_bootstrap() {
        let (dir, wiki) = open_wiki();
        assert!(dir.path().join("pages/.git").is_dir());
        assert!(!wiki.repository().has_history().unwrap());
        assert!(wiki.find_all().unwrap().is_empty());
        assert_eq!(wiki.commit_count().unwrap(), 0);
    }

    #[test]
    fn test_create_then_find() {
        let (_dir, wiki) = open_wiki();
        for (name, body) in [("Home", "# Home"), ("Empty", ""), ("Unicode", "héllo ✓")] {
            wiki.find_or_create(name, body).unwrap();
            let page = wiki.find(name).unwrap();
            assert_eq!(page.name(), name);
            assert_eq!(page.content().unwrap(), body.as_bytes());
        }
    }

    #[test]
    fn test_not_found_contract() {
        let (_dir, wiki) = open_wiki();
        let err = wiki.find("Nowhere").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Page (Nowhere) is not found");

        wiki.find_or_create("Somewhere", "x").unwrap();
        assert!(wiki.find("Nowhere").unwrap_err().is_not_found());

        let page = wiki.find_or_create("Nowhere", "").unwrap();
        assert_eq!(page.name(), "Nowhere");
    }

    #[test]
    fn test_invalid_name_is_not_page_not_found() {
        let (_dir, wiki) = open_wiki();
        let err = wiki.find("../escape").unwrap_err();
        assert!(matches!(err, WikiError::InvalidPageName(_)));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_update_twice_commits_at_most_once() {
        let (_dir, wiki) = open_wiki();
        let mut page = wiki.find_or_create("Home", "v1").unwrap();
        let before = wiki.commit_count().unwrap();

        page.update_content("v2").unwrap();
        page.update_content("v2").unwrap();

        assert_eq!(wiki.commit_count().unwrap(), before + 1);
        assert_eq!(wiki.find("Home").unwrap().content().unwrap(), b"v2");
    }

    #[test]
    fn test_update_after_fresh_resolve_is_noop() {
        let (_dir, wiki) = open_wiki();
        wiki.find_or_create("Home", "v1").unwrap().update_content("v2").unwrap();

        let mut fresh = wiki.find_or_create("Home", "").unwrap();
        assert!(fresh.update_content("v2").unwrap().is_none());
        assert_eq!(wiki.commit_count().unwrap(), 2);
    }

    #[test]
    fn test_traversal_completeness() {
        let (_dir, wiki) = open_wiki();
        wiki.find_or_create("A", "a").unwrap();
        wiki.find_or_create("B", "b").unwrap();
        wiki.find_or_create("C", "c").unwrap();

        let names: BTreeSet<String> = wiki.find_all().unwrap().iter().map(Page::name).collect();
        let expected: BTreeSet<String> = ["A", "B", "C"].iter().map(|s| s.to_string()).collect();
        assert_eq!(names, expected);
        assert_eq!(wiki.find_all().unwrap().len(), 3);
    }

    #[test]
    fn test_history_growth() {
        let (_dir, wiki) = open_wiki();

        wiki.find_or_create("Home", "v1").unwrap();
        assert_eq!(wiki.commit_count().unwrap(), 1);

        wiki.find_or_create("About", "").unwrap();
        assert_eq!(wiki.commit_count().unwrap(), 2);

        // already exists: no commit
        wiki.find_or_create("Home", "ignored").unwrap();
        assert_eq!(wiki.commit_count().unwrap(), 2);

        let mut home = wiki.find("Home").unwrap();
        home.update_content("v2").unwrap();
        assert_eq!(wiki.commit_count().unwrap(), 3);

        home.update_content("v2").unwrap();
        assert_eq!(wiki.commit_count().unwrap(), 3);

        let messages: Vec<String> = wiki
            .history(None)
            .unwrap()
            .iter()
            .map(|c| c.summary().to_string())
            .collect();
        assert_eq!(
            messages,
            vec!["Updated: Home.md", "Page (About) is created.", "Page (Home) is created."]
        );
    }

    #[test]
    fn test_extension_mapping() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages");

        let markdown = Wiki::new(&path, "md", "Home").unwrap();
        markdown.find_or_create("Home", "md body").unwrap();
        assert_eq!(markdown.find("Home").unwrap().path(), Path::new("Home.md"));
        drop(markdown);

        let text = Wiki::new(&path, "txt", "Home").unwrap();
        assert!(text.find("Home").unwrap_err().is_not_found());
        text.find_or_create("Home", "txt body").unwrap();
        assert_eq!(text.find("Home").unwrap().path(), Path::new("Home.txt"));
        assert_eq!(text.find("Home").unwrap().content().unwrap(), b"txt body");
    }

    #[test]
    fn test_homepage() {
        let (_dir, wiki) = open_wiki();
        assert_eq!(wiki.homepage_name().as_str(), "Home");
        assert!(wiki.homepage().unwrap_err().is_not_found());

        wiki.find_or_create("Home", "welcome").unwrap();
        assert_eq!(wiki.homepage().unwrap().content_string().unwrap(), "welcome");
    }

    #[test]
    fn test_reopen_keeps_pages() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages");
        Wiki::new(&path, "md", "Home").unwrap().find_or_create("Home", "kept").unwrap();

        let wiki = Wiki::new(&path, "md", "Home").unwrap();
        assert_eq!(wiki.find("Home").unwrap().content().unwrap(), b"kept");
        assert_eq!(wiki.commit_count().unwrap(), 1);
    }

    #[test]
    fn test_configured_author() {
        let dir = TempDir::new().unwrap();
        let config = WikiConfig::new(dir.path())
            .signature(GitSignature::new("Editor", "editor@example.com"));
        let wiki = Wiki::open(config).unwrap();

        wiki.find_or_create("Home", "").unwrap();
        let head = &wiki.history(Some(1)).unwrap()[0];
        assert_eq!(head.author_name, "Editor");
        assert_eq!(head.author_email, "editor@example.com");
    }

    #[test]
    fn test_concurrent_find_or_create_commits_once() {
        let (_dir, wiki) = open_wiki();
        let wiki = Arc::new(wiki);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let wiki = Arc::clone(&wiki);
                thread::spawn(move || wiki.find_or_create("Race", format!("writer {}", i)).unwrap())
            })
            .collect();
        let pages: Vec<Page> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(wiki.commit_count().unwrap(), 1);
        let first = pages[0].blob_id();
        assert!(pages.iter().all(|p| p.blob_id() == first));
    }

    #[test]
    fn test_separate_handles_keep_every_created_page() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages");
        Wiki::new(&path, "md", "Home").unwrap();

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let path = path.clone();
                thread::spawn(move || {
                    // each thread has its own repository handle, like a separate process
                    let wiki = Wiki::new(&path, "md", "Home").unwrap();
                    (0..4)
                        .map(|round| {
                            let name = format!("W{}-{}", i, round);
                            let created = wiki.find_or_create(&name, name.as_str()).is_ok();
                            (name, created)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let outcomes: Vec<(String, bool)> =
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect();

        let fresh = Wiki::new(&path, "md", "Home").unwrap();
        for (name, created) in &outcomes {
            assert_eq!(fresh.lookup(name).unwrap().is_found(), *created, "page {}", name);
        }
        let created = outcomes.iter().filter(|(_, ok)| *ok).count();
        assert_eq!(fresh.commit_count().unwrap(), created);
        assert_eq!(fresh.find_all().unwrap().len(), created);
    }

    #[test]
    fn test_config_validation() {
        assert!(WikiConfig::default().validate().is_ok());
        assert!(matches!(
            WikiConfig::default().extension("").validate(),
            Err(WikiError::InvalidConfig(_))
        ));
        assert!(matches!(
            WikiConfig::default().extension(".md").validate(),
            Err(WikiError::InvalidConfig(_))
        ));
        assert!(matches!(
            WikiConfig::default().homepage("../Home").validate(),
            Err(WikiError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_open_with_bad_config_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages");
        let result = Wiki::open(WikiConfig::new(&path).extension(""));
        assert!(matches!(result, Err(WikiError::InvalidConfig(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_config_overlay() {
        let env: HashMap<&str, &str> = [
            (WikiConfig::ENV_REPOSITORY, "/srv/wiki"),
            (WikiConfig::ENV_EXTENSION, "txt"),
            (WikiConfig::ENV_AUTHOR_NAME, "Bot"),
        ]
        .into_iter()
        .collect();

        let config = WikiConfig::default().overlay(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.repository, PathBuf::from("/srv/wiki"));
        assert_eq!(config.extension, "txt");
        assert_eq!(config.homepage, "Home");
        // email missing, so no author
        assert!(config.signature.is_none());
    }

    #[test]
    fn test_storage_unavailable() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, b"").unwrap();

        let result = Wiki::new(&file, "md", "Home");
        assert!(matches!(
            result,
            Err(WikiError::Storage(StorageError::StorageUnavailable { .. }))
        ));
    }
}
