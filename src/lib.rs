//! gitwiki - a wiki whose pages live in a Git repository
//!
//! Every page is a file `<name>.<extension>` in the repository's tree.
//! Reading a page resolves it in the tree at HEAD; creating or editing a
//! page makes a commit, so the full edit history is ordinary Git history.
//!
//! # Example
//!
//! ```no_run
//! use gitwiki::wiki::Wiki;
//!
//! let wiki = Wiki::new("./wiki", "md", "Home").unwrap();
//! let mut home = wiki.find_or_create("Home", "").unwrap();
//! home.update_content("# Welcome").unwrap();
//! assert_eq!(wiki.find("Home").unwrap().content().unwrap(), b"# Welcome");
//! ```

pub mod storage;
pub mod wiki;
