//! gitwiki - a wiki whose pages live in a Git repository
//!
//! This is the command-line front end: list, show, create and edit pages,
//! and browse their history.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gitwiki::storage::CommitInfo;
use gitwiki::wiki::{Page, Wiki, WikiConfig, WikiError};

enum Command {
    List,
    Show(Option<String>),
    Create(String),
    Edit { name: String, file: Option<PathBuf> },
    History { name: Option<String>, limit: Option<usize> },
}

struct Options {
    config: WikiConfig,
    verbose: bool,
    json: bool,
    command: Command,
}

enum Parsed {
    Help,
    Version,
    Run(Options),
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let options = match parse_args(&args) {
        Ok(Parsed::Help) => {
            print_help();
            return ExitCode::SUCCESS;
        }
        Ok(Parsed::Version) => {
            println!("gitwiki v{}", env!("CARGO_PKG_VERSION"));
            return ExitCode::SUCCESS;
        }
        Ok(Parsed::Run(options)) => options,
        Err(message) => {
            eprintln!("{}", message);
            eprintln!("Try 'gitwiki --help' for usage.");
            return ExitCode::FAILURE;
        }
    };

    init_logging(options.verbose);

    let wiki = match Wiki::open(options.config.clone()) {
        Ok(wiki) => wiki,
        Err(e) => {
            eprintln!("Error opening wiki: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&wiki, &options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(WikiError::PageNotFound(name)) => {
            eprintln!("Page ({}) is not found.", name);
            eprintln!("Create it with: gitwiki edit {}", name);
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "gitwiki=debug" } else { "gitwiki=info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn parse_args(args: &[String]) -> Result<Parsed, String> {
    let mut config = WikiConfig::from_env();
    let mut verbose = false;
    let mut json = false;
    let mut limit: Option<usize> = None;
    let mut positional: Vec<String> = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "-r" | "--repository" => {
                config = config.repository(value_for(arg, iter.next())?);
            }
            "-x" | "--extension" => {
                config = config.extension(value_for(arg, iter.next())?);
            }
            "--homepage" => {
                config = config.homepage(value_for(arg, iter.next())?);
            }
            "-n" | "--limit" => {
                let raw = value_for(arg, iter.next())?;
                limit = Some(raw.parse().map_err(|_| format!("Invalid limit: {}", raw))?);
            }
            "-v" | "--verbose" => verbose = true,
            "--json" => json = true,
            "-h" | "--help" => return Ok(Parsed::Help),
            "--version" => return Ok(Parsed::Version),
            other if other.starts_with('-') && other != "-" => {
                return Err(format!("Unknown option: {}", other));
            }
            other => positional.push(other.to_string()),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("list") | None => Command::List,
        Some("show") => Command::Show(positional.next()),
        Some("create") => Command::Create(
            positional.next().ok_or("create: missing page name")?,
        ),
        Some("edit") => Command::Edit {
            name: positional.next().ok_or("edit: missing page name")?,
            file: positional.next().filter(|f| f != "-").map(PathBuf::from),
        },
        Some("history") => Command::History {
            name: positional.next(),
            limit,
        },
        Some(other) => return Err(format!("Unknown command: {}", other)),
    };

    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    Ok(Parsed::Run(Options {
        config,
        verbose,
        json,
        command,
    }))
}

fn value_for(flag: &str, value: Option<&String>) -> Result<String, String> {
    value
        .cloned()
        .ok_or_else(|| format!("Option {} requires a value", flag))
}

fn print_help() {
    println!("gitwiki - a wiki whose pages live in a Git repository");
    println!();
    println!("Usage: gitwiki [OPTIONS] [COMMAND]");
    println!();
    println!("Commands:");
    println!("  list                   List all pages (default)");
    println!("  show [NAME]            Print a page (default: the homepage)");
    println!("  create NAME            Create an empty page if it doesn't exist");
    println!("  edit NAME [FILE]       Replace a page's content from FILE or stdin");
    println!("  history [NAME]         Show the commit log of the wiki or of one page");
    println!();
    println!("Options:");
    println!("  -r, --repository PATH  Repository directory (env: GITWIKI_REPOSITORY, default: wiki)");
    println!("  -x, --extension EXT    Page file extension (env: GITWIKI_EXTENSION, default: md)");
    println!("      --homepage NAME    Homepage name (env: GITWIKI_HOMEPAGE, default: Home)");
    println!("  -n, --limit N          Limit history output to N commits");
    println!("      --json             Print machine-readable JSON");
    println!("  -v, --verbose          Enable debug logging");
    println!("  -h, --help             Show this help message");
    println!("      --version          Show version");
    println!();
    println!("Commit author comes from GITWIKI_AUTHOR_NAME/GITWIKI_AUTHOR_EMAIL,");
    println!("then from git config.");
}

#[derive(Serialize)]
struct PageSummary {
    name: String,
    path: String,
    blob: String,
}

impl From<&Page> for PageSummary {
    fn from(page: &Page) -> Self {
        Self {
            name: page.name(),
            path: page.file_name(),
            blob: page.blob_id().to_string(),
        }
    }
}

fn run(wiki: &Wiki, options: &Options) -> Result<(), WikiError> {
    match &options.command {
        Command::List => {
            let pages = wiki.find_all()?;
            if options.json {
                let summaries: Vec<PageSummary> = pages.iter().map(PageSummary::from).collect();
                print_json(&summaries)?;
            } else if pages.is_empty() {
                println!("(no pages)");
            } else {
                for page in &pages {
                    println!("{}", page.name());
                }
            }
        }
        Command::Show(name) => {
            let page = match name {
                Some(name) => wiki.find(name)?,
                None => wiki.homepage()?,
            };
            let body = page.content_string().unwrap_or_default();
            if options.json {
                #[derive(Serialize)]
                struct Shown<'a> {
                    #[serde(flatten)]
                    page: PageSummary,
                    content: &'a str,
                }
                print_json(&Shown {
                    page: PageSummary::from(&page),
                    content: &body,
                })?;
            } else {
                print!("{}", body);
            }
        }
        Command::Create(name) => {
            let existed = wiki.lookup(name)?.is_found();
            let page = wiki.find_or_create(name, "")?;
            if existed {
                println!("{} already exists", page);
            } else {
                println!("Created {}", page);
            }
        }
        Command::Edit { name, file } => {
            let body = match file {
                Some(path) => std::fs::read(path)?,
                None => {
                    let mut buf = Vec::new();
                    std::io::stdin().read_to_end(&mut buf)?;
                    buf
                }
            };
            let mut page = wiki.find_or_create(name, "")?;
            match page.update_content(&body)? {
                Some(commit) => println!("{} {}", commit.id.short(), commit.summary()),
                None => println!("{} unchanged", page),
            }
        }
        Command::History { name, limit } => {
            let commits = match name {
                Some(name) => wiki.find(name)?.history(*limit)?,
                None => wiki.history(*limit)?,
            };
            if options.json {
                print_json(&commits)?;
            } else {
                print_history(&commits);
            }
        }
    }
    Ok(())
}

fn print_history(commits: &[CommitInfo]) {
    if commits.is_empty() {
        println!("(no history)");
        return;
    }
    for commit in commits {
        println!(
            "{}  {}  {:<20}  {}",
            commit.id.short(),
            commit.timestamp.format("%Y-%m-%d %H:%M:%S"),
            commit.author_name,
            commit.summary()
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), WikiError> {
    let out = serde_json::to_string_pretty(value)
        .map_err(|e| WikiError::Internal(format!("json output: {}", e)))?;
    println!("{}", out);
    Ok(())
}
