//! Configuration types for diskindex
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation

use crate::backend::BackendKind;
use crate::error::ConfigError;
use crate::index::IndexOptions;
use crate::store::SizeKind;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

/// Database file name used when neither `--database` nor the environment sets one
pub const DEFAULT_DATABASE_NAME: &str = ".diskindex.db";

/// Environment variable naming the database file
pub const DATABASE_ENV: &str = "DISKINDEX_DATABASE";

/// Disk usage indexer and browser
#[derive(Parser, Debug, Clone)]
#[command(
    name = "diskindex",
    version,
    about = "Index disk usage into a database and inspect it later",
    long_about = "Walks a directory tree once and stores per-directory sizes in a database.\n\n\
                  Later queries (info, ls) read the database only and never touch the\n\
                  scanned filesystem. A database path ending in .rocks selects the RocksDB\n\
                  backend when built with the rocksdb feature; anything else is SQLite.",
    after_help = "EXAMPLES:\n    \
        diskindex index /home\n    \
        diskindex index -x -e '\\.snapshot' /srv/data\n    \
        diskindex info\n    \
        diskindex ls /home/user -n 20\n    \
        diskindex -d scan.rocks index /var  # RocksDB (with feature)"
)]
pub struct CliArgs {
    /// Database file
    #[arg(short = 'd', long, global = true, env = DATABASE_ENV, value_name = "FILE")]
    pub database: Option<PathBuf>,

    /// Verbose output (debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan a directory tree and store it in the database
    Index(IndexArgs),

    /// List every indexed path with its scan time and size
    Info(InfoArgs),

    /// List the contents of an indexed directory, largest first
    Ls(LsArgs),
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    /// Directory to index
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Do not cross filesystem boundaries
    #[arg(short = 'x', long)]
    pub one_file_system: bool,

    /// Count files with multiple hard links only once
    #[arg(short = 'H', long)]
    pub check_hard_links: bool,

    /// Exclude paths matching regex (can be repeated)
    #[arg(short = 'e', long = "exclude", value_name = "REGEX", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,
}

#[derive(Args, Debug, Clone)]
pub struct InfoArgs {
    /// List reports from every database found in DIR
    #[arg(short = 'D', long = "dbdir", value_name = "DIR")]
    pub db_dir: Option<PathBuf>,

    /// Print reports as JSON
    #[arg(long)]
    pub json: bool,

    /// Show apparent sizes instead of disk usage
    #[arg(short = 'a', long)]
    pub apparent: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LsArgs {
    /// Directory to list (defaults to the most recently indexed path)
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Show apparent sizes instead of disk usage
    #[arg(short = 'a', long)]
    pub apparent: bool,

    /// Show sizes in bytes
    #[arg(short = 'b', long)]
    pub bytes: bool,

    /// Only show the largest N entries
    #[arg(short = 'n', long, value_name = "N")]
    pub top: Option<usize>,
}

impl InfoArgs {
    pub fn size_kind(&self) -> SizeKind {
        size_kind(self.apparent)
    }
}

impl LsArgs {
    pub fn size_kind(&self) -> SizeKind {
        size_kind(self.apparent)
    }
}

fn size_kind(apparent: bool) -> SizeKind {
    if apparent {
        SizeKind::Apparent
    } else {
        SizeKind::Actual
    }
}

/// `$HOME/.diskindex.db`, or the current directory without `HOME`
pub fn default_database_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => Path::new(&home).join(DEFAULT_DATABASE_NAME),
        _ => PathBuf::from(DEFAULT_DATABASE_NAME),
    }
}

/// Validated database location
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub backend: BackendKind,
}

impl DatabaseConfig {
    /// Resolve the database path, checking its parent directory exists
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        let path = args.database.clone().unwrap_or_else(default_database_path);

        if path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidDatabasePath {
                path,
                reason: "Path is empty".to_string(),
            });
        }

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::InvalidDatabasePath {
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                    path,
                });
            }
        }

        let backend = BackendKind::for_path(&path);
        Ok(Self { path, backend })
    }
}

/// Databases directly inside `dir`, sorted by path
///
/// SQLite files need a `.db` extension. With the `rocksdb` feature,
/// `.rocks` directories are included too.
pub fn find_databases(dir: &Path) -> Result<Vec<DatabaseConfig>, ConfigError> {
    let entries = fs::read_dir(dir).map_err(|e| ConfigError::InvalidDatabasePath {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let mut found: Vec<DatabaseConfig> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter_map(|path| {
            let backend = BackendKind::for_path(&path);
            let is_database = match backend {
                BackendKind::Sqlite => {
                    path.is_file() && path.extension().is_some_and(|ext| ext == "db")
                }
                #[cfg(feature = "rocksdb")]
                BackendKind::RocksDb => path.is_dir(),
            };
            is_database.then_some(DatabaseConfig { path, backend })
        })
        .collect();

    found.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(found)
}

/// Validated configuration for an `index` run
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Canonical scan root
    pub root: PathBuf,

    pub database: DatabaseConfig,

    pub options: IndexOptions,

    /// Show progress indicator
    pub show_progress: bool,
}

impl IndexConfig {
    /// Create and validate configuration from CLI arguments
    pub fn from_args(database: DatabaseConfig, args: &IndexArgs) -> Result<Self, ConfigError> {
        let root = fs::canonicalize(&args.path).map_err(|e| ConfigError::InvalidRoot {
            path: args.path.clone(),
            reason: e.to_string(),
        })?;

        if !root.is_dir() {
            return Err(ConfigError::InvalidRoot {
                path: args.path.clone(),
                reason: "Not a directory".to_string(),
            });
        }

        if root.to_str().is_none() {
            return Err(ConfigError::InvalidRoot {
                path: args.path.clone(),
                reason: "Path is not valid UTF-8".to_string(),
            });
        }

        let exclude = compile_patterns(&args.exclude_patterns)?;

        Ok(Self {
            root,
            database,
            options: IndexOptions {
                one_file_system: args.one_file_system,
                check_hard_links: args.check_hard_links,
                exclude,
                ..IndexOptions::default()
            },
            show_progress: !args.quiet,
        })
    }
}

/// Compile exclude patterns
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                pattern: p.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}
