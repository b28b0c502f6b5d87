//! diskindex - disk usage indexer
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use diskindex::backend::OpenMode;
use diskindex::config::{
    find_databases, CliArgs, Command, DatabaseConfig, IndexArgs, IndexConfig, InfoArgs, LsArgs,
};
use diskindex::index::Indexer;
use diskindex::progress::{
    print_header, print_summary, write_directory, write_reports, ListOptions, ProgressReporter,
};
use diskindex::store::{Database, IndexReport};
use diskindex::IndexError;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let database = DatabaseConfig::from_args(&args).context("Invalid configuration")?;

    match &args.command {
        Command::Index(index) => run_index(database, index),
        Command::Info(info) => run_info(&database, info),
        Command::Ls(ls) => run_ls(&database, ls),
    }
}

fn run_index(database: DatabaseConfig, args: &IndexArgs) -> Result<()> {
    let config = IndexConfig::from_args(database, args).context("Invalid configuration")?;

    if config.show_progress {
        print_header(
            &config.root,
            &config.database.path,
            config.database.backend.name(),
        );
    }

    let db = Database::open(&config.database.path, OpenMode::ReadWriteCreate)
        .with_context(|| format!("Failed to open database '{}'", config.database.path.display()))?;

    let indexer = Indexer::new(config.options.clone());

    // Setup signal handler for graceful shutdown
    let shutdown_flag = indexer.shutdown_flag();
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupt received, shutting down...");
        shutdown_flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to set signal handler")?;

    let progress = config.show_progress.then(ProgressReporter::new);

    let result = match &progress {
        Some(p) => {
            p.set_status("Indexing...");
            let reporter = ProgressReporter::from_bar(p.bar());
            indexer.run_with_progress(db, &config.root, move |update| reporter.update(&update))
        }
        None => indexer.run(db, &config.root),
    };

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(IndexError::Interrupted) => {
            if let Some(p) = &progress {
                p.finish("Index interrupted");
            }
            bail!("Index of '{}' interrupted, no report written", config.root.display());
        }
        Err(e) => {
            if let Some(p) = &progress {
                p.finish_and_clear();
            }
            return Err(e).context("Index failed");
        }
    };

    if let Some(p) = &progress {
        p.finish("Index completed");
    }

    if config.show_progress {
        print_summary(&outcome, database_size(&config.database.path));
    }

    if outcome.errors > 0 {
        info!(errors = outcome.errors, "Index completed with errors");
    }

    outcome.db.close().context("Failed to close database")?;
    Ok(())
}

fn run_info(database: &DatabaseConfig, args: &InfoArgs) -> Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let Some(dir) = &args.db_dir else {
        let reports = load_reports(&database.path)?;
        if args.json {
            serde_json::to_writer_pretty(&mut out, &reports).context("Failed to write JSON")?;
            writeln!(out)?;
        } else {
            writeln!(out, "Reading {}, available indices:", database.path.display())?;
            write_reports(&mut out, &reports, args.size_kind())?;
        }
        return Ok(());
    };

    let databases = find_databases(dir).context("Invalid database directory")?;
    if !args.json {
        writeln!(out, "Found {} databases in {}", databases.len(), dir.display())?;
    }

    let mut listed = Vec::new();
    for found in &databases {
        let reports = match load_reports(&found.path) {
            Ok(reports) => reports,
            Err(e) => {
                warn!(path = %found.path.display(), error = %format!("{e:#}"), "skipping database");
                continue;
            }
        };

        if args.json {
            listed.push(serde_json::json!({ "database": found.path, "reports": reports }));
        } else {
            writeln!(out, "Reading {}, available indices:", found.path.display())?;
            write_reports(&mut out, &reports, args.size_kind())?;
        }
    }

    if args.json {
        serde_json::to_writer_pretty(&mut out, &listed).context("Failed to write JSON")?;
        writeln!(out)?;
    }
    Ok(())
}

/// Every report listed in one database's registry
fn load_reports(path: &Path) -> Result<Vec<IndexReport>> {
    let db = open_read_only(path)?;

    let reports = db
        .reports()
        .context("Failed to read report registry")?
        .collect::<Result<Vec<_>, _>>()
        .context("Failed to read report")?;

    db.close()?;
    Ok(reports)
}

fn run_ls(database: &DatabaseConfig, args: &LsArgs) -> Result<()> {
    let db = open_read_only(&database.path)?;

    let path: PathBuf = match &args.path {
        Some(path) => absolute(path)?,
        None => match db.latest_report()? {
            Some(report) => PathBuf::from(report.path),
            None => bail!("Database '{}' has no indexed paths", database.path.display()),
        },
    };

    let record = db
        .read_directory_by_path(&path)
        .with_context(|| format!("'{}' is not in the index", path.display()))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    writeln!(out, "{}:", path.display())?;
    write_directory(
        &mut out,
        &record,
        ListOptions {
            kind: args.size_kind(),
            bytes: args.bytes,
            top: args.top,
        },
    )?;

    db.close()?;
    Ok(())
}

fn open_read_only(path: &Path) -> Result<Database> {
    Database::open(path, OpenMode::ReadOnly)
        .with_context(|| format!("Failed to open database '{}'", path.display()))
}

/// Absolute form of a user-supplied path; canonical when it still exists
fn absolute(path: &Path) -> Result<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

/// Bytes used by the database file or directory
fn database_size(path: &Path) -> Option<u64> {
    let metadata = std::fs::metadata(path).ok()?;
    if metadata.is_file() {
        return Some(metadata.len());
    }
    let total = std::fs::read_dir(path)
        .ok()?
        .filter_map(|e| e.ok())
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum();
    Some(total)
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("diskindex=debug,warn")
    } else {
        EnvFilter::new("diskindex=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(io::stderr)
        .init();

    Ok(())
}
