//! Terminal output
//!
//! Spinner progress while indexing (indicatif) and the plain-text
//! listings printed by `info` and `ls`. Listings are written to any
//! `io::Write` so they can be checked in tests.

use crate::index::{IndexOutcome, IndexProgress};
use crate::store::{DirectoryRecord, IndexReport, SizeKind};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

/// Timestamp layout used in report listings
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Spinner showing index status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        let spinner = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏");
        bar.set_style(spinner);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &IndexProgress) {
        let msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Rate: {:.0}/s | Errors: {}",
            format_number(progress.dirs),
            format_number(progress.files),
            format_size(progress.bytes, BINARY),
            progress.entries_per_second(),
            format_number(progress.errors),
        );
        self.bar.set_message(msg);
    }

    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }

    /// Handle for feeding updates from another thread
    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    /// Reporter drawing on an existing bar
    pub fn from_bar(bar: ProgressBar) -> Self {
        Self { bar }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Size for display: exact bytes or binary units
pub fn format_bytes(bytes: u64, exact: bool) -> String {
    if exact {
        bytes.to_string()
    } else {
        format_size(bytes, BINARY)
    }
}

/// Print a header at the start of an index run
pub fn print_header(root: &Path, database: &Path, backend: &str) {
    println!();
    println!(
        "{} {}",
        style("diskindex").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root.display());
    println!(
        "  {} {} ({})",
        style("Database:").bold(),
        database.display(),
        backend
    );
    println!();
}

/// Print a summary of a finished index run
pub fn print_summary(outcome: &IndexOutcome, db_size: Option<u64>) {
    let report = &outcome.report;
    let duration_secs = outcome.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        (report.file_count + report.dir_count) as f64 / duration_secs
    } else {
        0.0
    };

    println!();
    println!("{}", style("Index Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}",
        style("Directories:").bold(),
        format_number(report.dir_count)
    );
    println!("  {} {}", style("Files:").bold(), format_number(report.file_count));
    println!(
        "  {} {} ({} apparent)",
        style("Disk Usage:").bold(),
        format_size(report.size.actual, BINARY),
        format_size(report.size.apparent, BINARY)
    );
    println!(
        "  {} {:.1}s ({:.0} entries/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );
    if outcome.errors > 0 {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(outcome.errors)
        );
    }
    let db_path = outcome.db.path().display();
    match db_size {
        Some(size) => println!(
            "  {} {} ({})",
            style("Database:").bold(),
            db_path,
            format_size(size, BINARY)
        ),
        None => println!("  {} {}", style("Database:").bold(), db_path),
    }
    println!();
}

/// One line per report: local start time, size, path
pub fn write_reports<W: Write>(
    out: &mut W,
    reports: &[IndexReport],
    kind: SizeKind,
) -> io::Result<()> {
    for report in reports {
        let started = report
            .time_start
            .to_local()
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| report.time_start.secs.to_string());
        writeln!(
            out,
            "  {} {:>10} {}",
            started,
            format_size(report.size.get(kind), BINARY),
            report.path
        )?;
    }
    Ok(())
}

/// Options for [`write_directory`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ListOptions {
    pub kind: SizeKind,
    /// Exact byte counts instead of binary units
    pub bytes: bool,
    /// Only the largest N entries
    pub top: Option<usize>,
}

/// Entries largest first, type marker appended, then a totals footer
pub fn write_directory<W: Write>(
    out: &mut W,
    record: &DirectoryRecord,
    options: ListOptions,
) -> io::Result<()> {
    let entries = record.sorted_by_size(options.kind);
    let shown = options.top.unwrap_or(entries.len()).min(entries.len());
    let width = if options.bytes { 14 } else { 10 };

    for entry in &entries[..shown] {
        writeln!(
            out,
            "{:>width$} {}{}",
            format_bytes(entry.size.get(options.kind), options.bytes),
            entry.name_lossy(),
            entry.kind().marker(),
        )?;
    }

    if shown < entries.len() {
        writeln!(out, "{:>width$} ({} more)", "...", entries.len() - shown)?;
    }

    writeln!(
        out,
        "{} in {} files and {} directories",
        format_bytes(record.size_total().get(options.kind), options.bytes),
        format_number(record.file_count()),
        format_number(record.dir_count()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{DeviceInode, DirectoryEntry, FileType, Size, Timestamp};

    fn sample_record() -> DirectoryRecord {
        let mut record = DirectoryRecord::new(DeviceInode::new(8, 100), DeviceInode::new(8, 1));
        record.push(DirectoryEntry::file("small", Size::new(10, 4096), FileType::Regular));
        record.push(DirectoryEntry::directory(
            "big",
            Size::new(5000, 8192),
            DeviceInode::new(8, 101),
        ));
        record.push(DirectoryEntry::file("link", Size::new(7, 0), FileType::Symlink));
        record
    }

    fn render(record: &DirectoryRecord, options: ListOptions) -> String {
        let mut out = Vec::new();
        write_directory(&mut out, record, options).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(1536, true), "1536");
        assert_eq!(format_bytes(1536, false), format_size(1536u64, BINARY));
    }

    #[test]
    fn test_directory_listing() {
        let text = render(
            &sample_record(),
            ListOptions {
                bytes: true,
                ..ListOptions::default()
            },
        );
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].trim_start(), "8192 big/");
        assert_eq!(lines[1].trim_start(), "4096 small");
        assert_eq!(lines[2].trim_start(), "0 link@");
        assert_eq!(lines[3], "12288 in 2 files and 1 directories");
    }

    #[test]
    fn test_directory_listing_apparent_top() {
        let text = render(
            &sample_record(),
            ListOptions {
                kind: SizeKind::Apparent,
                bytes: true,
                top: Some(1),
            },
        );
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0].trim_start(), "5000 big/");
        assert!(lines[1].contains("(2 more)"));
        assert_eq!(lines[2], "5017 in 2 files and 1 directories");
    }

    #[test]
    fn test_report_listing() {
        let report = IndexReport {
            path: "/home".to_string(),
            devino: DeviceInode::new(8, 2),
            time_start: Timestamp::new(1_700_000_000, 0),
            time_stop: Timestamp::new(1_700_000_010, 0),
            file_count: 1,
            dir_count: 1,
            size: Size::new(1024, 2048),
        };
        let mut out = Vec::new();
        write_reports(&mut out, &[report], SizeKind::Actual).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("  20"));
        assert!(text.trim_end().ends_with(" /home"));
        assert!(text.contains(&format_size(2048u64, BINARY)));
    }
}
