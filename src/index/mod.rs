//! Local filesystem indexer
//!
//! Walks a directory tree and stores one [`DirectoryRecord`] per directory
//! plus an [`IndexReport`] for the scan root.
//!
//! Architecture:
//! ```text
//! Walker (calling thread)
//! │  explicit stack of open directories, deepest last
//! │  a directory is finished once all its entries are handled;
//! │  its record is sent and its subtree total folds into the parent
//! │
//! └── bounded channel ──► Writer Thread: recv record → Database::write_directory
//! ```
//!
//! Records are emitted in post-order, so a directory's entry for a child
//! always carries the child's complete subtree size. Only the stack of
//! open directories is kept in memory.

use crate::error::{ConfigError, IndexError, IndexResult, StoreResult};
use crate::store::{Database, DeviceInode, DirectoryEntry, DirectoryRecord, FileType, IndexReport, Size, Timestamp};
use crossbeam_channel::{bounded, Receiver, Sender};
use regex::Regex;
use std::collections::HashSet;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Records buffered between walker and writer
const DEFAULT_CHANNEL_SIZE: usize = 256;

/// Directory records committed per backend write
const DEFAULT_BATCH_SIZE: usize = 1_000;

/// How a scan treats mount points, hard links and exclusions
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Stay on the scan root's device
    pub one_file_system: bool,

    /// Count a file with several links only the first time it is seen
    pub check_hard_links: bool,

    /// Skip any entry whose full path matches one of these
    pub exclude: Vec<Regex>,

    /// Capacity of the walker-to-writer channel
    pub channel_size: usize,

    /// Directory records the writer collects before committing
    pub batch_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            one_file_system: false,
            check_hard_links: false,
            exclude: Vec::new(),
            channel_size: DEFAULT_CHANNEL_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Counters for display while a scan runs
#[derive(Debug, Clone, Default)]
pub struct IndexProgress {
    pub dirs: u64,
    pub files: u64,
    /// Allocated bytes of the files counted so far
    pub bytes: u64,
    pub errors: u64,
    pub elapsed: Duration,
}

impl IndexProgress {
    pub fn entries_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.files + self.dirs) as f64 / secs
        } else {
            0.0
        }
    }
}

/// Result of a completed scan
pub struct IndexOutcome {
    /// Database handed back by the writer thread, still open
    pub db: Database,
    pub report: IndexReport,
    /// Entries or directories that could not be read
    pub errors: u64,
    pub duration: Duration,
}

/// Subtree totals carried up the stack
#[derive(Debug, Clone, Copy, Default)]
struct Totals {
    size: Size,
    files: u64,
    dirs: u64,
}

/// A directory whose entries are still being handled
struct Frame {
    name: Vec<u8>,
    path: PathBuf,
    record: DirectoryRecord,
    pending: std::vec::IntoIter<(OsString, io::Result<Metadata>)>,
    total: Totals,
}

/// Filesystem indexer
pub struct Indexer {
    options: IndexOptions,
    shutdown: Arc<AtomicBool>,
    dirs_count: Arc<AtomicU64>,
    files_count: Arc<AtomicU64>,
    bytes_count: Arc<AtomicU64>,
    errors_count: Arc<AtomicU64>,
}

impl Indexer {
    pub fn new(options: IndexOptions) -> Self {
        Self {
            options,
            shutdown: Arc::new(AtomicBool::new(false)),
            dirs_count: Arc::new(AtomicU64::new(0)),
            files_count: Arc::new(AtomicU64::new(0)),
            bytes_count: Arc::new(AtomicU64::new(0)),
            errors_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Flag that stops the scan when set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    pub fn progress(&self, elapsed: Duration) -> IndexProgress {
        IndexProgress {
            dirs: self.dirs_count.load(Ordering::Relaxed),
            files: self.files_count.load(Ordering::Relaxed),
            bytes: self.bytes_count.load(Ordering::Relaxed),
            errors: self.errors_count.load(Ordering::Relaxed),
            elapsed,
        }
    }

    /// Index the tree at `root` into `db`
    ///
    /// The database moves to a writer thread for the duration of the scan
    /// and comes back in the outcome. An interrupted scan writes no report.
    pub fn run<P: AsRef<Path>>(&self, db: Database, root: P) -> IndexResult<IndexOutcome> {
        let start = Instant::now();
        let time_start = Timestamp::now();

        let given = root.as_ref();
        let root = fs::canonicalize(given).map_err(|source| IndexError::Root {
            path: given.to_path_buf(),
            source,
        })?;
        let root_str = root
            .to_str()
            .ok_or_else(|| IndexError::NonUtf8Root(root.clone()))?
            .to_string();

        let metadata = fs::symlink_metadata(&root).map_err(|source| IndexError::Root {
            path: root.clone(),
            source,
        })?;
        if !metadata.is_dir() {
            return Err(ConfigError::InvalidRoot {
                path: root,
                reason: "not a directory".into(),
            }
            .into());
        }

        let devino = DeviceInode::from_metadata(&metadata);
        let parent = root
            .parent()
            .and_then(|p| fs::symlink_metadata(p).ok())
            .map(|m| DeviceInode::from_metadata(&m))
            .unwrap_or(devino);

        info!(root = %root_str, %devino, "starting index");

        let (tx, rx) = bounded(self.options.channel_size.max(1));
        let writer = spawn_writer(db, rx, self.options.batch_size)?;

        let walked = self.walk(&root, &metadata, parent, &tx);
        drop(tx);
        let joined = join_writer(writer);

        let (total, mut db) = match (walked, joined) {
            (Ok(total), Ok(db)) => (total, db),
            // The writer hung up first; its error is the real cause
            (Err(IndexError::ChannelClosed), Err(e)) => return Err(e),
            (Err(e), _) | (Ok(_), Err(e)) => return Err(e),
        };

        let report = IndexReport {
            path: root_str,
            devino,
            time_start,
            time_stop: Timestamp::now(),
            file_count: total.files,
            dir_count: total.dirs,
            size: total.size,
        };
        db.write_report(&report)?;

        let errors = self.errors_count.load(Ordering::Relaxed);
        info!(
            root = %report.path,
            files = report.file_count,
            dirs = report.dir_count,
            bytes = report.size.actual,
            errors,
            "index complete"
        );

        Ok(IndexOutcome {
            db,
            report,
            errors,
            duration: start.elapsed(),
        })
    }

    /// Like [`Indexer::run`], calling `progress_callback` about every 100ms
    pub fn run_with_progress<P, F>(
        &self,
        db: Database,
        root: P,
        progress_callback: F,
    ) -> IndexResult<IndexOutcome>
    where
        P: AsRef<Path>,
        F: Fn(IndexProgress) + Send + 'static,
    {
        let start = Instant::now();
        let done = Arc::new(AtomicBool::new(false));

        let progress_handle = {
            let done = Arc::clone(&done);
            let dirs = Arc::clone(&self.dirs_count);
            let files = Arc::clone(&self.files_count);
            let bytes = Arc::clone(&self.bytes_count);
            let errors = Arc::clone(&self.errors_count);

            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    progress_callback(IndexProgress {
                        dirs: dirs.load(Ordering::Relaxed),
                        files: files.load(Ordering::Relaxed),
                        bytes: bytes.load(Ordering::Relaxed),
                        errors: errors.load(Ordering::Relaxed),
                        elapsed: start.elapsed(),
                    });
                    thread::sleep(Duration::from_millis(100));
                }
            })
        };

        let result = self.run(db, root);

        done.store(true, Ordering::SeqCst);
        let _ = progress_handle.join();

        result
    }

    /// Post-order walk; returns the root's subtree totals
    fn walk(
        &self,
        root: &Path,
        metadata: &Metadata,
        parent: DeviceInode,
        tx: &Sender<DirectoryRecord>,
    ) -> IndexResult<Totals> {
        let root_dev = metadata.dev();
        let mut seen: HashSet<DeviceInode> = HashSet::new();
        let mut stack = vec![self.open_dir(Vec::new(), root.to_path_buf(), metadata, parent)];

        while let Some(frame) = stack.last_mut() {
            if self.shutdown.load(Ordering::Relaxed) {
                warn!("shutdown requested, abandoning index");
                return Err(IndexError::Interrupted);
            }

            let Some((name, entry_meta)) = frame.pending.next() else {
                // All entries handled: emit the record and fold into the parent
                let Some(done) = stack.pop() else { break };
                let total = done.total;
                let devino = done.record.devino;
                tx.send(done.record).map_err(|_| IndexError::ChannelClosed)?;

                match stack.last_mut() {
                    Some(parent) => {
                        parent
                            .record
                            .push(DirectoryEntry::directory(done.name, total.size, devino));
                        parent.total.size += total.size;
                        parent.total.files += total.files;
                        parent.total.dirs += total.dirs;
                    }
                    None => return Ok(total),
                }
                continue;
            };

            let path = frame.path.join(&name);

            let entry_meta = match entry_meta {
                Ok(m) => m,
                Err(e) => {
                    self.record_error(&path, &e);
                    continue;
                }
            };

            if self.is_excluded(&path) {
                debug!(path = %path.display(), "excluded");
                continue;
            }

            let kind = FileType::from_std(entry_meta.file_type());

            if kind.is_dir() {
                if self.options.one_file_system && entry_meta.dev() != root_dev {
                    debug!(path = %path.display(), "skipping directory on another device");
                    continue;
                }
                let parent = frame.record.devino;
                let child = self.open_dir(name.as_bytes().to_vec(), path, &entry_meta, parent);
                stack.push(child);
                continue;
            }

            if self.options.check_hard_links
                && entry_meta.nlink() > 1
                && !seen.insert(DeviceInode::from_metadata(&entry_meta))
            {
                debug!(path = %path.display(), "hard link already counted");
                continue;
            }

            let size = Size::from_metadata(&entry_meta);
            frame
                .record
                .push(DirectoryEntry::file(name.as_bytes(), size, kind));
            frame.total.size += size;
            frame.total.files += 1;

            self.files_count.fetch_add(1, Ordering::Relaxed);
            self.bytes_count.fetch_add(size.actual, Ordering::Relaxed);
        }

        // Only reached if the root frame vanished without finishing
        Err(IndexError::ChannelClosed)
    }

    /// Read a directory's entries up front and start its record
    ///
    /// An unreadable directory still gets an (empty) record so it can be
    /// navigated to.
    fn open_dir(&self, name: Vec<u8>, path: PathBuf, metadata: &Metadata, parent: DeviceInode) -> Frame {
        self.dirs_count.fetch_add(1, Ordering::Relaxed);

        let pending: Vec<_> = match fs::read_dir(&path) {
            Ok(iter) => iter
                .filter_map(|entry| match entry {
                    Ok(entry) => Some((entry.file_name(), entry.metadata())),
                    Err(e) => {
                        self.record_error(&path, &e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                self.record_error(&path, &e);
                Vec::new()
            }
        };

        Frame {
            name,
            record: DirectoryRecord::new(DeviceInode::from_metadata(metadata), parent),
            path,
            pending: pending.into_iter(),
            total: Totals {
                dirs: 1,
                ..Totals::default()
            },
        }
    }

    fn is_excluded(&self, path: &Path) -> bool {
        if self.options.exclude.is_empty() {
            return false;
        }
        let path = path.to_string_lossy();
        self.options.exclude.iter().any(|re| re.is_match(&path))
    }

    fn record_error(&self, path: &Path, err: &io::Error) {
        warn!(path = %path.display(), error = %err, "unreadable");
        self.errors_count.fetch_add(1, Ordering::Relaxed);
    }
}

fn spawn_writer(
    db: Database,
    rx: Receiver<DirectoryRecord>,
    batch_size: usize,
) -> IndexResult<JoinHandle<StoreResult<Database>>> {
    thread::Builder::new()
        .name("db-writer".to_string())
        .spawn(move || writer_loop(db, rx, batch_size))
        .map_err(IndexError::Spawn)
}

/// Collect records into batches; the last partial batch is flushed once
/// the walker drops its sender
fn writer_loop(
    mut db: Database,
    rx: Receiver<DirectoryRecord>,
    batch_size: usize,
) -> StoreResult<Database> {
    let batch_size = batch_size.max(1);
    let mut pending: Vec<DirectoryRecord> = Vec::with_capacity(batch_size);
    let mut written: u64 = 0;

    while let Ok(record) = rx.recv() {
        pending.push(record);
        if pending.len() >= batch_size {
            db.write_directories(&pending)?;
            written += pending.len() as u64;
            pending.clear();
        }
    }

    if !pending.is_empty() {
        db.write_directories(&pending)?;
        written += pending.len() as u64;
    }

    debug!(records = written, "writer finished");
    Ok(db)
}

fn join_writer(handle: JoinHandle<StoreResult<Database>>) -> IndexResult<Database> {
    let db = handle.join().map_err(|_| IndexError::WriterPanicked)??;
    Ok(db)
}
