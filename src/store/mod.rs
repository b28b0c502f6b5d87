//! Directory-tree storage
//!
//! A [`Database`] wraps one open key-value backend and stores three kinds
//! of record in its single keyspace:
//!
//! | Key | Value |
//! |-----|-------|
//! | `hex(device)/hex(inode)` | directory record ([`dir`]) |
//! | absolute scan root path | index report ([`report`]) |
//! | [`report::REGISTRY_KEY`] | registry of every scanned path |
//!
//! Directories point at their parent and children by [`DeviceInode`], so
//! a tree is navigated by repeated lookups and never held in memory whole.
//!
//! # Example
//!
//! ```
//! use diskindex::backend::MemoryStore;
//! use diskindex::store::{Database, DeviceInode, DirectoryEntry, DirectoryRecord, FileType, Size};
//!
//! let mut db = Database::with_store(Box::new(MemoryStore::new()));
//!
//! let mut record = DirectoryRecord::new(DeviceInode::new(8, 100), DeviceInode::new(8, 1));
//! record.push(DirectoryEntry::file("a.txt", Size::new(10, 12), FileType::Regular));
//! db.write_directory(&record).unwrap();
//!
//! let read = db.read_directory(DeviceInode::new(8, 100)).unwrap();
//! assert_eq!(read.file_count(), 1);
//! ```

pub mod dir;
pub mod report;
pub mod types;

pub use report::Registry;
pub use types::{
    DeviceInode, DirectoryEntry, DirectoryRecord, FileType, IndexReport, Size, SizeKind,
    Timestamp,
};

use crate::backend::{open_backend, KvStore, OpenMode};
use crate::error::{StoreError, StoreResult};
use std::os::unix::ffi::OsStrExt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

/// Open database handle
pub struct Database {
    store: Box<dyn KvStore>,
    path: PathBuf,
}

impl Database {
    /// Open a database file, choosing the backend from its extension
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let store = open_backend(&path, mode)?;
        debug!(path = %path.display(), ?mode, "opened database");
        Ok(Self { store, path })
    }

    /// Use an already-open backend
    pub fn with_store(store: Box<dyn KvStore>) -> Self {
        Self {
            store,
            path: PathBuf::from(":memory:"),
        }
    }

    /// Flush and release the backend
    pub fn close(self) -> StoreResult<()> {
        debug!(path = %self.path.display(), "closing database");
        self.store.close()?;
        Ok(())
    }

    pub fn mode(&self) -> OpenMode {
        self.store.mode()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Store a directory record, replacing any previous one for the same directory
    pub fn write_directory(&mut self, record: &DirectoryRecord) -> StoreResult<()> {
        let key = dir::mkkey(record.devino);
        let value = dir::encode_directory(record);
        debug!(key = %key, entries = record.entries().len(), bytes = value.len(), "write directory");
        self.store.put(key.as_bytes(), &value)?;
        Ok(())
    }

    /// Store several directory records in one backend write
    pub fn write_directories(&mut self, records: &[DirectoryRecord]) -> StoreResult<()> {
        let batch: Vec<(Vec<u8>, Vec<u8>)> = records
            .iter()
            .map(|r| (dir::mkkey(r.devino).into_bytes(), dir::encode_directory(r)))
            .collect();
        debug!(records = batch.len(), "write directory batch");
        self.store.put_batch(&batch)?;
        Ok(())
    }

    /// Read the record for the directory identified by `devino`
    pub fn read_directory(&self, devino: DeviceInode) -> StoreResult<DirectoryRecord> {
        let key = dir::mkkey(devino);
        let value = self
            .store
            .get(key.as_bytes())?
            .ok_or(StoreError::PathNotFound { key })?;
        dir::decode_directory(devino, value)
    }

    /// Store a scan report, listing its path in the registry on first sight
    ///
    /// The registry update and the report write are two separate puts. A
    /// crash between them leaves a listed path with no report, which
    /// [`Database::reports`] skips.
    pub fn write_report(&mut self, report: &IndexReport) -> StoreResult<()> {
        report::validate_path(&report.path)?;
        let key = report.path.as_bytes();

        if self.store.get(key)?.is_none() {
            let mut registry = self.registry()?;
            if !registry.contains(&report.path)? {
                registry.append(&report.path)?;
                self.store.put(report::REGISTRY_KEY, registry.as_bytes())?;
                info!(path = %report.path, slots = registry.len(), "registered new index path");
            }
        }

        self.store.put(key, &report::encode_report(report))?;
        debug!(path = %report.path, "write report");
        Ok(())
    }

    /// Read the report for scan root `path`
    pub fn read_report(&self, path: &str) -> StoreResult<IndexReport> {
        let value = self
            .store
            .get(path.as_bytes())?
            .ok_or_else(|| StoreError::PathNotFound {
                key: path.to_string(),
            })?;
        report::decode_report(path, value)
    }

    /// Current registry contents
    pub fn registry(&self) -> StoreResult<Registry> {
        let value = self.store.get(report::REGISTRY_KEY)?.unwrap_or_default();
        Registry::from_value(value)
    }

    /// Every registered scan root, in first-seen order
    pub fn registry_paths(&self) -> StoreResult<Vec<String>> {
        self.registry()?.paths()
    }

    /// Number of registry slots
    pub fn report_count(&self) -> StoreResult<usize> {
        Ok(self.registry()?.len())
    }

    /// Report for registry slot `index`
    ///
    /// `None` when the index is past the end, the slot is empty, or the
    /// report record is missing.
    pub fn report(&self, index: usize) -> StoreResult<Option<IndexReport>> {
        let Some(path) = self.registry()?.path(index)? else {
            return Ok(None);
        };
        match self.read_report(&path) {
            Ok(report) => Ok(Some(report)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Lazily read every registered report in registry order
    ///
    /// The registry is read once when this is called; each report is read
    /// as the iterator advances. Slots whose report is missing are skipped.
    pub fn reports(&self) -> StoreResult<Reports<'_>> {
        Ok(Reports {
            db: self,
            registry: self.registry()?,
            next: 0,
        })
    }

    /// Report with the latest stop time
    pub fn latest_report(&self) -> StoreResult<Option<IndexReport>> {
        let mut latest: Option<IndexReport> = None;
        for report in self.reports()? {
            let report = report?;
            if latest.as_ref().map_or(true, |l| report.time_stop >= l.time_stop) {
                latest = Some(report);
            }
        }
        Ok(latest)
    }

    /// Find the directory at absolute `path` inside an indexed tree
    ///
    /// Picks the registered scan root that is the longest component-wise
    /// prefix of `path`, then walks down one directory record per
    /// remaining component.
    pub fn resolve_path<P: AsRef<Path>>(&self, path: P) -> StoreResult<DeviceInode> {
        let path = path.as_ref();
        let not_found = || StoreError::PathNotFound {
            key: path.display().to_string(),
        };

        if !path.is_absolute() {
            return Err(not_found());
        }

        let root = self
            .registry_paths()?
            .into_iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| Path::new(root).components().count())
            .ok_or_else(not_found)?;

        let report = self.read_report(&root)?;
        let relative = path.strip_prefix(&root).map_err(|_| not_found())?;

        let mut current = report.devino;
        for component in relative.components() {
            let name = match component {
                Component::Normal(name) => name.as_bytes(),
                Component::CurDir => continue,
                _ => return Err(not_found()),
            };

            let record = self.read_directory(current)?;
            current = record
                .find(name)
                .and_then(|entry| entry.child())
                .ok_or_else(not_found)?;
        }

        Ok(current)
    }

    /// Read the record for the directory at absolute `path`
    pub fn read_directory_by_path<P: AsRef<Path>>(&self, path: P) -> StoreResult<DirectoryRecord> {
        let devino = self.resolve_path(path)?;
        self.read_directory(devino)
    }
}

/// Iterator over registered reports, see [`Database::reports`]
pub struct Reports<'a> {
    db: &'a Database,
    registry: Registry,
    next: usize,
}

impl Reports<'_> {
    /// Number of registry slots, including any that will be skipped
    pub fn slots(&self) -> usize {
        self.registry.len()
    }
}

impl Iterator for Reports<'_> {
    type Item = StoreResult<IndexReport>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.registry.len() {
            let index = self.next;
            self.next += 1;

            let path = match self.registry.path(index) {
                Ok(Some(path)) => path,
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            };

            match self.db.read_report(&path) {
                Ok(report) => return Some(Ok(report)),
                Err(e) if e.is_not_found() => {
                    warn!(path = %path, "registered path has no report, skipping");
                }
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    fn memory_db() -> Database {
        Database::with_store(Box::new(MemoryStore::new()))
    }

    fn report(path: &str, stop: u64, files: u64) -> IndexReport {
        IndexReport {
            path: path.to_string(),
            devino: DeviceInode::new(8, 2),
            time_start: Timestamp::new(stop - 5, 0),
            time_stop: Timestamp::new(stop, 0),
            file_count: files,
            dir_count: 1,
            size: Size::new(files * 10, files * 12),
        }
    }

    #[test]
    fn test_directory_roundtrip() {
        let mut db = memory_db();
        let mut record = DirectoryRecord::new(DeviceInode::new(8, 100), DeviceInode::new(8, 1));
        record.push(DirectoryEntry::file("a.txt", Size::new(10, 12), FileType::Regular));
        record.push(DirectoryEntry::directory(
            "sub",
            Size::new(0, 0),
            DeviceInode::new(8, 101),
        ));
        db.write_directory(&record).unwrap();

        let read = db.read_directory(DeviceInode::new(8, 100)).unwrap();
        assert_eq!(read.file_count(), 1);
        assert_eq!(read.dir_count(), 1);
        assert_eq!(read.size_total(), Size::new(10, 12));
        assert_eq!(read, record);
    }

    #[test]
    fn test_roundtrip_every_type_with_ghost() {
        let mut db = memory_db();
        let devino = DeviceInode::new(0xfd00, 0x1234);
        let mut record = DirectoryRecord::new(devino, DeviceInode::new(0xfd00, 2));

        let kinds = [
            FileType::BlockDevice,
            FileType::CharDevice,
            FileType::Fifo,
            FileType::Symlink,
            FileType::Regular,
            FileType::Socket,
            FileType::Unknown,
        ];
        for (i, kind) in kinds.iter().enumerate() {
            let i = i as u64;
            record.push(DirectoryEntry::file(format!("f{i}"), Size::new(i, i * 2), *kind));
        }
        record.push(DirectoryEntry::directory(
            "d",
            Size::new(u64::MAX / 4, 4096),
            DeviceInode::new(u64::MAX, 7),
        ));
        record.push(DirectoryEntry::file("", Size::new(1000, 2000), FileType::Regular));
        db.write_directory(&record).unwrap();

        let read = db.read_directory(devino).unwrap();
        assert_eq!(read.entries(), &record.entries()[..record.entries().len() - 1]);
        assert_eq!(read.file_count(), 8);
        assert_eq!(read.dir_count(), 1);
        assert_eq!(read.size_total(), record.size_total());
        assert!(read.find(b"").is_none());
    }

    #[test]
    fn test_write_directories_batch() {
        let mut db = memory_db();
        let records: Vec<_> = (0..50u64)
            .map(|i| {
                let mut r = DirectoryRecord::new(DeviceInode::new(8, 100 + i), DeviceInode::new(8, 1));
                r.push(DirectoryEntry::file(format!("f{i}"), Size::new(i, i), FileType::Regular));
                r
            })
            .collect();

        db.write_directories(&records).unwrap();
        db.write_directories(&[]).unwrap();

        for record in &records {
            assert_eq!(&db.read_directory(record.devino).unwrap(), record);
        }
    }

    #[test]
    fn test_missing_directory() {
        let db = memory_db();
        let err = db.read_directory(DeviceInode::new(1, 1)).unwrap_err();
        assert!(matches!(err, StoreError::PathNotFound { ref key } if key == "1/1"));
    }

    #[test]
    fn test_write_replaces_whole_record() {
        let mut db = memory_db();
        let devino = DeviceInode::new(8, 100);

        let mut first = DirectoryRecord::new(devino, DeviceInode::new(8, 1));
        first.push(DirectoryEntry::file("old", Size::new(1, 1), FileType::Regular));
        db.write_directory(&first).unwrap();

        let mut second = DirectoryRecord::new(devino, DeviceInode::new(8, 1));
        second.push(DirectoryEntry::file("new", Size::new(2, 2), FileType::Regular));
        db.write_directory(&second).unwrap();

        let read = db.read_directory(devino).unwrap();
        assert_eq!(read.entries().len(), 1);
        assert_eq!(read.entries()[0].name, b"new");
    }

    #[test]
    fn test_report_dedup_and_order() {
        let mut db = memory_db();
        db.write_report(&report("/home", 100, 1)).unwrap();
        db.write_report(&report("/var", 200, 2)).unwrap();
        db.write_report(&report("/home", 300, 3)).unwrap();

        assert_eq!(db.registry_paths().unwrap(), vec!["/home", "/var"]);
        assert_eq!(db.report_count().unwrap(), 2);

        let reports: Vec<_> = db.reports().unwrap().collect::<StoreResult<_>>().unwrap();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].path, "/home");
        assert_eq!(reports[0].file_count, 3);
        assert_eq!(reports[1].path, "/var");

        assert_eq!(db.report(1).unwrap().unwrap().path, "/var");
        assert!(db.report(2).unwrap().is_none());
        assert_eq!(db.latest_report().unwrap().unwrap().time_stop.secs, 300);
    }

    #[test]
    fn test_reports_skip_missing_record() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::default();
        registry.append("/gone").unwrap();
        registry.append("/kept").unwrap();
        store.put(report::REGISTRY_KEY, registry.as_bytes()).unwrap();
        store
            .put(b"/kept", &report::encode_report(&report("/kept", 10, 1)))
            .unwrap();

        let db = Database::with_store(Box::new(store));
        let reports = db.reports().unwrap();
        assert_eq!(reports.slots(), 2);
        let paths: Vec<_> = reports.map(|r| r.unwrap().path).collect();
        assert_eq!(paths, vec!["/kept"]);
        assert!(db.report(0).unwrap().is_none());
    }

    #[test]
    fn test_rewrite_after_crash_does_not_duplicate() {
        let mut store = MemoryStore::new();
        let mut registry = Registry::default();
        registry.append("/home").unwrap();
        store.put(report::REGISTRY_KEY, registry.as_bytes()).unwrap();

        let mut db = Database::with_store(Box::new(store));
        db.write_report(&report("/home", 10, 1)).unwrap();
        assert_eq!(db.report_count().unwrap(), 1);
    }

    #[test]
    fn test_invalid_report_path() {
        let mut db = memory_db();
        let err = db.write_report(&report("relative", 10, 1)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidReportPath { .. }));
        assert_eq!(db.report_count().unwrap(), 0);
    }

    #[test]
    fn test_read_only_write_fails() {
        let db = Database::with_store(Box::new(MemoryStore::read_only(Default::default())));
        let mut db = db;
        let record = DirectoryRecord::new(DeviceInode::new(1, 2), DeviceInode::new(1, 1));
        assert!(matches!(
            db.write_directory(&record),
            Err(StoreError::PermissionDenied(_))
        ));
        assert!(matches!(
            db.write_report(&report("/home", 10, 1)),
            Err(StoreError::PermissionDenied(_))
        ));
    }

    #[test]
    fn test_resolve_path() {
        let mut db = memory_db();
        let root = DeviceInode::new(8, 2);
        let sub = DeviceInode::new(8, 3);
        let deep = DeviceInode::new(8, 4);

        let mut r = DirectoryRecord::new(root, DeviceInode::new(8, 1));
        r.push(DirectoryEntry::directory("sub", Size::new(5, 5), sub));
        r.push(DirectoryEntry::file("file", Size::new(1, 1), FileType::Regular));
        db.write_directory(&r).unwrap();

        let mut s = DirectoryRecord::new(sub, root);
        s.push(DirectoryEntry::directory("deep", Size::new(5, 5), deep));
        db.write_directory(&s).unwrap();
        db.write_directory(&DirectoryRecord::new(deep, sub)).unwrap();

        db.write_report(&report("/data", 10, 1)).unwrap();

        assert_eq!(db.resolve_path("/data").unwrap(), root);
        assert_eq!(db.resolve_path("/data/").unwrap(), root);
        assert_eq!(db.resolve_path("/data/sub").unwrap(), sub);
        assert_eq!(db.resolve_path("/data/./sub/deep").unwrap(), deep);
        assert_eq!(db.read_directory_by_path("/data/sub/deep").unwrap().parent, sub);

        assert!(db.resolve_path("/data/file").unwrap_err().is_not_found());
        assert!(db.resolve_path("/data/missing").unwrap_err().is_not_found());
        assert!(db.resolve_path("/database").unwrap_err().is_not_found());
        assert!(db.resolve_path("/data/sub/..").unwrap_err().is_not_found());
        assert!(db.resolve_path("data").unwrap_err().is_not_found());
    }

    #[test]
    fn test_resolve_prefers_deepest_root() {
        let mut db = memory_db();
        let outer = DeviceInode::new(8, 2);
        let inner = DeviceInode::new(9, 2);

        db.write_directory(&DirectoryRecord::new(outer, DeviceInode::new(8, 1)))
            .unwrap();
        db.write_directory(&DirectoryRecord::new(inner, DeviceInode::new(9, 1)))
            .unwrap();

        let mut outer_report = report("/srv", 10, 1);
        outer_report.devino = outer;
        let mut inner_report = report("/srv/data", 10, 1);
        inner_report.devino = inner;
        db.write_report(&outer_report).unwrap();
        db.write_report(&inner_report).unwrap();

        assert_eq!(db.resolve_path("/srv/data").unwrap(), inner);
        assert_eq!(db.resolve_path("/srv").unwrap(), outer);
    }
}
