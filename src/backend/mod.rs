//! Key-value backends
//!
//! The store only ever needs whole-value `get` and `put` on opaque byte
//! keys. Each backend keeps one flat keyspace; directory records, index
//! reports and the report registry all live side by side in it.
//!
//! # Module Structure
//!
//! - `sqlite`: default file backend, one `kv` table
//! - `rocks`: RocksDB backend (feature `rocksdb`), selected by a `.rocks` path
//! - `memory`: `BTreeMap` backend for tests and embedding

pub mod memory;
#[cfg(feature = "rocksdb")]
pub mod rocks;
pub mod sqlite;

pub use memory::MemoryStore;
#[cfg(feature = "rocksdb")]
pub use rocks::RocksStore;
pub use sqlite::SqliteStore;

use crate::error::BackendResult;
use std::path::Path;

/// How a database file is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Open for writing, creating the file if needed
    ReadWriteCreate,
    /// Open an existing file; every `put` fails
    ReadOnly,
}

impl OpenMode {
    pub fn is_read_only(&self) -> bool {
        *self == OpenMode::ReadOnly
    }
}

/// Minimal key-value contract the store is built on
///
/// `put` inserts or fully replaces the value for one key; a later `get`
/// never observes a partial write.
pub trait KvStore: Send {
    /// Fetch the value stored under `key`
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>>;

    /// Insert or replace the value stored under `key`
    fn put(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()>;

    /// Insert or replace many values in one backend write
    ///
    /// File backends commit the whole batch at once. Each key still ends
    /// up holding either its old value or the new one.
    fn put_batch(&mut self, entries: &[(Vec<u8>, Vec<u8>)]) -> BackendResult<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Mode the store was opened with
    fn mode(&self) -> OpenMode;

    /// Flush and release the underlying file
    fn close(self: Box<Self>) -> BackendResult<()>;
}

/// Backend implementation to use for a database file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// SQLite file
    Sqlite,
    /// RocksDB directory
    #[cfg(feature = "rocksdb")]
    RocksDb,
}

impl BackendKind {
    /// Pick the backend from the database path's extension
    pub fn for_path(path: &Path) -> Self {
        #[cfg(feature = "rocksdb")]
        {
            if path.extension().is_some_and(|ext| ext == "rocks") {
                return BackendKind::RocksDb;
            }
        }

        #[cfg(not(feature = "rocksdb"))]
        let _ = path;

        BackendKind::Sqlite
    }

    pub fn name(&self) -> &'static str {
        match self {
            BackendKind::Sqlite => "SQLite",
            #[cfg(feature = "rocksdb")]
            BackendKind::RocksDb => "RocksDB",
        }
    }
}

/// Open the backend selected by `path`
pub fn open_backend(path: &Path, mode: OpenMode) -> BackendResult<Box<dyn KvStore>> {
    match BackendKind::for_path(path) {
        BackendKind::Sqlite => Ok(Box::new(SqliteStore::open(path, mode)?)),
        #[cfg(feature = "rocksdb")]
        BackendKind::RocksDb => Ok(Box::new(RocksStore::open(path, mode)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_for_path() {
        assert_eq!(BackendKind::for_path(Path::new("/tmp/index.db")), BackendKind::Sqlite);
        assert_eq!(BackendKind::for_path(Path::new("index")), BackendKind::Sqlite);

        #[cfg(feature = "rocksdb")]
        assert_eq!(
            BackendKind::for_path(Path::new("/tmp/index.rocks")),
            BackendKind::RocksDb
        );
    }

    #[test]
    fn test_open_mode() {
        assert!(OpenMode::ReadOnly.is_read_only());
        assert!(!OpenMode::ReadWriteCreate.is_read_only());
    }
}
