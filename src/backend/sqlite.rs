//! SQLite key-value backend
//!
//! Stores every record in a single `kv` table keyed by raw bytes, plus a
//! small `meta` table describing who wrote the file.

use crate::backend::{KvStore, OpenMode};
use crate::error::{BackendError, BackendResult};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Version of the record layout written by this crate
pub const FORMAT_VERSION: u32 = 1;

/// SQL to create the key-value table
const CREATE_KV_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS kv (
    key BLOB PRIMARY KEY,
    value BLOB NOT NULL
) WITHOUT ROWID
"#;

/// Upsert one key
const UPSERT_KV: &str = "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)";

/// SQL to create the metadata table
const CREATE_META_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT
)
"#;

/// Pragmas for scan workloads: many small upserts, one writer
const WRITE_PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA cache_size = -64000;      -- 64MB cache
PRAGMA temp_store = MEMORY;
PRAGMA wal_autocheckpoint = 10000;
"#;

/// Metadata keys
pub mod meta_keys {
    /// Record layout version
    pub const FORMAT_VERSION: &str = "format_version";

    /// Version of the program that created the file
    pub const WRITER_VERSION: &str = "writer_version";
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
    path: PathBuf,
    mode: OpenMode,
}

impl SqliteStore {
    /// Open a database file
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> BackendResult<Self> {
        let path = path.as_ref().to_path_buf();

        let conn = match mode {
            OpenMode::ReadWriteCreate => {
                let conn = Connection::open(&path)?;
                init_schema(&conn)?;
                conn
            }
            OpenMode::ReadOnly => Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?,
        };

        debug!(path = %path.display(), ?mode, "opened SQLite store");
        Ok(Self { conn, path, mode })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> BackendResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            path: PathBuf::from(":memory:"),
            mode: OpenMode::ReadWriteCreate,
        })
    }

    /// Get metadata value
    pub fn get_meta(&self, key: &str) -> BackendResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn check_writable(&self) -> BackendResult<()> {
        if self.mode.is_read_only() {
            return Err(BackendError::PermissionDenied {
                path: self.path.clone(),
            });
        }
        Ok(())
    }
}

/// Create tables and record format metadata
fn init_schema(conn: &Connection) -> BackendResult<()> {
    conn.execute_batch(WRITE_PRAGMAS)?;
    conn.execute(CREATE_KV_TABLE, [])?;
    conn.execute(CREATE_META_TABLE, [])?;

    conn.execute(
        "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
        params![meta_keys::FORMAT_VERSION, FORMAT_VERSION.to_string()],
    )?;
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
        params![meta_keys::WRITER_VERSION, env!("CARGO_PKG_VERSION")],
    )?;

    Ok(())
}

impl KvStore for SqliteStore {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        self.check_writable()?;

        let mut stmt = self.conn.prepare_cached(UPSERT_KV)?;
        stmt.execute(params![key, value])?;
        Ok(())
    }

    fn put_batch(&mut self, entries: &[(Vec<u8>, Vec<u8>)]) -> BackendResult<()> {
        self.check_writable()?;
        if entries.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare_cached(UPSERT_KV)?;
            for (key, value) in entries {
                stmt.execute(params![key.as_slice(), value.as_slice()])?;
            }
        }
        tx.commit()?;

        debug!(rows = entries.len(), "committed batch");
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        debug!(path = %self.path.display(), "closing SQLite store");
        self.conn.close().map_err(|(_, e)| BackendError::Sqlite(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_get_put() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get(b"8/64").unwrap(), None);

        store.put(b"8/64", &[1, 2, 3]).unwrap();
        assert_eq!(store.get(b"8/64").unwrap(), Some(vec![1, 2, 3]));

        store.put(b"8/64", &[9]).unwrap();
        assert_eq!(store.get(b"8/64").unwrap(), Some(vec![9]));
    }

    #[test]
    fn test_meta_recorded() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(
            store.get_meta(meta_keys::FORMAT_VERSION).unwrap(),
            Some(FORMAT_VERSION.to_string())
        );
        assert_eq!(
            store.get_meta(meta_keys::WRITER_VERSION).unwrap().as_deref(),
            Some(env!("CARGO_PKG_VERSION"))
        );
        assert_eq!(store.get_meta("nonexistent").unwrap(), None);
    }

    #[test]
    fn test_read_only_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let mut store = SqliteStore::open(&db_path, OpenMode::ReadWriteCreate).unwrap();
        store.put(b"/home", b"report").unwrap();
        Box::new(store).close().unwrap();

        let mut store = SqliteStore::open(&db_path, OpenMode::ReadOnly).unwrap();
        assert_eq!(store.get(b"/home").unwrap(), Some(b"report".to_vec()));
        assert!(matches!(
            store.put(b"/home", b"other"),
            Err(BackendError::PermissionDenied { .. })
        ));
    }

    #[test]
    fn test_put_batch_survives_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");

        let batch: Vec<(Vec<u8>, Vec<u8>)> = (0..500u32)
            .map(|i| (format!("1/{i:x}").into_bytes(), i.to_le_bytes().to_vec()))
            .collect();

        let mut store = SqliteStore::open(&db_path, OpenMode::ReadWriteCreate).unwrap();
        store.put(b"1/0", b"stale").unwrap();
        store.put_batch(&batch).unwrap();
        store.put_batch(&[]).unwrap();
        Box::new(store).close().unwrap();

        let store = SqliteStore::open(&db_path, OpenMode::ReadOnly).unwrap();
        for (key, value) in &batch {
            assert_eq!(store.get(key).unwrap().as_ref(), Some(value));
        }
    }

    #[test]
    fn test_put_batch_read_only() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        Box::new(SqliteStore::open(&db_path, OpenMode::ReadWriteCreate).unwrap())
            .close()
            .unwrap();

        let mut store = SqliteStore::open(&db_path, OpenMode::ReadOnly).unwrap();
        let err = store
            .put_batch(&[(b"k".to_vec(), b"v".to_vec())])
            .unwrap_err();
        assert!(matches!(err, BackendError::PermissionDenied { .. }));
        assert_eq!(store.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_read_only_missing_file() {
        let dir = tempdir().unwrap();
        let result = SqliteStore::open(dir.path().join("missing.db"), OpenMode::ReadOnly);
        assert!(matches!(result, Err(BackendError::Sqlite(_))));
    }
}
