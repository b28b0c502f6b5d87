//! Error types for diskindex
//!
//! This module defines one error enum per layer:
//! - Buffer codec errors (varint/string decoding)
//! - Key-value backend errors (SQLite, RocksDB, read-only violations)
//! - Store errors (record-level failures surfaced to callers)
//! - Configuration and CLI errors
//! - Indexer errors
//!
//! Lower layers convert into higher ones with `From`, so `?` carries a
//! failure up unchanged. Nothing here retries.

use std::path::PathBuf;
use thiserror::Error;

/// Byte-buffer codec errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// A varint or string ran past the end of the buffer
    #[error("truncated input: needed {needed} more byte(s), {remaining} remaining")]
    Truncated { needed: usize, remaining: usize },

    /// A varint does not fit in 64 bits
    #[error("varint at offset {offset} overflows 64 bits")]
    Overflow { offset: usize },
}

/// Key-value backend errors
#[derive(Error, Debug)]
pub enum BackendError {
    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// RocksDB operation failed
    #[cfg(feature = "rocksdb")]
    #[error("RocksDB error: {0}")]
    Rocks(#[from] rocksdb::Error),

    /// I/O error (file operations)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Write attempted on a handle opened read-only
    #[error("database '{path}' is open read-only")]
    PermissionDenied { path: PathBuf },
}

/// Result type alias for BackendError
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors surfaced by the directory record store and report registry
#[derive(Error, Debug)]
pub enum StoreError {
    /// Requested key is absent
    #[error("path not found: '{key}'")]
    PathNotFound { key: String },

    /// Record decoded to something that is not a valid record
    #[error("corrupt record '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    /// A varint or string ran past the end of the record
    #[error("truncated record: needed {needed} more byte(s), {remaining} remaining")]
    TruncatedInput { needed: usize, remaining: usize },

    /// Backend get/put failed
    #[error("store failed: {0}")]
    StoreFailed(BackendError),

    /// Write attempted on a read-only database
    #[error("permission denied: {0}")]
    PermissionDenied(BackendError),

    /// Report path is empty, relative, or does not fit in a registry slot
    #[error("invalid report path '{path}': {reason}")]
    InvalidReportPath { path: String, reason: String },
}

impl StoreError {
    /// Attach the record key to a codec failure
    pub fn decode(key: &str, err: BufferError) -> Self {
        match err {
            BufferError::Truncated { needed, remaining } => {
                StoreError::TruncatedInput { needed, remaining }
            }
            BufferError::Overflow { .. } => StoreError::CorruptRecord {
                key: key.to_string(),
                reason: err.to_string(),
            },
        }
    }

    /// Build a `CorruptRecord` for the given key
    pub fn corrupt(key: &str, reason: impl Into<String>) -> Self {
        StoreError::CorruptRecord {
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if this error means the record simply isn't there
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::PathNotFound { .. })
    }
}

impl From<BackendError> for StoreError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::PermissionDenied { .. } => StoreError::PermissionDenied(err),
            other => StoreError::StoreFailed(other),
        }
    }
}

impl From<BufferError> for StoreError {
    fn from(err: BufferError) -> Self {
        StoreError::decode("", err)
    }
}

/// Result type alias for StoreError
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Scan root is missing or not a directory
    #[error("Invalid scan root '{path}': {reason}")]
    InvalidRoot { path: PathBuf, reason: String },

    /// Invalid exclude pattern
    #[error("Invalid exclude pattern '{pattern}': {reason}")]
    InvalidExcludePattern { pattern: String, reason: String },

    /// Database path error
    #[error("Invalid database path '{path}': {reason}")]
    InvalidDatabasePath { path: PathBuf, reason: String },
}

/// Indexer errors
#[derive(Error, Debug)]
pub enum IndexError {
    /// Store errors while writing records or the report
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Scan root could not be read
    #[error("Failed to read '{path}': {source}")]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Scan root path is not valid UTF-8
    #[error("Scan root '{0}' is not valid UTF-8")]
    NonUtf8Root(PathBuf),

    /// Interrupted by signal
    #[error("Index interrupted by signal")]
    Interrupted,

    /// Writer channel closed unexpectedly
    #[error("Writer channel closed unexpectedly")]
    ChannelClosed,

    /// Writer thread panicked
    #[error("Writer thread panicked")]
    WriterPanicked,

    /// Writer thread could not be started
    #[error("Failed to spawn writer thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type alias for IndexError
pub type IndexResult<T> = std::result::Result<T, IndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_maps_to_truncated_input() {
        let err = StoreError::decode(
            "8/64",
            BufferError::Truncated {
                needed: 1,
                remaining: 0,
            },
        );
        assert!(matches!(
            err,
            StoreError::TruncatedInput {
                needed: 1,
                remaining: 0
            }
        ));
    }

    #[test]
    fn test_overflow_maps_to_corrupt_record() {
        let err = StoreError::decode("8/64", BufferError::Overflow { offset: 3 });
        match err {
            StoreError::CorruptRecord { key, .. } => assert_eq!(key, "8/64"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_backend_permission_denied_conversion() {
        let backend = BackendError::PermissionDenied {
            path: PathBuf::from("/tmp/x.db"),
        };
        let err: StoreError = backend.into();
        assert!(matches!(err, StoreError::PermissionDenied(_)));

        let io = BackendError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        let err: StoreError = io.into();
        assert!(matches!(err, StoreError::StoreFailed(BackendError::Io(_))));
    }

    #[test]
    fn test_error_conversion() {
        let store_err = StoreError::PathNotFound {
            key: "/missing".into(),
        };
        assert!(store_err.is_not_found());
        let index_err: IndexError = store_err.into();
        assert!(matches!(index_err, IndexError::Store(_)));
    }
}
