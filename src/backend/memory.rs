//! In-memory backend

use crate::backend::{KvStore, OpenMode};
use crate::error::{BackendError, BackendResult};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// `BTreeMap`-backed store honoring the read-only contract
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    read_only: bool,
}

impl MemoryStore {
    /// Empty writable store
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view over existing contents
    pub fn read_only(entries: BTreeMap<Vec<u8>, Vec<u8>>) -> Self {
        Self {
            entries,
            read_only: true,
        }
    }

    /// Number of keys stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of every key/value pair
    pub fn entries(&self) -> &BTreeMap<Vec<u8>, Vec<u8>> {
        &self.entries
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        if self.read_only {
            return Err(BackendError::PermissionDenied {
                path: PathBuf::from(":memory:"),
            });
        }
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn mode(&self) -> OpenMode {
        if self.read_only {
            OpenMode::ReadOnly
        } else {
            OpenMode::ReadWriteCreate
        }
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces() {
        let mut store = MemoryStore::new();
        store.put(b"k", b"one").unwrap();
        store.put(b"k", b"two").unwrap();
        assert_eq!(store.get(b"k").unwrap(), Some(b"two".to_vec()));
        assert_eq!(store.get(b"missing").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_read_only_rejects_put() {
        let mut seed = BTreeMap::new();
        seed.insert(b"k".to_vec(), b"v".to_vec());
        let mut store = MemoryStore::read_only(seed);

        assert_eq!(store.mode(), OpenMode::ReadOnly);
        assert!(matches!(
            store.put(b"k", b"other"),
            Err(BackendError::PermissionDenied { .. })
        ));
        assert_eq!(store.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
