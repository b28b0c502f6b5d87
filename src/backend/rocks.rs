//! RocksDB key-value backend
//!
//! Uses the default column family as the single keyspace. Options are
//! tuned for the scan workload: many small writes from one thread,
//! point lookups on read.

use crate::backend::{KvStore, OpenMode};
use crate::error::{BackendError, BackendResult};
use rocksdb::{BlockBasedOptions, DBCompressionType, Options, WriteBatch, DB};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Database options for write-optimized scans
pub fn get_db_options() -> Options {
    let mut opts = Options::default();
    opts.create_if_missing(true);

    // Increase parallelism
    opts.increase_parallelism(num_cpus::get() as i32);
    opts.set_max_background_jobs(4);

    // Write buffer: 2 x 32MB
    opts.set_write_buffer_size(32 * 1024 * 1024);
    opts.set_max_write_buffer_number(2);

    // Bloom filter for point lookups (10 bits/key)
    let mut block_opts = BlockBasedOptions::default();
    block_opts.set_bloom_filter(10.0, false);
    block_opts.set_cache_index_and_filter_blocks(true);
    opts.set_block_based_table_factory(&block_opts);

    // Compression: LZ4 for speed
    opts.set_compression_type(DBCompressionType::Lz4);

    opts
}

/// RocksDB-backed store
pub struct RocksStore {
    db: DB,
    path: PathBuf,
    mode: OpenMode,
}

impl RocksStore {
    /// Open or create a database directory
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> BackendResult<Self> {
        let path = path.as_ref().to_path_buf();
        let opts = get_db_options();

        let db = match mode {
            OpenMode::ReadWriteCreate => DB::open(&opts, &path)?,
            OpenMode::ReadOnly => DB::open_for_read_only(&opts, &path, false)?,
        };

        debug!(path = %path.display(), ?mode, "opened RocksDB store");
        Ok(Self { db, path, mode })
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

impl KvStore for RocksStore {
    fn get(&self, key: &[u8]) -> BackendResult<Option<Vec<u8>>> {
        Ok(self.db.get(key)?)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> BackendResult<()> {
        self.check_writable()?;
        Ok(self.db.put(key, value)?)
    }

    fn put_batch(&mut self, entries: &[(Vec<u8>, Vec<u8>)]) -> BackendResult<()> {
        self.check_writable()?;

        let mut batch = WriteBatch::default();
        for (key, value) in entries {
            batch.put(key, value);
        }
        Ok(self.db.write(batch)?)
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn close(self: Box<Self>) -> BackendResult<()> {
        if !self.mode.is_read_only() {
            self.db.flush()?;
        }
        debug!(path = %self.path.display(), "closed RocksDB store");
        Ok(())
    }
}
