//! diskindex - Disk Usage Index Storage Engine
//!
//! Stores a scanned directory tree in a key-value database so disk usage
//! can be browsed later without touching the filesystem again.
//!
//! # Features
//!
//! - **Compact Records**: Each directory is one varint-encoded record
//!   holding its direct entries and sizes, keyed by device and inode.
//!
//! - **Scan Reports**: Every indexed root gets a summary report and a slot
//!   in a registry, so all scans in a database can be listed.
//!
//! - **Pluggable Backends**: SQLite by default, RocksDB behind the
//!   `rocksdb` feature, and an in-memory store for tests.
//!
//! - **Bounded Memory Indexing**: The indexer walks post-order with an
//!   explicit stack and streams finished records to a writer thread.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────┐     ┌──────────────────────────────┐
//! │          Indexer           │     │       info / ls readers      │
//! │  post-order walk (stack)   │     │  reports(), resolve_path()   │
//! └─────────────┬──────────────┘     └──────────────┬───────────────┘
//!               │ DirectoryRecord                   │
//!               ▼ (crossbeam bounded)               │
//! ┌────────────────────────────┐                    │
//! │       Writer Thread        │                    │
//! └─────────────┬──────────────┘                    │
//!               ▼                                   ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Database (store)                           │
//! │  dir records: hex(dev)/hex(ino)   reports: /abs/path            │
//! │  registry: duc_index_reports      codec: varint Buffer          │
//! └─────────────────────────────┬───────────────────────────────────┘
//!                               ▼
//!            ┌─────────────────────────────────────┐
//!            │  KvStore: SQLite | RocksDB | memory │
//!            └─────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Index a tree into ~/.diskindex.db
//! diskindex index /home
//!
//! # List indexed paths
//! diskindex info
//!
//! # Largest entries of a directory
//! diskindex ls /home/user -n 20
//! ```

pub mod backend;
pub mod buffer;
pub mod config;
pub mod error;
pub mod index;
pub mod progress;
pub mod store;

pub use backend::{KvStore, OpenMode};
pub use config::{CliArgs, IndexConfig};
pub use error::{IndexError, IndexResult, StoreError, StoreResult};
pub use index::{IndexOptions, Indexer};
pub use store::{Database, DeviceInode, DirectoryEntry, DirectoryRecord, FileType, IndexReport, Size};
