//! Index report encoding and the report registry
//!
//! A report is stored under the raw bytes of its scan root path:
//!
//! ```text
//! string path
//! varint devino.device, varint devino.inode
//! varint start.secs, varint start.micros
//! varint stop.secs, varint stop.micros
//! varint file_count, varint dir_count
//! varint size.apparent, varint size.actual
//! ```
//!
//! The registry is a single value under [`REGISTRY_KEY`]: fixed-size,
//! NUL-padded path slots concatenated in first-seen order with no count
//! prefix.

use crate::buffer::Buffer;
use crate::error::{StoreError, StoreResult};
use crate::store::types::{DeviceInode, IndexReport, Size, Timestamp};

/// Well-known key holding the registry, shared with existing databases
pub const REGISTRY_KEY: &[u8] = b"duc_index_reports";

/// Bytes per registry slot
pub const PATH_SLOT_SIZE: usize = 16384;

/// Longest report path; one byte of each slot stays NUL
pub const MAX_PATH_LEN: usize = PATH_SLOT_SIZE - 1;

/// Check that `path` can be used as a report key
pub fn validate_path(path: &str) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidReportPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    if !path.starts_with('/') {
        return Err(invalid("must be absolute"));
    }
    if path.as_bytes().contains(&0) {
        return Err(invalid("contains a NUL byte"));
    }
    if path.len() > MAX_PATH_LEN {
        return Err(invalid(&format!(
            "{} bytes, at most {MAX_PATH_LEN} allowed",
            path.len()
        )));
    }
    Ok(())
}

/// NUL-padded registry slot for `path`
pub fn path_slot(path: &str) -> StoreResult<Vec<u8>> {
    validate_path(path)?;
    let mut slot = vec![0u8; PATH_SLOT_SIZE];
    slot[..path.len()].copy_from_slice(path.as_bytes());
    Ok(slot)
}

/// Serialize a report
pub fn encode_report(report: &IndexReport) -> Vec<u8> {
    let mut b = Buffer::with_capacity(report.path.len() + 64);

    b.put_string(report.path.as_bytes());
    b.put_varint(report.devino.device);
    b.put_varint(report.devino.inode);
    b.put_varint(report.time_start.secs);
    b.put_varint(u64::from(report.time_start.micros));
    b.put_varint(report.time_stop.secs);
    b.put_varint(u64::from(report.time_stop.micros));
    b.put_varint(report.file_count);
    b.put_varint(report.dir_count);
    b.put_varint(report.size.apparent);
    b.put_varint(report.size.actual);

    b.into_inner()
}

/// Rebuild a report stored under `key`
pub fn decode_report(key: &str, value: Vec<u8>) -> StoreResult<IndexReport> {
    let err = |e| StoreError::decode(key, e);
    let mut b = Buffer::from_vec(value);

    let path = String::from_utf8(b.get_string().map_err(err)?)
        .map_err(|_| StoreError::corrupt(key, "report path is not valid UTF-8"))?;

    let mut next = || b.get_varint().map_err(err);

    let devino = DeviceInode::new(next()?, next()?);
    let start_secs = next()?;
    let start_micros = micros(key, next()?)?;
    let stop_secs = next()?;
    let stop_micros = micros(key, next()?)?;
    let file_count = next()?;
    let dir_count = next()?;
    let size = Size::new(next()?, next()?);

    if !b.is_exhausted() {
        return Err(StoreError::corrupt(
            key,
            format!("{} trailing byte(s) after report", b.remaining()),
        ));
    }

    Ok(IndexReport {
        path,
        devino,
        time_start: Timestamp::new(start_secs, start_micros),
        time_stop: Timestamp::new(stop_secs, stop_micros),
        file_count,
        dir_count,
        size,
    })
}

fn micros(key: &str, value: u64) -> StoreResult<u32> {
    match u32::try_from(value) {
        Ok(v) if v < 1_000_000 => Ok(v),
        _ => Err(StoreError::corrupt(
            key,
            format!("microseconds out of range: {value}"),
        )),
    }
}

/// Decoded view of the registry value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    value: Vec<u8>,
}

impl Registry {
    /// Wrap the raw registry value
    pub fn from_value(value: Vec<u8>) -> StoreResult<Self> {
        if value.len() % PATH_SLOT_SIZE != 0 {
            return Err(StoreError::corrupt(
                &String::from_utf8_lossy(REGISTRY_KEY),
                format!(
                    "length {} is not a multiple of the {PATH_SLOT_SIZE}-byte slot size",
                    value.len()
                ),
            ));
        }
        Ok(Self { value })
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.value.len() / PATH_SLOT_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Path in slot `index`; `None` past the end or for an empty slot
    pub fn path(&self, index: usize) -> StoreResult<Option<String>> {
        let slot = index.checked_mul(PATH_SLOT_SIZE).and_then(|start| {
            let end = start.checked_add(PATH_SLOT_SIZE)?;
            self.value.get(start..end)
        });
        let Some(slot) = slot else {
            return Ok(None);
        };

        let end = slot.iter().position(|&b| b == 0).unwrap_or(slot.len());
        if end == 0 {
            return Ok(None);
        }

        String::from_utf8(slot[..end].to_vec()).map(Some).map_err(|_| {
            StoreError::corrupt(
                &String::from_utf8_lossy(REGISTRY_KEY),
                format!("slot {index} is not valid UTF-8"),
            )
        })
    }

    /// Every non-empty path, in registry order
    pub fn paths(&self) -> StoreResult<Vec<String>> {
        let mut paths = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            if let Some(path) = self.path(i)? {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    pub fn contains(&self, path: &str) -> StoreResult<bool> {
        Ok(self.paths()?.iter().any(|p| p == path))
    }

    /// Append a slot for `path`
    pub fn append(&mut self, path: &str) -> StoreResult<()> {
        let slot = path_slot(path)?;
        self.value.extend_from_slice(&slot);
        Ok(())
    }

    /// Raw value to store back under [`REGISTRY_KEY`]
    pub fn as_bytes(&self) -> &[u8] {
        &self.value
    }
}
