//! Directory record encoding
//!
//! A directory record is stored under `hex(device)/hex(inode)` of the
//! directory itself. The value is:
//!
//! ```text
//! varint parent.device
//! varint parent.inode
//! repeated until end of value:
//!     string name
//!     varint size.apparent
//!     varint size.actual
//!     varint type
//!     [varint child.device, varint child.inode]   only when type == directory
//! ```

use crate::buffer::Buffer;
use crate::error::{StoreError, StoreResult};
use crate::store::types::{DeviceInode, DirectoryEntry, DirectoryRecord, FileType, Size};

/// Key of the record for `devino`
pub fn mkkey(devino: DeviceInode) -> String {
    devino.to_string()
}

/// Serialize a record's parent link and entries
pub fn encode_directory(record: &DirectoryRecord) -> Vec<u8> {
    // Most names are short; a rough per-entry estimate avoids regrowth
    let mut b = Buffer::with_capacity(4 + record.entries().len() * 24);

    b.put_varint(record.parent.device);
    b.put_varint(record.parent.inode);

    for entry in record.entries() {
        b.put_string(&entry.name);
        b.put_varint(entry.size.apparent);
        b.put_varint(entry.size.actual);
        b.put_varint(entry.kind().code());
        if entry.is_dir() {
            let child = entry.child().unwrap_or_default();
            b.put_varint(child.device);
            b.put_varint(child.inode);
        }
    }

    b.into_inner()
}

/// Rebuild the record stored for `devino`
///
/// Entries with an empty name are left out of the entry list but still
/// counted in the aggregates; older databases rely on those totals.
pub fn decode_directory(devino: DeviceInode, value: Vec<u8>) -> StoreResult<DirectoryRecord> {
    let key = mkkey(devino);
    let err = |e| StoreError::decode(&key, e);
    let mut b = Buffer::from_vec(value);

    let parent = DeviceInode::new(b.get_varint().map_err(err)?, b.get_varint().map_err(err)?);
    let mut record = DirectoryRecord::new(devino, parent);

    while !b.is_exhausted() {
        let name = b.get_string().map_err(err)?;
        let size = Size::new(b.get_varint().map_err(err)?, b.get_varint().map_err(err)?);
        let code = b.get_varint().map_err(err)?;
        let kind = FileType::from_code(code)
            .ok_or_else(|| StoreError::corrupt(&key, format!("unknown file type code {code}")))?;

        let child = if kind.is_dir() {
            Some(DeviceInode::new(
                b.get_varint().map_err(err)?,
                b.get_varint().map_err(err)?,
            ))
        } else {
            None
        };

        if name.is_empty() {
            record.account(kind, size);
            continue;
        }

        match child {
            Some(child) => record.push(DirectoryEntry::directory(name, size, child)),
            None => record.push(DirectoryEntry::file(name, size, kind)),
        }
    }

    Ok(record)
}
