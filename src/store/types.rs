//! Data model for directory records and index reports

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt;
use std::fs::Metadata;
use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::ops::AddAssign;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Identifies a directory independent of its path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DeviceInode {
    pub device: u64,
    pub inode: u64,
}

impl DeviceInode {
    pub const fn new(device: u64, inode: u64) -> Self {
        Self { device, inode }
    }

    /// Identity of the file described by `metadata`
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self::new(metadata.dev(), metadata.ino())
    }
}

impl fmt::Display for DeviceInode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:x}/{:x}", self.device, self.inode)
    }
}

/// Which of the two sizes to look at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SizeKind {
    /// Logical length
    Apparent,
    /// Allocated on disk
    #[default]
    Actual,
}

/// Apparent and allocated byte counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Size {
    pub apparent: u64,
    pub actual: u64,
}

impl Size {
    pub const ZERO: Size = Size {
        apparent: 0,
        actual: 0,
    };

    pub const fn new(apparent: u64, actual: u64) -> Self {
        Self { apparent, actual }
    }

    /// Sizes of a file from its metadata (`st_size`, `st_blocks` x 512)
    pub fn from_metadata(metadata: &Metadata) -> Self {
        Self::new(metadata.len(), metadata.blocks().saturating_mul(512))
    }

    pub fn get(&self, kind: SizeKind) -> u64 {
        match kind {
            SizeKind::Apparent => self.apparent,
            SizeKind::Actual => self.actual,
        }
    }
}

impl AddAssign for Size {
    fn add_assign(&mut self, other: Size) {
        self.apparent = self.apparent.saturating_add(other.apparent);
        self.actual = self.actual.saturating_add(other.actual);
    }
}

/// Type of a directory entry
///
/// The numeric codes are part of the on-disk format and never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum FileType {
    BlockDevice = 0,
    CharDevice = 1,
    Directory = 2,
    Fifo = 3,
    Symlink = 4,
    Regular = 5,
    Socket = 6,
    Unknown = 7,
}

impl FileType {
    /// Convert from the stored code
    pub fn from_code(code: u64) -> Option<Self> {
        let kind = match code {
            0 => FileType::BlockDevice,
            1 => FileType::CharDevice,
            2 => FileType::Directory,
            3 => FileType::Fifo,
            4 => FileType::Symlink,
            5 => FileType::Regular,
            6 => FileType::Socket,
            7 => FileType::Unknown,
            _ => return None,
        };
        Some(kind)
    }

    /// Stored code
    pub fn code(&self) -> u64 {
        *self as u64
    }

    /// Convert from a std file type (symlinks are not followed)
    pub fn from_std(file_type: std::fs::FileType) -> Self {
        if file_type.is_dir() {
            FileType::Directory
        } else if file_type.is_file() {
            FileType::Regular
        } else if file_type.is_symlink() {
            FileType::Symlink
        } else if file_type.is_block_device() {
            FileType::BlockDevice
        } else if file_type.is_char_device() {
            FileType::CharDevice
        } else if file_type.is_fifo() {
            FileType::Fifo
        } else if file_type.is_socket() {
            FileType::Socket
        } else {
            FileType::Unknown
        }
    }

    pub fn is_dir(&self) -> bool {
        *self == FileType::Directory
    }

    /// Suffix used when listing entries, like `ls -F`
    pub fn marker(&self) -> &'static str {
        match self {
            FileType::Directory => "/",
            FileType::Symlink => "@",
            FileType::Fifo => "|",
            FileType::Socket => "=",
            _ => "",
        }
    }
}

/// One child of a directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Raw name bytes; never contains NUL
    pub name: Vec<u8>,
    pub size: Size,
    kind: FileType,
    child: Option<DeviceInode>,
}

impl DirectoryEntry {
    /// A subdirectory, locatable as its own record through `child`
    pub fn directory(name: impl Into<Vec<u8>>, size: Size, child: DeviceInode) -> Self {
        Self {
            name: name.into(),
            size,
            kind: FileType::Directory,
            child: Some(child),
        }
    }

    /// Any entry that is not a directory
    ///
    /// A directory without a child identity cannot be stored, so passing
    /// `FileType::Directory` logs a warning and records the entry as
    /// `Unknown`. Use [`DirectoryEntry::directory`] for subdirectories.
    pub fn file(name: impl Into<Vec<u8>>, size: Size, kind: FileType) -> Self {
        let name = name.into();
        let kind = if kind.is_dir() {
            warn!(
                name = %String::from_utf8_lossy(&name),
                "directory entry without child identity, storing as unknown"
            );
            FileType::Unknown
        } else {
            kind
        };
        Self {
            name,
            size,
            kind,
            child: None,
        }
    }

    pub fn kind(&self) -> FileType {
        self.kind
    }

    /// Identity of the subdirectory; `None` for every other type
    pub fn child(&self) -> Option<DeviceInode> {
        self.child
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }

    /// Name for display, with invalid UTF-8 replaced
    pub fn name_lossy(&self) -> String {
        String::from_utf8_lossy(&self.name).into_owned()
    }
}

/// One directory's parent link and direct entries
///
/// `file_count`, `dir_count` and `size_total` cover direct entries only
/// and are never stored; they are rebuilt as entries are added or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRecord {
    pub devino: DeviceInode,
    pub parent: DeviceInode,
    entries: Vec<DirectoryEntry>,
    file_count: u64,
    dir_count: u64,
    size_total: Size,
}

impl DirectoryRecord {
    pub fn new(devino: DeviceInode, parent: DeviceInode) -> Self {
        Self {
            devino,
            parent,
            entries: Vec::new(),
            file_count: 0,
            dir_count: 0,
            size_total: Size::ZERO,
        }
    }

    /// Append an entry, keeping enumeration order
    pub fn push(&mut self, entry: DirectoryEntry) {
        self.account(entry.kind, entry.size);
        self.entries.push(entry);
    }

    /// Count an entry toward the aggregates without listing it
    pub(crate) fn account(&mut self, kind: FileType, size: Size) {
        if kind.is_dir() {
            self.dir_count += 1;
        } else {
            self.file_count += 1;
        }
        self.size_total += size;
    }

    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Non-directory entries counted
    pub fn file_count(&self) -> u64 {
        self.file_count
    }

    /// Directory entries counted
    pub fn dir_count(&self) -> u64 {
        self.dir_count
    }

    /// Sum of direct entry sizes
    pub fn size_total(&self) -> Size {
        self.size_total
    }

    /// Look up a direct entry by name
    pub fn find(&self, name: &[u8]) -> Option<&DirectoryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Entries ordered largest first
    pub fn sorted_by_size(&self, kind: SizeKind) -> Vec<&DirectoryEntry> {
        let mut sorted: Vec<_> = self.entries.iter().collect();
        sorted.sort_by(|a, b| {
            b.size
                .get(kind)
                .cmp(&a.size.get(kind))
                .then_with(|| a.name.cmp(&b.name))
        });
        sorted
    }
}

/// Seconds and microseconds since the Unix epoch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Timestamp {
    pub secs: u64,
    pub micros: u32,
}

impl Timestamp {
    pub const fn new(secs: u64, micros: u32) -> Self {
        Self { secs, micros }
    }

    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Times before the epoch clamp to zero
    pub fn from_system_time(time: SystemTime) -> Self {
        let since = time.duration_since(UNIX_EPOCH).unwrap_or_default();
        Self::new(since.as_secs(), since.subsec_micros())
    }

    /// Local wall-clock time, if representable
    pub fn to_local(&self) -> Option<DateTime<Local>> {
        let secs = i64::try_from(self.secs).ok()?;
        DateTime::from_timestamp(secs, self.micros.saturating_mul(1000))
            .map(|utc| utc.with_timezone(&Local))
    }

    /// Time elapsed from `earlier` to `self`, zero if negative
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        let this = Duration::new(self.secs, self.micros.saturating_mul(1000));
        let that = Duration::new(earlier.secs, earlier.micros.saturating_mul(1000));
        this.saturating_sub(that)
    }
}

/// Summary of one completed scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    /// Scan root
    pub path: String,
    pub devino: DeviceInode,
    pub time_start: Timestamp,
    pub time_stop: Timestamp,
    pub file_count: u64,
    pub dir_count: u64,
    pub size: Size,
}

impl IndexReport {
    /// Wall time the scan took
    pub fn duration(&self) -> Duration {
        self.time_stop.duration_since(self.time_start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_codes_are_stable() {
        let expected = [
            (FileType::BlockDevice, 0),
            (FileType::CharDevice, 1),
            (FileType::Directory, 2),
            (FileType::Fifo, 3),
            (FileType::Symlink, 4),
            (FileType::Regular, 5),
            (FileType::Socket, 6),
            (FileType::Unknown, 7),
        ];
        for (kind, code) in expected {
            assert_eq!(kind.code(), code);
            assert_eq!(FileType::from_code(code), Some(kind));
        }
        assert_eq!(FileType::from_code(8), None);
    }

    #[test]
    fn test_file_entry_never_carries_child() {
        let entry = DirectoryEntry::file("x", Size::ZERO, FileType::Directory);
        assert_eq!(entry.kind(), FileType::Unknown);
        assert_eq!(entry.child(), None);

        let mut record = DirectoryRecord::new(DeviceInode::new(8, 100), DeviceInode::new(8, 1));
        record.push(entry);
        assert_eq!(record.file_count(), 1);
        assert_eq!(record.dir_count(), 0);

        let dir = DirectoryEntry::directory("sub", Size::ZERO, DeviceInode::new(8, 101));
        assert!(dir.is_dir());
        assert_eq!(dir.child(), Some(DeviceInode::new(8, 101)));
    }

    #[test]
    fn test_record_aggregates() {
        let mut record = DirectoryRecord::new(DeviceInode::new(8, 100), DeviceInode::new(8, 1));
        record.push(DirectoryEntry::file("a.txt", Size::new(10, 12), FileType::Regular));
        record.push(DirectoryEntry::directory(
            "sub",
            Size::new(5, 4096),
            DeviceInode::new(8, 101),
        ));
        record.push(DirectoryEntry::file("l", Size::new(3, 0), FileType::Symlink));

        assert_eq!(record.file_count(), 2);
        assert_eq!(record.dir_count(), 1);
        assert_eq!(record.size_total(), Size::new(18, 4108));
        assert!(record.find(b"sub").is_some());
        assert!(record.find(b"nope").is_none());

        let sorted: Vec<_> = record
            .sorted_by_size(SizeKind::Actual)
            .iter()
            .map(|e| e.name_lossy())
            .collect();
        assert_eq!(sorted, vec!["sub", "a.txt", "l"]);
    }

    #[test]
    fn test_devino_display() {
        assert_eq!(DeviceInode::new(8, 100).to_string(), "8/64");
        assert_eq!(DeviceInode::new(0xfd01, 0).to_string(), "fd01/0");
    }

    #[test]
    fn test_timestamp_duration() {
        let start = Timestamp::new(100, 900_000);
        let stop = Timestamp::new(102, 100_000);
        assert_eq!(stop.duration_since(start), Duration::from_millis(1200));
        assert_eq!(start.duration_since(stop), Duration::ZERO);
        assert!(Timestamp::new(1_700_000_000, 0).to_local().is_some());
    }
}
