//! Index entry representation
//!
//! Each entry in the index represents a staged path with:
//! - Path relative to the repository root
//! - Content hash (object ID)
//! - File mode
//! - Stat metadata (size, timestamps, device/inode, owner)
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format with 8-byte alignment for efficient reading.
//! The stat metadata enables fast change detection without reading file content.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::{ENTRY_BLOCK, ENTRY_MIN_SIZE};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use bitflags::bitflags;
use byteorder::{ByteOrder, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::cmp::min;
use std::io::{BufRead, Write};

/// Largest path length recorded in the flags field
const MAX_PATH_SIZE: usize = 0xfff;

/// Offset of the path inside a serialized entry
const PATH_OFFSET: usize = 62;

bitflags! {
    /// Flag bits of an index entry, above the 12-bit name length
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct EntryFlags: u16 {
        const ASSUME_VALID = 0x8000;
        const EXTENDED = 0x4000;
        const STAGE_MASK = 0x3000;
    }
}

/// Index entry representing a staged path
///
/// Entries are ordered and compared by path only: an index holds at most one
/// entry per path.
#[derive(Debug, Clone, new)]
pub struct IndexEntry {
    /// Slash-separated path relative to the repository root
    pub path: String,
    pub oid: ObjectId,
    pub mode: EntryMode,
    #[new(default)]
    pub metadata: EntryMetadata,
}

/// Stat data recorded alongside an index entry
///
/// ## Timestamps
///
/// - `ctime`: File status change time (inode modification)
/// - `mtime`: File content modification time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub ctime: u32,
    pub ctime_nsec: u32,
    pub mtime: u32,
    pub mtime_nsec: u32,
    pub dev: u32,
    pub ino: u32,
    pub uid: u32,
    pub gid: u32,
    /// File size in bytes, truncated to 32 bits
    pub size: u32,
    pub flags: EntryFlags,
}

impl IndexEntry {
    pub fn with_metadata(mut self, metadata: EntryMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn basename(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// Every directory prefix of the path, outermost first
    ///
    /// `a/b/c` yields `a` and `a/b`.
    pub fn parent_dirs(&self) -> Vec<&str> {
        self.path
            .match_indices('/')
            .map(|(index, _)| &self.path[..index])
            .collect()
    }

    /// Check the entry against the schema accepted by the index
    ///
    /// Paths must be non-empty, relative, free of NUL bytes and of empty,
    /// `.`, `..` and `.git` components.
    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::Validation(format!("path {:?} {}", self.path, reason));

        if self.path.is_empty() {
            return Err(Error::Validation(String::from("path is empty")));
        }
        if self.path.contains('\0') {
            return Err(invalid("contains a NUL byte"));
        }
        if self.path.starts_with('/') {
            return Err(invalid("is absolute"));
        }
        for component in self.path.split('/') {
            match component {
                "" => return Err(invalid("has an empty component")),
                "." | ".." => return Err(invalid("has a relative component")),
                component if component.eq_ignore_ascii_case(".git") => {
                    return Err(invalid("enters a .git directory"));
                }
                _ => {}
            }
        }
        if self.metadata.flags.contains(EntryFlags::EXTENDED) {
            return Err(invalid("uses extended flags"));
        }
        if self.metadata.flags.intersects(EntryFlags::STAGE_MASK) {
            return Err(invalid("is a conflict stage entry"));
        }

        Ok(())
    }

    fn flags_field(&self) -> u16 {
        let name_length = min(self.path.len(), MAX_PATH_SIZE) as u16;
        (self.metadata.flags & EntryFlags::ASSUME_VALID).bits() | name_length
    }
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for IndexEntry {}

impl PartialOrd for IndexEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IndexEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.path.as_bytes().cmp(other.path.as_bytes())
    }
}

impl Packable for IndexEntry {
    fn serialize(&self) -> Result<Bytes> {
        let metadata = &self.metadata;

        let mut entry_bytes = Vec::with_capacity(ENTRY_MIN_SIZE + self.path.len());
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.ctime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.ctime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.mtime)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.mtime_nsec)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.dev)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.ino)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(self.mode.as_u32())?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.uid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.gid)?;
        entry_bytes.write_u32::<byteorder::NetworkEndian>(metadata.size)?;
        self.oid.write_h40_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<byteorder::NetworkEndian>(self.flags_field())?;
        entry_bytes.write_all(self.path.as_bytes())?;

        // Ensure the entry bytes are padded to ENTRY_BLOCK size with null bytes
        entry_bytes.push(0); // There must be at least one null byte at the end
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(mut reader: impl BufRead) -> Result<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        if bytes.len() < ENTRY_MIN_SIZE {
            return Err(Error::Corruption(String::from("invalid index entry size")));
        }

        let read_u32 = |offset: usize| byteorder::NetworkEndian::read_u32(&bytes[offset..offset + 4]);

        let mode = EntryMode::try_from(read_u32(24))
            .map_err(|e| Error::Corruption(format!("index entry has {e}")))?;
        let oid = ObjectId::from_raw(&bytes[40..60])?;
        let flags = byteorder::NetworkEndian::read_u16(&bytes[60..62]);

        // Extract the entry path, which is null-terminated
        let path_end = bytes[PATH_OFFSET..]
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| Error::Corruption(String::from("missing null terminator in entry path")))?;
        let path = std::str::from_utf8(&bytes[PATH_OFFSET..PATH_OFFSET + path_end])
            .map_err(|_| Error::Corruption(String::from("invalid UTF-8 in entry path")))?
            .to_string();

        Ok(IndexEntry {
            path,
            oid,
            mode,
            metadata: EntryMetadata {
                ctime: read_u32(0),
                ctime_nsec: read_u32(4),
                mtime: read_u32(8),
                mtime_nsec: read_u32(12),
                dev: read_u32(16),
                ino: read_u32(20),
                uid: read_u32(28),
                gid: read_u32(32),
                size: read_u32(36),
                flags: EntryFlags::from_bits_truncate(flags),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use crate::errors::ErrorKind;
    use rstest::{fixture, rstest};
    use sha1::Digest;
    use std::io::Cursor;

    #[fixture]
    fn oid() -> ObjectId {
        let mut hasher = sha1::Sha1::new();
        hasher.update("test data");
        ObjectId::from_raw(&hasher.finalize()).unwrap()
    }

    fn entry(path: &str, oid: ObjectId) -> IndexEntry {
        IndexEntry::new(path.to_string(), oid, EntryMode::File(FileMode::Regular))
    }

    #[rstest]
    fn test_entry_parent_dirs(oid: ObjectId) {
        let entry = entry("a/b/c", oid);

        pretty_assertions::assert_eq!(entry.parent_dirs(), vec!["a", "a/b"]);
    }

    #[rstest]
    fn test_entry_parent_dirs_root(oid: ObjectId) {
        let entry = entry("a", oid);

        pretty_assertions::assert_eq!(entry.parent_dirs(), Vec::<&str>::new());
    }

    #[rstest]
    fn test_entry_basename(oid: ObjectId) {
        let entry = entry("a/b/c", oid);

        pretty_assertions::assert_eq!(entry.basename(), "c");
    }

    #[rstest]
    #[case("")]
    #[case("/etc/passwd")]
    #[case("a//b")]
    #[case("a/")]
    #[case("./a")]
    #[case("a/../b")]
    #[case(".git/config")]
    #[case("sub/.GIT/HEAD")]
    #[case("nul\0byte")]
    fn malformed_paths_fail_validation(oid: ObjectId, #[case] path: &str) {
        let error = entry(path, oid).validate().unwrap_err();

        pretty_assertions::assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[rstest]
    fn conflict_stage_entries_fail_validation(oid: ObjectId) {
        let metadata = EntryMetadata {
            flags: EntryFlags::from_bits_truncate(0x1000),
            ..Default::default()
        };
        let error = entry("a.txt", oid).with_metadata(metadata).validate().unwrap_err();

        pretty_assertions::assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[rstest]
    #[case("a")]
    #[case("ab")]
    #[case("dir/file.txt")]
    #[case("a-much-longer/path/to/some/deeply/nested/file.rs")]
    fn serialized_entries_are_padded_to_blocks(oid: ObjectId, #[case] path: &str) {
        let metadata = EntryMetadata {
            mtime: 1_700_000_000,
            size: 42,
            flags: EntryFlags::ASSUME_VALID,
            ..Default::default()
        };
        let original = entry(path, oid).with_metadata(metadata);

        let bytes = original.serialize().unwrap();
        let parsed = IndexEntry::deserialize(Cursor::new(bytes.clone())).unwrap();

        pretty_assertions::assert_eq!(bytes.len() % ENTRY_BLOCK, 0);
        pretty_assertions::assert_eq!(parsed.path, original.path);
        pretty_assertions::assert_eq!(parsed.oid, original.oid);
        pretty_assertions::assert_eq!(parsed.metadata, original.metadata);
    }
}
