//! Git object identifier (SHA-1 hash)
//!
//! Object IDs are 20-byte SHA-1 hashes, written as 40 lowercase hexadecimal
//! characters. They uniquely identify all objects in Git (blobs, trees,
//! commits, tags).
//!
//! ## Format
//!
//! - Full: 40 hex characters (e.g., "ce013625030ba8dba906f756967f9e9ca394464a")
//! - Short: First 7 characters (e.g., "ce01362")
//!
//! ## Storage
//!
//! Objects are stored in `.git/objects/<first-2-chars>/<remaining-38-chars>`

use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::{OBJECT_ID_LENGTH, OBJECT_ID_SIZE};
use crate::errors::{Error, Result};
use sha1::{Digest, Sha1};
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Git object identifier (SHA-1 hash)
///
/// Always exactly 20 bytes; immutable once constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId([u8; OBJECT_ID_SIZE]);

impl ObjectId {
    /// Id of the tree with no entries.
    pub const EMPTY_TREE: ObjectId = ObjectId([
        0x4b, 0x82, 0x5d, 0xc6, 0x42, 0xcb, 0x6e, 0xb9, 0xa0, 0x60, 0xe5, 0x4b, 0xf8, 0xd6, 0x92,
        0x88, 0xfb, 0xee, 0x49, 0x04,
    ]);

    /// Parse and validate an object ID from its textual form
    ///
    /// # Arguments
    ///
    /// * `id` - 40-character lowercase hexadecimal string
    ///
    /// # Returns
    ///
    /// Validated ObjectId or `FormatError` if invalid length/characters
    pub fn try_parse(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref();

        if id.len() != OBJECT_ID_LENGTH {
            return Err(Error::Format(format!(
                "expected {} hex characters, got {}",
                OBJECT_ID_LENGTH,
                id.len()
            )));
        }
        if !id.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f')) {
            return Err(Error::Format(format!("invalid characters in {id:?}")));
        }

        let mut bytes = [0u8; OBJECT_ID_SIZE];
        hex::decode_to_slice(id, &mut bytes).map_err(|e| Error::Format(e.to_string()))?;

        Ok(Self(bytes))
    }

    /// Build an object ID from its 20-byte binary form
    ///
    /// No validation beyond the length; the bytes are trusted.
    pub fn from_raw(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; OBJECT_ID_SIZE] = bytes.try_into().map_err(|_| {
            Error::Format(format!(
                "expected {} raw bytes, got {}",
                OBJECT_ID_SIZE,
                bytes.len()
            ))
        })?;

        Ok(Self(bytes))
    }

    /// Hash `content` the way the object database keys it:
    /// `<type> <len>\0<content>`
    pub fn hash_object(object_type: ObjectType, content: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(format!("{} {}\0", object_type.as_str(), content.len()));
        hasher.update(content);

        Self::from_digest(&hasher.finalize())
    }

    /// Hash an already framed object (`<type> <len>\0<content>`)
    pub fn hash_framed(framed: &[u8]) -> Self {
        let mut hasher = Sha1::new();
        hasher.update(framed);

        Self::from_digest(&hasher.finalize())
    }

    fn from_digest(digest: &[u8]) -> Self {
        let mut bytes = [0u8; OBJECT_ID_SIZE];
        bytes.copy_from_slice(digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; OBJECT_ID_SIZE] {
        &self.0
    }

    /// Write the object ID in binary format (20 bytes)
    ///
    /// Used when serializing tree objects and index entries.
    pub fn write_h40_to<W: io::Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(&self.0)
    }

    /// Read an object ID from binary format (20 bytes)
    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut bytes = [0u8; OBJECT_ID_SIZE];
        reader.read_exact(&mut bytes)?;

        Ok(Self(bytes))
    }

    /// Convert to file system path for object storage
    ///
    /// Splits the hash as `XX/YYYYYY...` where XX is the first 2 chars.
    pub fn to_path(&self) -> PathBuf {
        let hex = self.to_string();
        let (dir, file) = hex.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Get abbreviated form of the object ID
    ///
    /// # Returns
    ///
    /// First 7 characters of the hash (standard Git abbreviation)
    pub fn to_short_oid(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(7);
        hex
    }
}

impl FromStr for ObjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::try_parse(s)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}
