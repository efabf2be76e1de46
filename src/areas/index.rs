//! Git index (staging area)
//!
//! The index tracks the tree to be written next: one entry per path with its
//! mode and object id. It is either in memory only ([`Index::new`]), backed by
//! an index file ([`Index::open`]), or bound to a repository, in which case
//! it also knows which object database to read and write trees against.
//!
//! ## Index File Format
//!
//! - Header: signature, version and entry count
//! - Entries: sorted by path bytes, each padded to 8 bytes
//! - Extensions: skipped when reading, never written
//! - Checksum: SHA-1 of everything before it
//!
//! ## Data Structures
//!
//! - `entries`: maps paths to their index entries
//! - `children`: maps directory paths to the entry paths below them

use crate::areas::database::{Database, Odb};
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{EntryFlags, IndexEntry};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{
    CHECKSUM_SIZE, ENTRY_BLOCK, ENTRY_MIN_SIZE, HEADER_SIZE, SIGNATURE, VERSION,
};
use crate::artifacts::objects::object::{Packable, ParsedObject, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{Tree, TreeBuilder};
use crate::errors::{Error, IoContext, Result};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::DerefMut;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Size of an extension header: 4-byte signature and 4-byte length
const EXTENSION_HEADER_SIZE: usize = 8;

/// Git index (staging area)
#[derive(Debug, Clone)]
pub struct Index {
    /// Path to the index file, `None` for an in-memory index
    path: Option<Box<Path>>,
    /// Object database of the owning repository
    database: Option<Weak<Database>>,
    /// Staged entries mapped by path
    entries: BTreeMap<String, IndexEntry>,
    /// Directory hierarchy for parent-child conflict checks
    children: BTreeMap<String, BTreeSet<String>>,
    /// Index file header metadata
    header: IndexHeader,
    /// Whether the entries changed since the last load or write
    changed: bool,
}

impl Default for Index {
    fn default() -> Self {
        Self::new()
    }
}

impl Index {
    /// Create an empty in-memory index
    ///
    /// It has no file to write to and no object database to write trees to
    /// unless one is passed to [`Index::write_tree_to`].
    pub fn new() -> Self {
        Index {
            path: None,
            database: None,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::empty(),
            changed: false,
        }
    }

    /// Open an index file, loading it if it exists
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut index = Index {
            path: Some(path.as_ref().into()),
            ..Self::new()
        };
        index.rehydrate()?;

        Ok(index)
    }

    /// Open the index file of a repository whose objects live in `database`
    pub(crate) fn for_repository(path: Box<Path>, database: &Arc<Database>) -> Result<Self> {
        let mut index = Index {
            path: Some(path),
            database: Some(Arc::downgrade(database)),
            ..Self::new()
        };
        index.rehydrate()?;

        Ok(index)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, path: &str) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    /// Entries in canonical order (byte-lexical by path)
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.entries.into_values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.changed = self.changed || !self.entries.is_empty();
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
    }

    /// Insert or replace the entry for `entry.path`
    ///
    /// A file entry replaces any entries below it, and an entry below a
    /// path replaces a file entry at that path.
    pub fn add(&mut self, entry: IndexEntry) -> Result<()> {
        entry.validate()?;

        self.discard_conflicts(&entry);
        self.store_entry(entry);

        self.header.entries_count = self.entries.len() as u32;
        self.changed = true;

        Ok(())
    }

    /// Remove the entry at `path`, or every entry below it if it is a directory
    ///
    /// # Returns
    ///
    /// Whether anything was removed
    pub fn remove(&mut self, path: &str) -> bool {
        let before = self.entries.len();

        self.remove_entry(path);
        self.remove_children(path);

        let removed = self.entries.len() != before;
        if removed {
            self.header.entries_count = self.entries.len() as u32;
            self.changed = true;
        }

        removed
    }

    /// Replace all entries with the flattened contents of a tree
    ///
    /// Subtrees are read from the repository's object database; an
    /// in-memory index can only read trees without subtrees.
    pub fn read_tree(&mut self, tree: &ParsedObject) -> Result<()> {
        let odb = self.bound_odb()?;
        self.read_tree_with(tree, odb.as_ref())
    }

    /// Replace all entries with the flattened contents of a tree whose
    /// subtrees are read from `odb`
    pub fn read_tree_from(&mut self, tree: &ParsedObject, odb: &Odb) -> Result<()> {
        self.read_tree_with(tree, Some(odb))
    }

    fn read_tree_with(&mut self, tree: &ParsedObject, odb: Option<&Odb>) -> Result<()> {
        let root = tree.as_tree()?;

        let mut flattened = Vec::new();
        Self::flatten_tree(root, "", odb, &mut flattened)?;
        for entry in &flattened {
            entry.validate()?;
        }

        // the index only changes once the whole tree has been read
        self.clear();
        for entry in flattened {
            self.add(entry)?;
        }
        self.changed = true;
        debug!(tree = %tree.id(), entries = self.entries.len(), "read tree into index");

        Ok(())
    }

    fn flatten_tree(
        tree: &Tree,
        prefix: &str,
        odb: Option<&Odb>,
        flattened: &mut Vec<IndexEntry>,
    ) -> Result<()> {
        for entry in tree.entries() {
            let name = std::str::from_utf8(&entry.name).map_err(|_| {
                Error::Validation(format!(
                    "tree entry name {:?} is not UTF-8",
                    entry.name_lossy()
                ))
            })?;
            let path = if prefix.is_empty() {
                name.to_string()
            } else {
                format!("{prefix}/{name}")
            };

            if entry.is_tree() {
                let odb = odb.ok_or_else(|| {
                    Error::NotFound(format!("object database to read subtree {path}"))
                })?;
                let subtree = odb.read(&entry.oid)?.into_tree()?;
                Self::flatten_tree(&subtree, &path, Some(odb), flattened)?;
            } else {
                flattened.push(IndexEntry::new(path, entry.oid, entry.mode));
            }
        }

        Ok(())
    }

    /// Write the entries as tree objects into the repository's object database
    ///
    /// # Returns
    ///
    /// The id of the root tree
    pub fn write_tree(&self) -> Result<ObjectId> {
        let odb = self.bound_odb()?.ok_or_else(|| {
            Error::NotFound(String::from("object database for an in-memory index"))
        })?;

        self.write_tree_to(&odb)
    }

    /// Write the entries as tree objects into `odb`
    pub fn write_tree_to(&self, odb: &Odb) -> Result<ObjectId> {
        let tree_oid = TreeBuilder::build(self.entries())?.write(odb)?;
        info!(tree = %tree_oid, entries = self.entries.len(), "wrote tree");

        Ok(tree_oid)
    }

    fn bound_odb(&self) -> Result<Option<Odb>> {
        match &self.database {
            None => Ok(None),
            Some(database) => {
                let database = database.upgrade().ok_or(Error::ClosedHandle("index"))?;
                Ok(Some(Odb::bound(&database)))
            }
        }
    }

    /// Load the index file from disk
    ///
    /// A missing or empty file yields an empty index. Acquires a shared lock
    /// on the index file while reading.
    pub fn rehydrate(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };

        self.clear();
        self.changed = false;

        if !path.exists() {
            return Ok(());
        }

        let mut index_file = std::fs::OpenOptions::new()
            .read(true)
            .open(&path)
            .with_context(|| format!("Unable to open index file {}", path.display()))?;
        let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)
            .with_context(|| format!("Unable to lock index file {}", path.display()))?;

        let file_size = lock
            .deref_mut()
            .metadata()
            .with_context(|| format!("Unable to stat index file {}", path.display()))?
            .len() as usize;
        // if the index file is empty, return early
        if file_size == 0 {
            return Ok(());
        }

        let mut reader = Checksum::new(lock);
        let entries_count = self.parse_header(&mut reader)?;
        let consumed = self.parse_entries(entries_count, &mut reader)?;
        Self::skip_extensions(file_size, HEADER_SIZE + consumed, &mut reader)?;

        reader.verify().inspect_err(|_| {
            warn!(path = %path.display(), "index checksum mismatch");
        })?;
        debug!(path = %path.display(), entries = entries_count, "loaded index");

        Ok(())
    }

    fn parse_header(&self, reader: &mut Checksum) -> Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(std::io::Cursor::new(header_bytes))?;

        if header.marker != SIGNATURE {
            return Err(Error::Corruption(String::from(
                "invalid index file signature",
            )));
        }

        if header.version != VERSION {
            return Err(Error::Corruption(format!(
                "unsupported index file version {}",
                header.version
            )));
        }

        Ok(header.entries_count)
    }

    /// Parse all entries from the index file
    ///
    /// # Returns
    ///
    /// The number of bytes the entries took
    fn parse_entries(&mut self, entries_count: u32, reader: &mut Checksum) -> Result<usize> {
        let mut consumed = 0;

        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes.last() != Some(&0) {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }
            consumed += entry_bytes.len();

            let entry = IndexEntry::deserialize(std::io::Cursor::new(Bytes::from(entry_bytes)))?;
            if entry.metadata.flags.intersects(EntryFlags::STAGE_MASK) {
                return Err(Error::Validation(format!(
                    "index holds an unresolved conflict at {}",
                    entry.path
                )));
            }

            self.store_entry(entry);
        }

        self.header.entries_count = entries_count;

        Ok(consumed)
    }

    /// Skip the extension blocks between the entries and the checksum
    ///
    /// Optional extensions (signature starting with `A`-`Z`) are ignored;
    /// any other extension is one this index does not understand.
    fn skip_extensions(file_size: usize, mut offset: usize, reader: &mut Checksum) -> Result<()> {
        while offset + CHECKSUM_SIZE < file_size {
            let extension_header = reader.read(EXTENSION_HEADER_SIZE)?;
            let signature = &extension_header[..4];
            let size = u32::from_be_bytes([
                extension_header[4],
                extension_header[5],
                extension_header[6],
                extension_header[7],
            ]) as usize;

            if !signature[0].is_ascii_uppercase() {
                return Err(Error::Corruption(format!(
                    "unsupported index extension {:?}",
                    String::from_utf8_lossy(signature)
                )));
            }
            if offset + EXTENSION_HEADER_SIZE + size + CHECKSUM_SIZE > file_size {
                return Err(Error::Corruption(String::from(
                    "index extension runs past the end of the file",
                )));
            }

            reader.read(size)?;
            offset += EXTENSION_HEADER_SIZE + size;
        }

        Ok(())
    }

    /// Remove any conflicting entries before adding a new entry
    ///
    /// Removes parent directories that are file entries, and any entries
    /// below the path if this entry is becoming a file.
    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            self.remove_entry(parent);
        }
        self.remove_children(&entry.path);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_string())
                .or_default()
                .insert(entry.path.clone());
        }

        self.entries.insert(entry.path.clone(), entry);
    }

    fn remove_children(&mut self, path: &str) {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                self.remove_entry(&child);
            }
        }
    }

    fn remove_entry(&mut self, path: &str) {
        if let Some(entry) = self.entries.remove(path) {
            for parent in entry.parent_dirs() {
                if let Some(children) = self.children.get_mut(parent) {
                    children.remove(path);
                    if children.is_empty() {
                        self.children.remove(parent);
                    }
                }
            }
        }
    }

    /// Write the entries to the index file as a version 2 index
    ///
    /// The entries go to `<index>.lock` first, which is then renamed over the
    /// index file; an existing lock file means another writer is active.
    pub fn write(&mut self) -> Result<()> {
        let path = self.path.clone().ok_or_else(|| Error::Io {
            message: String::from("Unable to write an in-memory index"),
            source: std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "the index has no backing file",
            ),
        })?;
        if let Some(database) = &self.database
            && database.strong_count() == 0
        {
            return Err(Error::ClosedHandle("index"));
        }

        let lock_path = Self::lock_path(&path);
        let mut lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .with_context(|| format!("Unable to create index lock {}", lock_path.display()))?;

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..IndexHeader::empty()
        };
        let written = self.write_entries(&mut lock_file);
        drop(lock_file);

        let committed = written.and_then(|()| {
            std::fs::rename(&lock_path, &path).with_context(|| {
                format!("Unable to rename index lock to {}", path.display())
            })
        });
        if let Err(e) = committed {
            if let Err(cleanup) = std::fs::remove_file(&lock_path) {
                warn!(path = %lock_path.display(), error = %cleanup, "stale index lock");
            }
            return Err(e);
        }

        self.changed = false;
        debug!(path = %path.display(), entries = self.entries.len(), "wrote index");

        Ok(())
    }

    fn write_entries(&self, lock_file: &mut std::fs::File) -> Result<()> {
        let lock = file_guard::lock(lock_file, file_guard::Lock::Exclusive, 0, 1)
            .context("Unable to lock index lock file")?;

        let mut writer = Checksum::new(lock);
        writer.write(&self.header.serialize()?)?;
        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()
    }

    fn lock_path(path: &Path) -> PathBuf {
        let mut lock_path = path.as_os_str().to_owned();
        lock_path.push(".lock");
        PathBuf::from(lock_path)
    }
}
