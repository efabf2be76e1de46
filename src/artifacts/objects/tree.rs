//! Git tree object
//!
//! Trees represent directory snapshots in Git. They contain entries for files (blobs)
//! and subdirectories (other trees), along with their names and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! ## Tree Building
//!
//! [`Tree`] is the read side: the entries exactly as stored. [`TreeBuilder`]
//! is the write side: it groups index entries by path prefix into nested
//! subtrees and stores them children first.

use crate::areas::database::Odb;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object::{Object, Packable, Unpackable, frame};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Git tree object representing a directory snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tree {
    entries: Vec<DatabaseEntry>,
}

impl Tree {
    pub fn new(entries: Vec<DatabaseEntry>) -> Self {
        Tree { entries }
    }

    pub fn entries(&self) -> impl Iterator<Item = &DatabaseEntry> {
        self.entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = DatabaseEntry> {
        self.entries.into_iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_by_name(&self, name: &[u8]) -> Option<&DatabaseEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Resolve a slash-separated path relative to this tree
    ///
    /// Intermediate subtrees are read from `odb` on demand. The final entry is
    /// returned whether it is a blob, a subtree or a gitlink.
    pub fn entry_bypath(&self, odb: &Odb, path: &str) -> Result<DatabaseEntry> {
        let (name, rest) = match path.split_once('/') {
            Some((name, rest)) => (name, Some(rest)),
            None => (path, None),
        };

        if name.is_empty() {
            return Err(Error::NotFound(format!("path {path:?}")));
        }

        let entry = self
            .entry_by_name(name.as_bytes())
            .ok_or_else(|| Error::NotFound(format!("path segment {name:?}")))?;

        match rest {
            None => Ok(entry.clone()),
            Some(rest) if entry.is_tree() => {
                let subtree = odb.read(&entry.oid)?.into_tree()?;
                subtree.entry_bypath(odb, rest)
            }
            Some(_) => Err(Error::NotFound(format!(
                "path segment {name:?} is not a directory"
            ))),
        }
    }
}

impl Packable for Tree {
    fn serialize(&self) -> Result<Bytes> {
        let mut content = Vec::new();

        for entry in &self.entries {
            content.extend_from_slice(entry.mode.as_str().as_bytes());
            content.push(b' ');
            content.extend_from_slice(&entry.name);
            content.push(0);
            entry.oid.write_h40_to(&mut content)?;
        }

        Ok(frame(self.object_type(), &content))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead) -> Result<Self> {
        let mut entries = Vec::new();

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            // Read "mode " (space-delimited)
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.pop() != Some(b' ') {
                return Err(Error::Corruption(String::from(
                    "unexpected end of tree in entry mode",
                )));
            }

            let mode_str = std::str::from_utf8(&mode_bytes)
                .map_err(|_| Error::Corruption(String::from("tree entry mode is not UTF-8")))?;
            let mode = EntryMode::from_octal_str(mode_str)?;

            // Read "name\0"
            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                return Err(Error::Corruption(String::from(
                    "unexpected end of tree in entry name",
                )));
            }
            let name = Bytes::copy_from_slice(&name_bytes);

            let oid = ObjectId::read_h40_from(&mut reader).map_err(|_| {
                Error::Corruption(String::from("unexpected end of tree in object id"))
            })?;

            entries.push(DatabaseEntry::new(name, oid, mode));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                format!(
                    "{} {} {}\t{}",
                    entry.mode,
                    entry.object_type(),
                    entry.oid,
                    entry.name_lossy()
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}

/// Node of a tree under construction
#[derive(Debug, Clone)]
enum TreeNode {
    /// Entry copied from the index (blob, symlink, gitlink or a whole subtree)
    Leaf { oid: ObjectId, mode: EntryMode },
    /// Directory grouped from index paths
    Directory(TreeBuilder),
}

/// Tree hierarchy grouped from a flat list of index entries
///
/// Keys of directory-like children carry a trailing `/` so that the map order
/// is git's canonical tree order.
#[derive(Debug, Clone, Default)]
pub struct TreeBuilder {
    entries: BTreeMap<String, TreeNode>,
}

impl TreeBuilder {
    /// Build a tree from index entries
    ///
    /// Files are organized into directories matching their path structure.
    pub fn build<'e>(entries: impl Iterator<Item = &'e IndexEntry>) -> Result<Self> {
        let mut root = Self::default();

        for entry in entries {
            let components = entry.path.split('/').collect::<Vec<_>>();
            root.add_entry(&components, entry)?;
        }

        Ok(root)
    }

    fn add_entry(&mut self, components: &[&str], entry: &IndexEntry) -> Result<()> {
        match components {
            [] => Err(Error::Validation(String::from("empty index path"))),
            [name] => {
                let key = if entry.mode.is_tree() {
                    format!("{name}/")
                } else {
                    name.to_string()
                };
                self.entries.insert(
                    key,
                    TreeNode::Leaf {
                        oid: entry.oid,
                        mode: entry.mode,
                    },
                );
                Ok(())
            }
            [parent, rest @ ..] => {
                let key = format!("{parent}/");
                let node = self
                    .entries
                    .entry(key)
                    .or_insert_with(|| TreeNode::Directory(TreeBuilder::default()));

                match node {
                    TreeNode::Directory(tree) => tree.add_entry(rest, entry),
                    TreeNode::Leaf { .. } => Err(Error::Validation(format!(
                        "{parent:?} is both a subtree entry and a directory"
                    ))),
                }
            }
        }
    }

    /// Store this tree and all of its subtrees, children first
    ///
    /// # Returns
    ///
    /// The id of the root tree
    pub fn write(&self, odb: &Odb) -> Result<ObjectId> {
        let mut entries = Vec::with_capacity(self.entries.len());

        for (key, node) in &self.entries {
            let name = Bytes::copy_from_slice(key.trim_end_matches('/').as_bytes());
            let entry = match node {
                TreeNode::Leaf { oid, mode } => DatabaseEntry::new(name, *oid, *mode),
                TreeNode::Directory(tree) => {
                    DatabaseEntry::new(name, tree.write(odb)?, EntryMode::Directory)
                }
            };
            entries.push(entry);
        }

        odb.write(&Tree::new(entries))
    }
}
