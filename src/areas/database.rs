//! Loose object database
//!
//! Objects live under `objects/xx/yyyy…`, zlib-compressed, each one framed as
//! `<type> <size>\0<content>`. The file name is the SHA-1 of the framed bytes,
//! so a stored object never changes and storing it twice is a no-op.

use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::{Object, ObjectBox, ParsedObject, Unpackable, frame};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::errors::{Error, IoContext, Result};
use bytes::Bytes;
use fake::rand;
use std::io::{BufReader, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

/// Upper bound on the buffer reserved up front from an object's declared size
const PREALLOCATED_CONTENT_LIMIT: usize = 1 << 20;

const INFLATE_CHUNK_SIZE: usize = 8 * 1024;

/// Object storage rooted at an `objects` directory
#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
}

// TODO: read packfiles under objects/pack so gc'ed repositories can be opened
impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self, object_id: &ObjectId) -> bool {
        self.path.join(object_id.to_path()).is_file()
    }

    pub fn store(&self, object: &impl Object) -> Result<ObjectId> {
        let object_content = object.serialize()?;
        let object_id = ObjectId::hash_framed(&object_content);

        self.store_framed(object_id, object_content)
    }

    pub fn store_raw(&self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId> {
        let object_id = ObjectId::hash_object(object_type, content);

        self.store_framed(object_id, frame(object_type, content))
    }

    fn store_framed(&self, object_id: ObjectId, object_content: Bytes) -> Result<ObjectId> {
        let object_path = self.path.join(object_id.to_path());

        // write the object to disk unless it already exists
        if object_path.exists() {
            debug!(oid = %object_id, "object already stored");
            return Ok(object_id);
        }

        let object_dir = object_path.parent().ok_or_else(|| {
            Error::NotFound(format!("parent directory of {}", object_path.display()))
        })?;
        std::fs::create_dir_all(object_dir).with_context(|| {
            format!("Unable to create object directory {}", object_dir.display())
        })?;

        self.write_object(object_dir, &object_path, object_content)?;
        debug!(oid = %object_id, "stored object");

        Ok(object_id)
    }

    /// Inflate and decode the object stored under `object_id`
    ///
    /// The inflated bytes must hash back to `object_id` and the body must be
    /// as long as its header declares.
    pub fn load(&self, object_id: &ObjectId) -> Result<ParsedObject> {
        let (object_type, content) = self.read_object(object_id)?;
        let object_reader = Cursor::new(content);

        let object = match object_type {
            ObjectType::Blob => ObjectBox::Blob(Box::new(Blob::deserialize(object_reader)?)),
            ObjectType::Tree => ObjectBox::Tree(Box::new(Tree::deserialize(object_reader)?)),
            ObjectType::Commit => {
                ObjectBox::Commit(Box::new(Commit::deserialize(object_reader)?))
            }
            ObjectType::Tag => ObjectBox::Tag(Box::new(Tag::deserialize(object_reader)?)),
        };
        debug!(oid = %object_id, object_type = %object_type, "read object");

        Ok(ParsedObject::new(*object_id, object))
    }

    /// Type and size of a stored object, without inflating its body
    pub fn load_header(&self, object_id: &ObjectId) -> Result<(ObjectType, usize)> {
        let file = self.open_object(object_id)?;
        let mut decoder = BufReader::new(flate2::read::ZlibDecoder::new(file));

        ObjectType::parse_object_header(&mut decoder).map_err(|e| Self::as_corruption(object_id, e))
    }

    fn read_object(&self, object_id: &ObjectId) -> Result<(ObjectType, Bytes)> {
        let file = self.open_object(object_id)?;
        let mut decoder = BufReader::new(flate2::read::ZlibDecoder::new(file));

        let (object_type, size) = ObjectType::parse_object_header(&mut decoder)
            .map_err(|e| Self::as_corruption(object_id, e))?;

        // the declared size is untrusted: inflate at most one byte past it
        let mut content = Vec::new();
        content.try_reserve_exact(size.min(PREALLOCATED_CONTENT_LIMIT))?;
        let mut body = decoder.take((size as u64).saturating_add(1));
        let mut chunk = [0u8; INFLATE_CHUNK_SIZE];
        loop {
            let read = match body.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => read,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(Error::Corruption(format!(
                        "Unable to inflate object {object_id}: {e}"
                    )));
                }
            };
            content.try_reserve(read)?;
            content.extend_from_slice(&chunk[..read]);
        }

        if content.len() != size {
            warn!(oid = %object_id, declared = size, actual = content.len(), "object size mismatch");
            return Err(Error::Corruption(format!(
                "object {object_id} declares {size} bytes but holds {}",
                content.len()
            )));
        }

        let actual_id = ObjectId::hash_object(object_type, &content);
        if actual_id != *object_id {
            warn!(oid = %object_id, actual = %actual_id, "object hash mismatch");
            return Err(Error::Corruption(format!(
                "object {object_id} hashes to {actual_id}"
            )));
        }

        Ok((object_type, Bytes::from(content)))
    }

    fn open_object(&self, object_id: &ObjectId) -> Result<std::fs::File> {
        let object_path = self.path.join(object_id.to_path());

        std::fs::File::open(&object_path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(format!("object {object_id}")),
            _ => Error::Io {
                message: format!("Unable to read object file {}", object_path.display()),
                source: e,
            },
        })
    }

    fn as_corruption(object_id: &ObjectId, error: Error) -> Error {
        match error {
            Error::Io { source, .. } => {
                Error::Corruption(format!("Unable to inflate object {object_id}: {source}"))
            }
            error => error,
        }
    }

    fn write_object(
        &self,
        object_dir: &Path,
        object_path: &PathBuf,
        object_content: Bytes,
    ) -> Result<()> {
        let temp_object_path = object_dir.join(Self::generate_temp_name());

        // compress the object content
        let object_content = Self::compress(object_content)?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_object_path)
            .with_context(|| {
                format!("Unable to open object file {}", temp_object_path.display())
            })?;

        file.write_all(&object_content).with_context(|| {
            format!("Unable to write object file {}", temp_object_path.display())
        })?;

        // rename the temp file to the object file to make it atomic
        std::fs::rename(&temp_object_path, object_path).with_context(|| {
            format!("Unable to rename object file to {}", object_path.display())
        })?;

        Ok(())
    }

    fn compress(data: Bytes) -> Result<Bytes> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&data)
            .context("Unable to compress object content")?;

        encoder
            .finish()
            .map(Bytes::from)
            .context("Unable to finish compressing object content")
    }

    fn generate_temp_name() -> String {
        format!("tmp_obj_{}", rand::random::<u32>())
    }

    /// Find all objects whose id starts with the given hex prefix
    ///
    /// Returns every match; more than one means the prefix is ambiguous.
    pub fn find_objects_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        if prefix.len() > OBJECT_ID_LENGTH
            || !prefix.bytes().all(|c| matches!(c, b'0'..=b'9' | b'a'..=b'f'))
        {
            return Err(Error::Format(format!("invalid object id prefix {prefix:?}")));
        }

        let dirs = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255u8).map(|i| format!("{i:02x}")).collect()
        };

        let mut matches = Vec::new();
        for dir_name in dirs {
            let dir_path = self.path.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }

            let dir_entries = std::fs::read_dir(&dir_path).with_context(|| {
                format!("Unable to list object directory {}", dir_path.display())
            })?;
            for entry in dir_entries {
                let entry = entry.with_context(|| {
                    format!("Unable to list object directory {}", dir_path.display())
                })?;
                let full_oid = format!("{}{}", dir_name, entry.file_name().to_string_lossy());

                // temp files and strays do not parse as ids
                if full_oid.starts_with(prefix)
                    && let Ok(oid) = ObjectId::try_parse(&full_oid)
                {
                    matches.push(oid);
                }
            }
        }

        matches.sort();
        Ok(matches)
    }
}

/// Handle to an object database
///
/// Either bound to a repository, in which case it stops working once the
/// repository is closed, or standalone over an `objects` directory.
#[derive(Debug, Clone)]
pub struct Odb {
    database: Weak<Database>,
    // keeps a standalone database alive; None when the repository owns it
    _owner: Option<Arc<Database>>,
}

impl Odb {
    /// Open a standalone object database over an existing `objects` directory
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(Error::NotFound(format!(
                "object directory {}",
                path.display()
            )));
        }

        let database = Arc::new(Database::new(path.into()));
        Ok(Odb {
            database: Arc::downgrade(&database),
            _owner: Some(database),
        })
    }

    pub(crate) fn bound(database: &Arc<Database>) -> Self {
        Odb {
            database: Arc::downgrade(database),
            _owner: None,
        }
    }

    pub(crate) fn database(&self) -> Result<Arc<Database>> {
        self.database
            .upgrade()
            .ok_or(Error::ClosedHandle("object database"))
    }

    /// True iff an object with that id is present
    ///
    /// Absence is not an error; only a closed handle is.
    pub fn exists(&self, object_id: &ObjectId) -> Result<bool> {
        Ok(self.database()?.exists(object_id))
    }

    pub fn read(&self, object_id: &ObjectId) -> Result<ParsedObject> {
        self.database()?.load(object_id)
    }

    pub fn read_header(&self, object_id: &ObjectId) -> Result<(ObjectType, usize)> {
        self.database()?.load_header(object_id)
    }

    pub fn write(&self, object: &impl Object) -> Result<ObjectId> {
        self.database()?.store(object)
    }

    pub fn write_raw(&self, object_type: ObjectType, content: &[u8]) -> Result<ObjectId> {
        self.database()?.store_raw(object_type, content)
    }

    pub fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ObjectId>> {
        self.database()?.find_objects_by_prefix(prefix)
    }
}
