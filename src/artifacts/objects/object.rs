use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::io::BufRead;
use std::path::PathBuf;

pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

pub trait Unpackable {
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    fn object_id(&self) -> Result<ObjectId> {
        Ok(ObjectId::hash_framed(&self.serialize()?))
    }

    fn object_path(&self) -> Result<PathBuf> {
        Ok(self.object_id()?.to_path())
    }
}

/// Prefix `content` with the `<type> <size>\0` object header
pub fn frame(object_type: ObjectType, content: &[u8]) -> Bytes {
    let header = format!("{} {}\0", object_type.as_str(), content.len());

    let mut framed = Vec::with_capacity(header.len() + content.len());
    framed.extend_from_slice(header.as_bytes());
    framed.extend_from_slice(content);

    Bytes::from(framed)
}

/// A decoded object, one variant per object type
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn object_type(&self) -> ObjectType {
        match self {
            ObjectBox::Blob(_) => ObjectType::Blob,
            ObjectBox::Tree(_) => ObjectType::Tree,
            ObjectBox::Commit(_) => ObjectType::Commit,
            ObjectBox::Tag(_) => ObjectType::Tag,
        }
    }

    pub fn display(&self) -> String {
        match self {
            ObjectBox::Blob(blob) => blob.display(),
            ObjectBox::Tree(tree) => tree.display(),
            ObjectBox::Commit(commit) => commit.display(),
            ObjectBox::Tag(tag) => tag.display(),
        }
    }
}

/// An object read from the database together with the id it is stored under
///
/// Value-like: independent of the repository it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedObject {
    id: ObjectId,
    object: ObjectBox,
}

impl ParsedObject {
    pub(crate) fn new(id: ObjectId, object: ObjectBox) -> Self {
        ParsedObject { id, object }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn object_type(&self) -> ObjectType {
        self.object.object_type()
    }

    pub fn object(&self) -> &ObjectBox {
        &self.object
    }

    pub fn into_object(self) -> ObjectBox {
        self.object
    }

    /// Fail with `TypeMismatchError` unless the object is of `expected` type
    pub fn expect_type(&self, expected: ObjectType) -> Result<()> {
        let actual = self.object_type();
        if actual != expected {
            return Err(Error::TypeMismatch {
                oid: self.id.to_string(),
                expected,
                actual,
            });
        }

        Ok(())
    }

    pub fn as_blob(&self) -> Result<&Blob> {
        match &self.object {
            ObjectBox::Blob(blob) => Ok(blob),
            _ => Err(self.mismatch(ObjectType::Blob)),
        }
    }

    pub fn as_tree(&self) -> Result<&Tree> {
        match &self.object {
            ObjectBox::Tree(tree) => Ok(tree),
            _ => Err(self.mismatch(ObjectType::Tree)),
        }
    }

    pub fn as_commit(&self) -> Result<&Commit> {
        match &self.object {
            ObjectBox::Commit(commit) => Ok(commit),
            _ => Err(self.mismatch(ObjectType::Commit)),
        }
    }

    pub fn as_tag(&self) -> Result<&Tag> {
        match &self.object {
            ObjectBox::Tag(tag) => Ok(tag),
            _ => Err(self.mismatch(ObjectType::Tag)),
        }
    }

    pub fn into_tree(self) -> Result<Tree> {
        match self.object {
            ObjectBox::Tree(tree) => Ok(*tree),
            object => Err(Error::TypeMismatch {
                oid: self.id.to_string(),
                expected: ObjectType::Tree,
                actual: object.object_type(),
            }),
        }
    }

    pub fn into_commit(self) -> Result<Commit> {
        match self.object {
            ObjectBox::Commit(commit) => Ok(*commit),
            object => Err(Error::TypeMismatch {
                oid: self.id.to_string(),
                expected: ObjectType::Commit,
                actual: object.object_type(),
            }),
        }
    }

    /// The tree id referenced by a commit object
    pub fn commit_tree_id(&self) -> Result<ObjectId> {
        Ok(*self.as_commit()?.tree_oid())
    }

    fn mismatch(&self, expected: ObjectType) -> Error {
        Error::TypeMismatch {
            oid: self.id.to_string(),
            expected,
            actual: self.object_type(),
        }
    }
}
