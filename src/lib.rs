//! Git object store and index engine
//!
//! Reads and writes loose objects, references and the index of a git
//! repository, byte-compatible with git itself. Every failure is an
//! [`Error`] carrying an [`ErrorKind`] and a message.

pub mod areas;
pub mod artifacts;
pub mod errors;

pub use areas::database::Odb;
pub use areas::index::Index;
pub use areas::refs::RefDb;
pub use areas::repository::Repository;
pub use artifacts::index::entry_mode::{EntryMode, FileMode};
pub use artifacts::index::index_entry::{EntryMetadata, IndexEntry};
pub use artifacts::objects::object::{ObjectBox, ParsedObject};
pub use artifacts::objects::object_id::ObjectId;
pub use artifacts::objects::object_type::ObjectType;
pub use artifacts::refs::reference::{Reference, ReferenceKind, ReferenceTarget};
pub use errors::{Error, ErrorKind, Result};
