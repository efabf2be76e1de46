//! Git data structures and codecs
//!
//! - `database`: tree entry records
//! - `index`: index file entries, header and checksum
//! - `objects`: object ids and the blob, tree, commit and tag objects
//! - `refs`: reference values and name validation

pub mod database;
pub mod index;
pub mod objects;
pub mod refs;
