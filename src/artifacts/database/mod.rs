//! Database entry types
//!
//! Entries read out of tree objects: a name, the mode it was recorded with and
//! the id of the object it points to.

pub mod database_entry;
