//! Reference value types
//!
//! - `reference`: A named pointer, either direct (to an object id) or
//!   symbolic (to another reference name)
//! - `ref_name`: Validation of reference names

pub mod ref_name;
pub mod reference;

/// Names matching this pattern are not valid reference names
pub const INVALID_REF_NAME_REGEX: &str =
    r"^\.|\/\.|\.\.|^\/|\/$|\/\/|\.lock$|\.lock\/|@\{|^@$|[\x00-\x20\*:\?\[\\~\^\x7f]";

/// Pattern of a symbolic reference file
pub const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Symbolic references are followed at most this many times
pub const MAX_SYMREF_DEPTH: usize = 10;
