use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
    Symlink,
}

/// File mode of an index or tree entry
#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum EntryMode {
    File(FileMode),
    Gitlink,
    #[default]
    Directory,
}

impl EntryMode {
    /// Octal form as it appears inside tree objects
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::File(FileMode::Regular) => "100644",
            EntryMode::File(FileMode::Executable) => "100755",
            EntryMode::File(FileMode::Symlink) => "120000",
            EntryMode::Gitlink => "160000",
            EntryMode::Directory => "40000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::File(FileMode::Regular) => 0o100644,
            EntryMode::File(FileMode::Executable) => 0o100755,
            EntryMode::File(FileMode::Symlink) => 0o120000,
            EntryMode::Gitlink => 0o160000,
            EntryMode::Directory => 0o40000,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }

    /// Type of the object an entry with this mode points at
    pub fn object_type(&self) -> ObjectType {
        match self {
            EntryMode::File(_) => ObjectType::Blob,
            EntryMode::Gitlink => ObjectType::Commit,
            EntryMode::Directory => ObjectType::Tree,
        }
    }

    /// Parse a mode read from a tree object
    ///
    /// Accepts the legacy group-writable `100664` as a regular file, as git does.
    pub fn from_octal_str(value: &str) -> Result<Self> {
        let mode = u32::from_str_radix(value, 8)
            .map_err(|_| Error::Corruption(format!("invalid entry mode {value:?}")))?;

        match mode {
            0o100664 => Ok(EntryMode::File(FileMode::Regular)),
            mode => EntryMode::try_from(mode).map_err(|_| {
                Error::Corruption(format!("unsupported entry mode {value:?}"))
            }),
        }
    }
}

impl TryFrom<u32> for EntryMode {
    type Error = Error;

    fn try_from(mode: u32) -> Result<Self> {
        match mode {
            0o100644 => Ok(EntryMode::File(FileMode::Regular)),
            0o100755 => Ok(EntryMode::File(FileMode::Executable)),
            0o120000 => Ok(EntryMode::File(FileMode::Symlink)),
            0o160000 => Ok(EntryMode::Gitlink),
            0o40000 => Ok(EntryMode::Directory),
            _ => Err(Error::Validation(format!("invalid entry mode {mode:o}"))),
        }
    }
}

impl From<EntryMode> for u32 {
    fn from(mode: EntryMode) -> Self {
        mode.as_u32()
    }
}

impl From<FileMode> for EntryMode {
    fn from(mode: FileMode) -> Self {
        EntryMode::File(mode)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.as_u32())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(0o100644, EntryMode::File(FileMode::Regular))]
    #[case(0o100755, EntryMode::File(FileMode::Executable))]
    #[case(0o120000, EntryMode::File(FileMode::Symlink))]
    #[case(0o160000, EntryMode::Gitlink)]
    #[case(0o040000, EntryMode::Directory)]
    fn recognized_modes_are_accepted(#[case] raw: u32, #[case] expected: EntryMode) {
        let mode = EntryMode::try_from(raw).unwrap();

        assert_eq!(mode, expected);
        assert_eq!(mode.as_u32(), raw);
    }

    #[rstest]
    #[case(0)]
    #[case(0o100664)]
    #[case(0o644)]
    #[case(0o170000)]
    fn unrecognized_modes_are_rejected(#[case] raw: u32) {
        let error = EntryMode::try_from(raw).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Validation);
    }

    #[test]
    fn legacy_tree_mode_reads_as_regular_file() {
        assert_eq!(
            EntryMode::from_octal_str("100664").unwrap(),
            EntryMode::File(FileMode::Regular)
        );
        assert_eq!(
            EntryMode::from_octal_str("40000").unwrap(),
            EntryMode::Directory
        );
    }

    #[test]
    fn display_pads_directories_to_six_digits() {
        assert_eq!(EntryMode::Directory.to_string(), "040000");
        assert_eq!(EntryMode::Gitlink.object_type(), ObjectType::Commit);
    }
}
