use crate::artifacts::refs::INVALID_REF_NAME_REGEX;
use crate::errors::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static INVALID_REF_NAME: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(INVALID_REF_NAME_REGEX));

/// A validated reference name such as `HEAD` or `refs/heads/main`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefName(String);

impl RefName {
    /// Validate a full reference name
    ///
    /// Accepts names under `refs/` and all-caps top-level names (`HEAD`,
    /// `FETCH_HEAD`); rejects the forms git forbids (`..`, `@{`, control
    /// characters, a `.lock` suffix, leading or trailing slashes).
    pub fn try_parse(name: impl Into<String>) -> Result<Self> {
        let name = name.into();

        if name.is_empty() {
            return Err(Error::Validation(String::from(
                "reference name cannot be empty",
            )));
        }
        let re = INVALID_REF_NAME
            .as_ref()
            .map_err(|e| Error::Validation(format!("invalid reference name regex: {e}")))?;

        if re.is_match(&name) {
            return Err(Error::Validation(format!("invalid reference name {name:?}")));
        }

        let is_top_level = name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b == b'_');
        if !is_top_level && !name.starts_with("refs/") {
            return Err(Error::Validation(format!(
                "reference name {name:?} must be under refs/ or an all-caps top-level name"
            )));
        }

        Ok(Self(name))
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl AsRef<str> for RefName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RefName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
