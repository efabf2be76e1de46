//! Repository configuration (`<gitdir>/config`)
//!
//! Only the subset of git's config syntax the engine needs: `[section]` and
//! `[section "subsection"]` headers, `key = value` lines, bare boolean keys
//! and `#`/`;` comments. Section and key names are case-insensitive; lookups
//! use dotted names such as `core.bare` or `remote.origin.url`.

use crate::errors::{Error, IoContext, Result};
use std::collections::BTreeMap;
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Name of the config file in the git directory
pub const CONFIG_FILE: &str = "config";

const SECTION_REGEX: &str = r#"^\[\s*([A-Za-z0-9.-]+)(?:\s+"((?:[^"\\]|\\.)*)")?\s*\]$"#;
const VARIABLE_REGEX: &str = r"^([A-Za-z][A-Za-z0-9-]*)\s*(?:=\s*(.*))?$";

static SECTION: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(SECTION_REGEX));
static VARIABLE: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(VARIABLE_REGEX));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    values: BTreeMap<String, String>,
}

impl Config {
    /// Load a config file; a missing file is an empty config
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Unable to read config file {}", path.display()))?;

        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let section_regex = SECTION
            .as_ref()
            .map_err(|e| Error::Corruption(format!("invalid config section pattern: {e}")))?;
        let variable_regex = VARIABLE
            .as_ref()
            .map_err(|e| Error::Corruption(format!("invalid config variable pattern: {e}")))?;

        let mut values = BTreeMap::new();
        let mut section = None;

        for (number, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = section_regex.captures(line) {
                let name = header[1].to_lowercase();
                section = Some(match header.get(2) {
                    Some(subsection) => format!("{name}.{}", subsection.as_str()),
                    None => name,
                });
                continue;
            }

            let variable = variable_regex.captures(line).ok_or_else(|| {
                Error::Corruption(format!("bad config line {}: {line:?}", number + 1))
            })?;
            let section = section.as_ref().ok_or_else(|| {
                Error::Corruption(format!(
                    "config line {} is outside of any section",
                    number + 1
                ))
            })?;

            let key = format!("{section}.{}", variable[1].to_lowercase());
            // a bare key is a boolean set to true
            let value = variable
                .get(2)
                .map(|value| Self::strip_comment(value.as_str()))
                .unwrap_or_else(|| String::from("true"));

            values.insert(key, value);
        }

        Ok(Config { values })
    }

    fn strip_comment(value: &str) -> String {
        let mut in_quotes = false;
        let mut stripped = String::with_capacity(value.len());

        for c in value.chars() {
            match c {
                '"' => in_quotes = !in_quotes,
                '#' | ';' if !in_quotes => break,
                c => stripped.push(c),
            }
        }

        stripped.trim().to_string()
    }

    /// Value of a dotted key; the last assignment wins
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(&Self::normalize_key(key)).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => Ok(Some(true)),
                "false" | "no" | "off" | "0" | "" => Ok(Some(false)),
                _ => Err(Error::Corruption(format!(
                    "config value {key} = {value:?} is not a boolean"
                ))),
            },
        }
    }

    /// Section and variable names are case-insensitive, subsections are not
    fn normalize_key(key: &str) -> String {
        match (key.split_once('.'), key.rsplit_once('.')) {
            (Some((section, _)), Some((middle, variable))) => {
                let subsection = middle.strip_prefix(section).unwrap_or_default();
                format!(
                    "{}{subsection}.{}",
                    section.to_lowercase(),
                    variable.to_lowercase()
                )
            }
            _ => key.to_lowercase(),
        }
    }

    /// The config `init` writes into a new repository
    pub fn initial(bare: bool) -> String {
        format!(
            "[core]\n\
             \trepositoryformatversion = 0\n\
             \tfilemode = true\n\
             \tbare = {bare}\n"
        )
    }
}
