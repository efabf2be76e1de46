//! Git commit object
//!
//! Commits represent snapshots of the repository at specific points in time.
//! They contain:
//! - A tree object ID (directory snapshot)
//! - Parent commit ID(s) (for history)
//! - Author and committer information
//! - Commit message
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0
//! tree <tree-sha>
//! parent <parent-sha>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//!
//! <commit message>
//! ```
//!
//! Headers this crate does not interpret (`encoding`, `gpgsig`, `mergetag`)
//! are kept verbatim so a decoded commit still describes the stored bytes.

use crate::artifacts::objects::object::{Object, Packable, Unpackable, frame};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use std::borrow::Cow;
use std::io::BufRead;

/// Author, committer or tagger information
///
/// Contains name, email, and timestamp with timezone information. Name and
/// email are kept as stored since git does not require them to be UTF-8.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Author {
    name: Bytes,
    email: Bytes,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Author {
    /// Create a new author with the current timestamp
    pub fn new(name: String, email: String) -> Self {
        Author {
            name: name.into(),
            email: email.into(),
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    /// Create a new author with a specific timestamp
    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Author {
            name: name.into(),
            email: email.into(),
            timestamp,
        }
    }

    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn email(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.email)
    }

    pub fn raw_name(&self) -> &[u8] {
        &self.name
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }

    /// Append "Name <email> timestamp timezone" as stored
    pub(crate) fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.name);
        out.extend_from_slice(b" <");
        out.extend_from_slice(&self.email);
        out.extend_from_slice(b"> ");
        out.extend_from_slice(
            format!(
                "{} {}",
                self.timestamp.timestamp(),
                self.timestamp.format("%z")
            )
            .as_bytes(),
        );
    }

    /// Format complete author info including timestamp
    ///
    /// # Returns
    ///
    /// String in format "Name <email> timestamp timezone"
    pub fn display(&self) -> String {
        let mut out = Vec::new();
        self.write_to(&mut out);
        String::from_utf8_lossy(&out).into_owned()
    }
}

impl TryFrom<&[u8]> for Author {
    type Error = Error;

    fn try_from(value: &[u8]) -> Result<Self> {
        let invalid = |reason: &str| {
            Error::Corruption(format!(
                "invalid signature {:?}: {reason}",
                String::from_utf8_lossy(value)
            ))
        };

        // Format: "name <email> timestamp timezone"
        // Split from right to get timezone and timestamp first
        let parts: Vec<&[u8]> = value.rsplitn(3, |&b| b == b' ').collect();
        if parts.len() < 3 {
            return Err(invalid("missing timestamp"));
        }

        let timezone = std::str::from_utf8(parts[0]).map_err(|_| invalid("bad timezone"))?;
        let timestamp = std::str::from_utf8(parts[1])
            .ok()
            .and_then(|timestamp| timestamp.parse::<i64>().ok())
            .ok_or_else(|| invalid("bad timestamp"))?;
        let name_email_part = parts[2];

        let email_start = name_email_part
            .iter()
            .position(|&b| b == b'<')
            .ok_or_else(|| invalid("missing '<'"))?;
        let email_end = name_email_part
            .iter()
            .rposition(|&b| b == b'>')
            .ok_or_else(|| invalid("missing '>'"))?;
        if email_end < email_start {
            return Err(invalid("misplaced '>'"));
        }

        let name = Bytes::copy_from_slice(name_email_part[..email_start].trim_ascii());
        let email = Bytes::copy_from_slice(&name_email_part[email_start + 1..email_end]);

        let offset = parse_timezone(timezone).ok_or_else(|| invalid("bad timezone"))?;
        let datetime = chrono::DateTime::from_timestamp(timestamp, 0)
            .ok_or_else(|| invalid("timestamp out of range"))?
            .with_timezone(&offset);

        Ok(Author {
            name,
            email,
            timestamp: datetime,
        })
    }
}

impl TryFrom<&str> for Author {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Author::try_from(value.as_bytes())
    }
}

/// Parse a `+hhmm` / `-hhmm` offset
fn parse_timezone(timezone: &str) -> Option<chrono::FixedOffset> {
    let (sign, digits) = match timezone.split_at_checked(1)? {
        ("+", digits) => (1, digits),
        ("-", digits) => (-1, digits),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let hours = digits[..2].parse::<i32>().ok()?;
    let minutes = digits[2..].parse::<i32>().ok()?;

    chrono::FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Git commit object
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Commit {
    /// Parent commit IDs (empty for initial commit, multiple for merge commits)
    parents: Vec<ObjectId>,
    /// Tree object ID representing the directory snapshot
    tree_oid: ObjectId,
    author: Author,
    committer: Author,
    /// Uninterpreted headers, in stored order
    extra_headers: Vec<(Bytes, Bytes)>,
    /// Message bytes in the commit's `encoding`
    message: Bytes,
}

impl Commit {
    /// Create a new commit
    ///
    /// # Arguments
    ///
    /// * `parents` - Parent commit IDs (empty for a root commit)
    /// * `tree_oid` - Tree object representing the snapshot
    /// * `author` - Author (also used as committer)
    /// * `message` - Commit message
    pub fn new(parents: Vec<ObjectId>, tree_oid: ObjectId, author: Author, message: String) -> Self {
        Commit {
            parents,
            tree_oid,
            author: author.clone(),
            committer: author,
            extra_headers: Vec::new(),
            message: message.into(),
        }
    }

    /// Get the first line of the commit message
    pub fn short_message(&self) -> String {
        self.message().lines().next().unwrap_or("").to_string()
    }

    /// The message, with bytes that are not UTF-8 replaced
    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    pub fn raw_message(&self) -> &[u8] {
        &self.message
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    pub fn parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn author(&self) -> &Author {
        &self.author
    }

    pub fn committer(&self) -> &Author {
        &self.committer
    }

    /// Value of an uninterpreted header such as `encoding`
    pub fn header(&self, key: &str) -> Option<Cow<'_, str>> {
        self.extra_headers
            .iter()
            .find(|(name, _)| name == key.as_bytes())
            .map(|(_, value)| String::from_utf8_lossy(value))
    }

    fn render(&self) -> Vec<u8> {
        let mut out = Vec::new();

        out.extend_from_slice(format!("tree {}\n", self.tree_oid).as_bytes());
        for parent in &self.parents {
            out.extend_from_slice(format!("parent {parent}\n").as_bytes());
        }
        out.extend_from_slice(b"author ");
        self.author.write_to(&mut out);
        out.extend_from_slice(b"\ncommitter ");
        self.committer.write_to(&mut out);
        out.push(b'\n');
        render_extra_headers(&self.extra_headers, &mut out);
        out.push(b'\n');
        out.extend_from_slice(&self.message);

        out
    }
}

fn render_extra_headers(headers: &[(Bytes, Bytes)], out: &mut Vec<u8>) {
    for (key, value) in headers {
        out.extend_from_slice(key);
        out.push(b' ');
        // continuation lines of multi-line headers start with a space
        for (i, line) in value.split(|&b| b == b'\n').enumerate() {
            if i > 0 {
                out.extend_from_slice(b"\n ");
            }
            out.extend_from_slice(line);
        }
        out.push(b'\n');
    }
}

/// Split a commit or tag body into its header fields and message
///
/// Multi-line header values (lines starting with a space) are joined with `\n`.
pub(crate) fn parse_headers(content: &Bytes) -> Result<(Vec<(Bytes, Bytes)>, Bytes)> {
    let (header_block, message) = match content.windows(2).position(|w| w == b"\n\n") {
        Some(at) => (content.slice(..at), content.slice(at + 2..)),
        None => {
            let end = content
                .iter()
                .rposition(|&b| b != b'\n')
                .map_or(0, |last| last + 1);
            (content.slice(..end), Bytes::new())
        }
    };

    let mut headers: Vec<(Bytes, Vec<u8>)> = Vec::new();
    for line in header_block.split(|&b| b == b'\n').filter(|line| !line.is_empty()) {
        if let Some(continuation) = line.strip_prefix(b" ") {
            let (_, value) = headers
                .last_mut()
                .ok_or_else(|| Error::Corruption(String::from("dangling header continuation")))?;
            value.push(b'\n');
            value.extend_from_slice(continuation);
        } else {
            let space = line.iter().position(|&b| b == b' ').ok_or_else(|| {
                Error::Corruption(format!(
                    "malformed header line {:?}",
                    String::from_utf8_lossy(line)
                ))
            })?;
            headers.push((
                Bytes::copy_from_slice(&line[..space]),
                line[space + 1..].to_vec(),
            ));
        }
    }

    let headers = headers
        .into_iter()
        .map(|(key, value)| (key, Bytes::from(value)))
        .collect();

    Ok((headers, message))
}

/// Object id stored in a header; a bad id means the object is corrupt
pub(crate) fn parse_header_oid(key: &str, value: &[u8]) -> Result<ObjectId> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|hex| ObjectId::try_parse(hex).ok())
        .ok_or_else(|| {
            Error::Corruption(format!(
                "invalid {key} id {:?}",
                String::from_utf8_lossy(value)
            ))
        })
}

impl Packable for Commit {
    fn serialize(&self) -> Result<Bytes> {
        Ok(frame(self.object_type(), &self.render()))
    }
}

impl Unpackable for Commit {
    fn deserialize(mut reader: impl BufRead) -> Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        let (headers, message) = parse_headers(&Bytes::from(content))?;

        let mut tree_oid = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;
        let mut extra_headers = Vec::new();

        for (key, value) in headers {
            match &key[..] {
                b"tree" if tree_oid.is_none() => {
                    tree_oid = Some(parse_header_oid("tree", &value)?)
                }
                b"parent" => parents.push(parse_header_oid("parent", &value)?),
                b"author" if author.is_none() => {
                    author = Some(Author::try_from(&value[..])?)
                }
                b"committer" if committer.is_none() => {
                    committer = Some(Author::try_from(&value[..])?)
                }
                _ => extra_headers.push((key, value)),
            }
        }

        let missing = |field: &str| Error::Corruption(format!("commit is missing its {field}"));

        Ok(Commit {
            parents,
            tree_oid: tree_oid.ok_or_else(|| missing("tree"))?,
            author: author.ok_or_else(|| missing("author"))?,
            committer: committer.ok_or_else(|| missing("committer"))?,
            extra_headers,
            message,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.render()).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};
    use std::io::Cursor;

    #[fixture]
    fn author() -> Author {
        let timestamp = chrono::DateTime::from_timestamp(1_700_000_000, 0)
            .unwrap()
            .fixed_offset();
        Author::new_with_timestamp(
            String::from("Test User"),
            String::from("test@example.com"),
            timestamp,
        )
    }

    #[rstest]
    fn commit_hash_matches_git_commit_tree(author: Author) {
        let tree = ObjectId::try_parse("b565590018feef277dce26b3648c36a343f7f65e").unwrap();
        let commit = Commit::new(vec![], tree, author, String::from("initial\n"));

        assert_eq!(
            commit.object_id().unwrap().to_string(),
            "936d42a6ab22d7fea546cc0c341545718254fd99"
        );
    }

    #[test]
    fn author_keeps_negative_timezone() {
        let author = Author::try_from("Jane Doe <jane@example.com> 1700000000 -0230").unwrap();

        assert_eq!(author.name(), "Jane Doe");
        assert_eq!(author.email(), "jane@example.com");
        assert_eq!(author.display(), "Jane Doe <jane@example.com> 1700000000 -0230");
    }

    #[test]
    fn unknown_headers_survive_decoding() {
        let body = "tree b565590018feef277dce26b3648c36a343f7f65e\n\
                    author A <a@b.c> 1700000000 +0000\n\
                    committer A <a@b.c> 1700000000 +0000\n\
                    gpgsig -----BEGIN-----\n \n line\n -----END-----\n\
                    \n\
                    signed\n";

        let commit = Commit::deserialize(Cursor::new(body.as_bytes().to_vec())).unwrap();

        assert_eq!(
            commit.header("gpgsig").as_deref(),
            Some("-----BEGIN-----\n\nline\n-----END-----")
        );
        assert_eq!(commit.message(), "signed\n");
        assert_eq!(commit.display(), body);
    }

    #[test]
    fn commit_without_tree_is_corruption() {
        let body = "author A <a@b.c> 1700000000 +0000\ncommitter A <a@b.c> 1700000000 +0000\n\nx";

        let error = Commit::deserialize(Cursor::new(body.as_bytes().to_vec())).unwrap_err();

        assert_eq!(error.kind(), crate::errors::ErrorKind::Corruption);
    }

    #[test]
    fn latin1_commit_keeps_its_bytes() {
        let body = b"tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\n\
                     author Jos\xe9 <jose@example.com> 1700000000 +0000\n\
                     committer Jos\xe9 <jose@example.com> 1700000000 +0000\n\
                     encoding ISO-8859-1\n\
                     \n\
                     caf\xe9\n";

        let commit = Commit::deserialize(Cursor::new(body.to_vec())).unwrap();

        assert_eq!(commit.author().raw_name(), b"Jos\xe9");
        assert_eq!(commit.author().name(), "Jos\u{fffd}");
        assert_eq!(commit.header("encoding").as_deref(), Some("ISO-8859-1"));
        assert_eq!(commit.raw_message(), b"caf\xe9\n");
        assert_eq!(
            commit.object_id().unwrap(),
            ObjectId::hash_object(ObjectType::Commit, body)
        );
    }

    #[rstest]
    #[case::tree("tree not-a-hex-id\n")]
    #[case::parent(
        "tree 4b825dc642cb6eb9a060e54bf8d69288fbee4904\nparent 936d42a6ab22\n"
    )]
    fn malformed_ids_are_corruption(#[case] ids: &str) {
        let body = format!(
            "{ids}author A <a@b.c> 1700000000 +0000\ncommitter A <a@b.c> 1700000000 +0000\n\nx"
        );

        let error = Commit::deserialize(Cursor::new(body.into_bytes())).unwrap_err();

        assert_eq!(error.kind(), crate::errors::ErrorKind::Corruption);
    }
}
