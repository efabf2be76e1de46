//! Git annotated tag object
//!
//! ## Format
//!
//! ```text
//! tag <size>\0
//! object <target-sha>
//! type <target-type>
//! tag <name>
//! tagger <name> <email> <timestamp> <timezone>
//!
//! <tag message>
//! ```

use crate::artifacts::objects::commit::{Author, parse_header_oid, parse_headers};
use crate::artifacts::objects::object::{Object, Packable, Unpackable, frame};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::{Error, Result};
use bytes::Bytes;
use derive_new::new;
use std::borrow::Cow;
use std::io::BufRead;

#[derive(Debug, Clone, Eq, PartialEq, new)]
pub struct Tag {
    target: ObjectId,
    target_type: ObjectType,
    name: Bytes,
    /// Absent on some very old tags
    tagger: Option<Author>,
    message: Bytes,
}

impl Tag {
    pub fn target(&self) -> &ObjectId {
        &self.target
    }

    pub fn target_type(&self) -> ObjectType {
        self.target_type
    }

    pub fn name(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    pub fn tagger(&self) -> Option<&Author> {
        self.tagger.as_ref()
    }

    pub fn message(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.message)
    }

    pub fn raw_message(&self) -> &[u8] {
        &self.message
    }

    fn render(&self) -> Vec<u8> {
        let mut out =
            format!("object {}\ntype {}\ntag ", self.target, self.target_type).into_bytes();
        out.extend_from_slice(&self.name);
        out.push(b'\n');
        if let Some(tagger) = &self.tagger {
            out.extend_from_slice(b"tagger ");
            tagger.write_to(&mut out);
            out.push(b'\n');
        }
        out.push(b'\n');
        out.extend_from_slice(&self.message);

        out
    }
}

impl Packable for Tag {
    fn serialize(&self) -> Result<Bytes> {
        Ok(frame(self.object_type(), &self.render()))
    }
}

impl Unpackable for Tag {
    fn deserialize(mut reader: impl BufRead) -> Result<Self> {
        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;

        let (headers, message) = parse_headers(&Bytes::from(content))?;
        let field = |key: &str| {
            headers
                .iter()
                .find(|(name, _)| name == key.as_bytes())
                .map(|(_, value)| value)
        };
        let missing = |key: &str| Error::Corruption(format!("tag is missing its {key}"));

        let target =
            parse_header_oid("object", field("object").ok_or_else(|| missing("object"))?)?;
        let target_type = std::str::from_utf8(field("type").ok_or_else(|| missing("type"))?)
            .map_err(|_| Error::Corruption(String::from("tag type is not UTF-8")))
            .and_then(ObjectType::try_from)?;
        let name = field("tag").ok_or_else(|| missing("name"))?.clone();
        let tagger = field("tagger")
            .map(|tagger| Author::try_from(&tagger[..]))
            .transpose()?;

        Ok(Tag {
            target,
            target_type,
            name,
            tagger,
            message,
        })
    }
}

impl Object for Tag {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tag
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.render()).into_owned()
    }
}
