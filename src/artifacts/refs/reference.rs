use crate::areas::refs::Refs;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::{Error, Result};
use std::sync::{Arc, Weak};

/// Discriminator of a [`Reference`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    Direct,
    Symbolic,
}

/// What a reference points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceTarget {
    /// Direct object ID
    Direct(ObjectId),
    /// Name of another reference
    Symbolic(String),
}

/// A named pointer read from the reference namespace
///
/// Tied to the namespace it was read from: resolving it after the owning
/// repository is released fails with a `ClosedHandleError`.
#[derive(Debug, Clone)]
pub struct Reference {
    name: String,
    target: ReferenceTarget,
    refs: Weak<Refs>,
}

impl Reference {
    pub(crate) fn new(name: String, target: ReferenceTarget, refs: Weak<Refs>) -> Self {
        Reference { name, target, refs }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ReferenceKind {
        match self.target {
            ReferenceTarget::Direct(_) => ReferenceKind::Direct,
            ReferenceTarget::Symbolic(_) => ReferenceKind::Symbolic,
        }
    }

    pub fn target_value(&self) -> &ReferenceTarget {
        &self.target
    }

    /// The name a symbolic reference points at, `None` for direct references
    pub fn symbolic_target(&self) -> Option<&str> {
        match &self.target {
            ReferenceTarget::Symbolic(name) => Some(name),
            ReferenceTarget::Direct(_) => None,
        }
    }

    /// Follow the symbolic chain to the final direct reference
    ///
    /// A direct reference resolves to itself.
    pub fn resolve(&self) -> Result<Reference> {
        match self.target {
            ReferenceTarget::Direct(_) => Ok(self.clone()),
            ReferenceTarget::Symbolic(_) => self.namespace()?.resolve(self),
        }
    }

    /// The object id this reference points at, resolving it first if symbolic
    pub fn target(&self) -> Result<ObjectId> {
        match &self.target {
            ReferenceTarget::Direct(oid) => Ok(*oid),
            ReferenceTarget::Symbolic(_) => match self.resolve()?.target {
                ReferenceTarget::Direct(oid) => Ok(oid),
                ReferenceTarget::Symbolic(name) => Err(Error::Reference(format!(
                    "{} resolved to symbolic reference {}",
                    self.name, name
                ))),
            },
        }
    }

    fn namespace(&self) -> Result<Arc<Refs>> {
        self.refs.upgrade().ok_or(Error::ClosedHandle("reference"))
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.target == other.target
    }
}

impl Eq for Reference {}
