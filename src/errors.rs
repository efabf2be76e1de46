//! Error contract exposed to the host
//!
//! Every failing operation yields an [`Error`] whose [`ErrorKind`] and
//! human-readable message can be forwarded across the binding boundary as a
//! `(kind, message)` pair. None of these are fatal to the process.

use crate::artifacts::objects::object_type::ObjectType;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Discriminator of an [`Error`], stable across messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Format,
    NotFound,
    TypeMismatch,
    Corruption,
    Reference,
    Validation,
    Io,
    ClosedHandle,
    OutOfMemory,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Format => "format_error",
            ErrorKind::NotFound => "not_found_error",
            ErrorKind::TypeMismatch => "type_mismatch_error",
            ErrorKind::Corruption => "corruption_error",
            ErrorKind::Reference => "reference_error",
            ErrorKind::Validation => "validation_error",
            ErrorKind::Io => "io_error",
            ErrorKind::ClosedHandle => "closed_handle_error",
            ErrorKind::OutOfMemory => "out_of_memory_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Errors that can occur while operating on a repository.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed object id text or binary.
    #[error("invalid object id: {0}")]
    Format(String),

    /// Missing object, reference or path segment.
    #[error("{0} not found")]
    NotFound(String),

    /// Object decoded as a different variant than requested.
    #[error("object {oid} is a {actual}, expected a {expected}")]
    TypeMismatch {
        oid: String,
        expected: ObjectType,
        actual: ObjectType,
    },

    /// Stored bytes fail integrity checks or decoding.
    #[error("corrupt data: {0}")]
    Corruption(String),

    /// Symbolic reference cycle or dangling target.
    #[error("reference error: {0}")]
    Reference(String),

    /// Malformed index entry, reference name or pattern.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Filesystem failure.
    #[error("{message}: {source}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// A handle was used after its repository was released.
    #[error("{0} handle used after its repository was released")]
    ClosedHandle(&'static str),

    /// A buffer could not be allocated.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Error::Corruption(_) => ErrorKind::Corruption,
            Error::Reference(_) => ErrorKind::Reference,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Io { .. } => ErrorKind::Io,
            Error::ClosedHandle(_) => ErrorKind::ClosedHandle,
            Error::OutOfMemory(_) => ErrorKind::OutOfMemory,
        }
    }

    /// The human-readable message paired with [`Error::kind`].
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Convert into the `(kind, message)` pair handed to the host.
    pub fn into_pair(self) -> (ErrorKind, String) {
        (self.kind(), self.message())
    }
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Error::Io {
            message: String::from("i/o failure"),
            source,
        }
    }
}

impl From<walkdir::Error> for Error {
    fn from(error: walkdir::Error) -> Self {
        let message = format!("Unable to walk directory {:?}", error.path());
        Error::Io {
            message,
            source: error.into(),
        }
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(error: std::collections::TryReserveError) -> Self {
        Error::OutOfMemory(error.to_string())
    }
}

/// Attach a message to an I/O failure, mirroring `anyhow::Context`.
pub trait IoContext<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;

    fn with_context<F, S>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|source| Error::Io {
            message: message.into(),
            source,
        })
    }

    fn with_context<F, S>(self, message: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|source| Error::Io {
            message: message().into(),
            source,
        })
    }
}
