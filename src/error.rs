//! Error types
//!
//! Every fallible context operation returns [`Result`]. The context also keeps
//! the most recent error in a single slot and forwards it to an optional
//! observer, so callers that prefer polling still see what went wrong.

use thiserror::Error;

/// The kind of precondition a call violated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ErrorKind {
    /// A required resource handle was missing or stale
    #[error("null pointer")]
    NullPointer,
    /// Zero dimension, unsupported format or out-of-range sub-region
    #[error("invalid argument")]
    InvalidArgument,
    /// The call is not allowed in the current state
    #[error("invalid operation")]
    InvalidOperation,
    /// Two inputs expected to agree in size do not
    #[error("argument mismatch")]
    ArgumentMismatch,
}

/// An error kind tagged with the operation that raised it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("{kind} in {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: &'static str,
}

impl Error {
    pub fn new(kind: ErrorKind, context: &'static str) -> Self {
        Self { kind, context }
    }

    pub fn null_pointer(context: &'static str) -> Self {
        Self::new(ErrorKind::NullPointer, context)
    }

    pub fn invalid_argument(context: &'static str) -> Self {
        Self::new(ErrorKind::InvalidArgument, context)
    }

    pub fn invalid_operation(context: &'static str) -> Self {
        Self::new(ErrorKind::InvalidOperation, context)
    }

    pub fn argument_mismatch(context: &'static str) -> Self {
        Self::new(ErrorKind::ArgumentMismatch, context)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Observer invoked synchronously for every recorded error
pub type ErrorHandler = Box<dyn FnMut(&Error)>;

/// Error raised while reading a vertex/index stream or decoding an image file
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Render(#[from] Error),
}

impl LoadError {
    /// The render error kind, if this was not an I/O or decode failure
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            LoadError::Io(_) | LoadError::Image(_) => None,
            LoadError::Render(e) => Some(e.kind),
        }
    }
}
