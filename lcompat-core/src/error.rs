//! Error types
//!
//! Every abort-style failure carries the single descriptive string the host's
//! own error reporter prints. Recoverable OS failures never use this type;
//! they are handed back as data on the stack.

use thiserror::Error;

/// Result type for shim operations
pub type CompatResult<T> = Result<T, CompatError>;

/// Abort-and-unwind failure of the current protected call
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompatError {
    /// Invalid operator selector, mode string or other argument
    #[error("{0}")]
    Argument(String),

    /// Value has no length, no string form, or converted to the wrong type
    #[error("{0}")]
    Type(String),

    /// Buffer overflow or missing stack headroom
    #[error("{0}")]
    Resource(String),

    /// Error raised by the host while running code
    #[error("{0}")]
    Runtime(String),
}

impl CompatError {
    /// Name of the error category
    pub fn category(&self) -> &'static str {
        match self {
            CompatError::Argument(_) => "argument",
            CompatError::Type(_) => "type",
            CompatError::Resource(_) => "resource",
            CompatError::Runtime(_) => "runtime",
        }
    }

    /// The message without category information
    pub fn message(&self) -> &str {
        match self {
            CompatError::Argument(msg)
            | CompatError::Type(msg)
            | CompatError::Resource(msg)
            | CompatError::Runtime(msg) => msg,
        }
    }

    pub(crate) fn no_headroom(what: &str) -> Self {
        CompatError::Resource(format!("stack overflow ({what})"))
    }
}
