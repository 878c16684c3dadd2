//! Error taxonomy for the codec

use std::fmt::Display;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Codec failures. All surface synchronously to the immediate caller;
/// there is no retry or partial-success mode.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or unsupported OOXML content on read, naming the
    /// offending package part
    #[error("malformed package part {part}: {reason}")]
    Format { part: String, reason: String },

    /// Underlying filesystem failure, propagated unchanged
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Container-level zip failure
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    /// A value the encoder cannot represent, failing fast at the cell
    /// being written
    #[error("unrepresentable value at {at}: {reason}")]
    Value { at: String, reason: String },
}

impl Error {
    pub(crate) fn format(part: impl Into<String>, reason: impl Display) -> Self {
        Error::Format {
            part: part.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn value(at: impl Into<String>, reason: impl Display) -> Self {
        Error::Value {
            at: at.into(),
            reason: reason.to_string(),
        }
    }
}
