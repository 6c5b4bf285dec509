//! Error types for artifact file encoding.

use thiserror::Error;

/// Why an artifact value could not be rendered to, or read from, a file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    /// A value kind the store's format cannot hold.
    #[error("{format} store cannot hold a {value} value")]
    Mismatch {
        format: &'static str,
        value: &'static str,
    },
    #[error("failed to encode artifact: {reason}")]
    Encode { reason: String },
    #[error("failed to decode artifact: {reason}")]
    Decode { reason: String },
}

impl FormatError {
    /// Create an encode error.
    pub fn encode(reason: impl Into<String>) -> Self {
        Self::Encode {
            reason: reason.into(),
        }
    }

    /// Create a decode error.
    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
        }
    }
}
