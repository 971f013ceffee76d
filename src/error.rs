//! Error types for bit-vector serialization.

use thiserror::Error;

/// Errors that can occur while reading a serialized bit-vector stream.
///
/// The codec has a single caller-visible failure kind: the stream does not
/// conform to the serialization format. Pre-condition violations (undersized
/// output buffers, truncated input) are programming errors and panic instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SerialError {
    /// The stream is not a valid serialized bit-vector.
    #[error("invalid serialization format: {0}")]
    SerialFormat(String),
}

impl SerialError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        SerialError::SerialFormat(msg.into())
    }
}

/// Convenience type alias for Results with SerialError.
pub type Result<T> = std::result::Result<T, SerialError>;
