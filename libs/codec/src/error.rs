//! Codec error types

use thiserror::Error;

/// Errors raised while decoding payload buffers.
///
/// Write-side violations (overrunning the writable region) are programming
/// errors and panic instead of appearing here.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// Fewer bytes left in the buffer than the decode step needs.
    #[error("buffer underflow: needed {needed} bytes, {available} available")]
    Underflow { needed: usize, available: usize },

    /// A string field did not contain valid UTF-8.
    #[error("invalid utf-8 in string field (valid up to byte {valid_up_to})")]
    InvalidString { valid_up_to: usize },

    /// A header failed structural validation during deserialization.
    #[error("malformed header: {0}")]
    MalformedHeader(String),
}
