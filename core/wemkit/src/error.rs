//! Error types for Wwise stream repackaging.

use std::io::ErrorKind;
use thiserror::Error;

/// Result type alias for wemkit operations.
pub type WemResult<T> = Result<T, WemError>;

/// Errors that can occur while rebuilding a Wwise audio stream.
///
/// Every variant aborts the conversion of the current input; nothing
/// is written to the caller's sink once one of these is raised.
#[derive(Debug, Error)]
pub enum WemError {
    /// Magic or structural mismatch in the container or a codec header.
    #[error("Format error: {message}")]
    Format {
        /// Description of the mismatch.
        message: String,
    },

    /// The input ended before a required read completed.
    #[error("Truncated input: {message}")]
    TruncatedInput {
        /// Where the short read happened.
        message: String,
    },

    /// A bounds or reserved-field violation while replaying the Vorbis setup packet.
    /// This typically indicates the wrong codebook library is being used.
    #[error("Corrupt setup packet: {message}")]
    CorruptSetup {
        /// Description of the violated constraint.
        message: String,
    },

    /// A layout variant that is recognized but not handled.
    #[error("Unsupported variant: {message}")]
    UnsupportedVariant {
        /// Description of the variant.
        message: String,
    },

    /// A chunk required by the codec is absent.
    #[error("Missing '{tag}' chunk")]
    MissingChunk {
        /// Four-character tag of the missing chunk.
        tag: String,
    },

    /// An external resource (such as the codebook library) is absent.
    #[error("Missing resource: {message}")]
    MissingResource {
        /// Description of the resource.
        message: String,
    },

    /// An Ogg page payload grew past the 255 x 255 byte limit.
    #[error("Ogg page capacity exceeded: {size} bytes")]
    CapacityExceeded {
        /// Payload size that was attempted.
        size: usize,
    },

    /// A codebook index is not present in the library.
    #[error("Codebook index {index} out of range ({count} codebooks), try a different codebook library")]
    Lookup {
        /// The requested index.
        index: usize,
        /// Number of codebooks in the library.
        count: usize,
    },

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[source] std::io::Error),
}

impl WemError {
    /// Create a new format error with the given message.
    pub fn format(message: impl Into<String>) -> Self {
        WemError::Format {
            message: message.into(),
        }
    }

    /// Create a new truncated input error.
    pub fn truncated(message: impl Into<String>) -> Self {
        WemError::TruncatedInput {
            message: message.into(),
        }
    }

    /// Create a new corrupt setup error.
    pub fn corrupt_setup(message: impl Into<String>) -> Self {
        WemError::CorruptSetup {
            message: message.into(),
        }
    }

    /// Create a new unsupported variant error.
    pub fn unsupported(message: impl Into<String>) -> Self {
        WemError::UnsupportedVariant {
            message: message.into(),
        }
    }

    /// Create a new missing chunk error from a four-character tag.
    pub fn missing_chunk(tag: &[u8; 4]) -> Self {
        WemError::MissingChunk {
            tag: String::from_utf8_lossy(tag).into_owned(),
        }
    }

    /// Create a new missing resource error.
    pub fn missing_resource(message: impl Into<String>) -> Self {
        WemError::MissingResource {
            message: message.into(),
        }
    }

    /// Create a new capacity exceeded error.
    pub fn capacity_exceeded(size: usize) -> Self {
        WemError::CapacityExceeded { size }
    }

    /// Create a new codebook lookup error.
    pub fn lookup(index: usize, count: usize) -> Self {
        WemError::Lookup { index, count }
    }
}

impl From<std::io::Error> for WemError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == ErrorKind::UnexpectedEof {
            WemError::TruncatedInput {
                message: err.to_string(),
            }
        } else {
            WemError::Io(err)
        }
    }
}
