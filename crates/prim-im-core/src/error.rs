//! Error types for the Prim IM core.

use thiserror::Error;

use crate::header::HEAD_LEN;

/// Errors raised while encoding or decoding a frame.
///
/// Every decode error is produced before any caller-visible state is touched,
/// so a rejected frame never reaches a timeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// Buffer is shorter than the fixed header width.
    #[error("frame truncated: {len} bytes, header needs {}", HEAD_LEN)]
    Truncated { len: usize },

    /// Declared payload/extension lengths run past the end of the buffer.
    #[error("frame overrun: header declares {declared} bytes, buffer has {available}")]
    Overrun { declared: usize, available: usize },

    /// Buffer holds more bytes than the header declares.
    #[error("trailing bytes: header declares {declared} bytes, buffer has {available}")]
    TrailingBytes { declared: usize, available: usize },

    /// A header field does not fit in its bit width.
    #[error("field {field} value {value} exceeds {bits}-bit width")]
    FieldOverflow {
        field: &'static str,
        value: u64,
        bits: u32,
    },

    /// Header length field disagrees with the attached section.
    #[error("{section} length mismatch: header says {declared}, actual {actual}")]
    LengthMismatch {
        section: &'static str,
        declared: usize,
        actual: usize,
    },

    /// The 12-bit type code is not a known message type.
    #[error("unknown message type: {0}")]
    UnknownType(u16),

    /// Payload could not be interpreted for its type.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
