//! Wire frames of the supported proxy protocols.
//!
//! Frames are written into any [`BufMut`](bytes::BufMut) and read from any
//! [`Buf`](bytes::Buf) holding at least the frame's fixed length,
//! keeping them independent of the transport which carries them.

use std::fmt;

pub mod http;
pub mod socks4;
pub mod socks5;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Error returned while encoding or decoding proxy frames.
pub enum ProtocolError {
    /// Fewer bytes were available than the frame needs.
    Incomplete {
        /// Bytes needed.
        needed: usize,
        /// Bytes available.
        available: usize,
    },
    /// A byte with an unexpected value at the given position of the frame.
    UnexpectedByte {
        /// Position of the byte within the frame.
        pos: usize,
        /// The byte that was found.
        byte: u8,
    },
    /// A variable-length field does not fit its one byte length prefix.
    FieldTooLong {
        /// Name of the field.
        field: &'static str,
        /// Length of the field in bytes.
        len: usize,
    },
    /// A response head exceeded the maximum accepted size.
    ResponseTooLarge {
        /// The maximum accepted size.
        max: usize,
    },
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incomplete { needed, available } => {
                write!(f, "incomplete frame: need {needed} bytes, have {available}")
            }
            Self::UnexpectedByte { pos, byte } => {
                write!(f, "unexpected byte {byte:#04x} at position {pos}")
            }
            Self::FieldTooLong { field, len } => {
                write!(f, "{field} too long: {len} bytes (max 255)")
            }
            Self::ResponseTooLarge { max } => {
                write!(f, "response head exceeds {max} bytes")
            }
        }
    }
}

impl std::error::Error for ProtocolError {}

pub(crate) fn ensure_remaining<B: bytes::Buf>(buf: &B, needed: usize) -> Result<(), ProtocolError> {
    let available = buf.remaining();
    if available < needed {
        return Err(ProtocolError::Incomplete { needed, available });
    }
    Ok(())
}

pub(crate) fn length_prefix(field: &'static str, value: &[u8]) -> Result<u8, ProtocolError> {
    u8::try_from(value.len()).map_err(|_overflow| ProtocolError::FieldTooLong {
        field,
        len: value.len(),
    })
}
