//! Error types for the transport layer.

use std::io;

/// Errors that can occur while encoding or decoding monitor messages.
///
/// Every variant other than [`CodecError::Io`] means the bytes on the
/// channel did not form a well-formed message.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Fewer bytes than a full header were available.
    #[error("malformed message: header needs {needed} bytes, got {available}")]
    ShortHeader {
        /// Header size in bytes.
        needed: usize,
        /// Bytes actually available.
        available: usize,
    },

    /// The declared payload length disagrees with the bytes available.
    #[error("malformed message: declared payload of {declared} bytes, got {available}")]
    LengthMismatch {
        /// `payload_len` from the header.
        declared: usize,
        /// Bytes that followed the header.
        available: usize,
    },

    /// The type byte does not name a known message type.
    #[error("malformed message: unknown message type {0:#04x}")]
    UnknownType(u8),

    /// The subtype byte is not valid for the message type.
    #[error("malformed message: unknown subtype {subtype:#04x} for {kind} message")]
    UnknownSubtype {
        /// Name of the message type.
        kind: &'static str,
        /// The offending subtype byte.
        subtype: u8,
    },

    /// The payload exceeds the configured maximum size.
    #[error("message size {size} exceeds maximum allowed {max}")]
    MessageTooLarge {
        /// The declared payload size.
        size: usize,
        /// The maximum allowed size.
        max: usize,
    },
}

impl CodecError {
    /// Whether this error describes a malformed message rather than an I/O failure
    pub fn is_malformed(&self) -> bool {
        !matches!(self, CodecError::Io(_))
    }
}

/// Errors surfaced by [`crate::Client`].
///
/// [`TransportError::Channel`] and [`TransportError::Closed`] mean the
/// channel can no longer be used. A [`TransportError::Codec`] error only
/// costs the offending frame: the stream stays in step and the next
/// message is read normally.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Writing to or reading from the channel failed.
    #[error("channel error: {0}")]
    Channel(#[source] io::Error),

    /// The peer closed the channel.
    #[error("channel closed by peer")]
    Closed,

    /// The peer sent bytes that do not decode as a message.
    #[error(transparent)]
    Codec(CodecError),
}

impl TransportError {
    /// Whether the channel is unusable from now on
    pub fn is_fatal(&self) -> bool {
        !matches!(self, TransportError::Codec(_))
    }
}

impl From<CodecError> for TransportError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::Io(e) => TransportError::Channel(e),
            other => TransportError::Codec(other),
        }
    }
}

impl From<io::Error> for TransportError {
    fn from(value: io::Error) -> Self {
        match value.kind() {
            io::ErrorKind::BrokenPipe | io::ErrorKind::UnexpectedEof => TransportError::Closed,
            _ => TransportError::Channel(value),
        }
    }
}
