//! Error types for the debug session.

use transport::{CodecError, MessageKind, TransportError};

use crate::{Address, ExecutionState};

/// Failure to turn target memory into an instruction.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The target returned no bytes for the address.
    #[error("no instruction bytes available")]
    Empty,

    /// The opcode needs more bytes than were available.
    #[error("truncated instruction: needs {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },

    /// The opcode does not start a valid instruction.
    #[error("invalid opcode {0:#04x}")]
    InvalidOpcode(u8),

    /// The decoder reported a length it was not allowed to consume.
    #[error("decoded length {length} outside 1..={max}")]
    BadLength { length: usize, max: usize },

    /// The address lies beyond the end of the target's memory.
    #[error("address {0:#06x} is beyond the end of memory")]
    OutOfRange(Address),

    /// Fetching the bytes from the target failed.
    #[error(transparent)]
    Channel(#[from] TransportError),
}

impl DecodeError {
    /// Only a broken channel ends the session
    pub fn is_fatal(&self) -> bool {
        match self {
            DecodeError::Channel(e) => e.is_fatal(),
            _ => false,
        }
    }
}

/// Errors from building or sliding an instruction window.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    #[error("cannot decode instruction at {addr:#06x}: {source}")]
    Decode {
        addr: Address,
        #[source]
        source: DecodeError,
    },

    /// The window cannot move any further in this direction.
    #[error("no further instructions in this direction")]
    BoundaryReached,
}

impl WindowError {
    pub fn is_fatal(&self) -> bool {
        match self {
            WindowError::Decode { source, .. } => source.is_fatal(),
            WindowError::BoundaryReached => false,
        }
    }
}

/// Bad command syntax. Reported to the user, never acted on.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("invalid command `{0}`")]
    UnknownCommand(String),

    #[error("`{command}` needs an address")]
    MissingAddress { command: &'static str },

    #[error("too many arguments for `{command}`")]
    TooManyArguments { command: &'static str },

    #[error("invalid hex address `{0}`")]
    InvalidAddress(String),

    #[error("address `{text}` is above {max:#06x}")]
    AddressOutOfRange { text: String, max: Address },
}

/// Errors surfaced by [`crate::Debugger`].
///
/// Only [`DebuggerError::Channel`] is fatal; everything else leaves the
/// session usable and is meant to be shown to the user.
#[derive(Debug, thiserror::Error)]
pub enum DebuggerError {
    /// An operation was refused locally because of the execution state.
    /// Nothing was written to the channel.
    #[error("`{operation}` is not allowed while the target is {state}")]
    IllegalStateTransition {
        operation: &'static str,
        state: ExecutionState,
    },

    #[error("cannot decode instruction at {addr:#06x}: {source}")]
    Decode {
        addr: Address,
        #[source]
        source: DecodeError,
    },

    #[error("no further instructions in this direction")]
    BoundaryReached,

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A reply or notification carried a payload of the wrong shape.
    #[error("malformed {kind} payload of {len} bytes")]
    MalformedPayload { kind: MessageKind, len: usize },

    /// The target sent a frame that does not decode. The frame was
    /// dropped and the channel is still in step.
    #[error(transparent)]
    MalformedMessage(CodecError),

    #[error(transparent)]
    Channel(TransportError),
}

impl DebuggerError {
    /// Whether the session must terminate
    pub fn is_fatal(&self) -> bool {
        match self {
            DebuggerError::Channel(e) => e.is_fatal(),
            _ => false,
        }
    }
}

impl From<TransportError> for DebuggerError {
    fn from(value: TransportError) -> Self {
        match value {
            TransportError::Codec(e) => DebuggerError::MalformedMessage(e),
            other => DebuggerError::Channel(other),
        }
    }
}

impl From<WindowError> for DebuggerError {
    fn from(value: WindowError) -> Self {
        match value {
            WindowError::Decode {
                source: DecodeError::Channel(e),
                ..
            } => e.into(),
            WindowError::Decode { addr, source } => DebuggerError::Decode { addr, source },
            WindowError::BoundaryReached => DebuggerError::BoundaryReached,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_channel_failures_are_fatal() {
        let fatal: DebuggerError = WindowError::Decode {
            addr: 0x100,
            source: DecodeError::Channel(TransportError::Closed),
        }
        .into();
        assert!(fatal.is_fatal());

        let recoverable: DebuggerError = WindowError::Decode {
            addr: 0x100,
            source: DecodeError::InvalidOpcode(0xd3),
        }
        .into();
        assert!(!recoverable.is_fatal());
        assert!(!DebuggerError::from(WindowError::BoundaryReached).is_fatal());
        assert!(!DebuggerError::from(ParseError::Empty).is_fatal());
    }

    #[test]
    fn malformed_frames_are_recoverable() {
        let direct = DebuggerError::from(TransportError::Codec(CodecError::UnknownType(9)));
        assert!(matches!(direct, DebuggerError::MalformedMessage(_)));
        assert!(!direct.is_fatal());

        let source = DecodeError::Channel(TransportError::Codec(CodecError::UnknownType(9)));
        assert!(!source.is_fatal());
        let during_fetch: DebuggerError = WindowError::Decode { addr: 0x100, source }.into();
        assert!(matches!(during_fetch, DebuggerError::MalformedMessage(_)));
        assert!(!during_fetch.is_fatal());
    }
}
