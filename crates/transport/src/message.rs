//! Monitor protocol message model.

use std::fmt;

use bytes::Bytes;

use crate::error::CodecError;

/// Inspection requests. The target answers these only while halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Inspect {
    PrintAddr,
    GetCpuReg,
    GetPpuReg,
    GetInstrAtAddr,
    GetOpLen,
}

/// Execution control requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlFlow {
    Until,
    Next,
    Break,
    Delete,
    Continue,
}

/// Monitor control messages, including the unsolicited halt notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Monitor {
    Stop,
    Resume,
    Halted,
}

/// The `(type, subtype)` pair of a message.
///
/// The meaning of the subtype byte depends on the type byte, so both are
/// carried together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Inspect(Inspect),
    ControlFlow(ControlFlow),
    Monitor(Monitor),
}

const TYPE_INSPECT: u8 = 0;
const TYPE_CONTROL_FLOW: u8 = 1;
const TYPE_MONITOR: u8 = 2;

impl MessageKind {
    /// Wire bytes for the header's `type` and `subtype` fields
    pub fn to_wire(self) -> (u8, u8) {
        match self {
            MessageKind::Inspect(sub) => (
                TYPE_INSPECT,
                match sub {
                    Inspect::PrintAddr => 0,
                    Inspect::GetCpuReg => 1,
                    Inspect::GetPpuReg => 2,
                    Inspect::GetInstrAtAddr => 3,
                    Inspect::GetOpLen => 4,
                },
            ),
            MessageKind::ControlFlow(sub) => (
                TYPE_CONTROL_FLOW,
                match sub {
                    ControlFlow::Until => 0,
                    ControlFlow::Next => 1,
                    ControlFlow::Break => 2,
                    ControlFlow::Delete => 3,
                    ControlFlow::Continue => 4,
                },
            ),
            MessageKind::Monitor(sub) => (
                TYPE_MONITOR,
                match sub {
                    Monitor::Stop => 0,
                    Monitor::Resume => 1,
                    Monitor::Halted => 2,
                },
            ),
        }
    }

    /// Parse the header's `type` and `subtype` bytes
    pub fn from_wire(ty: u8, subtype: u8) -> Result<Self, CodecError> {
        let unknown = |kind| CodecError::UnknownSubtype { kind, subtype };
        match ty {
            TYPE_INSPECT => Ok(MessageKind::Inspect(match subtype {
                0 => Inspect::PrintAddr,
                1 => Inspect::GetCpuReg,
                2 => Inspect::GetPpuReg,
                3 => Inspect::GetInstrAtAddr,
                4 => Inspect::GetOpLen,
                _ => return Err(unknown("inspect")),
            })),
            TYPE_CONTROL_FLOW => Ok(MessageKind::ControlFlow(match subtype {
                0 => ControlFlow::Until,
                1 => ControlFlow::Next,
                2 => ControlFlow::Break,
                3 => ControlFlow::Delete,
                4 => ControlFlow::Continue,
                _ => return Err(unknown("control flow")),
            })),
            TYPE_MONITOR => Ok(MessageKind::Monitor(match subtype {
                0 => Monitor::Stop,
                1 => Monitor::Resume,
                2 => Monitor::Halted,
                _ => return Err(unknown("monitor")),
            })),
            other => Err(CodecError::UnknownType(other)),
        }
    }

    /// Whether the target may be sent this message while it is executing
    pub fn is_safe_while_running(self) -> bool {
        !matches!(self, MessageKind::Inspect(_))
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Inspect(sub) => write!(f, "inspect/{sub:?}"),
            MessageKind::ControlFlow(sub) => write!(f, "control-flow/{sub:?}"),
            MessageKind::Monitor(sub) => write!(f, "monitor/{sub:?}"),
        }
    }
}

/// A single protocol message.
///
/// The payload length on the wire is always `payload.len()`; an empty
/// payload is a valid message in its own right.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    /// A message with a zero-length payload
    pub fn empty(kind: MessageKind) -> Self {
        Self::new(kind, Bytes::new())
    }

    /// A message carrying a single little-endian `u32`, the shape used for
    /// addresses and register selectors
    pub fn with_u32(kind: MessageKind, value: u32) -> Self {
        Self::new(kind, Bytes::copy_from_slice(&value.to_le_bytes()))
    }

    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Interpret a 1 to 4 byte payload as a little-endian unsigned value
    pub fn payload_u32(&self) -> Option<u32> {
        match self.payload.len() {
            1..=4 => Some(
                self.payload
                    .iter()
                    .rev()
                    .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte)),
            ),
            _ => None,
        }
    }
}
