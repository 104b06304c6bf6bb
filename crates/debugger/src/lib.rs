//! Debug session for the emulator monitor
//!
//! A [`Debugger`] owns the request/reply [`transport::Client`], the
//! execution state of the remote target and the instruction window shown
//! to the user. The target may halt at any time while it runs, so the
//! session refuses inspection requests until it has seen the halt
//! notification.
mod commands;
mod debugger;
mod decoder;
mod error;
mod presenter;
mod state;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod types;
mod window;

pub use commands::{Command, parse_address};
pub use debugger::{Debugger, Direction, SessionOptions};
pub use decoder::{Decoded, Decoder, Sm83Decoder, decode_instruction};
pub use error::{DebuggerError, DecodeError, ParseError, WindowError};
pub use presenter::Presenter;
pub use state::{ExecutionState, HaltOutcome};
pub use types::{Address, Instruction, Register};
pub use window::{InstructionSource, InstructionWindow};
