//! Emulator monitor client transport
//!
//! This crate contains the wire codec for monitor protocol messages and a
//! blocking request/reply client over a framed byte channel.
//!
//! # Scope
//!
//! - Encoding and decoding messages ([`codec`])
//! - Abstracting the byte channel ([`io`])
//! - Pairing one request with one reply, and polling for unsolicited
//!   halt notifications ([`Client`])
//!
//! Deciding which requests are legal at a given moment belongs to the
//! `debugger` crate.
mod client;
pub mod codec;
mod error;
pub mod io;
mod message;
pub mod reader;

pub use client::Client;
pub use codec::MessageCodec;
pub use error::{CodecError, TransportError};
pub use io::{InMemoryTransport, MonitorTransport};
#[cfg(unix)]
pub use io::UnixTransport;
pub use message::{ControlFlow, Inspect, Message, MessageKind, Monitor};
pub use reader::PollResult;
