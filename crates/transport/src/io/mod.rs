//! IO abstraction layer for the monitor channel
//!
//! The core trait [`MonitorTransport`] allows plugging in different byte
//! channels: a unix socket to a live emulator, or an in-memory pair for
//! tests.
//!
//! # Examples
//!
//! ## Using the unix socket transport
//!
//! ```no_run
//! use transport::io::UnixTransport;
//! use transport::Client;
//!
//! let transport = UnixTransport::connect("/tmp/emu-monitor.sock")?;
//! let client = Client::with_transport(transport)?;
//! # Ok::<(), eyre::Error>(())
//! ```
//!
//! ## Using the in-memory transport for testing
//!
//! ```
//! use transport::io::InMemoryTransport;
//! use transport::Client;
//!
//! let (client_transport, target_transport) = InMemoryTransport::pair();
//! let client = Client::with_transport(client_transport)?;
//! # Ok::<(), eyre::Error>(())
//! ```

use std::io::{Read, Write};

mod memory;
#[cfg(unix)]
mod unix;


pub use memory::{InMemoryReader, InMemoryTransport, InMemoryWriter};
#[cfg(unix)]
pub use unix::UnixTransport;

/// Trait for a bidirectional monitor byte channel
///
/// Implementations must be splittable into independent reader and writer
/// halves.
///
/// # Requirements
///
/// - When no data is currently available the reader must return an error
///   of kind `WouldBlock` (or `TimedOut`) rather than block forever, so
///   that notification polling can be non-blocking. Blocking reads are
///   built on top by retrying.
/// - End of stream (`Ok(0)`) means the peer closed the channel.
pub trait MonitorTransport: Send + 'static {
    /// The reader half
    type Reader: Read + Send + 'static;

    /// The writer half
    type Writer: Write + Send + 'static;

    /// Split the transport into separate reader and writer halves
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be split (e.g., socket cloning fails)
    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)>;
}
