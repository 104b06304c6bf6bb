//! In-memory transport implementation for testing

use std::io::{self, Cursor, Read, Write};

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use super::MonitorTransport;

/// In-memory transport for testing
///
/// This transport uses channels for bidirectional communication without
/// a real socket. One end is handed to the [`crate::Client`], the other is
/// driven by a test acting as the target.
///
/// # Examples
///
/// ```
/// use transport::io::{InMemoryTransport, MonitorTransport};
/// use transport::Client;
///
/// let (client_transport, target_transport) = InMemoryTransport::pair();
/// let client = Client::with_transport(client_transport)?;
/// let (target_reader, target_writer) = target_transport.split()?;
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct InMemoryTransport {
    reader: InMemoryReader,
    writer: InMemoryWriter,
}

/// Reader half of in-memory transport
///
/// When the channel is empty it returns `WouldBlock` to match the read
/// timeout behaviour of the socket transport.
pub struct InMemoryReader {
    buffer: Cursor<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
}

/// Writer half of in-memory transport
pub struct InMemoryWriter {
    tx: Sender<Vec<u8>>,
}

impl InMemoryTransport {
    /// Create a connected pair of in-memory transports
    ///
    /// Data written to one end can be read from the other.
    pub fn pair() -> (Self, Self) {
        let (client_tx, target_rx) = crossbeam_channel::unbounded();
        let (target_tx, client_rx) = crossbeam_channel::unbounded();

        let client = Self {
            reader: InMemoryReader::new(client_rx),
            writer: InMemoryWriter { tx: client_tx },
        };

        let target = Self {
            reader: InMemoryReader::new(target_rx),
            writer: InMemoryWriter { tx: target_tx },
        };

        (client, target)
    }
}

impl MonitorTransport for InMemoryTransport {
    type Reader = InMemoryReader;
    type Writer = InMemoryWriter;

    fn split(self) -> eyre::Result<(Self::Reader, Self::Writer)> {
        Ok((self.reader, self.writer))
    }
}

impl InMemoryReader {
    fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            buffer: Cursor::new(Vec::new()),
            rx,
        }
    }

    /// Whether any written bytes are still waiting to be read
    pub fn has_pending(&self) -> bool {
        self.buffer.position() < self.buffer.get_ref().len() as u64 || !self.rx.is_empty()
    }

    /// Block until the next chunk is available, then read as [`Read::read`] would
    ///
    /// Returns `Ok(0)` once the writer half has been dropped.
    pub fn read_blocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.recv() {
                Ok(data) => self.buffer = Cursor::new(data),
                Err(_) => return Ok(0),
            }
        }
        self.buffer.read(buf)
    }
}

impl Read for InMemoryReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.buffer.position() >= self.buffer.get_ref().len() as u64 {
            match self.rx.try_recv() {
                Ok(data) => {
                    self.buffer = Cursor::new(data);
                }
                Err(TryRecvError::Empty) => {
                    return Err(io::Error::new(
                        io::ErrorKind::WouldBlock,
                        "no data available",
                    ));
                }
                Err(TryRecvError::Disconnected) => {
                    return Ok(0);
                }
            }
        }

        self.buffer.read(buf)
    }
}

impl Write for InMemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel disconnected"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
