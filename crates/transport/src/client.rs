use std::collections::VecDeque;
use std::io::{Read, Write};

use bytes::BytesMut;
use tokio_util::codec::Encoder;

use crate::io::MonitorTransport;
use crate::reader::{MessageReader, PollResult};
use crate::{Message, MessageCodec, MessageKind, Monitor, TransportError};

/// Synchronous request/reply client for the monitor protocol
///
/// The protocol carries no request identifiers: every [`Client::call`]
/// writes one request and takes the next non-notification message as its
/// reply. Only one request may be outstanding at a time.
///
/// Halt notifications that arrive while a call is waiting for its reply
/// are queued and handed out by [`Client::poll_notification`].
///
/// # Example
///
/// ```no_run
/// use transport::{Client, Message, MessageKind, Inspect, io::UnixTransport};
///
/// let mut client = Client::with_transport(UnixTransport::connect("/tmp/emu-monitor.sock")?)?;
/// let reply = client.call(Message::with_u32(MessageKind::Inspect(Inspect::GetCpuReg), 5))?;
/// println!("pc = {:?}", reply.payload_u32());
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct Client {
    reader: MessageReader<Box<dyn Read + Send>>,
    writer: Box<dyn Write + Send>,
    codec: MessageCodec,
    notifications: VecDeque<Message>,
}

impl Client {
    /// Create a new client over any [`MonitorTransport`]
    pub fn with_transport<T>(transport: T) -> eyre::Result<Self>
    where
        T: MonitorTransport,
    {
        Self::with_codec(transport, MessageCodec::new())
    }

    pub fn with_codec<T>(transport: T, codec: MessageCodec) -> eyre::Result<Self>
    where
        T: MonitorTransport,
    {
        let (input, output) = transport.split()?;
        Ok(Self {
            reader: MessageReader::new(Box::new(input), codec.clone()),
            writer: Box::new(output),
            codec,
            notifications: VecDeque::new(),
        })
    }

    /// Send `request` and block until its reply arrives
    ///
    /// A malformed frame where the reply was expected is consumed and
    /// reported as [`TransportError::Codec`]; the channel stays usable.
    #[tracing::instrument(skip(self, request), fields(kind = %request.kind), level = "debug")]
    pub fn call(&mut self, request: Message) -> Result<Message, TransportError> {
        self.write(request)?;
        loop {
            match self.reader.poll_message(true)? {
                PollResult::Message(message) if is_halt_notification(&message) => {
                    tracing::debug!("queueing halt notification received while awaiting reply");
                    self.notifications.push_back(message);
                }
                PollResult::Message(reply) => return Ok(reply),
                PollResult::NoMessage => {}
            }
        }
    }

    /// Send `request` without waiting for a reply
    #[tracing::instrument(skip(self, request), fields(kind = %request.kind), level = "debug")]
    pub fn send(&mut self, request: Message) -> Result<(), TransportError> {
        self.write(request)
    }

    /// Read a message without writing anything first
    ///
    /// Used for unsolicited halt notifications. With `wait = false` this
    /// never blocks when nothing has arrived.
    pub fn poll_notification(&mut self, wait: bool) -> Result<PollResult, TransportError> {
        if let Some(message) = self.notifications.pop_front() {
            return Ok(PollResult::Message(message));
        }
        self.reader.poll_message(wait)
    }

    fn write(&mut self, message: Message) -> Result<(), TransportError> {
        tracing::debug!(kind = %message.kind, len = message.payload_len(), "sending message");
        let mut buf = BytesMut::new();
        self.codec.encode(message, &mut buf)?;
        self.writer.write_all(&buf)?;
        self.writer.flush()?;
        Ok(())
    }
}

fn is_halt_notification(message: &Message) -> bool {
    message.kind == MessageKind::Monitor(Monitor::Halted)
}
