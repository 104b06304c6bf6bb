use std::io::{self, Read};
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::codec::Decoder;

use crate::{Message, MessageCodec, TransportError};

const READ_CHUNK: usize = 512;

/// Result of a poll operation
#[derive(Debug, PartialEq, Eq)]
pub enum PollResult {
    /// A complete message was received
    Message(Message),
    /// Nothing was available and the caller asked not to wait
    NoMessage,
}

/// Reassembles framed messages from a byte reader.
///
/// Bytes beyond the end of the decoded frame stay buffered for the next
/// poll, so a reply and a notification arriving in one read are both
/// delivered.
pub struct MessageReader<R> {
    input: R,
    buffer: BytesMut,
    codec: MessageCodec,
}

impl<R> MessageReader<R>
where
    R: Read,
{
    pub fn new(input: R, codec: MessageCodec) -> Self {
        Self {
            input,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            codec,
        }
    }

    /// Read the next message.
    ///
    /// With `wait = false` this returns [`PollResult::NoMessage`] when no
    /// byte of a new message is available. Once part of a frame has been
    /// read, the rest is always waited for.
    pub fn poll_message(&mut self, wait: bool) -> Result<PollResult, TransportError> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(message) = self.codec.decode(&mut self.buffer)? {
                tracing::debug!(kind = %message.kind, len = message.payload_len(), "received message");
                return Ok(PollResult::Message(message));
            }

            match self.input.read(&mut chunk) {
                Ok(0) => {
                    return match self.codec.decode_eof(&mut self.buffer)? {
                        Some(message) => Ok(PollResult::Message(message)),
                        None => Err(TransportError::Closed),
                    };
                }
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    if !wait && self.buffer.is_empty() {
                        return Ok(PollResult::NoMessage);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(TransportError::Channel(e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use crate::codec::encode;
    use crate::io::{InMemoryTransport, MonitorTransport};
    use crate::{CodecError, MessageKind, Monitor};

    use super::*;

    fn reader_pair() -> (
        MessageReader<crate::io::InMemoryReader>,
        crate::io::InMemoryWriter,
    ) {
        let (client, target) = InMemoryTransport::pair();
        let (reader, _) = client.split().unwrap();
        let (_, writer) = target.split().unwrap();
        (MessageReader::new(reader, MessageCodec::new()), writer)
    }

    #[test]
    fn no_message_when_idle() -> eyre::Result<()> {
        let (mut reader, _writer) = reader_pair();
        assert_eq!(reader.poll_message(false)?, PollResult::NoMessage);
        Ok(())
    }

    #[test]
    fn message_split_between_writes() -> eyre::Result<()> {
        let (mut reader, mut writer) = reader_pair();
        let frame = encode(&Message::with_u32(MessageKind::Monitor(Monitor::Halted), 0x150))?;
        writer.write_all(&frame[..3])?;

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            writer.write_all(&frame[3..]).unwrap();
            writer
        });

        // a partial header forces the reader to wait even without `wait`
        match reader.poll_message(false)? {
            PollResult::Message(msg) => assert_eq!(msg.payload_u32(), Some(0x150)),
            other => panic!("unexpected {other:?}"),
        }
        let _writer = handle.join().unwrap();
        Ok(())
    }

    #[test]
    fn two_messages_in_one_write() -> eyre::Result<()> {
        let (mut reader, mut writer) = reader_pair();
        let mut bytes = encode(&Message::empty(MessageKind::Monitor(Monitor::Stop)))?.to_vec();
        bytes.extend_from_slice(&encode(&Message::with_u32(
            MessageKind::Monitor(Monitor::Halted),
            7,
        ))?);
        writer.write_all(&bytes)?;

        assert!(matches!(reader.poll_message(false)?, PollResult::Message(m) if m.payload_len() == 0));
        assert!(matches!(reader.poll_message(false)?, PollResult::Message(m) if m.payload_u32() == Some(7)));
        assert_eq!(reader.poll_message(false)?, PollResult::NoMessage);
        Ok(())
    }

    #[test]
    fn malformed_frame_is_skipped() -> eyre::Result<()> {
        let (mut reader, mut writer) = reader_pair();
        // monitor subtype 9 does not exist
        let mut bytes = vec![2, 9, 4, 0, 0, 0, 1, 2, 3, 4];
        bytes.extend_from_slice(&encode(&Message::with_u32(
            MessageKind::Monitor(Monitor::Halted),
            0x150,
        ))?);
        writer.write_all(&bytes)?;

        assert!(matches!(
            reader.poll_message(false),
            Err(TransportError::Codec(CodecError::UnknownSubtype { subtype: 9, .. }))
        ));
        match reader.poll_message(false)? {
            PollResult::Message(msg) => assert_eq!(msg.payload_u32(), Some(0x150)),
            other => panic!("unexpected {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn closed_channel() {
        let (mut reader, writer) = reader_pair();
        drop(writer);
        assert!(matches!(reader.poll_message(true), Err(TransportError::Closed)));
    }

    #[test]
    fn truncated_frame_at_close_is_malformed() -> eyre::Result<()> {
        let (mut reader, mut writer) = reader_pair();
        let frame = encode(&Message::with_u32(MessageKind::Monitor(Monitor::Halted), 1))?;
        writer.write_all(&frame[..frame.len() - 1])?;
        drop(writer);

        assert!(matches!(
            reader.poll_message(true),
            Err(TransportError::Codec(CodecError::LengthMismatch { .. }))
        ));
        Ok(())
    }
}
