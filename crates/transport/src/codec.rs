//! Monitor message codec using tokio-util.
//!
//! Wire shape:
//!
//! ```text
//! +------+---------+------------------+-------------------------+
//! | type | subtype | payload_len (LE) | payload_len bytes       |
//! | u8   | u8      | u32              |                         |
//! +------+---------+------------------+-------------------------+
//! ```
//!
//! There is no checksum, magic number or version field.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::CodecError;
use crate::message::{Message, MessageKind};

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 6;

/// Default maximum payload size (64 KiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 64 * 1024;

/// Encode a message into a freshly allocated buffer.
///
/// Fails with [`CodecError::MessageTooLarge`] when the payload length does
/// not fit the 32 bit length field.
pub fn encode(message: &Message) -> Result<Bytes, CodecError> {
    wire_len(message.payload_len())?;
    let mut dst = BytesMut::with_capacity(HEADER_LEN + message.payload_len());
    put_message(message, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode exactly one message from `src`.
///
/// `src` must hold the header and precisely `payload_len` bytes after it:
/// trailing or missing bytes are both [`CodecError::LengthMismatch`].
pub fn decode(src: &[u8]) -> Result<Message, CodecError> {
    let (kind, declared) = parse_header(src)?;
    let available = src.len() - HEADER_LEN;
    if declared != available {
        return Err(CodecError::LengthMismatch {
            declared,
            available,
        });
    }
    Ok(Message::new(kind, Bytes::copy_from_slice(&src[HEADER_LEN..])))
}

/// Value of the header length field for a payload of `len` bytes
fn wire_len(len: usize) -> Result<u32, CodecError> {
    u32::try_from(len).map_err(|_| CodecError::MessageTooLarge {
        size: len,
        max: u32::MAX as usize,
    })
}

fn put_message(message: &Message, dst: &mut BytesMut) -> Result<(), CodecError> {
    let len = wire_len(message.payload_len())?;
    let (ty, subtype) = message.kind.to_wire();
    dst.reserve(HEADER_LEN + message.payload_len());
    dst.put_u8(ty);
    dst.put_u8(subtype);
    dst.put_u32_le(len);
    dst.put_slice(&message.payload);
    Ok(())
}

fn parse_header(src: &[u8]) -> Result<(MessageKind, usize), CodecError> {
    let declared = declared_len(src)?;
    let kind = MessageKind::from_wire(src[0], src[1])?;
    Ok((kind, declared))
}

fn declared_len(src: &[u8]) -> Result<usize, CodecError> {
    if src.len() < HEADER_LEN {
        return Err(CodecError::ShortHeader {
            needed: HEADER_LEN,
            available: src.len(),
        });
    }
    Ok(u32::from_le_bytes([src[2], src[3], src[4], src[5]]) as usize)
}

/// Streaming codec for monitor messages.
///
/// A frame with a valid header but unusable contents (unknown type or
/// subtype, oversized payload) is dropped as a whole before the error is
/// returned: bytes of it that have not arrived yet are discarded as they
/// come in, so the next decode starts at the following frame.
///
/// # Example
///
/// ```
/// use bytes::BytesMut;
/// use tokio_util::codec::{Decoder, Encoder};
/// use transport::{Message, MessageCodec, MessageKind, Monitor};
///
/// let mut codec = MessageCodec::new();
/// let mut buf = BytesMut::new();
/// codec.encode(Message::empty(MessageKind::Monitor(Monitor::Stop)), &mut buf)?;
/// let decoded = codec.decode(&mut buf)?;
/// assert_eq!(decoded, Some(Message::empty(MessageKind::Monitor(Monitor::Stop))));
/// # Ok::<(), transport::CodecError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload: usize,
    /// Bytes of a rejected frame still to be thrown away
    skip: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    /// Messages with a larger payload are rejected with [`CodecError::MessageTooLarge`].
    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload,
            skip: 0,
        }
    }

    /// Drop the `total` byte frame at the head of `src`, remembering
    /// whatever part of it is still to come
    fn reject_frame(&mut self, src: &mut BytesMut, total: usize, error: CodecError) -> CodecError {
        let available = total.min(src.len());
        src.advance(available);
        self.skip = total - available;
        tracing::warn!(%error, dropped = total, "dropping malformed frame");
        error
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if self.skip > 0 {
            let n = self.skip.min(src.len());
            src.advance(n);
            self.skip -= n;
            if self.skip > 0 {
                return Ok(None);
            }
        }

        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let declared = declared_len(src)?;
        let total_length = HEADER_LEN.saturating_add(declared);
        let kind = match MessageKind::from_wire(src[0], src[1]) {
            Ok(kind) => kind,
            Err(e) => return Err(self.reject_frame(src, total_length, e)),
        };
        if declared > self.max_payload {
            let e = CodecError::MessageTooLarge {
                size: declared,
                max: self.max_payload,
            };
            return Err(self.reject_frame(src, total_length, e));
        }

        if src.len() < total_length {
            src.reserve(total_length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(declared).freeze();
        Ok(Some(Message::new(kind, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(message) => Ok(Some(message)),
            None if src.is_empty() => Ok(None),
            None if src.len() < HEADER_LEN => Err(CodecError::ShortHeader {
                needed: HEADER_LEN,
                available: src.len(),
            }),
            None => {
                let (_, declared) = parse_header(src)?;
                Err(CodecError::LengthMismatch {
                    declared,
                    available: src.len() - HEADER_LEN,
                })
            }
        }
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        if item.payload_len() > self.max_payload {
            return Err(CodecError::MessageTooLarge {
                size: item.payload_len(),
                max: self.max_payload,
            });
        }
        put_message(&item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ControlFlow, Inspect, Monitor};

    #[test]
    fn header_layout() {
        let msg = Message::with_u32(MessageKind::ControlFlow(ControlFlow::Until), 0x0150);
        let bytes = encode(&msg).unwrap();
        assert_eq!(&bytes[..], &[1, 0, 4, 0, 0, 0, 0x50, 0x01, 0, 0]);
    }

    #[test]
    fn length_field_is_never_truncated() {
        assert_eq!(wire_len(0).unwrap(), 0);
        assert_eq!(wire_len(u32::MAX as usize).unwrap(), u32::MAX);
        #[cfg(target_pointer_width = "64")]
        assert!(matches!(
            wire_len(u32::MAX as usize + 1),
            Err(CodecError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn roundtrip_preserves_messages() {
        let messages = [
            Message::empty(MessageKind::ControlFlow(ControlFlow::Next)),
            Message::with_u32(MessageKind::Inspect(Inspect::GetCpuReg), 5),
            Message::new(
                MessageKind::Inspect(Inspect::GetInstrAtAddr),
                vec![0x31, 0xfe, 0xff],
            ),
            Message::with_u32(MessageKind::Monitor(Monitor::Halted), 0xffff_ffff),
        ];
        for msg in messages {
            assert_eq!(decode(&encode(&msg).unwrap()).unwrap(), msg);
        }
    }

    #[test]
    fn empty_payload_is_distinct() {
        let bytes = encode(&Message::empty(MessageKind::Monitor(Monitor::Stop))).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let msg = decode(&bytes).unwrap();
        assert_eq!(msg.payload_len(), 0);
    }

    #[test]
    fn decode_rejects_length_mismatch() {
        let mut bytes = encode(&Message::with_u32(
            MessageKind::Inspect(Inspect::PrintAddr),
            1,
        ))
        .unwrap()
        .to_vec();

        let truncated = &bytes[..bytes.len() - 1];
        assert!(matches!(
            decode(truncated),
            Err(CodecError::LengthMismatch {
                declared: 4,
                available: 3
            })
        ));

        bytes.push(0);
        assert!(matches!(
            decode(&bytes),
            Err(CodecError::LengthMismatch {
                declared: 4,
                available: 5
            })
        ));
    }

    #[test]
    fn decode_rejects_short_header() {
        assert!(matches!(
            decode(&[0, 1, 2]),
            Err(CodecError::ShortHeader { available: 3, .. })
        ));
    }

    #[test]
    fn stream_decode_waits_for_complete_frame() {
        let mut codec = MessageCodec::new();
        let full = encode(&Message::new(
            MessageKind::Inspect(Inspect::GetInstrAtAddr),
            vec![1, 2, 3],
        ))
        .unwrap();

        let mut buf = BytesMut::from(&full[..4]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[4..7]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[7..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(&msg.payload[..], &[1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn stream_decode_multiple_frames() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Message::empty(MessageKind::Monitor(Monitor::Stop)), &mut buf)
            .unwrap();
        codec
            .encode(
                Message::with_u32(MessageKind::Monitor(Monitor::Halted), 0x100),
                &mut buf,
            )
            .unwrap();

        let first = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.kind, MessageKind::Monitor(Monitor::Stop));
        let second = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.payload_u32(), Some(0x100));
        assert!(buf.is_empty());
    }

    #[test]
    fn stream_decode_eof_with_partial_frame_is_malformed() {
        let mut codec = MessageCodec::new();
        let full = encode(&Message::with_u32(MessageKind::Monitor(Monitor::Halted), 1)).unwrap();
        let mut buf = BytesMut::from(&full[..full.len() - 2]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(CodecError::LengthMismatch {
                declared: 4,
                available: 2
            })
        ));
    }

    #[test]
    fn stream_decode_drops_frame_with_unknown_type() {
        let mut codec = MessageCodec::new();
        let mut buf = BytesMut::from(&[9u8, 0, 2, 0, 0, 0, 0xaa, 0xbb][..]);
        buf.extend_from_slice(&encode(&Message::empty(MessageKind::Monitor(Monitor::Stop))).unwrap());

        assert!(matches!(codec.decode(&mut buf), Err(CodecError::UnknownType(9))));
        let next = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(next.kind, MessageKind::Monitor(Monitor::Stop));
        assert!(buf.is_empty());
    }

    #[test]
    fn stream_decode_discards_rest_of_rejected_frame() {
        let mut codec = MessageCodec::with_max_payload(2);
        let mut frame = encode(&Message::new(
            MessageKind::Inspect(Inspect::GetInstrAtAddr),
            vec![1, 2, 3, 4, 5],
        ))
        .unwrap()
        .to_vec();
        frame.extend_from_slice(&encode(&Message::empty(MessageKind::Monitor(Monitor::Stop))).unwrap());

        // only part of the oversized payload has arrived
        let mut buf = BytesMut::from(&frame[..HEADER_LEN + 2]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { size: 5, max: 2 })
        ));
        assert!(buf.is_empty());

        buf.extend_from_slice(&frame[HEADER_LEN + 2..]);
        let next = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(next.kind, MessageKind::Monitor(Monitor::Stop));
        assert!(buf.is_empty());
    }

    #[test]
    fn stream_decode_too_large() {
        let mut codec = MessageCodec::with_max_payload(2);
        let mut buf = BytesMut::from(
            &encode(&Message::with_u32(MessageKind::Monitor(Monitor::Halted), 1)).unwrap()[..],
        );
        assert!(matches!(
            codec.decode(&mut buf),
            Err(CodecError::MessageTooLarge { size: 4, max: 2 })
        ));
    }
}
