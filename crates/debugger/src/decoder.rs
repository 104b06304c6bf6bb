//! Instruction decoding collaborators.

use std::fmt::Write as _;

use crate::{Address, DecodeError, Instruction};

/// Result of decoding the bytes at one address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub text: String,
    pub length: usize,
}

/// Turns raw target bytes into instruction text and length.
///
/// Implementations must be deterministic and must never report a length
/// greater than `max_len`.
pub trait Decoder {
    /// Longest encoding in the instruction set
    fn max_instruction_len(&self) -> usize;

    fn decode(&self, bytes: &[u8], max_len: usize) -> Result<Decoded, DecodeError>;
}

/// Decode `bytes` fetched from `addr`, checking the reported length.
pub fn decode_instruction<D>(decoder: &D, addr: Address, bytes: &[u8]) -> Result<Instruction, DecodeError>
where
    D: Decoder + ?Sized,
{
    let max = decoder.max_instruction_len().min(bytes.len());
    if max == 0 {
        return Err(DecodeError::Empty);
    }
    let Decoded { text, length } = decoder.decode(bytes, max)?;
    if length == 0 || length > max {
        return Err(DecodeError::BadLength { length, max });
    }
    Ok(Instruction {
        addr,
        length: length as u32,
        text,
    })
}

/// Decoder for the Game Boy CPU (SM83).
///
/// Only instruction lengths are known; the text is the raw encoding,
/// e.g. `db $31 $fe $ff`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sm83Decoder;

impl Sm83Decoder {
    pub const MAX_INSTRUCTION_LEN: usize = 3;

    fn opcode_len(opcode: u8) -> usize {
        match opcode {
            // `CB` prefixed opcodes are all two bytes long
            0x06 | 0x0e | 0x10 | 0x16 | 0x18 | 0x1e | 0x20 | 0x26 | 0x28 | 0x2e | 0x30 | 0x36
            | 0x38 | 0x3e | 0xc6 | 0xcb | 0xce | 0xd6 | 0xde | 0xe0 | 0xe6 | 0xe8 | 0xee
            | 0xf0 | 0xf6 | 0xf8 | 0xfe => 2,
            0x01 | 0x08 | 0x11 | 0x21 | 0x31 | 0xc2 | 0xc3 | 0xc4 | 0xca | 0xcc | 0xcd | 0xd2
            | 0xd4 | 0xda | 0xdc | 0xea | 0xfa => 3,
            _ => 1,
        }
    }
}

impl Decoder for Sm83Decoder {
    fn max_instruction_len(&self) -> usize {
        Self::MAX_INSTRUCTION_LEN
    }

    fn decode(&self, bytes: &[u8], max_len: usize) -> Result<Decoded, DecodeError> {
        let Some(&opcode) = bytes.first() else {
            return Err(DecodeError::Empty);
        };
        let length = Self::opcode_len(opcode);
        let available = bytes.len().min(max_len);
        if length > available {
            return Err(DecodeError::Truncated {
                needed: length,
                available,
            });
        }

        let mut text = String::from("db");
        for byte in &bytes[..length] {
            let _ = write!(text, " ${byte:02x}");
        }
        Ok(Decoded { text, length })
    }
}
