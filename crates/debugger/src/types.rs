use std::fmt;

use transport::{Inspect, Message, MessageKind};

/// Location in the target's address space
pub type Address = u32;

/// A single decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub addr: Address,
    /// Encoded length in bytes, never zero
    pub length: u32,
    pub text: String,
}

impl Instruction {
    /// Address of the instruction that follows this one, if it fits in
    /// the address type
    pub fn next_addr(&self) -> Option<Address> {
        self.addr.checked_add(self.length)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x}: {}", self.addr, self.text)
    }
}

/// Registers shown in the register panel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Af,
    Bc,
    De,
    Hl,
    Sp,
    Pc,
    /// PPU current scanline
    Ly,
}

impl Register {
    /// Panel order
    pub const ALL: [Register; 7] = [
        Register::Af,
        Register::Bc,
        Register::De,
        Register::Hl,
        Register::Sp,
        Register::Pc,
        Register::Ly,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Register::Af => "AF",
            Register::Bc => "BC",
            Register::De => "DE",
            Register::Hl => "HL",
            Register::Sp => "SP",
            Register::Pc => "PC",
            Register::Ly => "LY",
        }
    }

    /// Request that reads this register from the target
    pub(crate) fn request(self) -> Message {
        let (subtype, selector) = match self {
            Register::Af => (Inspect::GetCpuReg, 0),
            Register::Bc => (Inspect::GetCpuReg, 1),
            Register::De => (Inspect::GetCpuReg, 2),
            Register::Hl => (Inspect::GetCpuReg, 3),
            Register::Sp => (Inspect::GetCpuReg, 4),
            Register::Pc => (Inspect::GetCpuReg, 5),
            Register::Ly => (Inspect::GetPpuReg, 0),
        };
        Message::with_u32(MessageKind::Inspect(subtype), selector)
    }

    /// Panel rendering of a register value, e.g. `0x000f`
    pub fn format_value(value: u32) -> String {
        format!("{value:#06x}")
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
