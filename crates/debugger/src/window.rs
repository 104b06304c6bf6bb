//! The window of decoded instructions shown in the source view.

use std::collections::VecDeque;

use crate::{Address, DecodeError, Instruction, WindowError};

/// Where window instructions come from
pub trait InstructionSource {
    /// Fetch and decode the instruction starting at `addr`
    fn instruction_at(&mut self, addr: Address) -> Result<Instruction, DecodeError>;

    /// Longest encoding in the instruction set, bounding the backward scan
    fn max_instruction_len(&self) -> usize;

    /// Highest valid address
    fn address_max(&self) -> Address;
}

/// A contiguous run of decoded instructions.
///
/// Every instruction but the last ends exactly where the next one starts.
/// Windows are rebuilt from target memory rather than patched; sliding
/// only ever fetches the single instruction that enters the window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionWindow {
    instructions: VecDeque<Instruction>,
    /// Number of instructions the window was built to hold
    height: usize,
    highlighted: Option<Address>,
    current: Option<Address>,
}

impl InstructionWindow {
    /// Decode `count` consecutive instructions starting at `start`.
    ///
    /// Stops early, without error, when the next instruction would start
    /// beyond the end of the address space. Any failed fetch discards the
    /// instructions decoded so far.
    #[tracing::instrument(skip(source), level = "debug")]
    pub fn build<S>(source: &mut S, start: Address, count: usize) -> Result<Self, WindowError>
    where
        S: InstructionSource + ?Sized,
    {
        let address_max = source.address_max();
        let mut instructions = VecDeque::with_capacity(count);
        let mut addr = Some(start);

        while instructions.len() < count {
            let Some(next) = addr.filter(|a| *a <= address_max) else {
                break;
            };
            let instruction = fetch(source, next)?;
            addr = instruction.next_addr();
            instructions.push_back(instruction);
        }

        Ok(Self {
            instructions,
            height: count,
            highlighted: None,
            current: None,
        })
    }

    /// Drop the first instruction and append the one after the last.
    ///
    /// On error the window is unchanged.
    pub fn slide_forward<S>(&mut self, source: &mut S) -> Result<(), WindowError>
    where
        S: InstructionSource + ?Sized,
    {
        let next = self
            .instructions
            .back()
            .and_then(Instruction::next_addr)
            .filter(|addr| *addr <= source.address_max())
            .ok_or(WindowError::BoundaryReached)?;

        let instruction = fetch(source, next)?;
        self.instructions.pop_front();
        self.instructions.push_back(instruction);
        Ok(())
    }

    /// Prepend the instruction that ends at the window start, dropping
    /// the last one if the window is full.
    ///
    /// Memory does not say where the previous instruction begins, so each
    /// candidate start `o` from `start - max_len` up to `start - 1` is
    /// decoded and the first (smallest) one with `o + length == start` is
    /// taken. This is only exact when the byte stream really is
    /// instruction aligned at `start`; an operand byte that happens to
    /// decode to the right length is indistinguishable from an opcode.
    ///
    /// Candidates that fail to decode are skipped. When no candidate ends
    /// at `start` the window is left as it is and
    /// [`WindowError::BoundaryReached`] is returned.
    pub fn slide_backward<S>(&mut self, source: &mut S) -> Result<(), WindowError>
    where
        S: InstructionSource + ?Sized,
    {
        let start = self
            .instructions
            .front()
            .map(|i| i.addr)
            .ok_or(WindowError::BoundaryReached)?;

        let max_len = u32::try_from(source.max_instruction_len()).unwrap_or(u32::MAX);
        for back in (1..=max_len).rev() {
            let Some(candidate) = start.checked_sub(back) else {
                continue;
            };
            match source.instruction_at(candidate) {
                Ok(instruction) if instruction.next_addr() == Some(start) => {
                    tracing::trace!(candidate, start, "previous instruction found");
                    self.instructions.push_front(instruction);
                    if self.instructions.len() > self.height {
                        self.instructions.pop_back();
                    }
                    return Ok(());
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => {
                    return Err(WindowError::Decode {
                        addr: candidate,
                        source: e,
                    });
                }
                Err(e) => tracing::trace!(candidate, error = %e, "skipping undecodable candidate"),
            }
        }

        tracing::debug!(start, "no instruction ends at window start");
        Err(WindowError::BoundaryReached)
    }

    /// Mark `addr` as highlighted, returning whether it is in the window.
    ///
    /// Highlighting an address outside the window is allowed; it means the
    /// highlighted instruction is not currently visible.
    pub fn highlight(&mut self, addr: Address) -> bool {
        self.highlighted = Some(addr);
        self.contains(addr)
    }

    /// Record the target's program counter
    pub fn set_current(&mut self, addr: Address) {
        self.current = Some(addr);
    }

    pub fn highlighted(&self) -> Option<Address> {
        self.highlighted
    }

    pub fn current(&self) -> Option<Address> {
        self.current
    }

    pub fn start_addr(&self) -> Option<Address> {
        self.instructions.front().map(|i| i.addr)
    }

    pub fn contains(&self, addr: Address) -> bool {
        self.position(addr).is_some()
    }

    /// Row of the instruction starting at `addr`
    pub fn position(&self, addr: Address) -> Option<usize> {
        self.instructions.iter().position(|i| i.addr == addr)
    }

    pub fn get(&self, row: usize) -> Option<&Instruction> {
        self.instructions.get(row)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.instructions.iter().map(|i| i.addr).collect()
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Whether each instruction ends where the next one starts
    pub fn is_contiguous(&self) -> bool {
        self.instructions
            .iter()
            .zip(self.instructions.iter().skip(1))
            .all(|(a, b)| a.next_addr() == Some(b.addr))
    }
}

fn fetch<S>(source: &mut S, addr: Address) -> Result<Instruction, WindowError>
where
    S: InstructionSource + ?Sized,
{
    source
        .instruction_at(addr)
        .map_err(|source| WindowError::Decode { addr, source })
}

#[cfg(test)]
mod tests {
    use crate::testing::{MemoryImage, TableDecoder};

    use super::*;

    fn uniform_image(len: usize) -> MemoryImage<TableDecoder> {
        MemoryImage::new(vec![0u8; len], TableDecoder::uniform(1))
    }

    #[test]
    fn build_decodes_consecutive_instructions() {
        let mut image = uniform_image(0x200);
        let window = InstructionWindow::build(&mut image, 0x0100, 5).unwrap();
        assert_eq!(window.addresses(), vec![0x100, 0x101, 0x102, 0x103, 0x104]);
        assert!(window.is_contiguous());
    }

    #[test]
    fn build_follows_variable_lengths() {
        // 3 byte, 1 byte, 2 byte instructions
        let decoder = TableDecoder::uniform(1)
            .with_length(0x31, 3)
            .with_length(0x3e, 2);
        let mut image = MemoryImage::new(vec![0x31, 0xfe, 0xff, 0x00, 0x3e, 0x10, 0x00], decoder);
        let window = InstructionWindow::build(&mut image, 0, 4).unwrap();
        assert_eq!(window.addresses(), vec![0, 3, 4, 6]);
        assert!(window.is_contiguous());
    }

    #[test]
    fn build_discards_partial_window_on_failure() {
        let mut image = uniform_image(0x10).with_failure_at(0x3);
        match InstructionWindow::build(&mut image, 0, 8) {
            Err(WindowError::Decode { addr, .. }) => assert_eq!(addr, 3),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn build_stops_at_end_of_address_space() {
        let mut image = uniform_image(0x10);
        let window = InstructionWindow::build(&mut image, 0xd, 8).unwrap();
        assert_eq!(window.addresses(), vec![0xd, 0xe, 0xf]);
    }

    #[test]
    fn build_with_zero_count_is_empty() {
        let mut image = uniform_image(0x10);
        let window = InstructionWindow::build(&mut image, 0, 0).unwrap();
        assert!(window.is_empty());
        assert_eq!(image.fetches(), 0);
    }

    #[test]
    fn slide_forward_fetches_one_instruction() {
        let mut image = uniform_image(0x200);
        let mut window = InstructionWindow::build(&mut image, 0x100, 4).unwrap();
        let before = image.fetches();

        window.slide_forward(&mut image).unwrap();
        assert_eq!(image.fetches(), before + 1);
        assert_eq!(window.addresses(), vec![0x101, 0x102, 0x103, 0x104]);
    }

    #[test]
    fn slide_forward_at_end_of_memory() {
        let mut image = uniform_image(0x10);
        let mut window = InstructionWindow::build(&mut image, 0xc, 4).unwrap();
        assert!(matches!(
            window.slide_forward(&mut image),
            Err(WindowError::BoundaryReached)
        ));
        assert_eq!(window.addresses(), vec![0xc, 0xd, 0xe, 0xf]);
    }

    #[test]
    fn slide_forward_failure_keeps_window() {
        let mut image = uniform_image(0x10).with_failure_at(0x4);
        let mut window = InstructionWindow::build(&mut image, 0, 4).unwrap();
        let before = window.clone();
        assert!(window.slide_forward(&mut image).is_err());
        assert_eq!(window, before);
    }

    /// Memory where decode(0x02), decode(0x03) and decode(0x04) report the
    /// given lengths, with a window anchored at 0x05
    fn backward_case(len2: u8, len3: u8, len4: u8) -> (MemoryImage<TableDecoder>, InstructionWindow) {
        let decoder = TableDecoder::uniform(1)
            .with_length(0xa1, 1)
            .with_length(0xa2, 2)
            .with_length(0xa3, 3);
        let opcode = |len: u8| 0xa0 + len;
        let mut memory = vec![0u8; 0x10];
        memory[2] = opcode(len2);
        memory[3] = opcode(len3);
        memory[4] = opcode(len4);
        let mut image = MemoryImage::new(memory, decoder);
        let window = InstructionWindow::build(&mut image, 0x05, 3).unwrap();
        (image, window)
    }

    #[test]
    fn backward_scan_prefers_smallest_matching_start() {
        let (mut image, mut window) = backward_case(3, 2, 1);
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.addresses(), vec![0x02, 0x05, 0x06]);
        assert!(window.is_contiguous());
    }

    #[test]
    fn backward_scan_falls_back_to_later_candidates() {
        let (mut image, mut window) = backward_case(1, 2, 1);
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.start_addr(), Some(0x03));

        let (mut image, mut window) = backward_case(1, 1, 1);
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.start_addr(), Some(0x04));
    }

    #[test]
    fn backward_scan_boundary_when_nothing_ends_at_start() {
        let (mut image, mut window) = backward_case(1, 1, 2);
        let before = window.clone();
        assert!(matches!(
            window.slide_backward(&mut image),
            Err(WindowError::BoundaryReached)
        ));
        assert_eq!(window, before);
    }

    #[test]
    fn backward_scan_at_address_zero() {
        let mut image = uniform_image(0x10);
        let mut window = InstructionWindow::build(&mut image, 0, 3).unwrap();
        assert!(matches!(
            window.slide_backward(&mut image),
            Err(WindowError::BoundaryReached)
        ));
    }

    #[test]
    fn backward_scan_near_address_zero_uses_remaining_candidates() {
        let mut image = uniform_image(0x10);
        let mut window = InstructionWindow::build(&mut image, 1, 3).unwrap();
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.addresses(), vec![0, 1, 2]);
    }

    #[test]
    fn backward_scan_skips_undecodable_candidates() {
        let (image, mut window) = backward_case(3, 2, 1);
        let mut image = image.with_failure_at(0x02);
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.start_addr(), Some(0x03));
    }

    #[test]
    fn backward_scan_propagates_channel_failure() {
        let (image, mut window) = backward_case(3, 2, 1);
        let mut image = image.with_channel_failure_at(0x02);
        let err = window.slide_backward(&mut image).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn slide_backward_then_forward_restores_window() {
        let decoder = TableDecoder::uniform(1).with_length(0x3e, 2).with_length(0x31, 3);
        let memory = vec![0x00, 0x3e, 0x01, 0x31, 0x00, 0x00, 0x00, 0x3e, 0x02, 0x00, 0x00];
        let mut image = MemoryImage::new(memory, decoder);
        let original = InstructionWindow::build(&mut image, 0x03, 3).unwrap();

        let mut window = original.clone();
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.start_addr(), Some(0x01));
        window.slide_forward(&mut image).unwrap();
        assert_eq!(window, original);
    }

    #[test]
    fn backward_scan_grows_short_window() {
        let mut image = uniform_image(0x10);
        let mut window = InstructionWindow::build(&mut image, 0xe, 4).unwrap();
        assert_eq!(window.addresses(), vec![0xe, 0xf]);

        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.addresses(), vec![0xd, 0xe, 0xf]);
        window.slide_backward(&mut image).unwrap();
        window.slide_backward(&mut image).unwrap();
        assert_eq!(window.addresses(), vec![0xb, 0xc, 0xd, 0xe]);
    }

    #[test]
    fn highlight_outside_window() {
        let mut image = uniform_image(0x10);
        let mut window = InstructionWindow::build(&mut image, 0, 4).unwrap();
        assert!(window.highlight(2));
        assert_eq!(window.highlighted(), Some(2));
        assert!(!window.highlight(0xa));
        assert_eq!(window.highlighted(), Some(0xa));
    }
}
