//! Testing utilities for the debug session.
//!
//! This module provides test doubles for each collaborator of a
//! [`crate::Debugger`]:
//!
//! - [`TableDecoder`]: a decoder whose instruction lengths come from a table
//! - [`MemoryImage`]: an [`InstructionSource`] over an in-process byte buffer
//! - [`RecordingPresenter`]: a presenter that records everything it is shown
//! - [`FakeTarget`]: a monitor target served on a background thread over an
//!   [`InMemoryTransport`]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use transport::{
    ControlFlow, Inspect, Message, MessageCodec, MessageKind, Monitor, PollResult, TransportError,
    codec::encode,
    io::{InMemoryTransport, MonitorTransport},
    reader::MessageReader,
};

use crate::{
    Address, DecodeError, Decoded, Decoder, Instruction, InstructionSource, InstructionWindow,
    Presenter, Register, decode_instruction,
};

/// Decoder with a configurable length per opcode.
///
/// Opcodes without an entry decode with the default length. The text is
/// `op` followed by the opcode, e.g. `op $3e`.
#[derive(Debug, Clone)]
pub struct TableDecoder {
    lengths: HashMap<u8, usize>,
    invalid: HashSet<u8>,
    default_len: usize,
    max_len: usize,
}

impl TableDecoder {
    /// Every opcode decodes with length `len`
    pub fn uniform(len: usize) -> Self {
        Self {
            lengths: HashMap::new(),
            invalid: HashSet::new(),
            default_len: len,
            max_len: 3,
        }
    }

    pub fn with_length(mut self, opcode: u8, len: usize) -> Self {
        self.lengths.insert(opcode, len);
        self
    }

    pub fn with_invalid(mut self, opcode: u8) -> Self {
        self.invalid.insert(opcode);
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }
}

impl Decoder for TableDecoder {
    fn max_instruction_len(&self) -> usize {
        self.max_len
    }

    fn decode(&self, bytes: &[u8], max_len: usize) -> Result<Decoded, DecodeError> {
        let Some(&opcode) = bytes.first() else {
            return Err(DecodeError::Empty);
        };
        if self.invalid.contains(&opcode) {
            return Err(DecodeError::InvalidOpcode(opcode));
        }
        let length = self
            .lengths
            .get(&opcode)
            .copied()
            .unwrap_or(self.default_len);
        let available = bytes.len().min(max_len);
        if length > available {
            return Err(DecodeError::Truncated {
                needed: length,
                available,
            });
        }
        Ok(Decoded {
            text: format!("op ${opcode:02x}"),
            length,
        })
    }
}

/// Instruction source over a local byte buffer.
///
/// The address space ends at the last byte of the buffer.
#[derive(Debug, Clone)]
pub struct MemoryImage<D> {
    bytes: Vec<u8>,
    decoder: D,
    failures: BTreeSet<Address>,
    channel_failures: BTreeSet<Address>,
    fetches: usize,
}

impl<D> MemoryImage<D>
where
    D: Decoder,
{
    pub fn new(bytes: impl Into<Vec<u8>>, decoder: D) -> Self {
        Self {
            bytes: bytes.into(),
            decoder,
            failures: BTreeSet::new(),
            channel_failures: BTreeSet::new(),
            fetches: 0,
        }
    }

    /// Decoding at `addr` fails with a recoverable error
    pub fn with_failure_at(mut self, addr: Address) -> Self {
        self.failures.insert(addr);
        self
    }

    /// Fetching `addr` fails as if the channel had closed
    pub fn with_channel_failure_at(mut self, addr: Address) -> Self {
        self.channel_failures.insert(addr);
        self
    }

    /// Number of instructions fetched so far
    pub fn fetches(&self) -> usize {
        self.fetches
    }

    /// Bytes starting at `addr`, at most one instruction's worth
    fn bytes_at(&self, addr: Address) -> &[u8] {
        let start = (addr as usize).min(self.bytes.len());
        let end = start
            .saturating_add(self.decoder.max_instruction_len())
            .min(self.bytes.len());
        &self.bytes[start..end]
    }
}

impl<D> InstructionSource for MemoryImage<D>
where
    D: Decoder,
{
    fn instruction_at(&mut self, addr: Address) -> Result<Instruction, DecodeError> {
        self.fetches += 1;
        if self.channel_failures.contains(&addr) {
            return Err(DecodeError::Channel(TransportError::Closed));
        }
        if self.failures.contains(&addr) {
            let opcode = self.bytes_at(addr).first().copied().unwrap_or(0);
            return Err(DecodeError::InvalidOpcode(opcode));
        }
        if addr > self.address_max() {
            return Err(DecodeError::OutOfRange(addr));
        }
        decode_instruction(&self.decoder, addr, self.bytes_at(addr))
    }

    fn max_instruction_len(&self) -> usize {
        self.decoder.max_instruction_len()
    }

    fn address_max(&self) -> Address {
        self.bytes.len().saturating_sub(1) as Address
    }
}

/// Presenter that keeps everything it is given
#[derive(Debug, Default)]
pub struct RecordingPresenter {
    pub views: Vec<InstructionWindow>,
    pub registers: Vec<Vec<(Register, String)>>,
    pub notices: Vec<String>,
}

impl RecordingPresenter {
    pub fn last_view(&self) -> Option<&InstructionWindow> {
        self.views.last()
    }

    pub fn last_registers(&self) -> Option<&[(Register, String)]> {
        self.registers.last().map(Vec::as_slice)
    }

    pub fn last_notice(&self) -> Option<&str> {
        self.notices.last().map(String::as_str)
    }
}

impl Presenter for RecordingPresenter {
    fn refresh_source_view(&mut self, window: &InstructionWindow) {
        self.views.push(window.clone());
    }

    fn refresh_registers(&mut self, registers: &[(Register, String)]) {
        self.registers.push(registers.to_vec());
    }

    fn notify_user(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

/// Scripted monitor target.
///
/// Serves register reads, memory reads, breakpoints and single steps
/// from an in-process machine state. Like the real monitor it ignores
/// inspection requests while running, and only reports a halt when told
/// to through [`FakeTargetHandle::halt_at`] or when a `Stop` arrives.
pub struct FakeTarget<D> {
    memory: Vec<u8>,
    decoder: D,
    pc: Address,
    cpu: [u32; 5],
    ly: u8,
    breakpoints: BTreeSet<Address>,
    running: bool,
}

impl<D> FakeTarget<D>
where
    D: Decoder + Send + 'static,
{
    pub fn new(memory: impl Into<Vec<u8>>, decoder: D) -> Self {
        Self {
            memory: memory.into(),
            decoder,
            pc: 0,
            cpu: [0; 5],
            ly: 0,
            breakpoints: BTreeSet::new(),
            running: false,
        }
    }

    pub fn with_pc(mut self, pc: Address) -> Self {
        self.pc = pc;
        self
    }

    pub fn with_register(mut self, register: Register, value: u32) -> Self {
        match register {
            Register::Af => self.cpu[0] = value,
            Register::Bc => self.cpu[1] = value,
            Register::De => self.cpu[2] = value,
            Register::Hl => self.cpu[3] = value,
            Register::Sp => self.cpu[4] = value,
            Register::Pc => self.pc = value,
            Register::Ly => self.ly = value as u8,
        }
        self
    }

    /// Start out executing
    pub fn running(mut self) -> Self {
        self.running = true;
        self
    }

    /// Serve the target end of `transport` on a background thread
    pub fn spawn(self, transport: InMemoryTransport) -> eyre::Result<FakeTargetHandle> {
        let (reader, writer) = transport.split()?;
        let (requests_tx, requests) = crossbeam_channel::unbounded();
        let (events, events_rx) = crossbeam_channel::unbounded();

        let thread = thread::spawn(move || {
            let mut reader = MessageReader::new(reader, MessageCodec::new());
            let mut target = self;
            let mut writer = writer;
            loop {
                match reader.poll_message(false) {
                    Ok(PollResult::Message(request)) => {
                        let _ = requests_tx.send(request.clone());
                        if let Some(reply) = target.handle(&request) {
                            if !write_frame(&mut writer, &reply) {
                                break;
                            }
                        }
                    }
                    Ok(PollResult::NoMessage) => {
                        if let Ok(event) = events_rx.try_recv() {
                            let written = match event {
                                Unsolicited::Halt(addr) => {
                                    let notification = target.halt(addr);
                                    write_frame(&mut writer, &notification)
                                }
                                Unsolicited::HaltWithPayload(payload) => {
                                    target.running = false;
                                    let notification =
                                        Message::new(MessageKind::Monitor(Monitor::Halted), payload);
                                    write_frame(&mut writer, &notification)
                                }
                                Unsolicited::Raw(bytes) => writer.write_all(&bytes).is_ok(),
                            };
                            if !written {
                                break;
                            }
                        } else {
                            thread::sleep(Duration::from_millis(1));
                        }
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "fake target shutting down");
                        break;
                    }
                }
            }
        });

        Ok(FakeTargetHandle {
            requests,
            events,
            thread: Some(thread),
        })
    }

    fn halt(&mut self, addr: Address) -> Message {
        self.pc = addr;
        self.running = false;
        Message::with_u32(MessageKind::Monitor(Monitor::Halted), addr)
    }

    fn handle(&mut self, request: &Message) -> Option<Message> {
        let arg = request.payload_u32().unwrap_or(0);
        match request.kind {
            MessageKind::Inspect(_) if self.running => {
                tracing::debug!(kind = %request.kind, "running, ignoring inspection request");
                None
            }
            MessageKind::Inspect(Inspect::GetCpuReg) => {
                let value = match arg {
                    5 => self.pc,
                    n => self.cpu.get(n as usize).copied().unwrap_or(0),
                };
                Some(Message::with_u32(request.kind, value))
            }
            MessageKind::Inspect(Inspect::GetPpuReg) => {
                Some(Message::new(request.kind, vec![self.ly]))
            }
            MessageKind::Inspect(Inspect::PrintAddr) => {
                let byte = self.memory.get(arg as usize).copied().unwrap_or(0);
                Some(Message::new(request.kind, vec![byte]))
            }
            MessageKind::Inspect(Inspect::GetInstrAtAddr) => {
                Some(Message::new(request.kind, self.bytes_at(arg).to_vec()))
            }
            MessageKind::Inspect(Inspect::GetOpLen) => {
                let len = self.instruction_len(arg);
                Some(Message::with_u32(request.kind, len))
            }
            MessageKind::ControlFlow(ControlFlow::Next) => {
                let len = self.instruction_len(self.pc);
                self.pc += len;
                Some(Message::empty(request.kind))
            }
            MessageKind::ControlFlow(ControlFlow::Break) => {
                self.breakpoints.insert(arg);
                Some(Message::empty(request.kind))
            }
            MessageKind::ControlFlow(ControlFlow::Delete) => {
                self.breakpoints.remove(&arg);
                Some(Message::empty(request.kind))
            }
            MessageKind::ControlFlow(ControlFlow::Until | ControlFlow::Continue)
            | MessageKind::Monitor(Monitor::Resume) => {
                self.running = true;
                None
            }
            MessageKind::Monitor(Monitor::Stop) if self.running => Some(self.halt(self.pc)),
            MessageKind::Monitor(_) => None,
        }
    }

    fn bytes_at(&self, addr: Address) -> &[u8] {
        let start = (addr as usize).min(self.memory.len());
        let end = start
            .saturating_add(self.decoder.max_instruction_len())
            .min(self.memory.len());
        &self.memory[start..end]
    }

    fn instruction_len(&self, addr: Address) -> u32 {
        decode_instruction(&self.decoder, addr, self.bytes_at(addr))
            .map(|i| i.length)
            .unwrap_or(1)
    }
}

/// Write one frame, returning false once the client is gone
fn write_frame<W: Write>(writer: &mut W, message: &Message) -> bool {
    match encode(message) {
        Ok(frame) => writer.write_all(&frame).is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "cannot encode message");
            false
        }
    }
}

/// Something the target sends without being asked
enum Unsolicited {
    Halt(Address),
    /// Stop, but describe it with an arbitrary payload
    HaltWithPayload(Vec<u8>),
    Raw(Vec<u8>),
}

/// Test-side handle on a running [`FakeTarget`]
pub struct FakeTargetHandle {
    requests: Receiver<Message>,
    events: Sender<Unsolicited>,
    thread: Option<JoinHandle<()>>,
}

impl FakeTargetHandle {
    /// Make the target report a halt at `addr`, whatever it is doing
    pub fn halt_at(&self, addr: Address) {
        let _ = self.events.send(Unsolicited::Halt(addr));
    }

    /// Make the target stop where it is and send a halt notification
    /// carrying `payload` instead of an address
    pub fn halt_with_payload(&self, payload: impl Into<Vec<u8>>) {
        let _ = self.events.send(Unsolicited::HaltWithPayload(payload.into()));
    }

    /// Put `bytes` on the wire as they are, framed or not
    pub fn write_raw(&self, bytes: impl Into<Vec<u8>>) {
        let _ = self.events.send(Unsolicited::Raw(bytes.into()));
    }

    /// Every request received so far, in order
    pub fn received(&self) -> Vec<Message> {
        self.requests.try_iter().collect()
    }

    /// Wait for the next request of the given kind, returning it together
    /// with every request received before it
    pub fn wait_for(&self, kind: MessageKind, timeout: Duration) -> Option<Vec<Message>> {
        let mut seen = Vec::new();
        loop {
            match self.requests.recv_timeout(timeout) {
                Ok(message) => {
                    let done = message.kind == kind;
                    seen.push(message);
                    if done {
                        return Some(seen);
                    }
                }
                Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => return None,
            }
        }
    }

    /// Wait for the target thread to finish once the client side is gone
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
