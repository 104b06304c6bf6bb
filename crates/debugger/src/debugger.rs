use std::collections::BTreeSet;

use transport::{Client, ControlFlow, Inspect, Message, MessageKind, Monitor, PollResult};

use crate::{
    Address, DebuggerError, DecodeError, Decoder, ExecutionState, HaltOutcome, Instruction,
    InstructionSource, InstructionWindow, Presenter, Register, WindowError, decode_instruction,
    state::{ExecutionControl, StopRequest},
};

/// Per-session settings
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Highest valid target address
    pub address_max: Address,

    /// Number of instructions in the source view
    pub window_height: usize,

    /// The target is already executing when the session starts. The
    /// session must see a halt notification before it can inspect it.
    pub running: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            address_max: 0xffff,
            window_height: 20,
            running: false,
        }
    }
}

/// Cursor movement in the source view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Target memory read through the monitor
struct TargetMemory<'a> {
    client: &'a mut Client,
    decoder: &'a dyn Decoder,
    address_max: Address,
}

impl<'a> TargetMemory<'a> {
    fn new(client: &'a mut Client, decoder: &'a dyn Decoder, address_max: Address) -> Self {
        Self {
            client,
            decoder,
            address_max,
        }
    }
}

impl InstructionSource for TargetMemory<'_> {
    fn instruction_at(&mut self, addr: Address) -> Result<Instruction, DecodeError> {
        if addr > self.address_max {
            return Err(DecodeError::OutOfRange(addr));
        }
        let reply = self.client.call(Message::with_u32(
            MessageKind::Inspect(Inspect::GetInstrAtAddr),
            addr,
        ))?;
        decode_instruction(self.decoder, addr, &reply.payload)
    }

    fn max_instruction_len(&self) -> usize {
        self.decoder.max_instruction_len()
    }

    fn address_max(&self) -> Address {
        self.address_max
    }
}

/// Represents a debugging session with one monitored target
///
/// All operations run on the caller's thread. Operations that need an
/// answer from the target are refused with
/// [`DebuggerError::IllegalStateTransition`] while the target runs,
/// before anything is written to the channel.
pub struct Debugger<P> {
    client: Client,
    decoder: Box<dyn Decoder>,
    presenter: P,
    control: ExecutionControl,
    window: InstructionWindow,
    breakpoints: BTreeSet<Address>,
    options: SessionOptions,
}

impl<P> Debugger<P>
where
    P: Presenter,
{
    pub fn new(
        client: Client,
        decoder: impl Decoder + 'static,
        presenter: P,
        options: SessionOptions,
    ) -> Self {
        let initial = if options.running {
            ExecutionState::RunningContinuous
        } else {
            ExecutionState::Halted
        };
        tracing::debug!(state = %initial, "creating debug session");

        Self {
            client,
            decoder: Box::new(decoder),
            presenter,
            control: ExecutionControl::new(initial),
            window: InstructionWindow::default(),
            breakpoints: BTreeSet::new(),
            options,
        }
    }

    pub fn state(&self) -> ExecutionState {
        self.control.state()
    }

    pub fn window(&self) -> &InstructionWindow {
        &self.window
    }

    /// Breakpoints the client has asked the target to set
    pub fn breakpoints(&self) -> impl Iterator<Item = Address> + '_ {
        self.breakpoints.iter().copied()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub fn set_breakpoint(&mut self, addr: Address) -> Result<(), DebuggerError> {
        self.control.ensure_halted("break")?;
        self.client.call(Message::with_u32(
            MessageKind::ControlFlow(ControlFlow::Break),
            addr,
        ))?;
        self.breakpoints.insert(addr);
        Ok(())
    }

    /// Ask the target to remove a breakpoint. The removal is not
    /// confirmed by the target.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn clear_breakpoint(&mut self, addr: Address) -> Result<(), DebuggerError> {
        self.control.ensure_halted("delete")?;
        self.send_delete(addr)
    }

    /// Remove every known breakpoint, returning how many were removed
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn clear_all_breakpoints(&mut self) -> Result<usize, DebuggerError> {
        self.control.ensure_halted("delete")?;
        let addrs: Vec<Address> = self.breakpoints.iter().copied().collect();
        for addr in &addrs {
            self.send_delete(*addr)?;
        }
        Ok(addrs.len())
    }

    fn send_delete(&mut self, addr: Address) -> Result<(), DebuggerError> {
        self.client.call(Message::with_u32(
            MessageKind::ControlFlow(ControlFlow::Delete),
            addr,
        ))?;
        self.breakpoints.remove(&addr);
        Ok(())
    }

    pub fn get_register(&mut self, register: Register) -> Result<u32, DebuggerError> {
        self.control.ensure_halted("register read")?;
        self.read_value(register.request())
    }

    /// Every panel register with its display string, in panel order
    pub fn read_registers(&mut self) -> Result<Vec<(Register, String)>, DebuggerError> {
        self.control.ensure_halted("register read")?;
        Register::ALL
            .into_iter()
            .map(|register| {
                let value = self.read_value(register.request())?;
                Ok((register, Register::format_value(value)))
            })
            .collect()
    }

    pub fn get_instruction(&mut self, addr: Address) -> Result<Instruction, DebuggerError> {
        self.control.ensure_halted("instruction fetch")?;
        TargetMemory::new(&mut self.client, self.decoder.as_ref(), self.options.address_max)
            .instruction_at(addr)
            .map_err(|source| WindowError::Decode { addr, source }.into())
    }

    /// Value stored at `addr`
    pub fn inspect_address(&mut self, addr: Address) -> Result<u32, DebuggerError> {
        self.control.ensure_halted("print")?;
        self.read_value(Message::with_u32(
            MessageKind::Inspect(Inspect::PrintAddr),
            addr,
        ))
    }

    /// Let the target run until it reaches `addr`. Returns without
    /// waiting; the halt arrives through [`Debugger::poll_halt`].
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn run_until(&mut self, addr: Address) -> Result<(), DebuggerError> {
        self.control.ensure_halted("until")?;
        self.client.send(Message::with_u32(
            MessageKind::ControlFlow(ControlFlow::Until),
            addr,
        ))?;
        self.control
            .start_running(ExecutionState::RunningUntil(addr));
        Ok(())
    }

    #[tracing::instrument(skip(self), level = "debug")]
    pub fn continue_exec(&mut self) -> Result<(), DebuggerError> {
        self.control.ensure_halted("continue")?;
        self.client
            .send(Message::empty(MessageKind::ControlFlow(ControlFlow::Continue)))?;
        self.control
            .start_running(ExecutionState::RunningContinuous);
        Ok(())
    }

    /// Execute a single instruction and refresh the view at the new PC
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn step(&mut self) -> Result<(), DebuggerError> {
        self.control.ensure_halted("next")?;
        self.control.begin_step();
        let result = self
            .client
            .call(Message::empty(MessageKind::ControlFlow(ControlFlow::Next)));
        self.control.end_step();
        result?;
        self.refresh_or_report()
    }

    /// Ask a running target to halt.
    ///
    /// The session stays in its running state until the halt notification
    /// arrives. Repeated calls before then send nothing.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn stop(&mut self) -> Result<(), DebuggerError> {
        match self.control.request_stop() {
            StopRequest::Send => {
                self.client
                    .send(Message::empty(MessageKind::Monitor(Monitor::Stop)))?;
            }
            StopRequest::AlreadyRequested => {
                tracing::debug!("stop already requested, waiting for halt notification");
            }
            StopRequest::NotRunning => {
                tracing::debug!("target is not running, nothing to stop");
            }
        }
        Ok(())
    }

    /// Check for a halt notification.
    ///
    /// With `wait = false` this never blocks. Returns `None` when nothing
    /// arrived, or when the message was not a halt notification.
    pub fn poll_halt(&mut self, wait: bool) -> Result<Option<HaltOutcome>, DebuggerError> {
        let message = match self.client.poll_notification(wait)? {
            PollResult::NoMessage => return Ok(None),
            PollResult::Message(message) => message,
        };

        if message.kind != MessageKind::Monitor(Monitor::Halted) {
            tracing::warn!(kind = %message.kind, "ignoring unexpected message from target");
            return Ok(None);
        }

        self.handle_halt(&message).map(Some)
    }

    /// Apply a halt notification. A notification without a readable
    /// address still halts the session; the view is then rebuilt at the
    /// PC read back from the target.
    fn handle_halt(&mut self, notification: &Message) -> Result<HaltOutcome, DebuggerError> {
        let outcome = self.control.halted(notification.payload_u32());
        match outcome {
            HaltOutcome::AlreadyHalted { .. } => return Ok(outcome),
            HaltOutcome::UntilMismatch { expected, actual } => {
                self.presenter.notify_user(&format!(
                    "halted at {actual:#06x} instead of {expected:#06x}"
                ));
            }
            HaltOutcome::UnknownAddress => {
                let malformed = DebuggerError::MalformedPayload {
                    kind: notification.kind,
                    len: notification.payload_len(),
                };
                self.presenter.notify_user(&malformed.to_string());
            }
            HaltOutcome::Halted { .. } => {}
        }
        self.refresh_or_report()?;
        Ok(outcome)
    }

    /// Read PC, rebuild the window there and refresh the registers.
    ///
    /// If the window cannot be rebuilt the previous one is kept and the
    /// error is returned.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn refresh_at_pc(&mut self) -> Result<(), DebuggerError> {
        self.control.ensure_halted("refresh")?;
        let pc = self.read_value(Register::Pc.request())?;

        let mut memory =
            TargetMemory::new(&mut self.client, self.decoder.as_ref(), self.options.address_max);
        let built = match InstructionWindow::build(&mut memory, pc, self.options.window_height) {
            Err(e) if e.is_fatal() => return Err(e.into()),
            other => other,
        };

        let registers = self.read_registers()?;
        self.presenter.refresh_registers(&registers);

        let mut window = built?;
        window.set_current(pc);
        window.highlight(pc);
        self.window = window;
        self.presenter.refresh_source_view(&self.window);
        Ok(())
    }

    /// Show a recoverable error to the user and swallow it.
    ///
    /// Returns `Ok(None)` for a reported error; fatal errors are passed on.
    pub fn report<T>(&mut self, result: Result<T, DebuggerError>) -> Result<Option<T>, DebuggerError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                tracing::debug!(error = %e, "reporting recoverable error");
                self.presenter.notify_user(&e.to_string());
                Ok(None)
            }
        }
    }

    /// Refresh at PC, reporting recoverable failures to the user
    fn refresh_or_report(&mut self) -> Result<(), DebuggerError> {
        let result = self.refresh_at_pc();
        if let Err(e) = &result {
            tracing::warn!(error = %e, "keeping previous window");
        }
        self.report(result).map(|_| ())
    }

    /// Move the highlight `lines` rows, sliding the window when the
    /// highlight is on its first or last row.
    ///
    /// Reaching the edge of decodable memory ends the move early.
    pub fn move_cursor(&mut self, direction: Direction, lines: usize) -> Result<(), DebuggerError> {
        self.control.ensure_halted("move")?;
        let mut result = Ok(());
        for _ in 0..lines {
            match self.move_cursor_once(direction) {
                Ok(()) => {}
                Err(WindowError::BoundaryReached) => break,
                Err(e) => {
                    result = Err(e.into());
                    break;
                }
            }
        }
        self.presenter.refresh_source_view(&self.window);
        result
    }

    fn move_cursor_once(&mut self, direction: Direction) -> Result<(), WindowError> {
        let row = self
            .window
            .highlighted()
            .and_then(|addr| self.window.position(addr));

        let Some(row) = row else {
            // highlight scrolled out of view: pick it up at the top
            if let Some(first) = self.window.start_addr() {
                self.window.highlight(first);
            }
            return Ok(());
        };

        let mut memory =
            TargetMemory::new(&mut self.client, self.decoder.as_ref(), self.options.address_max);
        let next_row = match direction {
            Direction::Down if row + 1 < self.window.len() => row + 1,
            Direction::Up if row > 0 => row - 1,
            Direction::Down => {
                self.window.slide_forward(&mut memory)?;
                self.window.len().saturating_sub(1)
            }
            Direction::Up => {
                self.window.slide_backward(&mut memory)?;
                0
            }
        };

        if let Some(addr) = self.window.get(next_row).map(|i| i.addr) {
            self.window.highlight(addr);
        }
        Ok(())
    }

    /// Act on the highlighted instruction: run until it if it is not the
    /// current instruction, otherwise execute a single step.
    pub fn activate(&mut self) -> Result<(), DebuggerError> {
        self.control.ensure_halted("activate")?;
        match (self.window.highlighted(), self.window.current()) {
            (Some(highlighted), current) if Some(highlighted) != current => {
                self.run_until(highlighted)
            }
            _ => self.step(),
        }
    }

    fn read_value(&mut self, request: Message) -> Result<u32, DebuggerError> {
        let kind = request.kind;
        let reply = self.client.call(request)?;
        reply.payload_u32().ok_or(DebuggerError::MalformedPayload {
            kind,
            len: reply.payload_len(),
        })
    }
}
