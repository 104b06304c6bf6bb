use std::fmt;

use crate::{Address, DebuggerError};

/// What the remote target is doing, as far as the client knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionState {
    #[default]
    Halted,
    /// Running until the given address is reached
    RunningUntil(Address),
    RunningContinuous,
    /// A single step is in flight. Never visible between operations.
    Stepping,
}

impl ExecutionState {
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ExecutionState::RunningUntil(_) | ExecutionState::RunningContinuous
        )
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionState::Halted => f.write_str("halted"),
            ExecutionState::RunningUntil(addr) => write!(f, "running until {addr:#06x}"),
            ExecutionState::RunningContinuous => f.write_str("running"),
            ExecutionState::Stepping => f.write_str("stepping"),
        }
    }
}

/// How a halt notification was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltOutcome {
    /// The target stopped and the session is halted again
    Halted { addr: Address },
    /// The target stopped somewhere other than the requested `until`
    /// address. The session is halted regardless.
    UntilMismatch { expected: Address, actual: Address },
    /// The target stopped but the notification did not carry a usable
    /// address. The session is halted and the address has to be read back.
    UnknownAddress,
    /// The session was already halted, e.g. a second notification for the
    /// same stop. Nothing changed.
    AlreadyHalted { addr: Option<Address> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StopRequest {
    Send,
    AlreadyRequested,
    NotRunning,
}

/// The single authoritative execution state of a session
#[derive(Debug, Default)]
pub(crate) struct ExecutionControl {
    state: ExecutionState,
    stop_requested: bool,
}

impl ExecutionControl {
    pub(crate) fn new(state: ExecutionState) -> Self {
        Self {
            state,
            stop_requested: false,
        }
    }

    pub(crate) fn state(&self) -> ExecutionState {
        self.state
    }

    pub(crate) fn ensure_halted(&self, operation: &'static str) -> Result<(), DebuggerError> {
        if self.state == ExecutionState::Halted {
            Ok(())
        } else {
            Err(DebuggerError::IllegalStateTransition {
                operation,
                state: self.state,
            })
        }
    }

    /// Enter a running state. The caller has already checked that the
    /// session is halted.
    pub(crate) fn start_running(&mut self, next: ExecutionState) {
        debug_assert!(next.is_running());
        tracing::debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.stop_requested = false;
    }

    pub(crate) fn begin_step(&mut self) {
        self.state = ExecutionState::Stepping;
    }

    pub(crate) fn end_step(&mut self) {
        self.state = ExecutionState::Halted;
    }

    pub(crate) fn request_stop(&mut self) -> StopRequest {
        if !self.state.is_running() {
            return StopRequest::NotRunning;
        }
        if self.stop_requested {
            return StopRequest::AlreadyRequested;
        }
        self.stop_requested = true;
        StopRequest::Send
    }

    /// Apply a halt notification reporting that the target stopped at
    /// `addr`, or somewhere unknown when the notification was unreadable
    pub(crate) fn halted(&mut self, addr: Option<Address>) -> HaltOutcome {
        let outcome = match (self.state, addr) {
            (ExecutionState::Halted | ExecutionState::Stepping, _) => {
                tracing::debug!(?addr, "ignoring halt notification while not running");
                return HaltOutcome::AlreadyHalted { addr };
            }
            (_, None) => {
                tracing::warn!(state = %self.state, "halt notification without an address");
                HaltOutcome::UnknownAddress
            }
            (ExecutionState::RunningUntil(expected), Some(actual)) if expected != actual => {
                tracing::warn!(
                    expected = %format_args!("{expected:#06x}"),
                    actual = %format_args!("{actual:#06x}"),
                    "target halted away from the until address"
                );
                HaltOutcome::UntilMismatch { expected, actual }
            }
            (_, Some(addr)) => HaltOutcome::Halted { addr },
        };
        tracing::debug!(from = %self.state, ?addr, "target halted");
        self.state = ExecutionState::Halted;
        self.stop_requested = false;
        outcome
    }
}
