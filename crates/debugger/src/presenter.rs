use crate::{InstructionWindow, Register};

/// Presentation layer driven by the session.
///
/// The session never renders anything itself; it pushes fresh data here
/// whenever the window, registers or user-facing messages change.
pub trait Presenter {
    fn refresh_source_view(&mut self, window: &InstructionWindow);

    /// Registers in panel order with their display strings
    fn refresh_registers(&mut self, registers: &[(Register, String)]);

    fn notify_user(&mut self, message: &str);
}
