use std::fmt::Write as _;
use std::io::Write;

use debugger::{InstructionWindow, Presenter, Register};

/// Plain text presenter for a line-oriented terminal.
///
/// The current instruction is marked with `>` and the highlighted one
/// with `*`.
pub struct TerminalPresenter<W> {
    out: W,
}

impl<W> TerminalPresenter<W>
where
    W: Write,
{
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn emit(&mut self, text: &str) {
        if let Err(e) = self.out.write_all(text.as_bytes()).and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write to terminal");
        }
    }
}

impl<W> Presenter for TerminalPresenter<W>
where
    W: Write,
{
    fn refresh_source_view(&mut self, window: &InstructionWindow) {
        let mut text = String::new();
        for instruction in window.iter() {
            let current = window.current() == Some(instruction.addr);
            let highlighted = window.highlighted() == Some(instruction.addr);
            let marker = match (current, highlighted) {
                (true, true) => ">*",
                (true, false) => "> ",
                (false, true) => " *",
                (false, false) => "  ",
            };
            let _ = writeln!(text, "{marker} {instruction}");
        }
        self.emit(&text);
    }

    fn refresh_registers(&mut self, registers: &[(Register, String)]) {
        let line = registers
            .iter()
            .map(|(register, value)| format!("{register} {value}"))
            .collect::<Vec<_>>()
            .join("  ");
        self.emit(&format!("{line}\n"));
    }

    fn notify_user(&mut self, message: &str) {
        self.emit(&format!("-- {message}\n"));
    }
}

#[cfg(test)]
mod tests {
    use debugger::testing::{MemoryImage, TableDecoder};

    use super::*;

    fn rendered(f: impl FnOnce(&mut TerminalPresenter<Vec<u8>>)) -> String {
        let mut presenter = TerminalPresenter::new(Vec::new());
        f(&mut presenter);
        String::from_utf8(presenter.out).unwrap()
    }

    #[test]
    fn source_view_marks_current_and_highlighted_rows() {
        let mut image = MemoryImage::new(vec![0u8; 0x10], TableDecoder::uniform(1));
        let mut window = InstructionWindow::build(&mut image, 0x4, 3).unwrap();
        window.set_current(0x4);
        window.highlight(0x5);

        let text = rendered(|p| p.refresh_source_view(&window));
        assert_eq!(
            text,
            ">  0x0004: op $00\n *  0x0005: op $00\n   0x0006: op $00\n"
        );
    }

    #[test]
    fn registers_on_one_line() {
        let registers = vec![
            (Register::Pc, "0x0100".to_string()),
            (Register::Ly, "0x0090".to_string()),
        ];
        let text = rendered(|p| p.refresh_registers(&registers));
        assert_eq!(text, "PC 0x0100  LY 0x0090\n");
    }

    #[test]
    fn notices_are_prefixed() {
        let text = rendered(|p| p.notify_user("breakpoint set at 0x0010"));
        assert_eq!(text, "-- breakpoint set at 0x0010\n");
    }
}
