//! Command interpreter
//!
//! Turns an already tokenised command line into a [`Command`] and runs it
//! against a [`Debugger`]. A line that fails to parse never reaches the
//! session.

use crate::{Address, Debugger, DebuggerError, ParseError, Presenter};

/// A user command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Break(Address),
    Until(Address),
    Continue,
    /// Delete one breakpoint, or all of them
    Delete(Option<Address>),
    Next,
    Stop,
    Print(Address),
    Refresh,
    InfoBreakpoints,
}

impl Command {
    /// Parse `argv`, rejecting addresses above `address_max`
    pub fn parse<S>(argv: &[S], address_max: Address) -> Result<Self, ParseError>
    where
        S: AsRef<str>,
    {
        let mut args = argv.iter().map(|arg| arg.as_ref());
        let name = args.next().ok_or(ParseError::Empty)?;
        let args: Vec<&str> = args.collect();

        let command = match name {
            "break" | "b" => Command::Break(one_address("break", &args, address_max)?),
            "until" => Command::Until(one_address("until", &args, address_max)?),
            "continue" | "c" | "cont" => {
                no_arguments("continue", &args)?;
                Command::Continue
            }
            "delete" | "d" => match args.as_slice() {
                [] => Command::Delete(None),
                [addr] => Command::Delete(Some(parse_address(addr, address_max)?)),
                _ => return Err(ParseError::TooManyArguments { command: "delete" }),
            },
            "next" | "n" => {
                no_arguments("next", &args)?;
                Command::Next
            }
            "stop" => {
                no_arguments("stop", &args)?;
                Command::Stop
            }
            "print" | "p" => Command::Print(one_address("print", &args, address_max)?),
            "refresh" => {
                no_arguments("refresh", &args)?;
                Command::Refresh
            }
            "info" | "i" => match args.as_slice() {
                ["breakpoints" | "b"] => Command::InfoBreakpoints,
                _ => return Err(ParseError::UnknownCommand(argv_to_string(argv))),
            },
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

fn argv_to_string<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|arg| arg.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

fn one_address(
    command: &'static str,
    args: &[&str],
    address_max: Address,
) -> Result<Address, ParseError> {
    match args {
        [] => Err(ParseError::MissingAddress { command }),
        [addr] => parse_address(addr, address_max),
        _ => Err(ParseError::TooManyArguments { command }),
    }
}

fn no_arguments(command: &'static str, args: &[&str]) -> Result<(), ParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ParseError::TooManyArguments { command })
    }
}

/// Parse a hexadecimal address with an optional `0x` prefix
pub fn parse_address(text: &str, address_max: Address) -> Result<Address, ParseError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ParseError::InvalidAddress(text.to_string()));
    }

    let out_of_range = || ParseError::AddressOutOfRange {
        text: text.to_string(),
        max: address_max,
    };
    let value = u64::from_str_radix(digits, 16).map_err(|_| out_of_range())?;
    Address::try_from(value)
        .ok()
        .filter(|addr| *addr <= address_max)
        .ok_or_else(out_of_range)
}

impl<P> Debugger<P>
where
    P: Presenter,
{
    /// Run a parsed command, reporting what happened through the presenter
    pub fn execute(&mut self, command: Command) -> Result<(), DebuggerError> {
        tracing::debug!(?command, "executing command");
        match command {
            Command::Break(addr) => {
                self.set_breakpoint(addr)?;
                self.notify(format!("breakpoint set at {addr:#06x}"));
            }
            Command::Until(addr) => {
                self.run_until(addr)?;
                self.notify(format!("running until {addr:#06x}"));
            }
            Command::Continue => {
                self.continue_exec()?;
                self.notify("continuing");
            }
            Command::Delete(Some(addr)) => {
                self.clear_breakpoint(addr)?;
                self.notify(format!("breakpoint at {addr:#06x} deleted"));
            }
            Command::Delete(None) => {
                let count = self.clear_all_breakpoints()?;
                self.notify(format!("deleted {count} breakpoint(s)"));
            }
            Command::Next => self.step()?,
            Command::Stop => {
                self.stop()?;
                self.notify("stop requested");
            }
            Command::Print(addr) => {
                let value = self.inspect_address(addr)?;
                self.notify(format!("{addr:#06x}: {value:#04x}"));
            }
            Command::Refresh => self.refresh_at_pc()?,
            Command::InfoBreakpoints => {
                let listing = self
                    .breakpoints()
                    .map(|addr| format!("{addr:#06x}"))
                    .collect::<Vec<_>>();
                if listing.is_empty() {
                    self.notify("no breakpoints");
                } else {
                    self.notify(format!("breakpoints: {}", listing.join(", ")));
                }
            }
        }
        Ok(())
    }

    /// Parse and run one command line.
    ///
    /// Parse errors and recoverable failures are shown to the user and
    /// swallowed; only a fatal error is returned.
    pub fn handle_command_line<S>(&mut self, argv: &[S]) -> Result<(), DebuggerError>
    where
        S: AsRef<str>,
    {
        let result = Command::parse(argv, self.options().address_max)
            .map_err(DebuggerError::from)
            .and_then(|command| self.execute(command));
        self.report(result).map(|_| ())
    }

    fn notify(&mut self, message: impl AsRef<str>) {
        self.presenter_mut().notify_user(message.as_ref());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: Address = 0xffff;

    fn parse(line: &str) -> Result<Command, ParseError> {
        let argv: Vec<&str> = line.split_whitespace().collect();
        Command::parse(&argv, MAX)
    }

    macro_rules! command_parse_tests {
        ($($name:ident: $value:expr,)*) => {
        $(
            #[test]
            fn $name() {
                let (input, expected) = $value;
                assert_eq!(parse(input), expected);
            }
        )*
        }
    }

    command_parse_tests! {
        break_with_prefix: ("break 0x10", Ok(Command::Break(0x10))),
        break_alias: ("b 150", Ok(Command::Break(0x150))),
        break_upper_prefix: ("break 0XFF", Ok(Command::Break(0xff))),
        until: ("until 0x0150", Ok(Command::Until(0x150))),
        continue_full: ("continue", Ok(Command::Continue)),
        continue_c: ("c", Ok(Command::Continue)),
        continue_cont: ("cont", Ok(Command::Continue)),
        delete_one: ("delete 0x10", Ok(Command::Delete(Some(0x10)))),
        delete_all: ("d", Ok(Command::Delete(None))),
        next_alias: ("n", Ok(Command::Next)),
        stop: ("stop", Ok(Command::Stop)),
        print_alias: ("p 0xc000", Ok(Command::Print(0xc000))),
        refresh: ("refresh", Ok(Command::Refresh)),
        info_breakpoints: ("info breakpoints", Ok(Command::InfoBreakpoints)),
        info_b: ("i b", Ok(Command::InfoBreakpoints)),
        empty_line: ("", Err(ParseError::Empty)),
        unknown: ("jump 0x10", Err(ParseError::UnknownCommand("jump".to_string()))),
        info_unknown: ("info registers", Err(ParseError::UnknownCommand("info registers".to_string()))),
        break_without_address: ("break", Err(ParseError::MissingAddress { command: "break" })),
        break_two_addresses: ("break 1 2", Err(ParseError::TooManyArguments { command: "break" })),
        continue_with_argument: ("c 10", Err(ParseError::TooManyArguments { command: "continue" })),
        malformed_hex: ("break 0x1g", Err(ParseError::InvalidAddress("0x1g".to_string()))),
        prefix_only: ("break 0x", Err(ParseError::InvalidAddress("0x".to_string()))),
        signed_hex: ("break +10", Err(ParseError::InvalidAddress("+10".to_string()))),
        above_address_max: ("until 0x10000", Err(ParseError::AddressOutOfRange { text: "0x10000".to_string(), max: MAX })),
        overflowing: ("until 0xffffffffffffffffff", Err(ParseError::AddressOutOfRange { text: "0xffffffffffffffffff".to_string(), max: MAX })),
    }

    #[test]
    fn address_max_is_inclusive() {
        assert_eq!(parse_address("ffff", 0xffff), Ok(0xffff));
        assert_eq!(parse_address("0", 0xffff), Ok(0));
    }
}
