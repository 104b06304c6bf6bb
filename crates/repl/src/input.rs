use debugger::Direction;

/// What a line typed by the user asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Quit,
    /// Enter on the source view
    Activate,
    Cursor(Direction, usize),
    /// Anything else goes to the command interpreter
    Command(Vec<String>),
}

impl Input {
    pub fn from_line(line: &str, page_size: usize) -> Self {
        let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        match argv.as_slice() {
            [] => Input::Activate,
            [word] => match word.as_str() {
                "q" | "quit" => Input::Quit,
                "j" => Input::Cursor(Direction::Down, 1),
                "k" => Input::Cursor(Direction::Up, 1),
                "pgdn" => Input::Cursor(Direction::Down, page_size),
                "pgup" => Input::Cursor(Direction::Up, page_size),
                _ => Input::Command(argv),
            },
            _ => Input::Command(argv),
        }
    }
}
