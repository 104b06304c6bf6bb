use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::thread::JoinHandle;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use config::Config;
use crossbeam_channel::Receiver;
use debugger::{Debugger, SessionOptions, Sm83Decoder};
use tracing_subscriber::filter::EnvFilter;
use transport::{Client, MessageCodec, io::UnixTransport};

mod input;
mod presenter;

use input::Input;
use presenter::TerminalPresenter;

/// How long to wait for input before checking on a running target
const TICK: Duration = Duration::from_millis(50);

type Session = Debugger<TerminalPresenter<std::io::Stdout>>;

struct App {
    debugger: Session,
    page_size: usize,
    input_rx: Receiver<String>,

    #[allow(dead_code)]
    input_thread: JoinHandle<()>,
}

impl App {
    fn new(debugger: Session, page_size: usize) -> Self {
        // handle input
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        let input_thread = std::thread::spawn(move || {
            let mut buffer = String::new();
            loop {
                buffer.clear();
                match std::io::stdin().read_line(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        if input_tx.send(buffer.trim().to_owned()).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self {
            debugger,
            page_size,
            input_rx,
            input_thread,
        }
    }

    fn prompt(&self) -> eyre::Result<()> {
        if self.debugger.state().is_running() {
            print!("({}) > ", self.debugger.state());
        } else {
            print!("> ");
        }
        std::io::stdout().flush()?;
        Ok(())
    }

    fn loop_step(&mut self) -> eyre::Result<ShouldQuit> {
        if self.debugger.state().is_running() {
            let polled = self.debugger.poll_halt(false);
            match self
                .debugger
                .report(polled)
                .context("lost connection to the monitor")?
            {
                Some(Some(outcome)) => {
                    tracing::debug!(?outcome, "target halted");
                    self.prompt()?;
                }
                // nothing arrived yet
                Some(None) => {}
                None => self.prompt()?,
            }
        }

        crossbeam_channel::select! {
            recv(self.input_rx) -> input => match input {
                Ok(line) => {
                    let should_quit = self.handle_input(&line).context("handling command")?;
                    if let ShouldQuit::False = should_quit {
                        self.prompt()?;
                    }
                    Ok(should_quit)
                }
                // stdin closed
                Err(_) => Ok(ShouldQuit::True),
            },
            default(TICK) => Ok(ShouldQuit::False),
        }
    }

    #[tracing::instrument(skip(self))]
    fn handle_input(&mut self, line: &str) -> eyre::Result<ShouldQuit> {
        let result = match Input::from_line(line, self.page_size) {
            Input::Quit => return Ok(ShouldQuit::True),
            Input::Activate => self.debugger.activate(),
            Input::Cursor(direction, lines) => self.debugger.move_cursor(direction, lines),
            Input::Command(argv) => self.debugger.handle_command_line(&argv),
        };

        self.debugger
            .report(result)
            .context("lost connection to the monitor")?;
        Ok(ShouldQuit::False)
    }
}

/// Remote monitor client for a running emulator
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// Configuration file, defaults to <config dir>/emu-monitor/config.toml
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Path of the monitor socket
    #[clap(short, long)]
    socket: Option<PathBuf>,

    /// Number of instructions in the source view
    #[clap(long)]
    window_height: Option<usize>,

    #[clap(long)]
    log_file: Option<PathBuf>,

    /// The target is already running: stop it before the first refresh
    #[clap(long)]
    running: bool,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(socket) = &self.socket {
            config.connection.socket = socket.clone();
        }
        if let Some(height) = self.window_height {
            config.view.window_height = height.max(1);
        }
        if let Some(log_file) = &self.log_file {
            config.log.file = log_file.clone();
        }
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install().context("installing color_eyre")?;
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("loading configuration")?;
    args.apply(&mut config);

    let log_file = std::fs::File::create(&config.log.file)
        .with_context(|| format!("creating log file {}", config.log.file.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .with_writer(Mutex::new(log_file))
        .init();
    tracing::debug!(?config, "loaded configuration");

    let transport = UnixTransport::connect_with(
        &config.connection.socket,
        config.connection.connect_attempts,
        Duration::from_millis(config.connection.read_timeout_ms),
    )
    .context("connecting to monitor")?;
    let client = Client::with_codec(
        transport,
        MessageCodec::with_max_payload(config.target.max_payload),
    )
    .context("creating client")?;

    let options = SessionOptions {
        address_max: config.target.address_max,
        window_height: config.view.window_height,
        running: args.running,
    };
    let mut debugger = Debugger::new(
        client,
        Sm83Decoder,
        TerminalPresenter::new(std::io::stdout()),
        options,
    );

    if args.running {
        debugger.stop().context("stopping target")?;
        while debugger.state().is_running() {
            let polled = debugger.poll_halt(true);
            debugger
                .report(polled)
                .context("waiting for the target to halt")?;
        }
    } else {
        let refreshed = debugger.refresh_at_pc();
        debugger
            .report(refreshed)
            .context("reading initial target state")?;
    }
    tracing::debug!("debugger set up");

    let mut app = App::new(debugger, config.view.page_size);
    app.prompt()?;
    loop {
        match app.loop_step() {
            Ok(ShouldQuit::True) => break,
            Ok(ShouldQuit::False) => {}
            Err(e) => eyre::bail!("Error running session: {e:?}"),
        }
    }

    Ok(())
}

enum ShouldQuit {
    True,
    False,
}
