//! Unix domain socket transport

use std::os::unix::net::UnixStream;
use std::path::Path;
use std::time::Duration;

use eyre::{Context, Result};
use retry::{delay::Exponential, retry};

use super::MonitorTransport;

/// Default per-read timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Unix socket transport to a running emulator monitor
///
/// # Timeout Behavior
///
/// The socket is configured with a short read timeout so that a read with
/// nothing pending returns `WouldBlock` instead of blocking the session.
///
/// # Examples
///
/// ```no_run
/// use std::os::unix::net::UnixStream;
/// use transport::io::UnixTransport;
///
/// let stream = UnixStream::connect("/tmp/emu-monitor.sock")?;
/// let transport = UnixTransport::new(stream)?;
/// # Ok::<(), eyre::Error>(())
/// ```
pub struct UnixTransport {
    stream: UnixStream,
}

impl UnixTransport {
    /// Wrap an existing stream, applying [`DEFAULT_READ_TIMEOUT`]
    pub fn new(stream: UnixStream) -> Result<Self> {
        Self::with_read_timeout(stream, DEFAULT_READ_TIMEOUT)
    }

    pub fn with_read_timeout(stream: UnixStream, read_timeout: Duration) -> Result<Self> {
        stream
            .set_read_timeout(Some(read_timeout))
            .context("setting read timeout on unix stream")?;
        Ok(Self { stream })
    }

    /// Connect to the monitor socket at `path`, retrying with exponential
    /// back-off (200ms, 400ms, ...) for `attempts` tries
    pub fn connect(path: impl AsRef<Path>) -> Result<Self> {
        Self::connect_with_attempts(path, 5)
    }

    pub fn connect_with_attempts(path: impl AsRef<Path>, attempts: usize) -> Result<Self> {
        Self::connect_with(path, attempts, DEFAULT_READ_TIMEOUT)
    }

    pub fn connect_with(
        path: impl AsRef<Path>,
        attempts: usize,
        read_timeout: Duration,
    ) -> Result<Self> {
        let path = path.as_ref();
        let stream = retry(Exponential::from_millis(200).take(attempts), || {
            tracing::debug!(path = %path.display(), "trying to make connection");
            match UnixStream::connect(path) {
                Ok(stream) => {
                    tracing::debug!("connection made");
                    Ok(stream)
                }
                Err(e) => {
                    tracing::debug!(error = %e, "error making connection");
                    Err(e)
                }
            }
        })
        .wrap_err_with(|| format!("failed to connect to monitor at {}", path.display()))?;

        Self::with_read_timeout(stream, read_timeout)
    }
}

impl MonitorTransport for UnixTransport {
    type Reader = UnixStream;
    type Writer = UnixStream;

    fn split(self) -> Result<(Self::Reader, Self::Writer)> {
        let input = self
            .stream
            .try_clone()
            .context("cloning unix stream for reader")?;
        Ok((input, self.stream))
    }
}
