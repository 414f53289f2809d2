use std::io;
use std::io::Read;
use std::io::Write;
use std::process::Child;
use std::process::ChildStdin;
use std::process::ChildStdout;
use std::process::ExitStatus;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::error;
use parking_lot::Mutex;

use super::LaunchSpec;
use super::Launcher;
use super::TransportError;
use super::capture;
use super::capture::CAPTURE_LIMIT;
use super::capture::ErrorCapture;

/// Largest single read from the process's stdout.
pub const READ_CHUNK: usize = 8 * 1024;

/// Largest single write into the process's stdin.
pub const MAX_WRITE_CHUNK: usize = i32::MAX as usize;

/// How long close waits for the process to exit on its own by default.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

/// After a zero-byte read, how long the process gets to report its exit.
const EXIT_SETTLE: Duration = Duration::from_millis(200);

/// How long a failure waits for the stderr listener to catch up.
const CAPTURE_SETTLE: Duration = Duration::from_millis(250);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Slot shared with the subtransport, receiving the first error raised while a
/// stream was being dropped.
pub(crate) type CloseReport = Arc<Mutex<Option<TransportError>>>;

// -----------------------------------------------------------------------------
// Types

/// A duplex byte stream backed by the standard streams of an ssh process.
///
/// The process is spawned on first use. Every read and write first checks
/// that it has not died; [`SshExeStream::close`] (or dropping the stream)
/// requires it to have exited cleanly.
pub struct SshExeStream {
    spec: LaunchSpec,
    launcher: Arc<dyn Launcher>,
    close_grace: Duration,
    state: ProcessState,
    close_report: Option<CloseReport>,
}

enum ProcessState {
    NotStarted,
    Running(RunningProcess),
    Released,
}

struct RunningProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: ChildStdout,
    capture: Arc<ErrorCapture>,
}

// -----------------------------------------------------------------------------
// SshExeStream impl

impl SshExeStream {
    pub fn new(spec: LaunchSpec, launcher: Arc<dyn Launcher>) -> Self {
        Self {
            spec,
            launcher,
            close_grace: DEFAULT_CLOSE_GRACE,
            state: ProcessState::NotStarted,
            close_report: None,
        }
    }

    pub fn with_close_grace(mut self, close_grace: Duration) -> Self {
        self.close_grace = close_grace;
        self
    }

    pub(crate) fn with_close_report(mut self, report: CloseReport) -> Self {
        self.close_report = Some(report);
        self
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    pub fn is_started(&self) -> bool {
        matches!(self.state, ProcessState::Running(_))
    }

    pub fn is_released(&self) -> bool {
        matches!(self.state, ProcessState::Released)
    }

    /// Start the process if needed, then fail if it has exited with an error.
    fn assert_alive(&mut self) -> Result<&mut RunningProcess, TransportError> {
        if matches!(self.state, ProcessState::NotStarted) {
            debug!(
                "starting {} {}",
                self.spec.program.display(),
                self.spec.command_line()
            );
            let process = RunningProcess::start(&self.spec, self.launcher.as_ref())?;
            self.state = ProcessState::Running(process);
        }

        let ProcessState::Running(process) = &mut self.state else {
            return Err(TransportError::Closed);
        };
        process.check()?;
        Ok(process)
    }

    /// Release the process. Succeeds only if it exited with code 0.
    ///
    /// The process gets the close grace period to exit on its own; one still
    /// running afterwards is killed and reported as
    /// [`TransportError::ClosedBeforeExit`]. Calling this again, or on a stream
    /// that never started, does nothing.
    pub fn close(&mut self) -> Result<(), TransportError> {
        let ProcessState::Running(mut process) =
            std::mem::replace(&mut self.state, ProcessState::Released)
        else {
            return Ok(());
        };

        let result = process.finish(self.close_grace);
        process.release();
        debug!("released ssh process for {}", self.spec.command_line());
        result
    }
}

impl Read for SshExeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let process = self.assert_alive()?;
        let len = buf.len().min(READ_CHUNK);
        let read = process
            .stdout
            .read(&mut buf[..len])
            .inspect_err(|err| error!("reading from ssh failed: {err}"))?;

        // EOF: make sure the process didn't just die on us
        if read == 0 {
            if len > 0 {
                process.wait_exit(EXIT_SETTLE)?;
            }
            self.assert_alive()?;
        }

        Ok(read)
    }
}

impl Write for SshExeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let process = self.assert_alive()?;
        let stdin = process.stdin.as_mut().ok_or(TransportError::Closed)?;
        write_chunked(stdin, buf, MAX_WRITE_CHUNK)
            .inspect_err(|err| error!("writing to ssh failed: {err}"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.state {
            ProcessState::Running(RunningProcess {
                stdin: Some(stdin), ..
            }) => stdin.flush(),
            _ => Ok(()),
        }
    }
}

impl Drop for SshExeStream {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            error!("{err}");
            if let Some(report) = &self.close_report {
                report.lock().get_or_insert(err);
            }
        }
    }
}

/// Copy `buf` into `sink` at most `max_chunk` bytes at a time, flushing after
/// each chunk.
pub(crate) fn write_chunked<W>(sink: &mut W, buf: &[u8], max_chunk: usize) -> io::Result<()>
where
    W: Write + ?Sized,
{
    for chunk in buf.chunks(max_chunk) {
        sink.write_all(chunk)?;
        sink.flush()?;
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// RunningProcess impl

impl RunningProcess {
    fn start(spec: &LaunchSpec, launcher: &dyn Launcher) -> Result<Self, TransportError> {
        let launch_error = |source| TransportError::Launch {
            program: spec.program.display().to_string(),
            source,
        };

        let mut child = launcher.launch(spec).map_err(launch_error)?;
        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            reap(&mut child);
            return Err(launch_error(io::Error::other(
                "standard streams were not redirected",
            )));
        };

        let capture = Arc::new(ErrorCapture::new(CAPTURE_LIMIT));
        if let Err(err) = capture::spawn_listener(stderr, capture.clone()) {
            reap(&mut child);
            return Err(launch_error(err));
        }

        Ok(Self {
            child,
            stdin: Some(stdin),
            stdout,
            capture,
        })
    }

    fn check(&mut self) -> Result<(), TransportError> {
        match self.child.try_wait()? {
            Some(status) if !status.success() => Err(self.failure(status)),
            // A clean exit may still have output buffered in the pipe
            _ => Ok(()),
        }
    }

    fn failure(&self, status: ExitStatus) -> TransportError {
        self.capture.wait_finished(CAPTURE_SETTLE);
        TransportError::RemoteFailure {
            code: status.code(),
            stderr: self.capture.text(),
        }
    }

    fn wait_exit(&mut self, timeout: Duration) -> io::Result<Option<ExitStatus>> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(status) = self.child.try_wait()? {
                return Ok(Some(status));
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Wait up to `grace` for the process to exit on its own. Stdin stays
    /// open, so a process still expecting input is never told the transfer
    /// ended.
    fn finish(&mut self, grace: Duration) -> Result<(), TransportError> {
        match self.wait_exit(grace)? {
            Some(status) if status.success() => Ok(()),
            Some(status) => Err(self.failure(status)),
            None => {
                self.child.kill()?;
                self.child.wait()?;
                Err(TransportError::ClosedBeforeExit)
            }
        }
    }

    fn release(mut self) {
        drop(self.stdin.take());
        if matches!(self.child.try_wait(), Ok(None)) {
            reap(&mut self.child);
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(err) = child.kill() {
        debug!("failed to kill ssh process: {err}");
    }
    if let Err(err) = child.wait() {
        debug!("failed to wait for ssh process: {err}");
    }
}
