use std::collections::VecDeque;
use std::io;
use std::io::Read;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use std::time::Instant;

use log::debug;
use log::info;
use parking_lot::Condvar;
use parking_lot::Mutex;

/// How much stderr text is kept for diagnostics.
pub const CAPTURE_LIMIT: usize = 8 * 1024;

/// Bounded buffer of the most recent bytes written to the child's stderr.
///
/// Written by the listener thread, read when a failure is being described.
pub struct ErrorCapture {
    state: Mutex<CaptureState>,
    finished: Condvar,
}

struct CaptureState {
    buf: VecDeque<u8>,
    limit: usize,
    finished: bool,
}

impl ErrorCapture {
    pub fn new(limit: usize) -> Self {
        Self {
            state: Mutex::new(CaptureState {
                buf: VecDeque::with_capacity(limit.min(1024)),
                limit,
                finished: false,
            }),
            finished: Condvar::new(),
        }
    }

    pub fn append(&self, chunk: &[u8]) {
        let mut state = self.state.lock();
        let limit = state.limit;
        let chunk = &chunk[chunk.len().saturating_sub(limit)..];
        let overflow = (state.buf.len() + chunk.len()).saturating_sub(limit);
        state.buf.drain(..overflow);
        state.buf.extend(chunk);
    }

    /// Mark the stream as drained and wake any waiter.
    pub fn finish(&self) {
        self.state.lock().finished = true;
        self.finished.notify_all();
    }

    /// Wait until the stream is drained. Returns whether it was.
    pub fn wait_finished(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.finished {
            if self.finished.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.finished
    }

    pub fn text(&self) -> String {
        let state = self.state.lock();
        let (head, tail) = state.buf.as_slices();
        let mut bytes = Vec::with_capacity(head.len() + tail.len());
        bytes.extend_from_slice(head);
        bytes.extend_from_slice(tail);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// Drain `stderr` on a background thread, forwarding each chunk to the log and
/// into `capture`. Never fails once started.
pub fn spawn_listener<R>(
    mut stderr: R,
    capture: Arc<ErrorCapture>,
) -> io::Result<thread::JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new()
        .name("ssh-stderr".to_string())
        .spawn(move || {
            let mut buf = [0u8; 1024];
            loop {
                match stderr.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        for line in String::from_utf8_lossy(&buf[..n]).lines() {
                            info!(target: "ssh", "{line}");
                        }
                        capture.append(&buf[..n]);
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => {
                        debug!("stopped reading ssh stderr: {err}");
                        break;
                    }
                }
            }
            capture.finish();
        })
}
