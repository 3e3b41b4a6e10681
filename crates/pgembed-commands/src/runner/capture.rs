//! Pipe draining and bounded waiting for child processes.
//!
//! Each output pipe is drained on its own thread into a shared buffer so the
//! child never blocks on a full pipe. A tool such as `pg_ctl start` may leave
//! a grandchild holding the pipes open after the tool itself exits, so the
//! collectors are awaited for a bounded grace period and whatever was read
//! by then is returned.

use std::io::{self, Read};
use std::process::{Child, ExitStatus};
use std::sync::mpsc::{self, Receiver};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::RUNNER_TARGET;

/// Interval between `try_wait` polls while a timeout is armed.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How long collectors may keep reading after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const CHUNK_SIZE: usize = 8 * 1024;

/// Streams and exit status gathered from a finished child.
pub(super) struct Captured {
    /// `None` when the child was killed on timeout.
    pub(super) status: Option<ExitStatus>,
    pub(super) stdout: String,
    pub(super) stderr: String,
}

/// Collects a single pipe on a background thread.
struct StreamCollector {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl StreamCollector {
    fn spawn(stream: Option<impl Read + Send + 'static>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::channel();
        let Some(mut reader) = stream else {
            drop(tx.send(()));
            return Self { buffer, done: rx };
        };
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            let mut chunk = vec![0_u8; CHUNK_SIZE];
            loop {
                match reader.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(read) => {
                        let mut guard = sink.lock().unwrap_or_else(PoisonError::into_inner);
                        guard.extend(chunk.iter().take(read));
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                    Err(_) => break,
                }
            }
            drop(tx.send(()));
        });
        Self { buffer, done: rx }
    }

    /// Waits up to `grace` for the pipe to close and returns what was read.
    fn finish(self, stream: &str, grace: Duration) -> String {
        if self.done.recv_timeout(grace).is_err() {
            warn!(
                target: RUNNER_TARGET,
                stream,
                grace_ms = duration_ms(grace),
                "pipe still open after exit, returning partial output"
            );
        }
        let guard = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&guard).into_owned()
    }
}

/// Drains both pipes and waits for the child, killing it once `timeout`
/// elapses.
pub(super) fn run_to_completion(
    child: &mut Child,
    timeout: Option<Duration>,
) -> io::Result<Captured> {
    let stdout = StreamCollector::spawn(child.stdout.take());
    let stderr = StreamCollector::spawn(child.stderr.take());
    let status = match timeout {
        Some(limit) => wait_with_deadline(child, limit)?,
        None => Some(child.wait()?),
    };
    Ok(Captured {
        status,
        stdout: stdout.finish("stdout", DRAIN_GRACE),
        stderr: stderr.finish("stderr", DRAIN_GRACE),
    })
}

fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => {}
            Err(error) => {
                warn!(
                    target: RUNNER_TARGET,
                    pid = child.id(),
                    %error,
                    "failed to poll command, killing process"
                );
                kill_and_reap(child);
                return Err(error);
            }
        }
        if start.elapsed() >= limit {
            warn!(
                target: RUNNER_TARGET,
                pid = child.id(),
                timeout_ms = duration_ms(limit),
                "command timed out, killing process"
            );
            kill_and_reap(child);
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Kills `child` and waits for it so no zombie outlives the call.
pub(super) fn kill_and_reap(child: &mut Child) {
    drop(child.kill());
    drop(child.wait());
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(super) fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
