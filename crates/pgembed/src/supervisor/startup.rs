//! Readiness polling for a freshly spawned server.

use std::fs;
use std::path::Path;
use std::process::Child;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::endpoint::Listener;
use crate::probe::{PostmasterPid, ReadinessProbe};

use super::SUPERVISOR_TARGET;
use super::error::SupervisorError;

/// Log lines attached to startup errors.
const LOG_TAIL_LINES: usize = 20;

/// What the readiness loop watches.
pub(super) struct Readiness<'a> {
    pub(super) data_dir: &'a Path,
    pub(super) listener: &'a Listener,
    pub(super) probe: &'a dyn ReadinessProbe,
    pub(super) log_path: &'a Path,
    pub(super) timeout: Duration,
    pub(super) interval: Duration,
}

/// Polls until the server is ready, exits, or the timeout elapses.
///
/// The child is left running on timeout; the caller kills it.
pub(super) fn wait_for_ready(
    child: &mut Child,
    readiness: &Readiness<'_>,
) -> Result<(), SupervisorError> {
    let started = Instant::now();
    let pid = child.id();
    while started.elapsed() < readiness.timeout {
        if let Some(status) = child
            .try_wait()
            .map_err(|source| process_error("wait for", pid, source))?
        {
            return Err(SupervisorError::StartupFailed {
                exit_code: status.code(),
                log_tail: log_tail(readiness.log_path),
            });
        }
        if is_ready(pid, readiness)? {
            info!(
                target: SUPERVISOR_TARGET,
                pid,
                listener = %readiness.listener,
                elapsed_ms = millis(started.elapsed()),
                "server ready"
            );
            return Ok(());
        }
        thread::sleep(readiness.interval);
    }
    Err(SupervisorError::StartupTimeout {
        timeout_ms: millis(readiness.timeout),
        log_tail: log_tail(readiness.log_path),
    })
}

fn is_ready(pid: u32, readiness: &Readiness<'_>) -> Result<bool, SupervisorError> {
    let Some(postmaster) = PostmasterPid::read(readiness.data_dir).map_err(probe_error)? else {
        return Ok(false);
    };
    if postmaster.pid != pid || !postmaster.accepts_connections() {
        debug!(
            target: SUPERVISOR_TARGET,
            expected_pid = pid,
            recorded_pid = postmaster.pid,
            status = ?postmaster.status,
            "postmaster.pid not ready yet"
        );
        return Ok(false);
    }
    readiness
        .probe
        .probe(readiness.listener)
        .map_err(probe_error)
}

/// Last lines of the server log, empty when it cannot be read.
pub(super) fn log_tail(log_path: &Path) -> String {
    let contents = fs::read_to_string(log_path).unwrap_or_default();
    let lines: Vec<&str> = contents.lines().collect();
    let skip = lines.len().saturating_sub(LOG_TAIL_LINES);
    lines
        .iter()
        .skip(skip)
        .copied()
        .collect::<Vec<_>>()
        .join("\n")
}

pub(super) fn process_error(action: &'static str, pid: u32, source: std::io::Error) -> SupervisorError {
    SupervisorError::Process {
        action,
        pid,
        source: Arc::new(source),
    }
}

fn probe_error(source: std::io::Error) -> SupervisorError {
    SupervisorError::Probe {
        source: Arc::new(source),
    }
}

pub(super) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
