//! Errors raised by server supervision.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use pgembed_commands::CommandError;
use thiserror::Error;

use crate::datadir::InitError;
use crate::endpoint::EndpointError;

use super::LifecycleState;

/// Failures of starting, monitoring, or stopping a server.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The operation is not allowed in the current state.
    #[error("cannot {operation} while the server is {state}")]
    InvalidState {
        /// Operation attempted.
        operation: &'static str,
        /// State at the time of the attempt.
        state: LifecycleState,
    },
    /// Data-directory initialization failed.
    #[error(transparent)]
    Init(#[from] InitError),
    /// No endpoint could be prepared.
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
    /// Installation tools could not be discovered or run.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The base directory could not be prepared.
    #[error("failed to prepare base directory {path:?}: {source}")]
    BaseDirectory {
        /// Base directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The server log could not be opened.
    #[error("failed to open server log {path:?}: {source}")]
    Log {
        /// Log file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The server exited before becoming ready.
    #[error("server exited during startup ({}): {log_tail}", describe_exit(.exit_code))]
    StartupFailed {
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
        /// Last lines of the server log.
        log_tail: String,
    },
    /// Readiness was not reached in time; the server has been killed.
    #[error("server not ready after {timeout_ms} ms")]
    StartupTimeout {
        /// Readiness budget in milliseconds.
        timeout_ms: u64,
        /// Last lines of the server log.
        log_tail: String,
    },
    /// The server exited without being asked to stop.
    #[error("server exited unexpectedly ({})", describe_exit(.exit_code))]
    Crashed {
        /// Exit code, `None` when killed by a signal.
        exit_code: Option<i32>,
    },
    /// The handle has no running server.
    #[error("server is not running (state: {state})")]
    NotRunning {
        /// Current state.
        state: LifecycleState,
    },
    /// A readiness probe failed for a reason other than "not listening".
    #[error("readiness probe failed: {source}")]
    Probe {
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Observing or signalling the server process failed.
    #[error("failed to {action} server process {pid}: {source}")]
    Process {
        /// What was being done.
        action: &'static str,
        /// Server pid.
        pid: u32,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

impl SupervisorError {
    /// Returns `true` when retrying the same operation may succeed.
    ///
    /// Timeouts and port exhaustion are transient; crashes and configuration
    /// failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::StartupTimeout { .. } | Self::Endpoint(EndpointError::NoFreePort { .. }) => true,
            Self::Command(error) => error.is_retryable(),
            _ => false,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(
        || String::from("terminated by signal"),
        |status| format!("exit status {status}"),
    )
}
