//! Domain errors raised by command discovery and execution.
//!
//! I/O errors are wrapped in `Arc` so the enum stays `Clone`-friendly for
//! callers that fan diagnostics out, and to keep the variants small.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Errors arising from command registry lookups and subprocess execution.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No executable is bound to the requested logical name.
    #[error("command '{name}' is not available in the installation root")]
    NotFound {
        /// Logical name that was looked up.
        name: String,
    },

    /// A command that operates on a cluster was invoked without `-D`.
    #[error("command '{name}' requires a data directory")]
    MissingDataDir {
        /// Logical command name.
        name: String,
    },

    /// The installation root does not contain a `bin/` directory.
    #[error("installation root has no binary directory at {path:?}")]
    InstallRootMissing {
        /// Directory that was expected to exist.
        path: PathBuf,
    },

    /// Two executables mapped to the same logical name.
    #[error("command '{name}' is bound more than once")]
    DuplicateCommand {
        /// Conflicting logical name.
        name: String,
    },

    /// Listing the binary directory failed.
    #[error("failed to scan {path:?} for commands: {source}")]
    Scan {
        /// Directory being scanned.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The subprocess could not be started.
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        /// Full command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// Waiting on or reading from the subprocess failed.
    #[error("I/O error while running '{command}': {source}")]
    Io {
        /// Full command line.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },

    /// The subprocess exited unsuccessfully.
    #[error(
        "command '{command}' failed with {}: {}",
        describe_exit(.exit_code),
        trimmed(.stderr)
    )]
    Execution {
        /// Executable that was run.
        command: String,
        /// Arguments passed, including any data-directory flag.
        args: Vec<String>,
        /// Exit code, or `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The subprocess outlived the caller's timeout and was killed.
    #[error("command '{command}' timed out after {timeout_ms} ms")]
    Timeout {
        /// Full command line.
        command: String,
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
        /// Output captured before the process was killed.
        stdout: String,
        /// Error output captured before the process was killed.
        stderr: String,
    },
}

impl CommandError {
    /// Returns `true` when retrying the same invocation may succeed.
    ///
    /// Only timeouts qualify; a non-zero exit or a missing binary is treated
    /// as fatal.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Captured standard error, when the failure carries one.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Execution { stderr, .. } | Self::Timeout { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map_or_else(
        || String::from("termination by signal"),
        |status| format!("exit status {status}"),
    )
}

fn trimmed(text: &str) -> &str {
    text.trim()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn execution(exit_code: Option<i32>) -> CommandError {
        CommandError::Execution {
            command: String::from("/opt/pg/bin/initdb"),
            args: vec![String::from("-D"), String::from("/tmp/data")],
            exit_code,
            stdout: String::new(),
            stderr: String::from("fatal error: directory not empty\n"),
        }
    }

    #[rstest]
    #[case::exit_code(Some(1), "exit status 1")]
    #[case::signal(None, "termination by signal")]
    fn execution_message_describes_exit(#[case] code: Option<i32>, #[case] expected: &str) {
        let message = execution(code).to_string();
        assert!(message.contains(expected), "unexpected message: {message}");
        assert!(message.ends_with("fatal error: directory not empty"));
    }

    #[test]
    fn only_timeouts_are_retryable() {
        let timeout = CommandError::Timeout {
            command: String::from("pg_ctl"),
            timeout_ms: 10,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert!(timeout.is_retryable());
        assert!(!execution(Some(1)).is_retryable());
        assert!(
            !CommandError::NotFound {
                name: String::from("psql")
            }
            .is_retryable()
        );
    }

    #[test]
    fn stderr_accessor_exposes_captured_text() {
        assert_eq!(
            execution(Some(2)).stderr(),
            Some("fatal error: directory not empty\n")
        );
        assert_eq!(
            CommandError::MissingDataDir {
                name: String::from("initdb")
            }
            .stderr(),
            None
        );
    }
}
