//! Errors raised while preparing a data directory.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use nix::errno::Errno;
use pgembed_commands::CommandError;
use thiserror::Error;

use crate::extensions::ExtensionError;

/// Failures of data-directory initialization and configuration patching.
#[derive(Debug, Error)]
pub enum InitError {
    /// Another live process is initializing the same base directory.
    #[error("base directory is locked by running process {pid} ({path:?})")]
    Locked {
        /// Lock file path.
        path: PathBuf,
        /// PID recorded in the lock file.
        pid: u32,
    },
    /// The lock file could not be created, read or removed.
    #[error("failed to manage lock file {path:?}: {source}")]
    Lock {
        /// Lock file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Probing the lock owner failed.
    #[error("failed to check lock owner {pid}: {source}")]
    CheckProcess {
        /// PID recorded in the lock file.
        pid: u32,
        /// Underlying OS error.
        #[source]
        source: Errno,
    },
    /// The base directory could not be created.
    #[error("failed to create directory {path:?}: {source}")]
    CreateDirectory {
        /// Directory being created.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// The init tool failed.
    #[error("initdb failed: {source}")]
    InitTool {
        /// Runner failure, carrying the captured streams.
        #[source]
        source: CommandError,
    },
    /// The generated configuration file could not be read.
    #[error("failed to read configuration {path:?}: {source}")]
    ReadConfig {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Appending to the configuration file failed.
    #[error("failed to write configuration {path:?}: {source}")]
    WriteConfig {
        /// Configuration file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// A requested extension cannot be configured.
    #[error(transparent)]
    Extension(#[from] ExtensionError),
}
