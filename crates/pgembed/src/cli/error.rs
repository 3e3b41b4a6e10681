use std::io;
use std::sync::Arc;

use pgembed_config::SettingParseError;
use thiserror::Error;

use super::shutdown::ShutdownError;
use crate::scope::TeardownError;
use crate::supervisor::SupervisorError;
use crate::telemetry::TelemetryError;

/// Failures reported by the `pgembed` binary.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration could not be loaded.
    #[error("failed to load configuration: {0}")]
    LoadConfiguration(Arc<ortho_config::OrthoError>),
    /// A `settings` entry was malformed.
    #[error("invalid setting: {0}")]
    Setting(#[from] SettingParseError),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The server did not become ready.
    #[error("failed to start server: {0}")]
    Startup(#[source] SupervisorError),
    /// Writing the status report failed.
    #[error("failed to write status report: {0}")]
    Report(#[source] io::Error),
    /// Waiting for a shutdown signal failed.
    #[error(transparent)]
    Signal(#[from] ShutdownError),
    /// The server could not be released cleanly.
    #[error("failed to stop server: {0}")]
    Teardown(#[source] TeardownError),
}
