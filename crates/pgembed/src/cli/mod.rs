//! The `pgembed` binary: start a server, report it, stop it on a signal.
//!
//! On success a single JSON line describing the ready server is written to
//! stdout, followed by a second line once the server has been released.
//! Diagnostics go to stderr.

mod error;
mod shutdown;

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use ortho_config::OrthoConfig;
use pgembed_config::Config;
use serde::Serialize;
use tracing::info;

use crate::probe::ReadinessProbe;
use crate::scope::{ScopedServer, ServerOptions};
use crate::telemetry;

pub use self::error::CliError;
pub use self::shutdown::{ShutdownError, ShutdownSignal, SystemShutdownSignal};

pub(crate) const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

/// Status line written to stdout.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Report<'a> {
    Ready {
        uri: &'a str,
        pid: Option<u32>,
        data_dir: &'a Path,
        log_path: &'a Path,
    },
    Stopped,
}

/// Collaborators the binary would otherwise construct itself.
pub(crate) struct Runtime<'a> {
    pub(crate) signal: Option<&'a dyn ShutdownSignal>,
    pub(crate) probe: Option<Arc<dyn ReadinessProbe>>,
}

/// Runs the binary with the provided arguments and output streams.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let runtime = Runtime {
        signal: None,
        probe: None,
    };
    run_with(args, stdout, stderr, &runtime)
}

pub(crate) fn run_with<I, W, E>(
    args: I,
    stdout: &mut W,
    stderr: &mut E,
    runtime: &Runtime<'_>,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    match serve(args, stdout, runtime) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let _ = writeln!(stderr, "pgembed: {error}");
            ExitCode::FAILURE
        }
    }
}

fn serve<I, W>(args: I, stdout: &mut W, runtime: &Runtime<'_>) -> Result<(), CliError>
where
    I: IntoIterator<Item = OsString>,
    W: Write,
{
    let config = Config::load_from_iter(args).map_err(CliError::LoadConfiguration)?;
    telemetry::initialise(&config)?;

    let mut options = ServerOptions::from_config(&config)?;
    if let Some(probe) = &runtime.probe {
        options = options.with_probe(Arc::clone(probe));
    }
    let server = ScopedServer::acquire(&options).map_err(CliError::Startup)?;
    let uri = server.default_uri().map_err(CliError::Startup)?;
    emit(
        stdout,
        &Report::Ready {
            uri: &uri,
            pid: server.pid(),
            data_dir: server.data_dir(),
            log_path: server.log_path(),
        },
    )?;

    let system = SystemShutdownSignal::new(config.stop_timeout());
    runtime.signal.unwrap_or(&system).wait()?;

    info!(target: CLI_TARGET, "releasing server");
    server.shutdown().map_err(CliError::Teardown)?;
    emit(stdout, &Report::Stopped)
}

fn emit<W: Write>(stdout: &mut W, report: &Report<'_>) -> Result<(), CliError> {
    let line = serde_json::to_string(report)
        .map_err(|error| CliError::Report(error.into()))?;
    writeln!(stdout, "{line}").map_err(CliError::Report)?;
    stdout.flush().map_err(CliError::Report)
}
