//! Subprocess execution for registered tools.
//!
//! [`CommandRunner`] resolves a logical name through the shared
//! [`CommandRegistry`], prepends `-D <data_dir>` when a data directory is
//! given, and either runs the tool to completion ([`CommandRunner::run`]) or
//! leaves it running with output redirected to a log file
//! ([`CommandRunner::spawn_background`]).

mod capture;

use std::ffi::{OsStr, OsString};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use crate::error::CommandError;
use crate::registry::CommandRegistry;

use self::capture::duration_ms;

/// Tracing target for command execution.
pub(crate) const RUNNER_TARGET: &str = "pgembed_commands::runner";

/// Flag that introduces the data directory for every PostgreSQL tool.
const DATA_DIR_FLAG: &str = "-D";

/// Fully resolved invocation, used for logging and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: PathBuf,
    args: Vec<OsString>,
}

impl CommandLine {
    /// Executable path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, including the data-directory flag when present.
    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    fn lossy_args(&self) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Per-invocation knobs.
#[derive(Debug, Clone, Default)]
pub struct CommandOptions {
    timeout: Option<Duration>,
    env: Vec<(OsString, OsString)>,
    current_dir: Option<PathBuf>,
}

impl CommandOptions {
    /// Options with no timeout, inherited environment and working directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Kills the tool and fails with [`CommandError::Timeout`] once `timeout`
    /// has elapsed.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl AsRef<OsStr>, value: impl AsRef<OsStr>) -> Self {
        self.env
            .push((key.as_ref().to_os_string(), value.as_ref().to_os_string()));
        self
    }

    /// Runs the child from `dir`.
    #[must_use]
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Configured timeout, if any.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn apply(&self, command: &mut Command) {
        command.envs(self.env.iter().map(|(key, value)| (key, value)));
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    command_line: CommandLine,
    status: ExitStatus,
    stdout: String,
    stderr: String,
}

impl CommandOutput {
    /// The invocation that produced this output.
    #[must_use]
    pub const fn command_line(&self) -> &CommandLine {
        &self.command_line
    }

    /// Exit status of the tool.
    #[must_use]
    pub const fn status(&self) -> ExitStatus {
        self.status
    }

    /// Captured standard output.
    #[must_use]
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Captured standard error.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Consumes the output, returning standard output.
    #[must_use]
    pub fn into_stdout(self) -> String {
        self.stdout
    }
}

/// Executes tools from a shared registry.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    registry: Arc<CommandRegistry>,
}

impl CommandRunner {
    /// Creates a runner that owns `registry`.
    #[must_use]
    pub fn new(registry: CommandRegistry) -> Self {
        Self::from_shared(Arc::new(registry))
    }

    /// Creates a runner over an already shared registry.
    #[must_use]
    pub const fn from_shared(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Registry backing this runner.
    #[must_use]
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Runs `name` to completion and returns its captured output.
    ///
    /// Standard input is closed. The full command line and both streams are
    /// logged at `info` on success and at `error` on failure.
    ///
    /// # Errors
    ///
    /// - [`CommandError::NotFound`] when `name` is not registered.
    /// - [`CommandError::MissingDataDir`] when the tool needs `-D` and
    ///   `data_dir` is `None`. Nothing is spawned in that case.
    /// - [`CommandError::Spawn`] or [`CommandError::Io`] for OS failures.
    /// - [`CommandError::Timeout`] when the configured timeout elapses.
    /// - [`CommandError::Execution`] for a non-zero exit.
    pub fn run<I, S>(
        &self,
        name: &str,
        args: I,
        data_dir: Option<&Path>,
        options: &CommandOptions,
    ) -> Result<CommandOutput, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (mut command, command_line) = self.prepare(name, args, data_dir)?;
        options.apply(&mut command);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        info!(target: RUNNER_TARGET, command = %command_line, "running command");
        let mut child = command.spawn().map_err(|source| CommandError::Spawn {
            command: command_line.to_string(),
            source: Arc::new(source),
        })?;
        let captured = capture::run_to_completion(&mut child, options.timeout()).map_err(
            |source| CommandError::Io {
                command: command_line.to_string(),
                source: Arc::new(source),
            },
        )?;

        let Some(status) = captured.status else {
            let timeout_ms = options.timeout().map_or(0, duration_ms);
            error!(
                target: RUNNER_TARGET,
                command = %command_line,
                timeout_ms,
                stdout = %captured.stdout,
                stderr = %captured.stderr,
                "command timed out"
            );
            return Err(CommandError::Timeout {
                command: command_line.to_string(),
                timeout_ms,
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        };

        if !status.success() {
            error!(
                target: RUNNER_TARGET,
                command = %command_line,
                exit_code = ?status.code(),
                stdout = %captured.stdout,
                stderr = %captured.stderr,
                "command failed"
            );
            return Err(CommandError::Execution {
                command: command_line.program().display().to_string(),
                args: command_line.lossy_args(),
                exit_code: status.code(),
                stdout: captured.stdout,
                stderr: captured.stderr,
            });
        }

        info!(
            target: RUNNER_TARGET,
            command = %command_line,
            stdout = %captured.stdout,
            stderr = %captured.stderr,
            "command succeeded"
        );
        Ok(CommandOutput {
            command_line,
            status,
            stdout: captured.stdout,
            stderr: captured.stderr,
        })
    }

    /// Runs `name` and returns only its standard output.
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run).
    pub fn run_stdout<I, S>(
        &self,
        name: &str,
        args: I,
        data_dir: Option<&Path>,
        options: &CommandOptions,
    ) -> Result<String, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.run(name, args, data_dir, options)
            .map(CommandOutput::into_stdout)
    }

    /// Starts `name` without waiting for it, sending both output streams to
    /// `log`.
    ///
    /// The caller owns the returned [`Child`] and is responsible for reaping
    /// it.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::NotFound`], [`CommandError::MissingDataDir`],
    /// [`CommandError::Io`] when the log handle cannot be duplicated, or
    /// [`CommandError::Spawn`].
    pub fn spawn_background<I, S>(
        &self,
        name: &str,
        args: I,
        data_dir: Option<&Path>,
        log: File,
        options: &CommandOptions,
    ) -> Result<(Child, CommandLine), CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let (mut command, command_line) = self.prepare(name, args, data_dir)?;
        options.apply(&mut command);
        let stderr_log = log.try_clone().map_err(|source| CommandError::Io {
            command: command_line.to_string(),
            source: Arc::new(source),
        })?;
        command
            .stdin(Stdio::null())
            .stdout(Stdio::from(log))
            .stderr(Stdio::from(stderr_log));

        let child = command.spawn().map_err(|source| CommandError::Spawn {
            command: command_line.to_string(),
            source: Arc::new(source),
        })?;
        info!(
            target: RUNNER_TARGET,
            command = %command_line,
            pid = child.id(),
            "started background command"
        );
        Ok((child, command_line))
    }

    fn prepare<I, S>(
        &self,
        name: &str,
        args: I,
        data_dir: Option<&Path>,
    ) -> Result<(Command, CommandLine), CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let spec = self.registry.get(name).ok_or_else(|| CommandError::NotFound {
            name: name.to_owned(),
        })?;
        if spec.requires_data_dir() && data_dir.is_none() {
            return Err(CommandError::MissingDataDir {
                name: name.to_owned(),
            });
        }

        let mut full_args: Vec<OsString> = Vec::new();
        if let Some(dir) = data_dir {
            full_args.push(OsString::from(DATA_DIR_FLAG));
            full_args.push(dir.as_os_str().to_os_string());
        }
        full_args.extend(args.into_iter().map(|arg| arg.as_ref().to_os_string()));

        let mut command = Command::new(spec.executable());
        command.args(&full_args);
        let command_line = CommandLine {
            program: spec.executable().to_path_buf(),
            args: full_args,
        };
        Ok((command, command_line))
    }
}

#[cfg(test)]
mod tests;
