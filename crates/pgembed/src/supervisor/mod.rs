//! Supervision of one server process.
//!
//! A [`ServerHandle`] owns the server it starts: nothing else starts or stops
//! it. The server executable is spawned directly as a child of this process,
//! so an unexpected exit is observed through its exit status rather than
//! inferred from a missing pid file.

mod error;
mod shutdown;
mod startup;
mod state;

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::Arc;
use std::time::Duration;

use pgembed_commands::{CommandOptions, CommandRunner, tools};
use pgembed_config::{
    Config, DEFAULT_PROBE_INTERVAL, DEFAULT_STARTUP_TIMEOUT, DEFAULT_STOP_TIMEOUT,
    DEFAULT_SUPERUSER, ListenMode,
};
use tracing::{debug, error, info, warn};

use crate::datadir::{DataDirectory, InitOptions};
use crate::endpoint::{ConnectionEndpoint, Listener, PortReservation};
use crate::probe::{ReadinessProbe, SocketProbe};

pub use self::error::SupervisorError;
pub use self::state::LifecycleState;

use self::shutdown::{StopBudget, kill_and_reap, stop_server};
use self::startup::{Readiness, wait_for_ready};

pub(crate) const SUPERVISOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::supervisor");

/// Server output file inside the base directory.
pub const SERVER_LOG_NAME: &str = "postgres.log";

/// Timeouts and identity used by a [`ServerHandle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    startup_timeout: Duration,
    probe_interval: Duration,
    stop_timeout: Duration,
    superuser: String,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            superuser: DEFAULT_SUPERUSER.to_owned(),
        }
    }
}

impl SupervisorSettings {
    /// Settings taken from loaded configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            startup_timeout: config.startup_timeout(),
            probe_interval: config.probe_interval(),
            stop_timeout: config.stop_timeout(),
            superuser: config.superuser().to_owned(),
        }
    }

    /// Overall readiness budget.
    #[must_use]
    pub const fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Delay between readiness and exit polls.
    #[must_use]
    pub const fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    /// Wait granted to each shutdown mode.
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Role used in connection URIs.
    #[must_use]
    pub fn with_superuser(mut self, superuser: impl Into<String>) -> Self {
        self.superuser = superuser.into();
        self
    }

    /// Overall readiness budget.
    #[must_use]
    pub const fn startup_timeout(&self) -> Duration {
        self.startup_timeout
    }

    /// Delay between polls.
    #[must_use]
    pub const fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// Wait granted to each shutdown mode.
    #[must_use]
    pub const fn stop_timeout(&self) -> Duration {
        self.stop_timeout
    }

    /// Role used in connection URIs.
    #[must_use]
    pub fn superuser(&self) -> &str {
        &self.superuser
    }
}

/// One supervised server instance.
///
/// Operations on a handle take `&mut self`; callers sharing a handle across
/// threads must serialise access themselves.
pub struct ServerHandle {
    runner: CommandRunner,
    probe: Arc<dyn ReadinessProbe>,
    settings: SupervisorSettings,
    listen: ListenMode,
    base_dir: PathBuf,
    data_dir: PathBuf,
    log_path: PathBuf,
    listener: Option<Listener>,
    reservation: Option<PortReservation>,
    child: Option<Child>,
    state: LifecycleState,
}

impl fmt::Debug for ServerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerHandle")
            .field("base_dir", &self.base_dir)
            .field("listener", &self.listener)
            .field("pid", &self.pid())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ServerHandle {
    /// Creates an uninitialized handle for `base_dir`, probing readiness with
    /// a [`SocketProbe`].
    #[must_use]
    pub fn new(
        base_dir: impl Into<PathBuf>,
        runner: CommandRunner,
        listen: ListenMode,
        settings: SupervisorSettings,
    ) -> Self {
        let base = base_dir.into();
        Self {
            runner,
            probe: Arc::new(SocketProbe::default()),
            settings,
            listen,
            data_dir: DataDirectory::path_for(&base),
            log_path: base.join(SERVER_LOG_NAME),
            base_dir: base,
            listener: None,
            reservation: None,
            child: None,
            state: LifecycleState::Uninitialized,
        }
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Prepares the data directory: `Uninitialized -> Initialized`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] outside `Uninitialized` and
    /// [`SupervisorError::Init`] when initialization fails, which also moves
    /// the handle to `Failed`.
    pub fn initialize(&mut self, options: &InitOptions) -> Result<DataDirectory, SupervisorError> {
        self.require(LifecycleState::Uninitialized, "initialize")?;
        match DataDirectory::initialize(&self.base_dir, &self.runner, options) {
            Ok(data_dir) => {
                self.transition(LifecycleState::Initialized);
                Ok(data_dir)
            }
            Err(error) => {
                self.fail();
                Err(error.into())
            }
        }
    }

    /// Spawns the server and blocks until it is ready:
    /// `Initialized -> Starting -> Ready`.
    ///
    /// On any failure the server is killed and reaped, its port released, and
    /// the handle left `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::StartupFailed`] when the server exits,
    /// [`SupervisorError::StartupTimeout`] when readiness is not reached in
    /// time, or the endpoint, log, spawn, and probe errors that prevent a
    /// start.
    pub fn start(&mut self) -> Result<(), SupervisorError> {
        self.require(LifecycleState::Initialized, "start")?;
        self.transition(LifecycleState::Starting);
        match self.launch() {
            Ok(()) => {
                self.transition(LifecycleState::Ready);
                Ok(())
            }
            Err(error) => {
                error!(target: SUPERVISOR_TARGET, %error, "server failed to start");
                self.fail();
                Err(error)
            }
        }
    }

    fn launch(&mut self) -> Result<(), SupervisorError> {
        let (listener, reservation) = Listener::resolve(&self.listen, &self.data_dir)?;
        self.reservation = reservation;
        let log = File::create(&self.log_path).map_err(|source| SupervisorError::Log {
            path: self.log_path.clone(),
            source: Arc::new(source),
        })?;
        let (spawned, command_line) = self.runner.spawn_background(
            tools::POSTGRES,
            listener.server_args(),
            Some(&self.data_dir),
            log,
            &CommandOptions::new(),
        )?;
        info!(
            target: SUPERVISOR_TARGET,
            pid = spawned.id(),
            listener = %listener,
            command = %command_line,
            "server spawned"
        );
        let child = self.child.insert(spawned);
        let readiness = Readiness {
            data_dir: &self.data_dir,
            listener: &listener,
            probe: self.probe.as_ref(),
            log_path: &self.log_path,
            timeout: self.settings.startup_timeout,
            interval: self.settings.probe_interval,
        };
        wait_for_ready(child, &readiness)?;
        self.listener = Some(listener);
        Ok(())
    }

    /// Stops the server: `Ready -> Stopping -> Stopped`.
    ///
    /// Stopping a handle that never started, already stopped, or failed is a
    /// no-op. A server found to have exited on its own moves the handle to
    /// `Failed` without error.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Process`] when the server survives every
    /// shutdown mode and cannot be killed; the handle is then `Failed`.
    pub fn stop(&mut self) -> Result<(), SupervisorError> {
        match self.state {
            LifecycleState::Ready => {}
            LifecycleState::Failed => {
                self.release();
                return Ok(());
            }
            LifecycleState::Uninitialized
            | LifecycleState::Initialized
            | LifecycleState::Starting
            | LifecycleState::Stopping
            | LifecycleState::Stopped => return Ok(()),
        }
        if let Err(SupervisorError::Crashed { exit_code }) = self.check() {
            warn!(
                target: SUPERVISOR_TARGET,
                ?exit_code,
                "server had already exited before stop"
            );
            return Ok(());
        }
        self.transition(LifecycleState::Stopping);
        let budget = StopBudget {
            timeout: self.settings.stop_timeout,
            interval: self.settings.probe_interval,
        };
        let outcome = self.child.as_mut().map_or(Ok(()), |child| {
            stop_server(child, &self.runner, &self.data_dir, &budget)
        });
        match outcome {
            Ok(()) => {
                self.child = None;
                self.reservation = None;
                self.transition(LifecycleState::Stopped);
                Ok(())
            }
            Err(error) => {
                self.fail();
                Err(error)
            }
        }
    }

    /// Checks that the server is still running.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Crashed`] the first time an unexpected exit
    /// is observed (the handle becomes `Failed`) and
    /// [`SupervisorError::NotRunning`] whenever the handle is not `Ready`.
    pub fn check(&mut self) -> Result<(), SupervisorError> {
        if self.state != LifecycleState::Ready {
            return Err(SupervisorError::NotRunning { state: self.state });
        }
        let Some(child) = self.child.as_mut() else {
            return Err(SupervisorError::NotRunning { state: self.state });
        };
        let pid = child.id();
        let exited = child
            .try_wait()
            .map_err(|source| startup::process_error("wait for", pid, source))?;
        let Some(status) = exited else {
            return Ok(());
        };
        error!(
            target: SUPERVISOR_TARGET,
            pid,
            exit_code = ?status.code(),
            "server exited unexpectedly"
        );
        self.child = None;
        self.fail();
        Err(SupervisorError::Crashed {
            exit_code: status.code(),
        })
    }

    /// Connection details of the running server.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] unless the handle is `Ready`.
    pub fn endpoint(&self) -> Result<ConnectionEndpoint, SupervisorError> {
        match (&self.listener, self.state) {
            (Some(listener), LifecycleState::Ready) => Ok(ConnectionEndpoint::new(
                listener.clone(),
                self.settings.superuser(),
            )),
            (_, state) => Err(SupervisorError::InvalidState {
                operation: "build a connection URI",
                state,
            }),
        }
    }

    /// Connection URI for `database`. Performs no I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] unless the handle is `Ready`.
    pub fn uri(&self, database: &str) -> Result<String, SupervisorError> {
        self.endpoint().map(|endpoint| endpoint.uri(database))
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> LifecycleState {
        self.state
    }

    /// Pid of the supervised server, while one is attached.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.as_ref().map(Child::id)
    }

    /// Resolved listener, once ready.
    #[must_use]
    pub const fn listener(&self) -> Option<&Listener> {
        self.listener.as_ref()
    }

    /// Base directory owned by this handle.
    #[must_use]
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Data directory inside the base directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Server log file.
    #[must_use]
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Supervision settings.
    #[must_use]
    pub const fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// Runner shared with this handle.
    #[must_use]
    pub const fn runner(&self) -> &CommandRunner {
        &self.runner
    }

    fn require(&self, expected: LifecycleState, operation: &'static str) -> Result<(), SupervisorError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SupervisorError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    /// Records a transition already validated by the caller's state check.
    fn transition(&mut self, next: LifecycleState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "invalid transition {} -> {next}",
            self.state
        );
        debug!(
            target: SUPERVISOR_TARGET,
            from = %self.state,
            to = %next,
            "lifecycle transition"
        );
        self.state = next;
    }

    /// Kills any child, releases the port, and marks the handle `Failed`.
    fn fail(&mut self) {
        self.release();
        if self.state.can_transition_to(LifecycleState::Failed) {
            self.transition(LifecycleState::Failed);
        }
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take()
            && let Err(error) = kill_and_reap(&mut child)
        {
            warn!(target: SUPERVISOR_TARGET, %error, "failed to reap server process");
        }
        self.reservation = None;
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        if self.child.is_some() {
            warn!(
                target: SUPERVISOR_TARGET,
                pid = ?self.pid(),
                state = %self.state,
                "server handle dropped while running, killing server"
            );
            self.release();
        }
    }
}
