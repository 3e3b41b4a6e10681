//! Acquire a ready server, hand it out, and guarantee its release.
//!
//! [`ScopedServer`] is the RAII form: acquiring it initializes and starts a
//! server, and dropping it stops the server and removes any directory the
//! scope created. [`with_server`] is the closure form that also reports
//! teardown failures.

mod base_dir;
mod error;

use std::env;
use std::ffi::OsStr;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pgembed_commands::{CommandError, CommandOptions, CommandOutput, CommandRegistry, CommandRunner};
use pgembed_config::{Config, DEFAULT_DATABASE, ListenMode, Setting, SettingParseError};
use tracing::{info, warn};

use crate::datadir::InitOptions;
use crate::extensions::ExtensionRegistry;
use crate::probe::{ReadinessProbe, SocketProbe};
use crate::supervisor::{ServerHandle, SupervisorError, SupervisorSettings};

pub use self::base_dir::BaseDir;
pub use self::error::{ScopeError, TeardownError};

pub(crate) const SCOPE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::scope");

/// Everything needed to acquire a scoped server.
#[derive(Clone)]
pub struct ServerOptions {
    install_root: PathBuf,
    base_dir: Option<PathBuf>,
    listen: ListenMode,
    supervisor: SupervisorSettings,
    default_database: String,
    command_timeout: Option<Duration>,
    settings: Vec<Setting>,
    extensions: Vec<String>,
    probe: Arc<dyn ReadinessProbe>,
}

impl fmt::Debug for ServerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerOptions")
            .field("install_root", &self.install_root)
            .field("base_dir", &self.base_dir)
            .field("listen", &self.listen)
            .field("supervisor", &self.supervisor)
            .field("default_database", &self.default_database)
            .field("settings", &self.settings)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl ServerOptions {
    /// Options for a server from `install_root` in a temporary directory.
    #[must_use]
    pub fn new(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            base_dir: None,
            listen: ListenMode::default(),
            supervisor: SupervisorSettings::default(),
            default_database: DEFAULT_DATABASE.to_owned(),
            command_timeout: None,
            settings: Vec::new(),
            extensions: Vec::new(),
            probe: Arc::new(SocketProbe::default()),
        }
    }

    /// Options taken from loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SettingParseError`] for malformed `settings` entries.
    pub fn from_config(config: &Config) -> Result<Self, SettingParseError> {
        Ok(Self {
            install_root: config.install_root().into_std_path_buf(),
            base_dir: config.base_dir().map(|dir| dir.as_std_path().to_path_buf()),
            listen: config.listen(),
            supervisor: SupervisorSettings::from_config(config),
            default_database: config.default_database().to_owned(),
            command_timeout: config.command_timeout(),
            settings: config.settings()?,
            extensions: config.extensions().to_vec(),
            probe: Arc::new(SocketProbe::default()),
        })
    }

    /// Places the server in `dir` instead of a temporary directory.
    #[must_use]
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Listening endpoint.
    #[must_use]
    pub fn with_listen(mut self, listen: ListenMode) -> Self {
        self.listen = listen;
        self
    }

    /// Timeouts and superuser.
    #[must_use]
    pub fn with_supervisor(mut self, supervisor: SupervisorSettings) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Database used by [`ScopedServer::default_uri`].
    #[must_use]
    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = database.into();
        self
    }

    /// Timeout for auxiliary tool invocations.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Adds a configuration override.
    #[must_use]
    pub fn with_setting(mut self, setting: Setting) -> Self {
        self.settings.push(setting);
        self
    }

    /// Requests an extension whose preload settings must be written.
    #[must_use]
    pub fn with_extension(mut self, name: impl Into<String>) -> Self {
        self.extensions.push(name.into());
        self
    }

    /// Replaces the readiness probe.
    #[must_use]
    pub fn with_probe(mut self, probe: Arc<dyn ReadinessProbe>) -> Self {
        self.probe = probe;
        self
    }

    fn init_options(&self) -> InitOptions {
        let options = InitOptions::new()
            .with_superuser(self.supervisor.superuser())
            .with_settings(self.settings.iter().cloned())
            .with_command_timeout(self.command_timeout);
        if self.extensions.is_empty() {
            options
        } else {
            options.with_extensions(
                ExtensionRegistry::detect(&self.install_root),
                self.extensions.iter().cloned(),
            )
        }
    }
}

/// A ready server that is stopped and cleaned up when dropped.
#[derive(Debug)]
pub struct ScopedServer {
    handle: ServerHandle,
    base: Option<BaseDir>,
    default_database: String,
    command_timeout: Option<Duration>,
}

impl ScopedServer {
    /// Initializes and starts a server described by `options`.
    ///
    /// When startup fails the server is stopped, directories created for it
    /// are removed, and the startup error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError`] when the installation cannot be scanned,
    /// the base directory cannot be prepared, or the server fails to
    /// initialize or become ready.
    pub fn acquire(options: &ServerOptions) -> Result<Self, SupervisorError> {
        let registry = CommandRegistry::discover(&options.install_root)?;
        let base = prepare_base_dir(options.base_dir.as_deref())?;
        let mut handle = ServerHandle::new(
            base.path(),
            CommandRunner::new(registry),
            options.listen.clone(),
            options.supervisor.clone(),
        )
        .with_probe(Arc::clone(&options.probe));

        let startup = handle
            .initialize(&options.init_options())
            .and_then(|_| handle.start());
        if let Err(error) = startup {
            let stopped = handle.stop();
            drop(handle);
            if let Err(release_error) = release(stopped, base) {
                warn!(target: SCOPE_TARGET, error = %release_error, "release after failed startup failed");
            }
            return Err(error);
        }

        info!(
            target: SCOPE_TARGET,
            base_dir = %handle.base_dir().display(),
            pid = ?handle.pid(),
            "scoped server ready"
        );
        Ok(Self {
            handle,
            base: Some(base),
            default_database: options.default_database.clone(),
            command_timeout: options.command_timeout,
        })
    }

    /// Connection URI for `database`.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::InvalidState`] once the server has stopped
    /// or failed.
    pub fn uri(&self, database: &str) -> Result<String, SupervisorError> {
        self.handle.uri(database)
    }

    /// Connection URI for the configured default database.
    ///
    /// # Errors
    ///
    /// Same as [`uri`](Self::uri).
    pub fn default_uri(&self) -> Result<String, SupervisorError> {
        self.handle.uri(&self.default_database)
    }

    /// Runs an auxiliary tool (for example `pg_dump` or `psql`) against this
    /// server.
    ///
    /// `PGHOST`, `PGPORT`, `PGUSER` and `PGDATABASE` point at the server, and
    /// tools that operate on a cluster receive its data directory.
    ///
    /// # Errors
    ///
    /// Propagates [`CommandError`] from the runner.
    pub fn run<I, S>(&self, tool: &str, args: I) -> Result<CommandOutput, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let runner = self.handle.runner();
        let data_dir = runner
            .registry()
            .get(tool)
            .filter(|spec| spec.requires_data_dir())
            .map(|_| self.handle.data_dir());
        let mut options = CommandOptions::new()
            .with_env("PGUSER", self.handle.settings().superuser())
            .with_env("PGDATABASE", &self.default_database);
        if let Some(listener) = self.handle.listener() {
            options = options
                .with_env("PGHOST", listener.libpq_host())
                .with_env("PGPORT", listener.port().to_string());
        }
        if let Some(timeout) = self.command_timeout {
            options = options.with_timeout(timeout);
        }
        runner.run(tool, args, data_dir, &options)
    }

    /// Stops the server and removes owned directories, reporting failures.
    ///
    /// Owned directories are kept when the server could not be stopped.
    ///
    /// # Errors
    ///
    /// Returns [`TeardownError`] when stopping or removal fails.
    pub fn shutdown(mut self) -> Result<(), TeardownError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), TeardownError> {
        let Some(base) = self.base.take() else {
            return Ok(());
        };
        release(self.handle.stop(), base)
    }
}

/// Removes `base` once its server is known to be stopped.
///
/// After a failed stop the server may still be using the directory, so it is
/// left in place and only the stop error is returned.
fn release(stopped: Result<(), SupervisorError>, base: BaseDir) -> Result<(), TeardownError> {
    if let Err(error) = stopped {
        let kept = base.keep();
        warn!(
            target: SCOPE_TARGET,
            dir = %kept.display(),
            %error,
            "server did not stop, keeping base directory"
        );
        return Err(TeardownError::Stop(error));
    }
    let path = base.path().to_path_buf();
    base.remove().map_err(|source| TeardownError::Cleanup {
        path,
        source: Arc::new(source),
    })
}

impl Deref for ScopedServer {
    type Target = ServerHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl DerefMut for ScopedServer {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.handle
    }
}

impl Drop for ScopedServer {
    fn drop(&mut self) {
        if let Err(error) = self.teardown() {
            warn!(target: SCOPE_TARGET, %error, "teardown of dropped server failed");
        }
    }
}

/// Runs `body` against a freshly acquired server and always releases it.
///
/// The body's error takes priority: a teardown failure after a failing body
/// is logged, not returned. A panic in `body` still releases the server.
///
/// # Errors
///
/// Returns [`ScopeError::Startup`] when the server cannot be acquired,
/// [`ScopeError::Body`] when `body` fails, and [`ScopeError::Teardown`] when
/// only the release fails.
pub fn with_server<T, E, F>(options: &ServerOptions, body: F) -> Result<T, ScopeError<E>>
where
    F: FnOnce(&mut ScopedServer) -> Result<T, E>,
    E: std::error::Error + 'static,
{
    let mut server = ScopedServer::acquire(options).map_err(ScopeError::Startup)?;
    let outcome = body(&mut server);
    let teardown = server.shutdown();
    match (outcome, teardown) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(error)) => Err(ScopeError::Teardown(error)),
        (Err(error), Ok(())) => Err(ScopeError::Body(error)),
        (Err(error), Err(teardown_error)) => {
            warn!(
                target: SCOPE_TARGET,
                error = %teardown_error,
                "teardown failed after the scope body failed"
            );
            Err(ScopeError::Body(error))
        }
    }
}

fn prepare_base_dir(requested: Option<&Path>) -> Result<BaseDir, SupervisorError> {
    let prepared = requested.map_or_else(BaseDir::temporary, BaseDir::provided);
    prepared.map_err(|source| SupervisorError::BaseDirectory {
        path: requested.map_or_else(env::temp_dir, Path::to_path_buf),
        source: Arc::new(source),
    })
}
