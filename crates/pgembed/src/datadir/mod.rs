//! Creation and configuration of a server data directory.
//!
//! [`DataDirectory::initialize`] lays out `<base>/data`, runs `initdb` when
//! the directory has not been initialized yet, and appends configuration
//! overrides before the server is ever started. Initialization of one base
//! directory is serialised across processes by an advisory lock file.

mod error;
mod lock;
mod patch;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pgembed_commands::{CommandOptions, CommandRunner, tools};
use pgembed_config::{DEFAULT_SUPERUSER, Setting};
use tracing::{info, warn};

use crate::extensions::ExtensionRegistry;

pub use self::error::InitError;
pub use self::lock::LOCK_FILE_NAME;
pub use self::patch::patch_config;

#[cfg(test)]
pub(crate) use self::lock::process_is_alive;

pub(crate) const DATADIR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::datadir");

/// Data directory name inside the base directory.
pub const DATA_DIR_NAME: &str = "data";

/// File whose presence marks an initialized data directory.
pub const INITIALIZED_MARKER: &str = "PG_VERSION";

/// Server configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "postgresql.conf";

/// Inputs to [`DataDirectory::initialize`].
#[derive(Debug, Clone)]
pub struct InitOptions {
    superuser: String,
    settings: Vec<Setting>,
    extensions: Option<(ExtensionRegistry, Vec<String>)>,
    command_timeout: Option<Duration>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            superuser: DEFAULT_SUPERUSER.to_owned(),
            settings: Vec::new(),
            extensions: None,
            command_timeout: None,
        }
    }
}

impl InitOptions {
    /// Options initializing the cluster for the default superuser.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cluster superuser passed to `initdb -U`.
    #[must_use]
    pub fn with_superuser(mut self, superuser: impl Into<String>) -> Self {
        self.superuser = superuser.into();
        self
    }

    /// Configuration overrides appended to `postgresql.conf`.
    #[must_use]
    pub fn with_settings(mut self, settings: impl IntoIterator<Item = Setting>) -> Self {
        self.settings.extend(settings);
        self
    }

    /// Extensions whose preload settings must be written before first start.
    #[must_use]
    pub fn with_extensions(
        mut self,
        registry: ExtensionRegistry,
        names: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.extensions = Some((registry, names.into_iter().map(Into::into).collect()));
        self
    }

    /// Timeout applied to the `initdb` invocation.
    #[must_use]
    pub const fn with_command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Configured superuser.
    #[must_use]
    pub fn superuser(&self) -> &str {
        &self.superuser
    }

    fn resolved_settings(&self) -> Result<Vec<Setting>, InitError> {
        let mut settings = self.settings.clone();
        if let Some((registry, names)) = &self.extensions {
            settings.extend(registry.preload_settings(names)?);
        }
        Ok(settings)
    }
}

/// An initialized, configured data directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDirectory {
    path: PathBuf,
    freshly_initialized: bool,
    appended: Vec<String>,
}

impl DataDirectory {
    /// Returns `<base_dir>/data`.
    #[must_use]
    pub fn path_for(base_dir: &Path) -> PathBuf {
        base_dir.join(DATA_DIR_NAME)
    }

    /// Returns `true` when `data_dir` already holds a cluster.
    #[must_use]
    pub fn is_initialized(data_dir: &Path) -> bool {
        data_dir.join(INITIALIZED_MARKER).is_file()
    }

    /// Prepares `<base_dir>/data` for a first start.
    ///
    /// An already initialized directory is reused untouched apart from
    /// appending settings that are not present yet. Otherwise `initdb` runs
    /// through `runner`. When initialization fails, a data directory created
    /// by this call is removed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`InitError`] when the lock is held by a live process, the
    /// directories cannot be created, a requested extension is unusable,
    /// `initdb` fails, or the configuration cannot be patched.
    pub fn initialize(
        base_dir: &Path,
        runner: &CommandRunner,
        options: &InitOptions,
    ) -> Result<Self, InitError> {
        let settings = options.resolved_settings()?;
        fs::create_dir_all(base_dir).map_err(|source| InitError::CreateDirectory {
            path: base_dir.to_path_buf(),
            source: Arc::new(source),
        })?;
        let _lock = lock::DataDirLock::acquire(base_dir)?;

        let path = Self::path_for(base_dir);
        if Self::is_initialized(&path) {
            info!(
                target: DATADIR_TARGET,
                data_dir = %path.display(),
                "reusing initialized data directory"
            );
            let appended = patch_config(&path.join(CONFIG_FILE_NAME), &settings)?;
            return Ok(Self {
                path,
                freshly_initialized: false,
                appended,
            });
        }

        let existed = path.exists();
        match run_initdb(&path, runner, options)
            .and_then(|()| patch_config(&path.join(CONFIG_FILE_NAME), &settings))
        {
            Ok(appended) => {
                info!(
                    target: DATADIR_TARGET,
                    data_dir = %path.display(),
                    "initialized data directory"
                );
                Ok(Self {
                    path,
                    freshly_initialized: true,
                    appended,
                })
            }
            Err(error) => {
                if !existed {
                    remove_partial(&path);
                }
                Err(error)
            }
        }
    }

    /// Data directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Server configuration file.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE_NAME)
    }

    /// `true` when this call ran `initdb`.
    #[must_use]
    pub const fn freshly_initialized(&self) -> bool {
        self.freshly_initialized
    }

    /// Keys appended to the configuration by this call.
    #[must_use]
    pub fn appended_settings(&self) -> &[String] {
        &self.appended
    }
}

fn run_initdb(data_dir: &Path, runner: &CommandRunner, options: &InitOptions) -> Result<(), InitError> {
    let mut command_options = CommandOptions::new();
    if let Some(timeout) = options.command_timeout {
        command_options = command_options.with_timeout(timeout);
    }
    runner
        .run(
            tools::INITDB,
            ["-U", options.superuser(), "--auth=trust", "-E", "UTF8"],
            Some(data_dir),
            &command_options,
        )
        .map(drop)
        .map_err(|source| InitError::InitTool { source })
}

fn remove_partial(data_dir: &Path) {
    if !data_dir.exists() {
        return;
    }
    match fs::remove_dir_all(data_dir) {
        Ok(()) => info!(
            target: DATADIR_TARGET,
            data_dir = %data_dir.display(),
            "removed partially initialized data directory"
        ),
        Err(error) => warn!(
            target: DATADIR_TARGET,
            data_dir = %data_dir.display(),
            %error,
            "failed to remove partially initialized data directory"
        ),
    }
}
