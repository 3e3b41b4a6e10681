//! Registry binding logical tool names to executables.
//!
//! [`CommandRegistry::discover`] scans `<install_root>/bin` exactly once and
//! records every executable it finds. The registry offers lookups only; it is
//! shared read-only (typically behind an `Arc`) for the lifetime of the
//! process.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::CommandError;

/// Tracing target for registry operations.
const REGISTRY_TARGET: &str = "pgembed_commands::registry";

/// Tools that operate on a cluster and therefore always need `-D <dir>`.
pub const DATA_DIR_COMMANDS: &[&str] = &["initdb", "pg_ctl", "pg_dump"];

/// Windows executable suffix stripped from logical names.
const EXE_SUFFIX: &str = ".exe";

/// A logical name bound to an executable path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    name: String,
    executable: PathBuf,
}

impl CommandSpec {
    /// Binds `name` to `executable`.
    #[must_use]
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
        }
    }

    /// Logical command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the executable.
    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Returns `true` when the tool must be given a data directory.
    #[must_use]
    pub fn requires_data_dir(&self) -> bool {
        DATA_DIR_COMMANDS.contains(&self.name.as_str())
    }
}

/// Read-only mapping of logical names to [`CommandSpec`]s.
///
/// # Example
///
/// ```
/// use pgembed_commands::{CommandRegistry, CommandSpec};
///
/// let registry = CommandRegistry::new()
///     .with_spec(CommandSpec::new("initdb", "/opt/pg/bin/initdb"))
///     .expect("unique name");
/// assert!(registry.contains("initdb"));
/// assert!(registry.get("pg_ctl").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CommandRegistry {
    bin_dir: Option<PathBuf>,
    specs: BTreeMap<String, CommandSpec>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans `<install_root>/bin` and binds every executable found there.
    ///
    /// A trailing `.exe` is stripped from file names so the same logical
    /// names work on every platform.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::InstallRootMissing`] when the binary directory
    /// does not exist, [`CommandError::Scan`] when it cannot be listed, and
    /// [`CommandError::DuplicateCommand`] when two files map to one name.
    pub fn discover(install_root: &Path) -> Result<Self, CommandError> {
        let bin_dir = install_root.join("bin");
        if !bin_dir.is_dir() {
            return Err(CommandError::InstallRootMissing { path: bin_dir });
        }
        let scan_error = |source: io::Error| CommandError::Scan {
            path: bin_dir.clone(),
            source: Arc::new(source),
        };
        let mut registry = Self {
            bin_dir: Some(bin_dir.clone()),
            specs: BTreeMap::new(),
        };
        for entry in fs::read_dir(&bin_dir).map_err(scan_error)? {
            let path = entry.map_err(scan_error)?.path();
            if !is_executable(&path) {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };
            let name = file_name.strip_suffix(EXE_SUFFIX).unwrap_or(file_name);
            registry.insert(CommandSpec::new(name, path.clone()))?;
        }
        debug!(
            target: REGISTRY_TARGET,
            bin_dir = %bin_dir.display(),
            commands = registry.specs.len(),
            "discovered installation commands"
        );
        Ok(registry)
    }

    /// Adds a binding, consuming and returning the registry.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::DuplicateCommand`] when the name is taken.
    pub fn with_spec(mut self, spec: CommandSpec) -> Result<Self, CommandError> {
        self.insert(spec)?;
        Ok(self)
    }

    fn insert(&mut self, spec: CommandSpec) -> Result<(), CommandError> {
        if self.specs.contains_key(spec.name()) {
            return Err(CommandError::DuplicateCommand {
                name: spec.name().to_owned(),
            });
        }
        self.specs.insert(spec.name().to_owned(), spec);
        Ok(())
    }

    /// Looks up a command by logical name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CommandSpec> {
        self.specs.get(name)
    }

    /// Returns `true` when `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.specs.contains_key(name)
    }

    /// Bound names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    /// Directory scanned by [`discover`](Self::discover), if any.
    #[must_use]
    pub fn bin_dir(&self) -> Option<&Path> {
        self.bin_dir.as_deref()
    }

    /// Number of bound commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Returns `true` when nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    fs::metadata(path)
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    fs::metadata(path).is_ok_and(|metadata| metadata.is_file())
}
