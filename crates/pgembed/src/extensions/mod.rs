//! Snapshot of the extensions bundled with an installation root.
//!
//! Availability is decided once, when [`ExtensionRegistry::detect`] checks
//! for each known library under `<install_root>/lib/postgresql`. The result
//! is an immutable value passed to the data-directory initializer, which asks
//! it for the settings that must be in place before the first start.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pgembed_config::Setting;
use thiserror::Error;
use tracing::debug;

const EXTENSIONS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::extensions");

/// Library directory relative to the installation root.
const LIBRARY_SUBDIR: &str = "lib/postgresql";

/// Static description of an extension the installation may bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionSpec {
    /// Logical name used by callers and configuration.
    pub name: &'static str,
    /// Shared library file under the library directory.
    pub library: &'static str,
    /// Name passed to `CREATE EXTENSION`.
    pub create_name: &'static str,
    /// Whether the library must be listed in `shared_preload_libraries`.
    pub preload: bool,
}

/// Extensions known to ship with pgembed installation roots.
pub const KNOWN_EXTENSIONS: &[ExtensionSpec] = &[
    ExtensionSpec {
        name: "pgvector",
        library: "vector.so",
        create_name: "vector",
        preload: false,
    },
    ExtensionSpec {
        name: "pgvectorscale",
        library: "vectorscale-0.5.1.so",
        create_name: "vectorscale",
        preload: false,
    },
    ExtensionSpec {
        name: "pgtextsearch",
        library: "pg_textsearch.so",
        create_name: "pg_textsearch",
        preload: false,
    },
    ExtensionSpec {
        name: "pg_duckdb",
        library: "pg_duckdb.so",
        create_name: "pg_duckdb",
        preload: true,
    },
];

/// Errors raised when resolving requested extensions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtensionError {
    /// The name matches no known extension.
    #[error("unknown extension '{name}'")]
    Unknown {
        /// Requested name.
        name: String,
    },
    /// The extension is known but its library is not installed.
    #[error("extension '{name}' is not installed (expected {library:?})")]
    Unavailable {
        /// Requested name.
        name: String,
        /// Library path that was checked.
        library: PathBuf,
    },
}

/// Immutable availability snapshot for [`KNOWN_EXTENSIONS`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionRegistry {
    library_dir: PathBuf,
    available: BTreeMap<&'static str, bool>,
}

impl ExtensionRegistry {
    /// Checks which known extensions are installed under `install_root`.
    #[must_use]
    pub fn detect(install_root: &Path) -> Self {
        let library_dir = install_root.join(LIBRARY_SUBDIR);
        let available = KNOWN_EXTENSIONS
            .iter()
            .map(|spec| (spec.name, library_dir.join(spec.library).is_file()))
            .collect();
        let registry = Self {
            library_dir,
            available,
        };
        debug!(
            target: EXTENSIONS_TARGET,
            library_dir = %registry.library_dir.display(),
            available = ?registry.available,
            "detected bundled extensions"
        );
        registry
    }

    /// Directory holding the bundled libraries.
    #[must_use]
    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    /// Returns `true` when `name` is known and installed.
    #[must_use]
    pub fn has_extension(&self, name: &str) -> bool {
        self.available.get(name).copied().unwrap_or(false)
    }

    /// Availability of every known extension, keyed by logical name.
    #[must_use]
    pub fn list(&self) -> BTreeMap<&'static str, bool> {
        self.available.clone()
    }

    /// Name to use with `CREATE EXTENSION`; unknown names pass through.
    #[must_use]
    pub fn create_name<'a>(&self, name: &'a str) -> &'a str {
        lookup(name).map_or(name, |spec| spec.create_name)
    }

    /// Full path of the library, when the extension is installed.
    #[must_use]
    pub fn library_path(&self, name: &str) -> Option<PathBuf> {
        let spec = lookup(name)?;
        self.has_extension(name)
            .then(|| self.library_dir.join(spec.library))
    }

    /// Settings that must be written before first start so `requested`
    /// extensions can load.
    ///
    /// Only extensions that need preloading contribute. When any do, the
    /// result holds `shared_preload_libraries` listing them in request order
    /// and `dynamic_library_path` pointing at the bundled library directory.
    ///
    /// # Errors
    ///
    /// Returns [`ExtensionError::Unknown`] or [`ExtensionError::Unavailable`]
    /// for the first requested name that cannot be used.
    pub fn preload_settings<S: AsRef<str>>(
        &self,
        requested: &[S],
    ) -> Result<Vec<Setting>, ExtensionError> {
        let mut preload: Vec<&str> = Vec::new();
        for name in requested.iter().map(AsRef::as_ref) {
            let spec = lookup(name).ok_or_else(|| ExtensionError::Unknown {
                name: name.to_owned(),
            })?;
            if !self.has_extension(name) {
                return Err(ExtensionError::Unavailable {
                    name: name.to_owned(),
                    library: self.library_dir.join(spec.library),
                });
            }
            let library = spec.library.trim_end_matches(".so");
            if spec.preload && !preload.contains(&library) {
                preload.push(library);
            }
        }
        if preload.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![
            Setting::new("shared_preload_libraries", preload.join(",")),
            Setting::new(
                "dynamic_library_path",
                self.library_dir.display().to_string(),
            ),
        ])
    }
}

fn lookup(name: &str) -> Option<&'static ExtensionSpec> {
    KNOWN_EXTENSIONS.iter().find(|spec| spec.name == name)
}

#[cfg(test)]
mod tests;
