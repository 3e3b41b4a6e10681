//! Ownership of the directory a scoped server lives in.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::info;

use super::SCOPE_TARGET;

/// Base directory of a scoped server and whether the scope must remove it.
#[derive(Debug)]
pub enum BaseDir {
    /// Caller-supplied directory.
    Provided {
        /// Directory path.
        path: PathBuf,
        /// Topmost directory the scope had to create for `path`, removed on
        /// release. `None` when `path` already existed.
        created_root: Option<PathBuf>,
    },
    /// Temporary directory created and removed by the scope.
    Temporary(TempDir),
}

impl BaseDir {
    /// Uses `path`, creating it when absent.
    ///
    /// # Errors
    ///
    /// Propagates directory creation failures.
    pub fn provided(path: impl Into<PathBuf>) -> io::Result<Self> {
        let dir = path.into();
        let created_root = topmost_missing(&dir);
        if created_root.is_some() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self::Provided {
            path: dir,
            created_root,
        })
    }

    /// Creates a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Propagates temporary directory creation failures.
    pub fn temporary() -> io::Result<Self> {
        tempfile::Builder::new()
            .prefix("pgembed-")
            .tempdir()
            .map(Self::Temporary)
    }

    /// Directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::Provided { path, .. } => path,
            Self::Temporary(dir) => dir.path(),
        }
    }

    /// Returns `true` when [`remove`](Self::remove) deletes the directory.
    #[must_use]
    pub const fn is_owned(&self) -> bool {
        match self {
            Self::Provided { created_root, .. } => created_root.is_some(),
            Self::Temporary(_) => true,
        }
    }

    /// Removes the directory when the scope owns it, together with any
    /// missing parents created alongside it.
    ///
    /// # Errors
    ///
    /// Propagates removal failures.
    pub fn remove(self) -> io::Result<()> {
        let removed = match self {
            Self::Provided {
                created_root: None, ..
            } => return Ok(()),
            Self::Provided {
                created_root: Some(root),
                ..
            } => {
                fs::remove_dir_all(&root)?;
                root
            }
            Self::Temporary(dir) => {
                let path = dir.path().to_path_buf();
                dir.close()?;
                path
            }
        };
        info!(target: SCOPE_TARGET, dir = %removed.display(), "removed base directory");
        Ok(())
    }

    /// Leaves the directory on disk and returns its path.
    #[must_use]
    pub fn keep(self) -> PathBuf {
        match self {
            Self::Provided { path, .. } => path,
            Self::Temporary(dir) => dir.keep(),
        }
    }
}

/// Highest ancestor of `path` (or `path` itself) that does not exist yet.
fn topmost_missing(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .take_while(|ancestor| !ancestor.as_os_str().is_empty() && !ancestor.exists())
        .last()
        .map(Path::to_path_buf)
}
