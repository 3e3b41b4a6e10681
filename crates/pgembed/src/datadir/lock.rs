//! Advisory lock serialising initialization of one base directory.
//!
//! The lock file holds the owner's PID. It is published with a hard link from
//! a fully written staging file, so a reader never observes an empty lock.
//! A lock whose owner is no longer alive is stale and gets replaced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use tracing::{debug, warn};

use super::DATADIR_TARGET;
use super::error::InitError;

/// Lock file name inside the base directory.
pub const LOCK_FILE_NAME: &str = "pgembed.lock";

static STAGING_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Held lock; removed on drop.
#[derive(Debug)]
pub(crate) struct DataDirLock {
    path: PathBuf,
}

impl DataDirLock {
    pub(crate) fn acquire(base_dir: &Path) -> Result<Self, InitError> {
        let path = base_dir.join(LOCK_FILE_NAME);
        let pid = process::id();
        let sequence = STAGING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
        let staging = base_dir.join(format!("{LOCK_FILE_NAME}.{pid}.{sequence}"));
        fs::write(&staging, format!("{pid}\n")).map_err(|source| lock_error(&staging, source))?;
        let outcome = publish(&staging, &path);
        if let Err(error) = fs::remove_file(&staging) {
            warn!(
                target: DATADIR_TARGET,
                file = %staging.display(),
                %error,
                "failed to remove lock staging file"
            );
        }
        outcome?;
        debug!(target: DATADIR_TARGET, file = %path.display(), pid, "acquired data directory lock");
        Ok(Self { path })
    }
}

impl Drop for DataDirLock {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: DATADIR_TARGET,
                    file = %self.path.display(),
                    %error,
                    "failed to remove lock file"
                );
            }
            _ => {}
        }
    }
}

fn publish(staging: &Path, path: &Path) -> Result<(), InitError> {
    match fs::hard_link(staging, path) {
        Ok(()) => Ok(()),
        Err(error) if error.kind() == io::ErrorKind::AlreadyExists => {
            replace_if_stale(path)?;
            fs::hard_link(staging, path).map_err(|source| contended(path, source))
        }
        Err(source) => Err(lock_error(path, source)),
    }
}

fn replace_if_stale(path: &Path) -> Result<(), InitError> {
    if let Some(pid) = read_pid(path)
        && process_is_alive(pid)?
    {
        return Err(InitError::Locked {
            path: path.to_path_buf(),
            pid,
        });
    }
    warn!(target: DATADIR_TARGET, file = %path.display(), "removing stale lock file");
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(lock_error(path, error)),
        _ => Ok(()),
    }
}

/// Another process won the race between stale-lock removal and re-linking.
fn contended(path: &Path, source: io::Error) -> InitError {
    if source.kind() == io::ErrorKind::AlreadyExists
        && let Some(pid) = read_pid(path)
    {
        return InitError::Locked {
            path: path.to_path_buf(),
            pid,
        };
    }
    lock_error(path, source)
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Returns `true` when `pid` names a live process.
pub(crate) fn process_is_alive(pid: u32) -> Result<bool, InitError> {
    let Ok(raw) = i32::try_from(pid) else {
        return Ok(false);
    };
    if raw == 0 {
        return Ok(false);
    }
    match kill(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH) => Ok(false),
        Err(source) => Err(InitError::CheckProcess { pid, source }),
    }
}

fn lock_error(path: &Path, source: io::Error) -> InitError {
    InitError::Lock {
        path: path.to_path_buf(),
        source: Arc::new(source),
    }
}
