//! Fake installation roots populated with shell-script tools.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// Creates a temporary installation root with an empty `bin/` directory.
pub(crate) fn install_root() -> TempDir {
    let root = TempDir::new().expect("create install root");
    fs::create_dir_all(root.path().join("bin")).expect("create bin directory");
    root
}

/// Writes an executable `/bin/sh` script named `name` into `root/bin`.
pub(crate) fn write_tool(root: &Path, name: &str, body: &str) -> PathBuf {
    let path = root.join("bin").join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool script");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod tool");
    }
    path
}
