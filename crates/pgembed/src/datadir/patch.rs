//! Append-only patching of `postgresql.conf`.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use pgembed_config::Setting;
use tracing::{debug, info};

use super::DATADIR_TARGET;
use super::error::InitError;

/// Appends `key = 'value'` lines for every setting whose key does not yet
/// appear anywhere in the file, returning the keys that were written.
///
/// Presence of the key as a substring suppresses the line, so an override
/// cannot be replaced by patching again. The file is never rewritten.
///
/// # Errors
///
/// Returns [`InitError::ReadConfig`] or [`InitError::WriteConfig`] when the
/// file cannot be read or appended to.
pub fn patch_config(conf_path: &Path, settings: &[Setting]) -> Result<Vec<String>, InitError> {
    let mut contents = fs::read_to_string(conf_path).map_err(|source| InitError::ReadConfig {
        path: conf_path.to_path_buf(),
        source: Arc::new(source),
    })?;
    let mut block = if contents.is_empty() || contents.ends_with('\n') {
        String::new()
    } else {
        String::from("\n")
    };
    let mut appended = Vec::new();
    for setting in settings {
        if contents.contains(setting.key()) {
            debug!(
                target: DATADIR_TARGET,
                key = setting.key(),
                "setting already present, leaving configuration untouched"
            );
            continue;
        }
        let line = setting.to_conf_line();
        contents.push_str(&line);
        contents.push('\n');
        block.push_str(&line);
        block.push('\n');
        appended.push(setting.key().to_owned());
    }
    if appended.is_empty() {
        return Ok(appended);
    }

    let write_error = |source| InitError::WriteConfig {
        path: conf_path.to_path_buf(),
        source: Arc::new(source),
    };
    let mut file = OpenOptions::new()
        .append(true)
        .open(conf_path)
        .map_err(write_error)?;
    file.write_all(block.as_bytes()).map_err(write_error)?;
    file.sync_all().map_err(write_error)?;
    info!(
        target: DATADIR_TARGET,
        file = %conf_path.display(),
        keys = ?appended,
        "patched server configuration"
    );
    Ok(appended)
}
