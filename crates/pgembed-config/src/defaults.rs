use std::env;
use std::time::Duration;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Role created by the init tool and used in connection strings.
pub const DEFAULT_SUPERUSER: &str = "postgres";

/// Database every fresh cluster contains.
pub const DEFAULT_DATABASE: &str = "postgres";

/// Overall budget for the readiness poll.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between readiness probes.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_millis(50);

/// Budget for each graceful or immediate stop attempt.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(10);

/// Directory name appended to the platform data directory when no
/// installation root is configured.
const INSTALL_DIR_NAME: &str = "pginstall";

/// Default log filter expression used by the binaries.
#[must_use]
pub const fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Computes the installation root searched for `bin/` and `lib/`.
///
/// Falls back to `<data_local_dir>/pgembed/pginstall`, then to a
/// `pginstall` directory beside the working directory.
#[must_use]
pub fn default_install_root() -> Utf8PathBuf {
    if let Some(mut dir) = dirs::data_local_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
    {
        dir.push("pgembed");
        dir.push(INSTALL_DIR_NAME);
        return dir;
    }
    env::current_dir()
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .map_or_else(
            || Utf8PathBuf::from(INSTALL_DIR_NAME),
            |cwd| cwd.join(INSTALL_DIR_NAME),
        )
}
