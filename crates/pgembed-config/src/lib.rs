//! Shared configuration for the embedded PostgreSQL supervisor.
//!
//! [`Config`] is loaded through `ortho_config`, layering built-in defaults, a
//! TOML configuration file, `PGEMBED_*` environment variables, and command
//! line flags (highest precedence). Every field is optional on the wire; the
//! accessors supply the defaults from [`defaults`].

mod defaults;
mod logging;
mod listen;
mod setting;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_DATABASE, DEFAULT_LOG_FILTER, DEFAULT_PROBE_INTERVAL, DEFAULT_STARTUP_TIMEOUT,
    DEFAULT_STOP_TIMEOUT, DEFAULT_SUPERUSER, default_install_root, default_log_filter,
    default_log_format,
};
pub use listen::{DEFAULT_TCP_HOST, ListenMode, ListenParseError};
pub use logging::{LogFormat, LogFormatParseError};
pub use setting::{Setting, SettingParseError};

/// Runtime configuration for a supervised server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "PGEMBED")]
#[serde(default)]
pub struct Config {
    /// Installation root containing `bin/` and `lib/postgresql/`.
    pub install_root: Option<Utf8PathBuf>,
    /// Base directory for the cluster; a temporary one is created when unset.
    pub base_dir: Option<Utf8PathBuf>,
    /// Listening endpoint (`tcp`, `tcp://host:port`, `unix`, `unix:///dir`).
    pub listen: Option<ListenMode>,
    /// Role used by the init tool and connection strings.
    pub superuser: Option<String>,
    /// Database named by the connection string printed on startup.
    pub default_database: Option<String>,
    /// Readiness budget in milliseconds.
    pub startup_timeout_ms: Option<u64>,
    /// Readiness probe interval in milliseconds.
    pub probe_interval_ms: Option<u64>,
    /// Budget for each stop attempt in milliseconds.
    pub stop_timeout_ms: Option<u64>,
    /// Timeout applied to auxiliary command invocations in milliseconds.
    pub command_timeout_ms: Option<u64>,
    /// Extra `key=value` settings appended to `postgresql.conf` before first start.
    #[serde(default)]
    #[ortho_config(merge_strategy = "append")]
    pub settings: Vec<String>,
    /// Extensions that must be configured before first start.
    #[serde(default)]
    #[ortho_config(merge_strategy = "append")]
    pub extensions: Vec<String>,
    /// Tracing filter expression.
    ///
    /// Its default keeps the defaults layer non-empty when no other source
    /// contributes a value.
    #[ortho_config(default = DEFAULT_LOG_FILTER.to_owned())]
    pub log_filter: Option<String>,
    /// Tracing output format.
    #[ortho_config(default = default_log_format())]
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Installation root, falling back to [`default_install_root`].
    #[must_use]
    pub fn install_root(&self) -> Utf8PathBuf {
        self.install_root
            .clone()
            .unwrap_or_else(default_install_root)
    }

    /// Caller-supplied base directory, if any.
    #[must_use]
    pub fn base_dir(&self) -> Option<&Utf8Path> {
        self.base_dir.as_deref()
    }

    /// Requested listening endpoint.
    #[must_use]
    pub fn listen(&self) -> ListenMode {
        self.listen.clone().unwrap_or_default()
    }

    /// Role used by the init tool and connection strings.
    #[must_use]
    pub fn superuser(&self) -> &str {
        self.superuser.as_deref().unwrap_or(DEFAULT_SUPERUSER)
    }

    /// Database named in the startup connection string.
    #[must_use]
    pub fn default_database(&self) -> &str {
        self.default_database.as_deref().unwrap_or(DEFAULT_DATABASE)
    }

    /// Readiness budget.
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        self.startup_timeout_ms
            .map_or(DEFAULT_STARTUP_TIMEOUT, Duration::from_millis)
    }

    /// Interval between readiness probes.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        self.probe_interval_ms
            .map_or(DEFAULT_PROBE_INTERVAL, Duration::from_millis)
    }

    /// Budget for each stop attempt.
    #[must_use]
    pub fn stop_timeout(&self) -> Duration {
        self.stop_timeout_ms
            .map_or(DEFAULT_STOP_TIMEOUT, Duration::from_millis)
    }

    /// Timeout for auxiliary command invocations, if configured.
    #[must_use]
    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_ms.map(Duration::from_millis)
    }

    /// Parses the configured `key=value` overrides.
    ///
    /// # Errors
    ///
    /// Returns [`SettingParseError`] for the first malformed entry.
    pub fn settings(&self) -> Result<Vec<Setting>, SettingParseError> {
        self.settings.iter().map(|raw| raw.parse()).collect()
    }

    /// Extensions that must be configured before first start.
    #[must_use]
    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// Tracing filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Tracing output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }
}
