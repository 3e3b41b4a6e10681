//! Fake installation roots whose tools are `/bin/sh` scripts.
//!
//! The fake `postgres` writes a `postmaster.pid` naming itself with a `ready`
//! status and then `exec`s `sleep`, so the supervised pid stays the same.
//! The fake `pg_ctl stop` signals that pid and records the shutdown mode.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pgembed_commands::{CommandRegistry, CommandRunner};
use tempfile::TempDir;

use crate::endpoint::Listener;
use crate::probe::ReadinessProbe;

pub(crate) const INITDB_OK: &str = r##"data="$2"
mkdir -p "$data" || exit 1
echo 17 > "$data/PG_VERSION"
printf '%s\n' "# generated by initdb" "max_connections = 100" > "$data/postgresql.conf"
echo "Success. You can now start the database server.""##;

pub(crate) const INITDB_FAILING: &str = r#"mkdir -p "$2"
echo "initdb: fatal error: could not write configuration" >&2
exit 1"#;

pub(crate) const POSTGRES_READY: &str = r#"data="$2"
port=5432
while [ $# -gt 0 ]; do
  case "$1" in
    -p) port="$2"; shift ;;
  esac
  shift
done
printf '%s\n' "$$" "$data" "$(date +%s)" "$port" "" "" "0 0" "ready" > "$data/postmaster.pid"
echo "database system is ready to accept connections"
exec sleep 300"#;

/// Writes a lock file that stops before the status line, as a postmaster
/// still starting up does.
pub(crate) const POSTGRES_NO_STATUS: &str = r#"data="$2"
printf '%s\n' "$$" "$data" "0" "5432" "" "" "0 0" > "$data/postmaster.pid"
exec sleep 300"#;

pub(crate) const POSTGRES_FAILING: &str = r#"echo "FATAL:  could not create lock file" >&2
exit 1"#;

pub(crate) const POSTGRES_NEVER_READY: &str = "exec sleep 300";

pub(crate) const POSTGRES_STUBBORN: &str = r#"data="$2"
trap '' TERM INT QUIT
printf '%s\n' "$$" "$data" "0" "5432" "" "" "0 0" "ready" > "$data/postmaster.pid"
while true; do sleep 1; done"#;

pub(crate) const PG_CTL: &str = r#"data="$2"
pidfile="$data/postmaster.pid"
case "$3" in
  stop)
    echo "$5" >> "$data/../pg_ctl.calls"
    if [ ! -f "$pidfile" ]; then
      echo "pg_ctl: PID file \"$pidfile\" does not exist" >&2
      exit 1
    fi
    kill -TERM "$(head -n 1 "$pidfile")"
    rm -f "$pidfile"
    echo "server stopped"
    ;;
esac"#;

/// A temporary installation root populated with fake tools.
pub(crate) struct FakeInstall {
    root: TempDir,
}

impl FakeInstall {
    /// Installation with working `initdb`, `postgres` and `pg_ctl`.
    pub(crate) fn new() -> Self {
        let root = TempDir::new().expect("install root");
        fs::create_dir_all(root.path().join("bin")).expect("bin directory");
        fs::create_dir_all(root.path().join("lib/postgresql")).expect("library directory");
        let install = Self { root };
        install
            .with_tool("initdb", INITDB_OK)
            .with_tool("postgres", POSTGRES_READY)
            .with_tool("pg_ctl", PG_CTL)
    }

    /// Writes (or replaces) an executable script.
    pub(crate) fn with_tool(self, name: &str, body: &str) -> Self {
        let path = self.root.path().join("bin").join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write tool");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod tool");
        }
        self
    }

    /// Creates an empty bundled library file.
    pub(crate) fn with_library(self, file_name: &str) -> Self {
        fs::write(self.root.path().join("lib/postgresql").join(file_name), b"")
            .expect("write library");
        self
    }

    pub(crate) fn path(&self) -> &Path {
        self.root.path()
    }

    pub(crate) fn runner(&self) -> CommandRunner {
        CommandRunner::new(CommandRegistry::discover(self.path()).expect("discover tools"))
    }
}

/// Probe that reports every listener as accepting connections.
pub(crate) struct AlwaysReady;

impl ReadinessProbe for AlwaysReady {
    fn probe(&self, _listener: &Listener) -> io::Result<bool> {
        Ok(true)
    }
}

pub(crate) fn always_ready() -> Arc<dyn ReadinessProbe> {
    Arc::new(AlwaysReady)
}

/// Shutdown modes recorded by the fake `pg_ctl` for `base_dir`.
pub(crate) fn recorded_stop_modes(base_dir: &Path) -> Vec<String> {
    fs::read_to_string(base_dir.join("pg_ctl.calls"))
        .unwrap_or_default()
        .lines()
        .map(str::to_owned)
        .collect()
}

/// Returns `true` while `pid` names a live, unreaped process.
pub(crate) fn pid_is_alive(pid: u32) -> bool {
    crate::datadir::process_is_alive(pid).expect("probe pid")
}

pub(crate) fn base_dir_in(parent: &TempDir, name: &str) -> PathBuf {
    parent.path().join(name)
}
