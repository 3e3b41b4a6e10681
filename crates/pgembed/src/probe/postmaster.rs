//! Parsing of the `postmaster.pid` file a running server keeps in its data
//! directory.
//!
//! Lines: pid, data directory, start time, port, socket directory, listen
//! address, shared memory key, and (on current releases) a status word.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File name inside the data directory.
pub const POSTMASTER_PID_FILE: &str = "postmaster.pid";

/// Server status recorded on the last line of `postmaster.pid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostmasterStatus {
    /// Still running recovery or startup.
    Starting,
    /// Accepting connections.
    Ready,
    /// Shutting down.
    Stopping,
    /// Hot standby accepting read-only connections.
    Standby,
}

impl PostmasterStatus {
    fn parse(word: &str) -> Option<Self> {
        match word {
            "starting" => Some(Self::Starting),
            "ready" => Some(Self::Ready),
            "stopping" => Some(Self::Stopping),
            "standby" => Some(Self::Standby),
            _ => None,
        }
    }
}

/// Contents of a `postmaster.pid` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostmasterPid {
    /// Server process id.
    pub pid: u32,
    /// Port the server listens on.
    pub port: Option<u16>,
    /// First Unix socket directory, if any.
    pub socket_dir: Option<PathBuf>,
    /// Status line; absent while the server is still writing the file.
    pub status: Option<PostmasterStatus>,
}

impl PostmasterPid {
    /// Reads `<data_dir>/postmaster.pid`, returning `None` while it does not
    /// exist or is only partially written.
    ///
    /// # Errors
    ///
    /// Propagates I/O errors other than `NotFound`.
    pub fn read(data_dir: &Path) -> io::Result<Option<Self>> {
        match fs::read_to_string(data_dir.join(POSTMASTER_PID_FILE)) {
            Ok(contents) => Ok(Self::parse(&contents)),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error),
        }
    }

    /// Parses file contents; `None` when the pid line is missing or invalid.
    #[must_use]
    pub fn parse(contents: &str) -> Option<Self> {
        let mut lines = contents.lines().map(str::trim);
        let pid = lines.next()?.parse().ok()?;
        let mut rest = lines.skip(2);
        let port = rest.next().and_then(|line| line.parse().ok());
        let socket_dir = rest
            .next()
            .filter(|line| !line.is_empty())
            .map(PathBuf::from);
        let status = rest.nth(2).and_then(PostmasterStatus::parse);
        Some(Self {
            pid,
            port,
            socket_dir,
            status,
        })
    }

    /// Returns `true` when the status line is present and allows client
    /// connections.
    #[must_use]
    pub const fn accepts_connections(&self) -> bool {
        matches!(
            self.status,
            Some(PostmasterStatus::Ready | PostmasterStatus::Standby)
        )
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const READY_FILE: &str = "4242\n/srv/data\n1700000000\n6543\n/srv/sock\n127.0.0.1\n  5432001  32769\nready   \n";

    #[test]
    fn parses_complete_file() {
        let parsed = PostmasterPid::parse(READY_FILE).expect("parse");
        assert_eq!(
            parsed,
            PostmasterPid {
                pid: 4242,
                port: Some(6543),
                socket_dir: Some(PathBuf::from("/srv/sock")),
                status: Some(PostmasterStatus::Ready),
            }
        );
        assert!(parsed.accepts_connections());
    }

    #[rstest]
    #[case::starting("starting", false)]
    #[case::stopping("stopping", false)]
    #[case::standby("standby", true)]
    fn status_controls_acceptance(#[case] status: &str, #[case] accepts: bool) {
        let contents = format!("1\n/d\n0\n5432\n\n\n0 0\n{status}\n");
        let parsed = PostmasterPid::parse(&contents).expect("parse");
        assert_eq!(parsed.socket_dir, None);
        assert_eq!(parsed.accepts_connections(), accepts);
    }

    #[rstest]
    #[case::truncated("77\n/d\n0\n5432\n")]
    #[case::seven_lines("77\n/d\n0\n5432\n/tmp\n127.0.0.1\n0 0\n")]
    #[case::unknown_word("77\n/d\n0\n5432\n/tmp\n127.0.0.1\n0 0\nbooting\n")]
    fn missing_status_line_is_not_ready(#[case] contents: &str) {
        let parsed = PostmasterPid::parse(contents).expect("parse");
        assert_eq!(parsed.pid, 77);
        assert_eq!(parsed.status, None);
        assert!(!parsed.accepts_connections());
    }

    #[rstest]
    #[case::empty("")]
    #[case::garbage("not-a-pid\n")]
    fn invalid_pid_line_is_ignored(#[case] contents: &str) {
        assert!(PostmasterPid::parse(contents).is_none());
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::TempDir::new().expect("temp dir");
        assert_eq!(PostmasterPid::read(dir.path()).expect("read"), None);
    }
}
