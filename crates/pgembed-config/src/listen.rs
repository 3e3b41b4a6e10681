//! Declarative description of where the supervised server listens.

use std::fmt;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::{Host, Url};

/// Loopback host used when no TCP host is configured.
pub const DEFAULT_TCP_HOST: &str = "127.0.0.1";

/// Listening configuration requested for a server.
///
/// A TCP port of `0` asks the supervisor to pick a free ephemeral port at
/// acquisition time. A Unix endpoint without a directory places the socket in
/// the server's data directory.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum ListenMode {
    /// TCP listener on `host:port`.
    Tcp {
        /// Interface the server binds.
        host: String,
        /// Port to bind; `0` requests an ephemeral port.
        port: u16,
    },
    /// Unix domain socket inside `dir` (data directory when absent).
    Unix {
        /// Socket directory override.
        dir: Option<Utf8PathBuf>,
    },
}

impl ListenMode {
    /// TCP on the loopback interface with an ephemeral port.
    #[must_use]
    pub fn ephemeral_tcp() -> Self {
        Self::Tcp {
            host: DEFAULT_TCP_HOST.to_owned(),
            port: 0,
        }
    }

    /// TCP on a fixed host and port.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Unix socket placed in the data directory.
    #[must_use]
    pub const fn unix() -> Self {
        Self::Unix { dir: None }
    }

    /// Unix socket placed in a caller-chosen directory.
    #[must_use]
    pub fn unix_in(dir: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix {
            dir: Some(dir.into()),
        }
    }

    /// Returns `true` for Unix socket endpoints.
    #[must_use]
    pub const fn is_unix(&self) -> bool {
        matches!(self, Self::Unix { .. })
    }
}

impl Default for ListenMode {
    fn default() -> Self {
        if cfg!(unix) {
            Self::unix()
        } else {
            Self::ephemeral_tcp()
        }
    }
}

impl fmt::Display for ListenMode {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } if host.contains(':') => {
                write!(formatter, "tcp://[{host}]:{port}")
            }
            Self::Tcp { host, port } => write!(formatter, "tcp://{host}:{port}"),
            Self::Unix { dir: None } => formatter.write_str("unix"),
            Self::Unix { dir: Some(dir) } => write!(formatter, "unix://{dir}"),
        }
    }
}

impl FromStr for ListenMode {
    type Err = ListenParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim() {
            "tcp" => return Ok(Self::ephemeral_tcp()),
            "unix" => return Ok(Self::unix()),
            "" => return Err(ListenParseError::Empty),
            _ => {}
        }
        let url = Url::parse(input.trim())?;
        match url.scheme() {
            "tcp" => {
                let host = match url.host() {
                    Some(Host::Ipv6(address)) => address.to_string(),
                    Some(Host::Ipv4(address)) => address.to_string(),
                    Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_owned(),
                    _ => return Err(ListenParseError::MissingHost(input.to_owned())),
                };
                Ok(Self::tcp(host, url.port().unwrap_or(0)))
            }
            "unix" => {
                let path = url.path();
                if path.is_empty() || path == "/" {
                    return Err(ListenParseError::MissingUnixDirectory(input.to_owned()));
                }
                Ok(Self::unix_in(path))
            }
            other => Err(ListenParseError::UnsupportedScheme(other.to_owned())),
        }
    }
}

impl TryFrom<String> for ListenMode {
    type Error = ListenParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ListenMode> for String {
    fn from(mode: ListenMode) -> Self {
        mode.to_string()
    }
}

/// Errors encountered while parsing a [`ListenMode`] from text.
#[derive(Debug, Error)]
pub enum ListenParseError {
    /// The input was blank.
    #[error("listen endpoint must not be empty")]
    Empty,
    /// Scheme was not recognised.
    #[error("unsupported listen scheme '{0}'")]
    UnsupportedScheme(String),
    /// TCP host name was missing.
    #[error("missing TCP host in '{0}'")]
    MissingHost(String),
    /// Unix socket directory was absent.
    #[error("missing Unix socket directory in '{0}'")]
    MissingUnixDirectory(String),
    /// URL failed to parse.
    #[error(transparent)]
    Url(#[from] url::ParseError),
}
