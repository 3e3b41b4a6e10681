//! Resolved server endpoints and connection URIs.
//!
//! A [`ListenMode`] from configuration is turned into a concrete [`Listener`]
//! when a server starts: ephemeral TCP ports are picked and reserved, Unix
//! socket directories default to the data directory. [`ConnectionEndpoint`]
//! formats `postgresql://` URIs from a listener without touching the network.

mod ports;

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use pgembed_config::ListenMode;
use thiserror::Error;

pub use self::ports::PortReservation;

pub(crate) const ENDPOINT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::endpoint");

/// Port used to name the socket file of Unix endpoints.
pub const DEFAULT_UNIX_PORT: u16 = 5432;

/// Characters left intact in URI components (RFC 3986 unreserved).
const COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Errors raised while choosing an endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// Binding the host failed.
    #[error("cannot bind {host}:{port}: {source}")]
    Bind {
        /// Host that was bound.
        host: String,
        /// Port that was bound; `0` for ephemeral.
        port: u16,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
    /// Every ephemeral port offered collided with a live reservation.
    #[error("no free port on {host} after {attempts} attempts")]
    NoFreePort {
        /// Host that was bound.
        host: String,
        /// Attempts made.
        attempts: u32,
    },
    /// A fixed port is already held by another handle in this process.
    #[error("port {port} is already reserved by another server")]
    PortReserved {
        /// Requested port.
        port: u16,
    },
    /// The socket directory could not be created.
    #[error("failed to create socket directory {path:?}: {source}")]
    SocketDirectory {
        /// Socket directory.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Where a started server accepts connections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Listener {
    /// TCP on `host:port`.
    Tcp {
        /// Bound interface.
        host: String,
        /// Bound port.
        port: u16,
    },
    /// Unix socket `<dir>/.s.PGSQL.<port>`.
    Unix {
        /// Socket directory.
        dir: PathBuf,
        /// Port naming the socket file.
        port: u16,
    },
}

impl Listener {
    /// Resolves `mode` for a server whose data directory is `data_dir`.
    ///
    /// TCP endpoints come with the [`PortReservation`] that must be kept for
    /// as long as the server runs.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError`] when no port can be reserved or the socket
    /// directory cannot be created.
    pub fn resolve(
        mode: &ListenMode,
        data_dir: &Path,
    ) -> Result<(Self, Option<PortReservation>), EndpointError> {
        match mode {
            ListenMode::Tcp { host, port } => {
                let reservation = if *port == 0 {
                    PortReservation::ephemeral(host)?
                } else {
                    PortReservation::fixed(host, *port)?
                };
                let listener = Self::Tcp {
                    host: host.clone(),
                    port: reservation.port(),
                };
                Ok((listener, Some(reservation)))
            }
            ListenMode::Unix { dir } => {
                let socket_dir = dir.as_ref().map_or_else(
                    || data_dir.to_path_buf(),
                    |custom| custom.as_std_path().to_path_buf(),
                );
                fs::create_dir_all(&socket_dir).map_err(|source| {
                    EndpointError::SocketDirectory {
                        path: socket_dir.clone(),
                        source: Arc::new(source),
                    }
                })?;
                let listener = Self::Unix {
                    dir: socket_dir,
                    port: DEFAULT_UNIX_PORT,
                };
                Ok((listener, None))
            }
        }
    }

    /// Port the server is started with.
    #[must_use]
    pub const fn port(&self) -> u16 {
        match self {
            Self::Tcp { port, .. } | Self::Unix { port, .. } => *port,
        }
    }

    /// Socket file path for Unix endpoints.
    #[must_use]
    pub fn socket_path(&self) -> Option<PathBuf> {
        match self {
            Self::Tcp { .. } => None,
            Self::Unix { dir, port } => Some(dir.join(format!(".s.PGSQL.{port}"))),
        }
    }

    /// Server arguments selecting this endpoint.
    ///
    /// TCP servers disable their Unix socket and Unix servers disable TCP, so
    /// concurrent servers never compete for a shared default location.
    #[must_use]
    pub fn server_args(&self) -> Vec<String> {
        let (listen_addresses, socket_dirs) = match self {
            Self::Tcp { host, .. } => (host.clone(), String::new()),
            Self::Unix { dir, .. } => (String::new(), dir.display().to_string()),
        };
        vec![
            String::from("-p"),
            self.port().to_string(),
            String::from("-c"),
            format!("listen_addresses={listen_addresses}"),
            String::from("-c"),
            format!("unix_socket_directories={socket_dirs}"),
        ]
    }

    /// Host value understood by libpq (`PGHOST`): a hostname or a socket
    /// directory.
    #[must_use]
    pub fn libpq_host(&self) -> String {
        match self {
            Self::Tcp { host, .. } => host.clone(),
            Self::Unix { dir, .. } => dir.display().to_string(),
        }
    }
}

impl fmt::Display for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "tcp://{}:{port}", bracketed(host)),
            Self::Unix { dir, port } => write!(f, "unix://{}/.s.PGSQL.{port}", dir.display()),
        }
    }
}

/// Connection details for one listener and role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionEndpoint {
    listener: Listener,
    user: String,
}

impl ConnectionEndpoint {
    /// Endpoint connecting to `listener` as `user`.
    #[must_use]
    pub fn new(listener: Listener, user: impl Into<String>) -> Self {
        Self {
            listener,
            user: user.into(),
        }
    }

    /// Underlying listener.
    #[must_use]
    pub const fn listener(&self) -> &Listener {
        &self.listener
    }

    /// Role used in the URI.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Formats a `postgresql://` URI for `database`.
    ///
    /// The user, database and socket directory are percent-encoded.
    ///
    /// ```
    /// use pgembed::{ConnectionEndpoint, Listener};
    ///
    /// let endpoint = ConnectionEndpoint::new(
    ///     Listener::Tcp { host: "127.0.0.1".into(), port: 54321 },
    ///     "postgres",
    /// );
    /// assert_eq!(
    ///     endpoint.uri("my db"),
    ///     "postgresql://postgres@127.0.0.1:54321/my%20db"
    /// );
    /// ```
    #[must_use]
    pub fn uri(&self, database: &str) -> String {
        let user = encode(&self.user);
        let dbname = encode(database);
        match &self.listener {
            Listener::Tcp { host, port } => {
                format!("postgresql://{user}@{}:{port}/{dbname}", bracketed(host))
            }
            Listener::Unix { dir, port } => {
                let socket_dir = encode(&dir.display().to_string());
                format!("postgresql://{user}@/{dbname}?host={socket_dir}&port={port}")
            }
        }
    }
}

fn encode(component: &str) -> String {
    utf8_percent_encode(component, COMPONENT).to_string()
}

fn bracketed(host: &str) -> String {
    if host.contains(':') {
        format!("[{host}]")
    } else {
        host.to_owned()
    }
}

#[cfg(test)]
mod tests;
