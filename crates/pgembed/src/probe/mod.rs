//! Readiness detection for a starting server.
//!
//! A server is ready when the `postmaster.pid` it writes names the supervised
//! child with an accepting status and a connection to its listener succeeds.
//! The connection attempt sits behind [`ReadinessProbe`] so supervision can be
//! exercised without a real server.

mod postmaster;

use std::io;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::endpoint::Listener;

pub use self::postmaster::{PostmasterPid, PostmasterStatus};

/// Per-attempt connection timeout of [`SocketProbe`].
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Checks whether a listener accepts connections.
#[cfg_attr(test, mockall::automock)]
pub trait ReadinessProbe: Send + Sync {
    /// Returns `Ok(true)` once `listener` accepts connections and
    /// `Ok(false)` while nothing is listening yet.
    ///
    /// # Errors
    ///
    /// Returns errors that do not simply mean "not listening yet".
    fn probe(&self, listener: &Listener) -> io::Result<bool>;
}

/// Probe that opens a real connection and closes it immediately.
#[derive(Debug, Clone, Copy)]
pub struct SocketProbe {
    timeout: Duration,
}

impl Default for SocketProbe {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl SocketProbe {
    /// Probe with a custom per-attempt connection timeout.
    #[must_use]
    pub const fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ReadinessProbe for SocketProbe {
    fn probe(&self, listener: &Listener) -> io::Result<bool> {
        match try_connect(listener, self.timeout) {
            Ok(()) => Ok(true),
            Err(error) if is_not_listening(&error) => Ok(false),
            Err(error) => Err(error),
        }
    }
}

fn try_connect(listener: &Listener, timeout: Duration) -> io::Result<()> {
    match listener {
        Listener::Tcp { host, port } => {
            let address = resolve_tcp(host, *port)?;
            TcpStream::connect_timeout(&address, timeout).map(drop)
        }
        Listener::Unix { .. } => listener
            .socket_path()
            .map_or_else(|| Ok(()), |path| connect_unix(&path, timeout)),
    }
}

fn resolve_tcp(host: &str, port: u16) -> io::Result<SocketAddr> {
    (host, port)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::AddrNotAvailable, "no resolved address"))
}

#[cfg(unix)]
fn connect_unix(path: &std::path::Path, timeout: Duration) -> io::Result<()> {
    use socket2::{Domain, SockAddr, Socket, Type};

    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path)?;
    socket.connect_timeout(&address, timeout)
}

#[cfg(not(unix))]
fn connect_unix(_path: &std::path::Path, _timeout: Duration) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "unix sockets unsupported on this platform",
    ))
}

/// Errors meaning nothing is listening yet rather than a probe failure.
///
/// `ConnectionReset` is deliberately absent: it means something accepted.
fn is_not_listening(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotFound
            | io::ErrorKind::AddrNotAvailable
    )
}
