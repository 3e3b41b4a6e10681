//! Process-wide TCP port reservations.
//!
//! The operating system hands out an ephemeral port on `bind(host:0)`, but the
//! port is free again the moment the probe socket closes. Two handles starting
//! at the same time could therefore be given the same port. Every port handed
//! to a server is recorded here until its [`PortReservation`] is dropped.

use std::collections::HashSet;
use std::io;
use std::net::TcpListener;
use std::sync::{Arc, Mutex, PoisonError};

use once_cell::sync::Lazy;
use tracing::debug;

use super::{ENDPOINT_TARGET, EndpointError};

/// Ephemeral port attempts before giving up.
const MAX_ATTEMPTS: u32 = 16;

static RESERVED_PORTS: Lazy<Mutex<HashSet<u16>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// A port held for one server; released on drop.
#[derive(Debug, PartialEq, Eq)]
pub struct PortReservation {
    port: u16,
}

impl PortReservation {
    /// Picks a free ephemeral port on `host` that no live handle holds.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::Bind`] when `host` cannot be bound at all and
    /// [`EndpointError::NoFreePort`] when every attempt collided.
    pub fn ephemeral(host: &str) -> Result<Self, EndpointError> {
        for attempt in 1..=MAX_ATTEMPTS {
            let port = bind_port(host, 0).map_err(|source| bind_error(host, 0, source))?;
            if bind_port(host, port).is_err() {
                debug!(target: ENDPOINT_TARGET, host, port, attempt, "port taken on re-check");
                continue;
            }
            if let Some(reservation) = Self::claim(port) {
                debug!(target: ENDPOINT_TARGET, host, port, attempt, "reserved ephemeral port");
                return Ok(reservation);
            }
        }
        Err(EndpointError::NoFreePort {
            host: host.to_owned(),
            attempts: MAX_ATTEMPTS,
        })
    }

    /// Reserves a caller-chosen port after checking it can be bound.
    ///
    /// # Errors
    ///
    /// Returns [`EndpointError::PortReserved`] when another handle in this
    /// process holds `port` and [`EndpointError::Bind`] when it is in use.
    pub fn fixed(host: &str, port: u16) -> Result<Self, EndpointError> {
        let reservation = Self::claim(port).ok_or(EndpointError::PortReserved { port })?;
        bind_port(host, port).map_err(|source| bind_error(host, port, source))?;
        Ok(reservation)
    }

    /// The reserved port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Returns `true` when `port` is currently reserved in this process.
    #[must_use]
    pub fn is_reserved(port: u16) -> bool {
        reserved().contains(&port)
    }

    fn claim(port: u16) -> Option<Self> {
        // The guard must be gone before a rejected reservation could drop.
        let inserted = reserved().insert(port);
        inserted.then(|| Self { port })
    }
}

impl Drop for PortReservation {
    fn drop(&mut self) {
        reserved().remove(&self.port);
        debug!(target: ENDPOINT_TARGET, port = self.port, "released port reservation");
    }
}

fn reserved() -> std::sync::MutexGuard<'static, HashSet<u16>> {
    RESERVED_PORTS.lock().unwrap_or_else(PoisonError::into_inner)
}

fn bind_port(host: &str, port: u16) -> io::Result<u16> {
    let listener = TcpListener::bind((host, port))?;
    Ok(listener.local_addr()?.port())
}

fn bind_error(host: &str, port: u16, source: io::Error) -> EndpointError {
    EndpointError::Bind {
        host: host.to_owned(),
        port,
        source: Arc::new(source),
    }
}
