//! Ephemeral PostgreSQL servers owned by the process that starts them.
//!
//! A server moves through a fixed lifecycle: its data directory is prepared
//! with `initdb` and configuration overrides, the `postgres` executable is
//! spawned as a child of this process, and it is considered ready once it
//! reports itself as accepting connections and its listener answers. Stopping
//! escalates from a fast to an immediate shutdown and finally to killing the
//! child, so a handle never leaks a running server.
//!
//! [`ScopedServer`] and [`with_server`] wrap that lifecycle in a scope: the
//! server is released and any directory created for it is removed on every
//! exit path, including panics.
//!
//! ```rust,no_run
//! use pgembed::{ScopeError, ServerOptions, with_server};
//!
//! # #[derive(Debug, thiserror::Error)]
//! # #[error("query failed")]
//! # struct QueryFailed;
//! # fn main() -> Result<(), ScopeError<QueryFailed>> {
//! let options = ServerOptions::new("/opt/pginstall");
//! let uri = with_server(&options, |server| {
//!     server.default_uri().map_err(|_| QueryFailed)
//! })?;
//! assert!(uri.starts_with("postgresql://"));
//! # Ok(())
//! # }
//! ```
//!
//! Component crates:
//!
//! - [`pgembed_commands`] runs installation tools with captured output.
//! - [`pgembed_config`] loads layered configuration.

pub mod cli;
pub mod datadir;
pub mod endpoint;
pub mod extensions;
pub mod probe;
pub mod scope;
pub mod supervisor;
pub mod telemetry;

pub use cli::run;
pub use datadir::{DataDirectory, InitError, InitOptions};
pub use endpoint::{ConnectionEndpoint, EndpointError, Listener};
pub use extensions::{ExtensionError, ExtensionRegistry, ExtensionSpec};
pub use probe::{ReadinessProbe, SocketProbe};
pub use scope::{ScopeError, ScopedServer, ServerOptions, TeardownError, with_server};
pub use supervisor::{LifecycleState, ServerHandle, SupervisorError, SupervisorSettings};

#[cfg(test)]
mod tests;
