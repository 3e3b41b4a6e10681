//! Errors surfaced by scoped server lifecycles.

use std::error::Error as StdError;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::supervisor::SupervisorError;

/// Failures while releasing a scoped server.
#[derive(Debug, Error)]
pub enum TeardownError {
    /// Stopping the server failed.
    #[error("failed to stop server: {0}")]
    Stop(#[source] SupervisorError),
    /// Removing the owned base directory failed.
    #[error("failed to remove base directory {path:?}: {source}")]
    Cleanup {
        /// Directory being removed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: Arc<io::Error>,
    },
}

/// Outcome of [`with_server`](super::with_server) when something failed.
///
/// A failing body always wins over a failing teardown; the teardown error is
/// then only logged.
#[derive(Debug, Error)]
pub enum ScopeError<E>
where
    E: StdError + 'static,
{
    /// The server never became ready.
    #[error("failed to start server: {0}")]
    Startup(#[source] SupervisorError),
    /// The caller's body failed.
    #[error(transparent)]
    Body(E),
    /// The body succeeded but releasing the server failed.
    #[error("failed to release server: {0}")]
    Teardown(#[source] TeardownError),
}
