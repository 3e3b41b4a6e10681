//! Server lifecycle states.

use std::fmt;

/// Lifecycle of a supervised server.
///
/// Transitions only move forward through
/// `Uninitialized -> Initialized -> Starting -> Ready -> Stopping -> Stopped`.
/// `Failed` is reachable from every state except the terminal ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// No data directory prepared yet.
    Uninitialized,
    /// Data directory initialized and configured.
    Initialized,
    /// Server spawned, waiting for readiness.
    Starting,
    /// Server accepts connections.
    Ready,
    /// Shutdown in progress.
    Stopping,
    /// Server stopped.
    Stopped,
    /// Startup failed or the server died.
    Failed,
}

impl LifecycleState {
    /// Returns `true` for states no transition leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Failed)
    }

    /// Returns `true` when moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Uninitialized, Self::Initialized)
            | (Self::Initialized, Self::Starting)
            | (Self::Starting, Self::Ready)
            | (Self::Ready, Self::Stopping)
            | (Self::Stopping, Self::Stopped) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::Starting => "starting",
            Self::Ready => "ready",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
