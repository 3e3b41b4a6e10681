//! Invocation of the PostgreSQL command-line tools shipped with an
//! installation root.
//!
//! A [`CommandRegistry`] binds logical tool names (`initdb`, `pg_ctl`,
//! `pg_dump`, ...) to executables found under `<install_root>/bin`. It is
//! built once and never mutated afterwards. The [`CommandRunner`] executes a
//! bound tool as a subprocess, captures stdout and stderr on dedicated reader
//! threads so neither pipe can fill and stall the child, enforces an optional
//! timeout, and turns a non-zero exit into [`CommandError::Execution`] with
//! the captured streams attached.
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! use pgembed_commands::{CommandOptions, CommandRegistry, CommandRunner};
//!
//! # fn main() -> Result<(), pgembed_commands::CommandError> {
//! let registry = CommandRegistry::discover(Path::new("/opt/pginstall"))?;
//! let runner = CommandRunner::new(registry);
//! let version = runner.run_stdout("postgres", ["--version"], None, &CommandOptions::default())?;
//! assert!(version.contains("PostgreSQL"));
//! # Ok(()) }
//! ```

mod error;
mod registry;
mod runner;

pub use error::CommandError;
pub use registry::{CommandRegistry, CommandSpec, DATA_DIR_COMMANDS};
pub use runner::{CommandLine, CommandOptions, CommandOutput, CommandRunner};

/// Logical names of the tools the supervisor relies on.
pub mod tools {
    /// Cluster initialisation tool.
    pub const INITDB: &str = "initdb";
    /// Server control tool.
    pub const PG_CTL: &str = "pg_ctl";
    /// Logical backup tool.
    pub const PG_DUMP: &str = "pg_dump";
    /// Connection readiness checker.
    pub const PG_ISREADY: &str = "pg_isready";
    /// The server executable itself.
    pub const POSTGRES: &str = "postgres";
}

#[cfg(test)]
mod tests;
