//! Starts an ephemeral PostgreSQL server and keeps it running until a
//! termination signal arrives.

use std::io::{self, StderrLock, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    pgembed::run(std::env::args_os(), &mut stdout, &mut stderr)
}
