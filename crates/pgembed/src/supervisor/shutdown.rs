//! Graceful-then-forceful server shutdown.
//!
//! `pg_ctl stop -m fast` is tried first, then `-m immediate`, each followed
//! by a bounded wait for the supervised child to exit. A child that survives
//! both is killed.

use std::path::Path;
use std::process::Child;
use std::thread;
use std::time::{Duration, Instant};

use pgembed_commands::{CommandOptions, CommandRunner, tools};
use tracing::{info, warn};

use super::SUPERVISOR_TARGET;
use super::error::SupervisorError;
use super::startup::{millis, process_error};

/// Extra time granted to `pg_ctl` beyond its own `-t` budget.
const CONTROL_TOOL_GRACE: Duration = Duration::from_secs(5);

/// Shutdown modes in escalation order.
const STOP_MODES: [&str; 2] = ["fast", "immediate"];

/// Budgets for one shutdown.
pub(super) struct StopBudget {
    pub(super) timeout: Duration,
    pub(super) interval: Duration,
}

/// Stops the server owned by `child` and reaps it.
pub(super) fn stop_server(
    child: &mut Child,
    runner: &CommandRunner,
    data_dir: &Path,
    budget: &StopBudget,
) -> Result<(), SupervisorError> {
    let pid = child.id();
    for mode in STOP_MODES {
        request_stop(runner, data_dir, mode, budget.timeout);
        if wait_for_exit(child, budget)? {
            info!(target: SUPERVISOR_TARGET, pid, mode, "server stopped");
            return Ok(());
        }
        warn!(
            target: SUPERVISOR_TARGET,
            pid,
            mode,
            timeout_ms = millis(budget.timeout),
            "server still running after shutdown request"
        );
    }
    warn!(target: SUPERVISOR_TARGET, pid, "killing server");
    kill_and_reap(child)
}

/// Kills the child unless it has already exited, then reaps it.
pub(super) fn kill_and_reap(child: &mut Child) -> Result<(), SupervisorError> {
    let pid = child.id();
    if child
        .try_wait()
        .map_err(|source| process_error("wait for", pid, source))?
        .is_some()
    {
        return Ok(());
    }
    child
        .kill()
        .map_err(|source| process_error("kill", pid, source))?;
    child
        .wait()
        .map(drop)
        .map_err(|source| process_error("reap", pid, source))
}

fn request_stop(runner: &CommandRunner, data_dir: &Path, mode: &str, timeout: Duration) {
    let seconds = control_tool_seconds(timeout).to_string();
    let options = CommandOptions::new().with_timeout(timeout.saturating_add(CONTROL_TOOL_GRACE));
    if let Err(error) = runner.run(
        tools::PG_CTL,
        ["stop", "-m", mode, "-w", "-t", seconds.as_str()],
        Some(data_dir),
        &options,
    ) {
        warn!(
            target: SUPERVISOR_TARGET,
            mode,
            %error,
            "pg_ctl stop failed"
        );
    }
}

fn wait_for_exit(child: &mut Child, budget: &StopBudget) -> Result<bool, SupervisorError> {
    let pid = child.id();
    let started = Instant::now();
    loop {
        if child
            .try_wait()
            .map_err(|source| process_error("wait for", pid, source))?
            .is_some()
        {
            return Ok(true);
        }
        if started.elapsed() >= budget.timeout {
            return Ok(false);
        }
        thread::sleep(budget.interval);
    }
}

/// Whole seconds for `pg_ctl -t`, rounded up and at least one.
pub(super) fn control_tool_seconds(timeout: Duration) -> u64 {
    let rounded = timeout
        .as_secs()
        .saturating_add(u64::from(timeout.subsec_nanos() > 0));
    rounded.max(1)
}
