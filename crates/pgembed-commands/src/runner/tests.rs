//! Unit tests for subprocess execution.

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, Instant};

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;
use crate::tests::support::{install_root, write_tool};

struct Harness {
    root: TempDir,
}

impl Harness {
    fn tool(&self, name: &str, body: &str) -> &Self {
        write_tool(self.root.path(), name, body);
        self
    }

    fn runner(&self) -> CommandRunner {
        CommandRunner::new(CommandRegistry::discover(self.root.path()).expect("discover"))
    }

    fn path(&self) -> &Path {
        self.root.path()
    }
}

#[fixture]
fn harness() -> Harness {
    Harness {
        root: install_root(),
    }
}

#[rstest]
fn run_returns_captured_stdout(harness: Harness) {
    let runner = harness.tool("postgres", "echo 'postgres (PostgreSQL) 17.2'").runner();
    let output = runner
        .run("postgres", ["--version"], None, &CommandOptions::new())
        .expect("run");
    assert!(output.status().success());
    assert_eq!(output.stdout(), "postgres (PostgreSQL) 17.2\n");
    assert!(output.stderr().is_empty());
    assert!(output.command_line().to_string().ends_with("postgres --version"));
}

#[rstest]
fn non_zero_exit_carries_stderr(harness: Harness) {
    let runner = harness
        .tool("pg_ctl", "echo partial; echo 'fatal error' >&2; exit 1")
        .runner();
    let err = runner
        .run("pg_ctl", ["status"], Some(Path::new("/srv/data")), &CommandOptions::new())
        .expect_err("should fail");
    let CommandError::Execution {
        args,
        exit_code,
        stdout,
        stderr,
        ..
    } = &err
    else {
        panic!("expected Execution, got {err:?}");
    };
    assert_eq!(*exit_code, Some(1));
    assert_eq!(args, &["-D", "/srv/data", "status"]);
    assert_eq!(stdout, "partial\n");
    assert!(stderr.contains("fatal error"));
    assert!(err.to_string().contains("fatal error"));
}

#[rstest]
fn unknown_command_is_not_found(harness: Harness) {
    let err = harness
        .runner()
        .run("psql", ["-c", "select 1"], None, &CommandOptions::new())
        .expect_err("psql not installed");
    assert!(matches!(err, CommandError::NotFound { name } if name == "psql"));
}

#[rstest]
fn missing_data_dir_fails_before_spawning(harness: Harness) {
    let marker = harness.path().join("spawned");
    let body = format!("touch '{}'", marker.display());
    let runner = harness.tool("initdb", &body).runner();
    let err = runner
        .run("initdb", ["-U", "postgres"], None, &CommandOptions::new())
        .expect_err("initdb requires -D");
    assert!(matches!(err, CommandError::MissingDataDir { name } if name == "initdb"));
    assert!(!marker.exists(), "initdb must not be spawned");
}

#[rstest]
fn data_dir_flag_precedes_caller_arguments(harness: Harness) {
    let runner = harness.tool("pg_dump", r#"printf '%s\n' "$@""#).runner();
    let stdout = runner
        .run_stdout(
            "pg_dump",
            ["--schema-only", "appdb"],
            Some(Path::new("/srv/data")),
            &CommandOptions::new(),
        )
        .expect("run");
    let args: Vec<&str> = stdout.lines().collect();
    assert_eq!(args, vec!["-D", "/srv/data", "--schema-only", "appdb"]);
}

#[rstest]
fn optional_data_dir_is_forwarded_to_other_tools(harness: Harness) {
    let runner = harness.tool("postgres", r#"printf '%s\n' "$@""#).runner();
    let stdout = runner
        .run_stdout(
            "postgres",
            ["-C", "port"],
            Some(Path::new("/srv/data")),
            &CommandOptions::new(),
        )
        .expect("run");
    assert_eq!(stdout.lines().next(), Some("-D"));
}

#[rstest]
fn large_output_on_both_streams_does_not_stall(harness: Harness) {
    let body = "dd if=/dev/zero bs=1024 count=256 2>/dev/null | tr '\\0' o\n\
                dd if=/dev/zero bs=1024 count=256 2>/dev/null | tr '\\0' e >&2";
    let runner = harness.tool("postgres", body).runner();
    let output = runner
        .run(
            "postgres",
            std::iter::empty::<&str>(),
            None,
            &CommandOptions::new().with_timeout(Duration::from_secs(30)),
        )
        .expect("run");
    assert_eq!(output.stdout().len(), 256 * 1024);
    assert_eq!(output.stderr().len(), 256 * 1024);
    assert!(output.stdout().bytes().all(|byte| byte == b'o'));
}

#[rstest]
fn timeout_kills_long_running_tool(harness: Harness) {
    let runner = harness.tool("pg_isready", "echo waiting; exec sleep 30").runner();
    let started = Instant::now();
    let err = runner
        .run(
            "pg_isready",
            std::iter::empty::<&str>(),
            None,
            &CommandOptions::new().with_timeout(Duration::from_millis(200)),
        )
        .expect_err("should time out");
    assert!(started.elapsed() < Duration::from_secs(10));
    let CommandError::Timeout {
        timeout_ms, stdout, ..
    } = &err
    else {
        panic!("expected Timeout, got {err:?}");
    };
    assert_eq!(*timeout_ms, 200);
    assert_eq!(stdout, "waiting\n");
    assert!(err.is_retryable());
}

#[rstest]
fn options_set_environment_and_working_directory(harness: Harness) {
    let runner = harness
        .tool("postgres", r#"echo "$PGEMBED_PROBE"; pwd"#)
        .runner();
    let workdir = TempDir::new().expect("workdir");
    let stdout = runner
        .run_stdout(
            "postgres",
            std::iter::empty::<&str>(),
            None,
            &CommandOptions::new()
                .with_env("PGEMBED_PROBE", "present")
                .with_current_dir(workdir.path()),
        )
        .expect("run");
    let mut lines = stdout.lines();
    assert_eq!(lines.next(), Some("present"));
    let reported = fs::canonicalize(lines.next().expect("pwd line")).expect("canonical pwd");
    assert_eq!(reported, fs::canonicalize(workdir.path()).expect("canonical workdir"));
}

#[rstest]
fn background_command_writes_to_log(harness: Harness) {
    let runner = harness
        .tool("postgres", "echo 'listening'; echo 'warming up' >&2")
        .runner();
    let log_path = harness.path().join("postgres.log");
    let log = File::create(&log_path).expect("create log");
    let (mut child, command_line) = runner
        .spawn_background(
            "postgres",
            ["-p", "5432"],
            Some(Path::new("/srv/data")),
            log,
            &CommandOptions::new(),
        )
        .expect("spawn");
    let status = child.wait().expect("wait");
    assert!(status.success());
    assert_eq!(command_line.args().len(), 4);

    let contents = fs::read_to_string(&log_path).expect("read log");
    assert!(contents.contains("listening"));
    assert!(contents.contains("warming up"));
}

#[rstest]
fn background_spawn_validates_data_dir(harness: Harness) {
    let runner = harness.tool("pg_ctl", "exit 0").runner();
    let log = File::create(harness.path().join("pg_ctl.log")).expect("create log");
    let err = runner
        .spawn_background("pg_ctl", ["start"], None, log, &CommandOptions::new())
        .expect_err("pg_ctl needs -D");
    assert!(matches!(err, CommandError::MissingDataDir { .. }));
}

#[rstest]
fn kill_and_reap_leaves_no_running_child() {
    let mut child = std::process::Command::new("sleep")
        .arg("30")
        .spawn()
        .expect("spawn sleep");

    super::capture::kill_and_reap(&mut child);

    let status = child.try_wait().expect("poll reaped child");
    assert!(status.is_some_and(|exit| !exit.success()));
}
