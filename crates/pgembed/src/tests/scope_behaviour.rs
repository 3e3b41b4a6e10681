//! Behaviour-driven tests for scoped servers.

use std::path::PathBuf;
use std::time::Duration;

use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;
use thiserror::Error;

use crate::{ScopeError, ServerOptions, SupervisorError, SupervisorSettings, with_server};

use super::support::{FakeInstall, POSTGRES_FAILING, always_ready, pid_is_alive};

#[derive(Debug, Error)]
#[error("{0}")]
struct BodyFailed(String);

const BODY_VALUE: u32 = 7;

struct TestWorld {
    install: Option<FakeInstall>,
    parent: TempDir,
    outcome: Option<Result<u32, ScopeError<BodyFailed>>>,
    pid: Option<u32>,
    body_ran: bool,
}

#[fixture]
fn world() -> TestWorld {
    TestWorld {
        install: None,
        parent: TempDir::new().expect("parent dir"),
        outcome: None,
        pid: None,
        body_ran: false,
    }
}

impl TestWorld {
    fn base(&self) -> PathBuf {
        self.parent.path().join("scope")
    }

    fn run_scope(&mut self, failure: Option<String>) {
        let install = self.install.as_ref().expect("installation was not created");
        let options = ServerOptions::new(install.path())
            .with_base_dir(self.base())
            .with_probe(always_ready())
            .with_supervisor(
                SupervisorSettings::default()
                    .with_startup_timeout(Duration::from_secs(5))
                    .with_probe_interval(Duration::from_millis(10))
                    .with_stop_timeout(Duration::from_secs(2)),
            );
        let mut pid = None;
        let mut body_ran = false;
        let outcome = with_server(&options, |server| {
            body_ran = true;
            pid = server.pid();
            failure.map_or(Ok(BODY_VALUE), |message| Err(BodyFailed(message)))
        });
        self.pid = pid;
        self.body_ran = body_ran;
        self.outcome = Some(outcome);
    }

    fn error(&self) -> &ScopeError<BodyFailed> {
        self.outcome
            .as_ref()
            .expect("scope did not run")
            .as_ref()
            .expect_err("expected the scope to fail")
    }
}

#[given("a working installation for a scope")]
fn given_working_installation(world: &mut TestWorld) {
    world.install = Some(FakeInstall::new());
}

#[given("an installation whose server exits on startup")]
fn given_failing_server(world: &mut TestWorld) {
    world.install = Some(FakeInstall::new().with_tool("postgres", POSTGRES_FAILING));
}

#[when("a scope runs a body that succeeds")]
fn when_body_succeeds(world: &mut TestWorld) {
    world.run_scope(None);
}

#[when("a scope runs a body that fails with {text}")]
fn when_body_fails(world: &mut TestWorld, text: String) {
    world.run_scope(Some(text.trim_matches('"').to_owned()));
}

#[then("the scope returns the body's value")]
fn then_value_returned(world: &mut TestWorld) {
    let value = world
        .outcome
        .as_ref()
        .expect("scope did not run")
        .as_ref()
        .expect("expected the scope to succeed");
    assert_eq!(*value, BODY_VALUE);
}

#[then("the scope reports the body error {text}")]
fn then_body_error(world: &mut TestWorld, text: String) {
    let err = world.error();
    assert!(matches!(err, ScopeError::Body(_)), "expected Body, got: {err}");
    assert_eq!(err.to_string(), text.trim_matches('"'));
}

#[then("the scope reports a startup failure")]
fn then_startup_failure(world: &mut TestWorld) {
    let err = world.error();
    assert!(
        matches!(err, ScopeError::Startup(SupervisorError::StartupFailed { .. })),
        "expected a startup failure, got: {err}"
    );
    assert!(!world.body_ran);
}

#[then("the scoped server process has exited")]
fn then_process_exited(world: &mut TestWorld) {
    assert!(!pid_is_alive(world.pid.expect("no pid recorded")));
}

#[then("the scope's base directory is gone")]
fn then_base_removed(world: &mut TestWorld) {
    assert!(!world.base().exists());
}

#[scenario(
    path = "tests/features/scoped_server.feature",
    name = "A successful scope releases everything it created"
)]
fn successful_scope(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/scoped_server.feature",
    name = "A failing scope body still releases the server"
)]
fn failing_scope_body(world: TestWorld) {
    let _ = world;
}

#[scenario(
    path = "tests/features/scoped_server.feature",
    name = "A scope whose server cannot start never runs its body"
)]
fn unstartable_scope(world: TestWorld) {
    let _ = world;
}
