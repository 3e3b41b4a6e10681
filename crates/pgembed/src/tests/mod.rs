//! Crate-level integration and BDD tests.

pub(crate) mod support;

mod scope_behaviour;

use std::time::Duration;

use pgembed_config::ListenMode;

use crate::{InitOptions, LifecycleState, ServerHandle, ServerOptions, SupervisorSettings, with_server};

use self::support::{FakeInstall, always_ready, pid_is_alive};

#[derive(Debug, thiserror::Error)]
#[error("unreachable")]
struct Unreachable;

#[test]
fn handle_and_scope_agree_on_the_connection_uri() {
    let install = FakeInstall::new();
    let base = tempfile::TempDir::new().expect("base dir");
    let settings = SupervisorSettings::default().with_probe_interval(Duration::from_millis(10));

    let mut handle = ServerHandle::new(
        base.path().join("direct"),
        install.runner(),
        ListenMode::unix(),
        settings.clone(),
    )
    .with_probe(always_ready());
    handle.initialize(&InitOptions::new()).expect("initialize");
    handle.start().expect("start");
    let direct = handle.uri("postgres").expect("uri");
    handle.stop().expect("stop");
    assert_eq!(handle.state(), LifecycleState::Stopped);

    let options = ServerOptions::new(install.path())
        .with_base_dir(base.path().join("direct"))
        .with_supervisor(settings)
        .with_probe(always_ready());
    let (scoped, pid) = with_server(&options, |server| {
        Ok::<_, Unreachable>((server.default_uri().expect("uri"), server.pid()))
    })
    .expect("scope");

    assert_eq!(direct, scoped);
    assert!(!pid_is_alive(pid.expect("pid")));
}
