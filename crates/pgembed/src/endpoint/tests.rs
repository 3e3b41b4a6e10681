//! Unit tests for listener resolution and URI formatting.

use std::net::TcpListener;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use rstest::rstest;
use tempfile::TempDir;

use super::*;

fn tcp(host: &str, port: u16) -> ConnectionEndpoint {
    ConnectionEndpoint::new(
        Listener::Tcp {
            host: host.to_owned(),
            port,
        },
        "postgres",
    )
}

#[rstest]
#[case::plain("appdb", "postgresql://postgres@127.0.0.1:6543/appdb")]
#[case::space("my db", "postgresql://postgres@127.0.0.1:6543/my%20db")]
#[case::reserved("a/b?c#d", "postgresql://postgres@127.0.0.1:6543/a%2Fb%3Fc%23d")]
#[case::unicode("données", "postgresql://postgres@127.0.0.1:6543/donn%C3%A9es")]
fn tcp_uri_encodes_database(#[case] database: &str, #[case] expected: &str) {
    assert_eq!(tcp("127.0.0.1", 6543).uri(database), expected);
}

#[test]
fn tcp_uri_brackets_ipv6_hosts() {
    assert_eq!(
        tcp("::1", 6543).uri("postgres"),
        "postgresql://postgres@[::1]:6543/postgres"
    );
}

#[test]
fn unix_uri_carries_socket_directory_and_port() {
    let endpoint = ConnectionEndpoint::new(
        Listener::Unix {
            dir: PathBuf::from("/tmp/pg base/data"),
            port: DEFAULT_UNIX_PORT,
        },
        "app user",
    );
    assert_eq!(
        endpoint.uri("appdb"),
        "postgresql://app%20user@/appdb?host=%2Ftmp%2Fpg%20base%2Fdata&port=5432"
    );
}

#[test]
fn uri_is_deterministic() {
    let endpoint = tcp("127.0.0.1", 6543);
    assert_eq!(endpoint.uri("appdb"), endpoint.uri("appdb"));
}

#[test]
fn ephemeral_tcp_reserves_distinct_ports() {
    let data_dir = Path::new("/unused");
    let mode = ListenMode::ephemeral_tcp();
    let (first, first_reservation) = Listener::resolve(&mode, data_dir).expect("first port");
    let (second, second_reservation) = Listener::resolve(&mode, data_dir).expect("second port");
    assert_ne!(first.port(), second.port());
    assert!(PortReservation::is_reserved(first.port()));

    let released = first.port();
    drop(first_reservation);
    assert!(!PortReservation::is_reserved(released));
    drop(second_reservation);
}

#[test]
fn fixed_port_rejects_double_reservation() {
    let probe = TcpListener::bind(("127.0.0.1", 0)).expect("bind probe");
    let port = probe.local_addr().expect("local addr").port();
    drop(probe);

    let held = PortReservation::fixed("127.0.0.1", port).expect("first reservation");
    let err = PortReservation::fixed("127.0.0.1", port).expect_err("already reserved");
    assert!(matches!(err, EndpointError::PortReserved { port: reserved } if reserved == port));
    assert!(PortReservation::is_reserved(port));
    drop(held);
    assert!(!PortReservation::is_reserved(port));
}

#[test]
fn rejected_reservation_leaves_other_threads_unblocked() {
    let held = PortReservation::ephemeral("127.0.0.1").expect("first reservation");
    let port = held.port();
    let (tx, rx) = mpsc::channel();

    thread::spawn(move || {
        let rejected = PortReservation::fixed("127.0.0.1", port).is_err();
        let next = PortReservation::ephemeral("127.0.0.1").map(|other| other.port());
        let _ = tx.send((rejected, next));
    });

    let (rejected, next) = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("reservations completed without blocking");
    assert!(rejected);
    assert_ne!(next.expect("second ephemeral port"), port);
    assert!(PortReservation::is_reserved(port));
}

#[test]
fn fixed_port_in_use_fails_to_bind() {
    let occupied = TcpListener::bind(("127.0.0.1", 0)).expect("bind occupant");
    let port = occupied.local_addr().expect("local addr").port();
    let err = PortReservation::fixed("127.0.0.1", port).expect_err("port in use");
    assert!(matches!(err, EndpointError::Bind { .. }));
    assert!(!PortReservation::is_reserved(port));
}

#[test]
fn unix_listener_defaults_to_data_directory() {
    let base = TempDir::new().expect("base dir");
    let data_dir = base.path().join("data");
    let (listener, reservation) =
        Listener::resolve(&ListenMode::unix(), &data_dir).expect("resolve unix");
    assert!(reservation.is_none());
    assert_eq!(
        listener,
        Listener::Unix {
            dir: data_dir.clone(),
            port: DEFAULT_UNIX_PORT,
        }
    );
    assert!(data_dir.is_dir());
    assert_eq!(
        listener.socket_path(),
        Some(data_dir.join(".s.PGSQL.5432"))
    );
}

#[test]
fn distinct_data_directories_give_distinct_sockets() {
    let base = TempDir::new().expect("base dir");
    let (first, _) =
        Listener::resolve(&ListenMode::unix(), &base.path().join("one")).expect("first");
    let (second, _) =
        Listener::resolve(&ListenMode::unix(), &base.path().join("two")).expect("second");
    assert_ne!(first.socket_path(), second.socket_path());
}

#[rstest]
#[case::tcp(
    Listener::Tcp { host: String::from("127.0.0.1"), port: 6543 },
    vec!["-p", "6543", "-c", "listen_addresses=127.0.0.1", "-c", "unix_socket_directories="]
)]
#[case::unix(
    Listener::Unix { dir: PathBuf::from("/srv/sock"), port: 5432 },
    vec!["-p", "5432", "-c", "listen_addresses=", "-c", "unix_socket_directories=/srv/sock"]
)]
fn server_args_select_one_transport(#[case] listener: Listener, #[case] expected: Vec<&str>) {
    assert_eq!(listener.server_args(), expected);
}
