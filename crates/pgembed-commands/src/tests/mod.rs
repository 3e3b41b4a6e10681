//! Crate-level integration and BDD tests.

pub(crate) mod support;


use std::path::Path;

use crate::{CommandError, CommandOptions, CommandRegistry, CommandRunner, tools};

use self::support::{install_root, write_tool};

#[test]
fn discovered_tools_run_end_to_end() {
    let root = install_root();
    write_tool(root.path(), "initdb", r#"echo "initdb $*""#);
    write_tool(root.path(), "postgres", "echo 'postgres (PostgreSQL) 17.2'");

    let registry = CommandRegistry::discover(root.path()).expect("discover");
    let runner = CommandRunner::new(registry);

    let version = runner
        .run_stdout(tools::POSTGRES, ["--version"], None, &CommandOptions::new())
        .expect("postgres --version");
    assert_eq!(version.trim(), "postgres (PostgreSQL) 17.2");

    let init = runner
        .run_stdout(
            tools::INITDB,
            ["-U", "postgres"],
            Some(Path::new("/srv/data")),
            &CommandOptions::new(),
        )
        .expect("initdb");
    assert_eq!(init.trim(), "initdb -D /srv/data -U postgres");
}

#[test]
fn tools_absent_from_root_are_not_found() {
    let root = install_root();
    let runner = CommandRunner::new(CommandRegistry::discover(root.path()).expect("discover"));
    let err = runner
        .run(tools::PG_DUMP, ["--schema-only"], Some(Path::new("/srv/data")), &CommandOptions::new())
        .expect_err("pg_dump is not installed");
    assert!(matches!(err, CommandError::NotFound { name } if name == "pg_dump"));
}
