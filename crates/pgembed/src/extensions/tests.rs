//! Unit tests for extension detection and preload settings.

use std::fs;

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

#[fixture]
fn install_root() -> TempDir {
    let root = TempDir::new().expect("install root");
    let lib = root.path().join(LIBRARY_SUBDIR);
    fs::create_dir_all(&lib).expect("library dir");
    fs::write(lib.join("vector.so"), b"").expect("vector library");
    fs::write(lib.join("pg_duckdb.so"), b"").expect("duckdb library");
    root
}

#[rstest]
fn detect_reports_installed_libraries(install_root: TempDir) {
    let registry = ExtensionRegistry::detect(install_root.path());
    let listing = registry.list();
    assert_eq!(listing.len(), KNOWN_EXTENSIONS.len());
    assert_eq!(listing.get("pgvector"), Some(&true));
    assert_eq!(listing.get("pg_duckdb"), Some(&true));
    assert_eq!(listing.get("pgvectorscale"), Some(&false));
    assert!(!registry.has_extension("pgtextsearch"));
    assert!(!registry.has_extension("postgis"));
}

#[rstest]
#[case::known("pgvector", "vector")]
#[case::scale("pgvectorscale", "vectorscale")]
#[case::unknown("postgis", "postgis")]
fn create_name_maps_logical_names(install_root: TempDir, #[case] name: &str, #[case] expected: &str) {
    let registry = ExtensionRegistry::detect(install_root.path());
    assert_eq!(registry.create_name(name), expected);
}

#[rstest]
fn library_path_requires_installation(install_root: TempDir) {
    let registry = ExtensionRegistry::detect(install_root.path());
    let path = registry.library_path("pgvector").expect("installed");
    assert!(path.ends_with("lib/postgresql/vector.so"));
    assert!(registry.library_path("pgvectorscale").is_none());
}

#[rstest]
fn preload_settings_cover_preloaded_extensions(install_root: TempDir) {
    let registry = ExtensionRegistry::detect(install_root.path());
    let settings = registry
        .preload_settings(&["pgvector", "pg_duckdb"])
        .expect("settings");
    assert_eq!(settings.len(), 2);
    assert_eq!(
        settings.first().map(Setting::to_conf_line),
        Some(String::from("shared_preload_libraries = 'pg_duckdb'"))
    );
    let library_path = settings.get(1).expect("dynamic_library_path");
    assert_eq!(library_path.key(), "dynamic_library_path");
    assert_eq!(
        library_path.value(),
        registry.library_dir().display().to_string()
    );
}

#[rstest]
fn extensions_without_preload_need_no_settings(install_root: TempDir) {
    let registry = ExtensionRegistry::detect(install_root.path());
    let settings = registry.preload_settings(&["pgvector"]).expect("settings");
    assert!(settings.is_empty());
}

#[rstest]
fn unavailable_extension_is_rejected(install_root: TempDir) {
    let registry = ExtensionRegistry::detect(install_root.path());
    let err = registry
        .preload_settings(&["pgvectorscale"])
        .expect_err("not installed");
    assert!(matches!(err, ExtensionError::Unavailable { name, .. } if name == "pgvectorscale"));
}

#[rstest]
fn unknown_extension_is_rejected(install_root: TempDir) {
    let registry = ExtensionRegistry::detect(install_root.path());
    let err = registry
        .preload_settings(&["postgis"])
        .expect_err("unknown");
    assert_eq!(
        err,
        ExtensionError::Unknown {
            name: String::from("postgis")
        }
    );
}
