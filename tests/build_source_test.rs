//! End-to-end construction tests against real sqlite databases.
//!
//! These walk the whole pipeline - property bag, translation, adapter
//! construction, driver tuning - and then actually acquire connections to
//! verify that construction itself performed no I/O and that acquisition
//! works (or fails with a connectivity error) exactly where expected.

use dbbridge::{
    AdapterRegistry, ConfigMap, ConnectionSource, LiveConnection, SourceError, SourceRequest,
    build_source,
};
use tempfile::tempdir;

mod common;

fn cfg(pairs: &[(&str, &str)]) -> ConfigMap {
    common::init_tracing();
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[tokio::test]
async fn test_embedded_file_create_and_connect() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("app.db");
    let db_path = db_path.to_str().unwrap();

    let source = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new(
            "sqlite",
            cfg(&[("databaseName", db_path), ("createDatabase", "create")]),
        ),
    )
    .unwrap();

    assert_eq!(source.database_name(), Some(db_path));

    // File is created on first acquisition, not during build
    assert!(!std::path::Path::new(db_path).exists());
    let mut conn = source.get_connection().await.unwrap();
    conn.ping().await.unwrap();
    conn.close().await.unwrap();
    assert!(std::path::Path::new(db_path).exists());
}

#[tokio::test]
async fn test_embedded_file_missing_without_create_flag() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("absent.db");

    let source = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new(
            "sqlite",
            cfg(&[("databaseName", db_path.to_str().unwrap())]),
        ),
    )
    .unwrap();

    // Build succeeded without touching the filesystem; the failure is a
    // connectivity error at acquisition time.
    let err = source.get_connection().await.unwrap_err();
    assert!(matches!(err, SourceError::Connectivity { .. }));
    assert!(!db_path.exists());
}

#[tokio::test]
async fn test_in_memory_connect_and_ping() {
    let source = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new("sqlite-memory", cfg(&[("databaseName", "scratch")])),
    )
    .unwrap();

    let mut conn = source.get_connection().await.unwrap();
    assert!(!conn.is_pooled());
    conn.ping().await.unwrap();
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_in_memory_store_shared_within_source() {
    let source = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new("sqlite-memory", cfg(&[("databaseName", "shared-scratch")])),
    )
    .unwrap();

    let mut first = source.get_connection().await.unwrap();
    let mut second = source.get_connection().await.unwrap();

    let LiveConnection::Sqlite(writer) = &mut first else {
        panic!("expected a direct sqlite connection");
    };
    sqlx::query("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")
        .execute(&mut *writer)
        .await
        .unwrap();
    sqlx::query("INSERT INTO notes (body) VALUES ('hello')")
        .execute(&mut *writer)
        .await
        .unwrap();

    // A second connection from the same source sees the same store
    let LiveConnection::Sqlite(reader) = &mut second else {
        panic!("expected a direct sqlite connection");
    };
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes")
        .fetch_one(&mut *reader)
        .await
        .unwrap();
    assert_eq!(count, 1);

    second.close().await.unwrap();
    first.close().await.unwrap();
}

#[tokio::test]
async fn test_in_memory_stores_isolated_per_label() {
    let registry = AdapterRegistry::builtin();
    let first = build_source(
        &registry,
        SourceRequest::new("sqlite-memory", cfg(&[("databaseName", "island-a")])),
    )
    .unwrap();
    let second = build_source(
        &registry,
        SourceRequest::new("sqlite-memory", cfg(&[("databaseName", "island-b")])),
    )
    .unwrap();

    let mut a = first.get_connection().await.unwrap();
    let LiveConnection::Sqlite(writer) = &mut a else {
        panic!("expected a direct sqlite connection");
    };
    sqlx::query("CREATE TABLE island (id INTEGER)")
        .execute(&mut *writer)
        .await
        .unwrap();

    // A differently labelled source must not see the table
    let mut b = second.get_connection().await.unwrap();
    let LiveConnection::Sqlite(reader) = &mut b else {
        panic!("expected a direct sqlite connection");
    };
    let err = sqlx::query("SELECT COUNT(*) FROM island")
        .fetch_one(&mut *reader)
        .await;
    assert!(err.is_err());

    b.close().await.unwrap();
    a.close().await.unwrap();
}

#[tokio::test]
async fn test_driver_tuning_skips_vendor_keys() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("tuned.db");

    // foreignKeys is a known sqlite tuning key; the vendor key is unknown
    // and must be skipped in the non-strict driver namespace.
    let source = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new(
            "sqlite",
            cfg(&[
                ("databaseName", db_path.to_str().unwrap()),
                ("createDatabase", "create"),
                ("foreignKeys", "true"),
                ("someVendorKnob", "whatever"),
            ]),
        ),
    )
    .unwrap();

    let mut conn = source.get_connection().await.unwrap();
    conn.ping().await.unwrap();
    conn.close().await.unwrap();
}

#[tokio::test]
async fn test_client_server_build_is_lazy() {
    // An unreachable server must not fail construction; no I/O happens
    // before the first acquisition.
    let source = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new(
            "postgres",
            cfg(&[
                ("url", "postgres://db.invalid:5432/app"),
                ("user", "app"),
                ("password", "secret"),
            ]),
        ),
    )
    .unwrap();

    assert_eq!(source.database_name(), Some("app"));
    assert_eq!(source.driver(), "postgres");
}

#[tokio::test]
async fn test_translation_error_propagates() {
    let err = build_source(
        &AdapterRegistry::builtin(),
        SourceRequest::new("sqlite", cfg(&[("serverName", "nowhere")])),
    )
    .unwrap_err();
    assert!(matches!(err, SourceError::Configuration { .. }));
}
