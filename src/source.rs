//! Connection-source handles.
//!
//! A [`SourceHandle`] is the opaque result of adapter construction: a set of
//! fully assembled driver connect options that has performed no I/O yet.
//! Structural fields (driver, variant, database name) are immutable once
//! built; only tuning properties may be mutated afterwards, through the
//! owning adapter's setter table.
//!
//! The [`ConnectionSource`] trait is the minimal capability contract every
//! published source satisfies: it can produce live connections on demand,
//! failing with a connectivity error. Connection establishment is deferred
//! entirely to [`ConnectionSource::get_connection`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, MySql, Postgres, Sqlite};

use crate::error::SourceResult;

/// Closed set of driver adapter variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverVariant {
    /// Database name is a filesystem path; supports create-if-missing.
    EmbeddedFile,
    /// Logical database on a remote server; authentication deferred to
    /// first connection attempt.
    ClientServer,
    /// Database name is a session-scoped identifier; lifetime bound to the
    /// owning handle.
    InMemory,
}

impl std::fmt::Display for DriverVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmbeddedFile => write!(f, "embedded-file"),
            Self::ClientServer => write!(f, "client-server"),
            Self::InMemory => write!(f, "in-memory"),
        }
    }
}

/// Backend-specific connect options (database-specific types avoid the
/// limitations of sqlx's `Any` driver).
#[derive(Debug, Clone)]
pub enum Backend {
    Sqlite(SqliteConnectOptions),
    Postgres(PgConnectOptions),
    MySql(MySqlConnectOptions),
}

impl Backend {
    /// Short name of the underlying sqlx driver.
    pub fn driver_name(&self) -> &'static str {
        match self {
            Backend::Sqlite(_) => "sqlite",
            Backend::Postgres(_) => "postgres",
            Backend::MySql(_) => "mysql",
        }
    }
}

/// An unpooled connection source: assembled connect options plus the
/// structural identity they were built from.
#[derive(Debug, Clone)]
pub struct SourceHandle {
    pub(crate) driver: &'static str,
    pub(crate) variant: DriverVariant,
    pub(crate) database_name: Option<String>,
    pub(crate) backend: Backend,
}

impl SourceHandle {
    pub(crate) fn new(
        driver: &'static str,
        variant: DriverVariant,
        database_name: Option<String>,
        backend: Backend,
    ) -> Self {
        Self {
            driver,
            variant,
            database_name,
            backend,
        }
    }

    /// Registered name of the adapter that built this handle.
    pub fn driver(&self) -> &str {
        self.driver
    }

    pub fn variant(&self) -> DriverVariant {
        self.variant
    }

    pub fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    // Tuning hooks used by adapter setter tables. Each rebuilds the
    // builder-style options value in place; a mismatched backend is a no-op
    // since every adapter only registers setters for its own backend.

    pub(crate) fn map_sqlite(
        &mut self,
        f: impl FnOnce(SqliteConnectOptions) -> SqliteConnectOptions,
    ) {
        if let Backend::Sqlite(opts) = &mut self.backend {
            *opts = f(std::mem::take(opts));
        }
    }

    pub(crate) fn map_postgres(&mut self, f: impl FnOnce(PgConnectOptions) -> PgConnectOptions) {
        if let Backend::Postgres(opts) = &mut self.backend {
            *opts = f(std::mem::take(opts));
        }
    }

    pub(crate) fn map_mysql(&mut self, f: impl FnOnce(MySqlConnectOptions) -> MySqlConnectOptions) {
        if let Backend::MySql(opts) = &mut self.backend {
            *opts = f(std::mem::take(opts));
        }
    }
}

/// Minimal capability contract for a published connection source.
#[async_trait]
pub trait ConnectionSource: Send + Sync {
    /// Registered name of the adapter that built this source.
    fn driver(&self) -> &str;

    fn variant(&self) -> DriverVariant;

    fn database_name(&self) -> Option<&str>;

    /// Whether acquisitions go through a connection pool.
    fn pooled(&self) -> bool {
        false
    }

    /// Produce a live connection.
    ///
    /// This is the only operation in the crate that performs I/O; all
    /// connectivity failures (unreachable host, bad credentials, missing
    /// file) surface here as `SourceError::Connectivity`.
    async fn get_connection(&self) -> SourceResult<LiveConnection>;

    /// Release resources held by the source. Unpooled sources hold none;
    /// pooled sources close their pool.
    async fn shutdown(&self) {}
}

impl std::fmt::Debug for dyn ConnectionSource + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSource")
            .field("driver", &self.driver())
            .field("variant", &self.variant())
            .field("database_name", &self.database_name())
            .field("pooled", &self.pooled())
            .finish()
    }
}

#[async_trait]
impl ConnectionSource for SourceHandle {
    fn driver(&self) -> &str {
        self.driver
    }

    fn variant(&self) -> DriverVariant {
        self.variant
    }

    fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    async fn get_connection(&self) -> SourceResult<LiveConnection> {
        use sqlx::ConnectOptions;

        let conn = match &self.backend {
            Backend::Sqlite(opts) => LiveConnection::Sqlite(opts.connect().await?),
            Backend::Postgres(opts) => LiveConnection::Postgres(opts.connect().await?),
            Backend::MySql(opts) => LiveConnection::MySql(opts.connect().await?),
        };
        Ok(conn)
    }
}

/// A live database connection, direct or checked out of a pool.
#[derive(Debug)]
pub enum LiveConnection {
    Sqlite(SqliteConnection),
    Postgres(PgConnection),
    MySql(MySqlConnection),
    PooledSqlite(PoolConnection<Sqlite>),
    PooledPostgres(PoolConnection<Postgres>),
    PooledMySql(PoolConnection<MySql>),
}

impl LiveConnection {
    /// Whether this connection came out of a pool.
    pub fn is_pooled(&self) -> bool {
        matches!(
            self,
            Self::PooledSqlite(_) | Self::PooledPostgres(_) | Self::PooledMySql(_)
        )
    }

    /// Round-trip liveness check.
    pub async fn ping(&mut self) -> SourceResult<()> {
        match self {
            Self::Sqlite(c) => c.ping().await?,
            Self::Postgres(c) => c.ping().await?,
            Self::MySql(c) => c.ping().await?,
            Self::PooledSqlite(c) => c.ping().await?,
            Self::PooledPostgres(c) => c.ping().await?,
            Self::PooledMySql(c) => c.ping().await?,
        }
        Ok(())
    }

    /// Release the connection. Direct connections are closed gracefully;
    /// pooled connections return to their pool on drop.
    pub async fn close(self) -> SourceResult<()> {
        match self {
            Self::Sqlite(c) => c.close().await?,
            Self::Postgres(c) => c.close().await?,
            Self::MySql(c) => c.close().await?,
            Self::PooledSqlite(_) | Self::PooledPostgres(_) | Self::PooledMySql(_) => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variant_display() {
        assert_eq!(DriverVariant::EmbeddedFile.to_string(), "embedded-file");
        assert_eq!(DriverVariant::ClientServer.to_string(), "client-server");
        assert_eq!(DriverVariant::InMemory.to_string(), "in-memory");
    }

    #[test]
    fn test_handle_structural_accessors() {
        let handle = SourceHandle::new(
            "sqlite",
            DriverVariant::EmbeddedFile,
            Some("target/test1".to_string()),
            Backend::Sqlite(SqliteConnectOptions::new()),
        );
        assert_eq!(handle.driver(), "sqlite");
        assert_eq!(handle.variant(), DriverVariant::EmbeddedFile);
        assert_eq!(handle.database_name(), Some("target/test1"));
        assert_eq!(handle.backend().driver_name(), "sqlite");
        assert!(!handle.pooled());
    }

    #[test]
    fn test_map_backend_mismatch_is_noop() {
        let mut handle = SourceHandle::new(
            "sqlite",
            DriverVariant::EmbeddedFile,
            None,
            Backend::Sqlite(SqliteConnectOptions::new()),
        );
        // Postgres tuning on a sqlite handle changes nothing
        handle.map_postgres(|o| o.application_name("ignored"));
        assert!(matches!(handle.backend(), Backend::Sqlite(_)));
    }

    #[test]
    fn test_variant_serde_round_trip() {
        let json = serde_json::to_string(&DriverVariant::ClientServer).unwrap();
        assert_eq!(json, "\"client-server\"");
        let back: DriverVariant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DriverVariant::ClientServer);
    }
}
