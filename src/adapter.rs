//! Driver adapters.
//!
//! Each adapter maps a [`ConnectionDescriptor`] onto one backend's native
//! connect-options surface and owns the setter table for that backend's
//! tuning keys. The variant set is closed: embedded-file, client-server and
//! in-memory, with sqlite covering the embedded variants and postgres/mysql
//! the client-server one.
//!
//! `build` never performs network or disk I/O; it only assembles options.
//! The options are plain values, so a failed build leaves no live native
//! resource behind.

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use sqlx::mysql::MySqlConnectOptions;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::sqlite::SqliteConnectOptions;
use tracing::debug;

use crate::config::ConnectionDescriptor;
use crate::error::{SourceError, SourceResult};
use crate::setters::SetterTable;
use crate::source::{Backend, DriverVariant, SourceHandle};

/// Default ports for the client-server backends.
pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_MYSQL_PORT: u16 = 3306;

/// One backend's translation from descriptor to connection source.
pub trait DriverAdapter: Send + Sync {
    /// Registry name this adapter is published under.
    fn name(&self) -> &'static str;

    fn variant(&self) -> DriverVariant;

    /// Build a connection-source handle from a descriptor.
    ///
    /// # Errors
    ///
    /// `SourceError::DriverConstruction` when the descriptor is missing a
    /// field this backend requires or the native options reject a value.
    fn build(&self, descriptor: &ConnectionDescriptor) -> SourceResult<SourceHandle>;

    /// Setter table for this backend's tuning keys, applied non-strictly to
    /// driver-level residual properties.
    fn tuning(&self) -> &'static SetterTable<SourceHandle>;
}

impl std::fmt::Debug for dyn DriverAdapter + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverAdapter")
            .field("name", &self.name())
            .field("variant", &self.variant())
            .finish()
    }
}

fn require_database(
    descriptor: &ConnectionDescriptor,
    driver: &'static str,
) -> SourceResult<String> {
    descriptor
        .database_name
        .clone()
        .ok_or_else(|| SourceError::driver_construction(driver, "database name required"))
}

// ---------------------------------------------------------------------------
// sqlite (embedded-file)
// ---------------------------------------------------------------------------

/// Embedded file-backed sqlite. The database name is a filesystem path.
pub struct SqliteFileAdapter;

static SQLITE_TUNING: LazyLock<SetterTable<SourceHandle>> = LazyLock::new(|| {
    SetterTable::<SourceHandle>::new()
        .bool("readOnly", |h, v| h.map_sqlite(|o| o.read_only(v)))
        .bool("foreignKeys", |h, v| h.map_sqlite(|o| o.foreign_keys(v)))
        .string("journalMode", |h, v| {
            h.map_sqlite(|o| o.pragma("journal_mode", v));
        })
        .int("busyTimeout", |h, v| {
            h.map_sqlite(|o| o.busy_timeout(Duration::from_millis(v.max(0) as u64)));
        })
});

impl DriverAdapter for SqliteFileAdapter {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn variant(&self) -> DriverVariant {
        DriverVariant::EmbeddedFile
    }

    fn build(&self, descriptor: &ConnectionDescriptor) -> SourceResult<SourceHandle> {
        let database = require_database(descriptor, self.name())?;
        // create-if-missing comes from the discrete flag or the URL attribute
        let create = descriptor.create_on_missing
            || descriptor
                .attribute("create")
                .is_some_and(|v| v.eq_ignore_ascii_case("true"));

        let options = SqliteConnectOptions::new()
            .filename(&database)
            .create_if_missing(create);

        Ok(SourceHandle::new(
            self.name(),
            self.variant(),
            Some(database),
            Backend::Sqlite(options),
        ))
    }

    fn tuning(&self) -> &'static SetterTable<SourceHandle> {
        &SQLITE_TUNING
    }
}

// ---------------------------------------------------------------------------
// sqlite-memory (in-memory)
// ---------------------------------------------------------------------------

/// In-memory sqlite. The database name is a session-scoped label; the store
/// lives exactly as long as the owning handle's connections.
pub struct SqliteMemoryAdapter;

impl DriverAdapter for SqliteMemoryAdapter {
    fn name(&self) -> &'static str {
        "sqlite-memory"
    }

    fn variant(&self) -> DriverVariant {
        DriverVariant::InMemory
    }

    fn build(&self, descriptor: &ConnectionDescriptor) -> SourceResult<SourceHandle> {
        let database = require_database(descriptor, self.name())?;

        // Named shared-cache store: sqlite uses the filename only as the
        // cache-sharing key for memory databases, so every connection from
        // this handle opens the same store.
        let options = SqliteConnectOptions::new()
            .filename(&database)
            .in_memory(true)
            .shared_cache(true);

        Ok(SourceHandle::new(
            self.name(),
            self.variant(),
            Some(database),
            Backend::Sqlite(options),
        ))
    }

    fn tuning(&self) -> &'static SetterTable<SourceHandle> {
        &SQLITE_TUNING
    }
}

// ---------------------------------------------------------------------------
// postgres (client-server)
// ---------------------------------------------------------------------------

pub struct PostgresAdapter;

static POSTGRES_TUNING: LazyLock<SetterTable<SourceHandle>> = LazyLock::new(|| {
    SetterTable::<SourceHandle>::new()
        .string("applicationName", |h, v| {
            h.map_postgres(|o| o.application_name(&v));
        })
        .string("sslMode", |h, v| {
            h.map_postgres(|o| o.ssl_mode(parse_ssl_mode(&v)));
        })
        .int("statementCacheCapacity", |h, v| {
            h.map_postgres(|o| o.statement_cache_capacity(v.max(0) as usize));
        })
});

fn parse_ssl_mode(value: &str) -> PgSslMode {
    match value.to_ascii_lowercase().as_str() {
        "disable" => PgSslMode::Disable,
        "allow" => PgSslMode::Allow,
        "require" => PgSslMode::Require,
        "verify-ca" => PgSslMode::VerifyCa,
        "verify-full" => PgSslMode::VerifyFull,
        _ => PgSslMode::Prefer,
    }
}

impl DriverAdapter for PostgresAdapter {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn variant(&self) -> DriverVariant {
        DriverVariant::ClientServer
    }

    fn build(&self, descriptor: &ConnectionDescriptor) -> SourceResult<SourceHandle> {
        let server = descriptor
            .server_name
            .as_deref()
            .ok_or_else(|| SourceError::driver_construction(self.name(), "server name required"))?;
        let database = require_database(descriptor, self.name())?;

        let mut options = PgConnectOptions::new()
            .host(server)
            .port(descriptor.port.unwrap_or(DEFAULT_POSTGRES_PORT))
            .database(&database);
        if let Some(user) = &descriptor.user {
            options = options.username(user);
        }
        if let Some(password) = &descriptor.password {
            options = options.password(password);
        }

        Ok(SourceHandle::new(
            self.name(),
            self.variant(),
            Some(database),
            Backend::Postgres(options),
        ))
    }

    fn tuning(&self) -> &'static SetterTable<SourceHandle> {
        &POSTGRES_TUNING
    }
}

// ---------------------------------------------------------------------------
// mysql (client-server)
// ---------------------------------------------------------------------------

pub struct MySqlAdapter;

static MYSQL_TUNING: LazyLock<SetterTable<SourceHandle>> = LazyLock::new(|| {
    SetterTable::<SourceHandle>::new()
        .string("charset", |h, v| {
            h.map_mysql(|o| o.charset(&v));
        })
        .int("statementCacheCapacity", |h, v| {
            h.map_mysql(|o| o.statement_cache_capacity(v.max(0) as usize));
        })
});

impl DriverAdapter for MySqlAdapter {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn variant(&self) -> DriverVariant {
        DriverVariant::ClientServer
    }

    fn build(&self, descriptor: &ConnectionDescriptor) -> SourceResult<SourceHandle> {
        let server = descriptor
            .server_name
            .as_deref()
            .ok_or_else(|| SourceError::driver_construction(self.name(), "server name required"))?;
        let database = require_database(descriptor, self.name())?;

        let mut options = MySqlConnectOptions::new()
            .host(server)
            .port(descriptor.port.unwrap_or(DEFAULT_MYSQL_PORT))
            .database(&database);
        if let Some(user) = &descriptor.user {
            options = options.username(user);
        }
        if let Some(password) = &descriptor.password {
            options = options.password(password);
        }

        Ok(SourceHandle::new(
            self.name(),
            self.variant(),
            Some(database),
            Backend::MySql(options),
        ))
    }

    fn tuning(&self) -> &'static SetterTable<SourceHandle> {
        &MYSQL_TUNING
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry of known driver adapters.
///
/// Populated once at startup and never mutated afterwards; share it behind an
/// `Arc` and read it from any thread without locking.
pub struct AdapterRegistry {
    adapters: HashMap<&'static str, Box<dyn DriverAdapter>>,
}

impl AdapterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Registry preloaded with every built-in adapter.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(SqliteFileAdapter));
        registry.register(Box::new(SqliteMemoryAdapter));
        registry.register(Box::new(PostgresAdapter));
        registry.register(Box::new(MySqlAdapter));
        registry
    }

    /// Register an adapter under its own name. Startup-time only; the last
    /// registration for a name wins.
    pub fn register(&mut self, adapter: Box<dyn DriverAdapter>) {
        debug!(driver = adapter.name(), variant = %adapter.variant(), "Registering driver adapter");
        self.adapters.insert(adapter.name(), adapter);
    }

    /// Look up an adapter by name.
    pub fn get(&self, name: &str) -> SourceResult<&dyn DriverAdapter> {
        self.adapters
            .get(name)
            .map(Box::as_ref)
            .ok_or_else(|| SourceError::driver_not_found(name))
    }

    /// Names of all registered adapters.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.adapters.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
