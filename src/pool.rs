//! Declarative pooling on top of a built source.
//!
//! [`PoolFactory::wrap`] consumes an unpooled [`SourceHandle`] and produces a
//! [`PooledSource`] backed by a lazily constructed sqlx pool. Pool tuning is
//! driven entirely by the strict setter table on [`PoolSettings`]: a typo in
//! a pool key is a hard error, unlike best-effort driver tuning. Keys may
//! carry a `pool.` namespace prefix to disambiguate them from driver-level
//! residual keys; the prefix is stripped before table lookup.
//!
//! Pool construction performs no I/O; connections are established on first
//! acquisition.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use sqlx::pool::PoolOptions;
use sqlx::{MySql, Pool, Postgres, Sqlite};
use tracing::debug;

use crate::config::ConfigMap;
use crate::error::{SourceError, SourceResult};
use crate::setters::SetterTable;
use crate::source::{Backend, ConnectionSource, DriverVariant, LiveConnection, SourceHandle};

/// Namespace prefix for pool configuration keys.
pub const POOL_KEY_PREFIX: &str = "pool.";

// Conservative defaults: a small pool, bounded acquisition wait, idle
// connections reaped after ten minutes.
pub const DEFAULT_MAX_POOL_SIZE: u32 = 10;
pub const DEFAULT_MIN_IDLE: u32 = 1;
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 600_000;

/// Effective pool configuration, observable on the wrapped source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolSettings {
    pub max_size: u32,
    pub min_idle: u32,
    pub connection_timeout_ms: u64,
    pub idle_timeout_ms: Option<u64>,
    pub max_lifetime_ms: Option<u64>,
    pub test_on_acquire: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_POOL_SIZE,
            min_idle: DEFAULT_MIN_IDLE,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            idle_timeout_ms: Some(DEFAULT_IDLE_TIMEOUT_MS),
            max_lifetime_ms: None,
            test_on_acquire: true,
        }
    }
}

impl PoolSettings {
    /// Validate the settings before a pool is built from them.
    fn validate(&self) -> SourceResult<()> {
        if self.max_size == 0 {
            return Err(SourceError::pool_construction(
                "maximumPoolSize must be greater than 0",
            ));
        }
        if self.min_idle > self.max_size {
            return Err(SourceError::pool_construction(format!(
                "minimumIdle ({}) cannot exceed maximumPoolSize ({})",
                self.min_idle, self.max_size
            )));
        }
        Ok(())
    }
}

static POOL_SETTERS: LazyLock<SetterTable<PoolSettings>> = LazyLock::new(|| {
    SetterTable::<PoolSettings>::new()
        .int("maximumPoolSize", |s, v| {
            s.max_size = v.clamp(0, i64::from(u32::MAX)) as u32;
        })
        .int("minimumIdle", |s, v| {
            s.min_idle = v.clamp(0, i64::from(u32::MAX)) as u32;
        })
        .int("connectionTimeout", |s, v| {
            s.connection_timeout_ms = v.max(0) as u64;
        })
        .int("idleTimeout", |s, v| {
            // Zero disables idle reaping
            s.idle_timeout_ms = (v > 0).then_some(v as u64);
        })
        .int("maxLifetime", |s, v| {
            s.max_lifetime_ms = (v > 0).then_some(v as u64);
        })
        .bool("testOnAcquire", |s, v| s.test_on_acquire = v)
});

/// Strip the `pool.` namespace prefix from every key that carries it.
///
/// A key supplied both with and without the prefix is rejected; map
/// iteration order must not pick the survivor.
fn strip_pool_prefix(config: &ConfigMap) -> SourceResult<ConfigMap> {
    let mut stripped = ConfigMap::with_capacity(config.len());
    for (k, v) in config {
        let key = k.strip_prefix(POOL_KEY_PREFIX).unwrap_or(k);
        if stripped.insert(key.to_string(), v.clone()).is_some() {
            return Err(SourceError::pool_construction(format!(
                "Pool key '{key}' supplied both with and without the '{POOL_KEY_PREFIX}' prefix"
            )));
        }
    }
    Ok(stripped)
}

fn pool_options<DB: sqlx::Database>(settings: &PoolSettings) -> PoolOptions<DB> {
    PoolOptions::new()
        .max_connections(settings.max_size)
        .min_connections(settings.min_idle)
        .acquire_timeout(Duration::from_millis(settings.connection_timeout_ms))
        .idle_timeout(settings.idle_timeout_ms.map(Duration::from_millis))
        .max_lifetime(settings.max_lifetime_ms.map(Duration::from_millis))
        .test_before_acquire(settings.test_on_acquire)
}

#[derive(Debug)]
enum PooledBackend {
    Sqlite(Pool<Sqlite>),
    Postgres(Pool<Postgres>),
    MySql(Pool<MySql>),
}

/// A connection source whose acquisitions go through a sqlx pool.
#[derive(Debug)]
pub struct PooledSource {
    driver: &'static str,
    variant: DriverVariant,
    database_name: Option<String>,
    settings: PoolSettings,
    pool: PooledBackend,
}

impl PooledSource {
    /// Effective settings the pool was built with.
    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// Close the pool and every connection it holds.
    pub async fn close(&self) {
        match &self.pool {
            PooledBackend::Sqlite(pool) => pool.close().await,
            PooledBackend::Postgres(pool) => pool.close().await,
            PooledBackend::MySql(pool) => pool.close().await,
        }
    }
}

#[async_trait]
impl ConnectionSource for PooledSource {
    fn driver(&self) -> &str {
        self.driver
    }

    fn variant(&self) -> DriverVariant {
        self.variant
    }

    fn database_name(&self) -> Option<&str> {
        self.database_name.as_deref()
    }

    fn pooled(&self) -> bool {
        true
    }

    async fn get_connection(&self) -> SourceResult<LiveConnection> {
        let conn = match &self.pool {
            PooledBackend::Sqlite(pool) => LiveConnection::PooledSqlite(pool.acquire().await?),
            PooledBackend::Postgres(pool) => LiveConnection::PooledPostgres(pool.acquire().await?),
            PooledBackend::MySql(pool) => LiveConnection::PooledMySql(pool.acquire().await?),
        };
        Ok(conn)
    }

    async fn shutdown(&self) {
        self.close().await;
    }
}

/// Wraps built sources with pooling.
pub struct PoolFactory;

impl PoolFactory {
    /// Wrap `inner` with a pool tuned from `pool_config`.
    ///
    /// Pool keys are applied strictly after stripping the optional `pool.`
    /// prefix. The sqlx pool variants carry no distributed-transaction
    /// capability, so `wants_xa` always fails.
    ///
    /// # Errors
    ///
    /// `SourceError::UnknownProperty` for an unrecognized pool key,
    /// `SourceError::PoolConstruction` for an unsupported XA request,
    /// invalid settings, or a key supplied both with and without the
    /// prefix. A failed wrap leaves no pool behind; `inner` is consumed
    /// either way, mirroring its single-use lifecycle.
    pub fn wrap(
        inner: SourceHandle,
        pool_config: &ConfigMap,
        wants_xa: bool,
    ) -> SourceResult<PooledSource> {
        if wants_xa {
            return Err(SourceError::pool_construction(format!(
                "XA is not supported by the '{}' pool variant",
                inner.driver(),
            )));
        }

        let mut settings = PoolSettings::default();
        let residual = strip_pool_prefix(pool_config)?;
        POOL_SETTERS.apply(&mut settings, &residual, true)?;
        settings.validate()?;

        debug!(
            driver = inner.driver(),
            max_size = settings.max_size,
            "Building lazy connection pool"
        );

        let SourceHandle {
            driver,
            variant,
            database_name,
            backend,
        } = inner;

        let pool = match backend {
            Backend::Sqlite(opts) => {
                PooledBackend::Sqlite(pool_options::<Sqlite>(&settings).connect_lazy_with(opts))
            }
            Backend::Postgres(opts) => {
                PooledBackend::Postgres(pool_options::<Postgres>(&settings).connect_lazy_with(opts))
            }
            Backend::MySql(opts) => {
                PooledBackend::MySql(pool_options::<MySql>(&settings).connect_lazy_with(opts))
            }
        };

        Ok(PooledSource {
            driver,
            variant,
            database_name,
            settings,
            pool,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DriverAdapter, SqliteMemoryAdapter};
    use crate::config::translate;

    fn handle() -> SourceHandle {
        let desc = translate(
            [("databaseName".to_string(), "scratch".to_string())]
                .into_iter()
                .collect(),
        )
        .unwrap();
        SqliteMemoryAdapter.build(&desc).unwrap()
    }

    fn cfg(pairs: &[(&str, &str)]) -> ConfigMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    // Successful wraps build a lazy pool, which spawns its reaper task and
    // therefore needs a runtime; error paths stop before pool construction.

    #[tokio::test]
    async fn test_wrap_applies_maximum_pool_size() {
        let pooled = PoolFactory::wrap(handle(), &cfg(&[("maximumPoolSize", "8")]), false).unwrap();
        assert_eq!(pooled.settings().max_size, 8);
        assert!(pooled.pooled());
    }

    #[test]
    fn test_wrap_unknown_key_names_key() {
        let err = PoolFactory::wrap(handle(), &cfg(&[("dummy", "8")]), false).unwrap_err();
        assert!(matches!(err, SourceError::UnknownProperty { key } if key == "dummy"));
    }

    #[tokio::test]
    async fn test_wrap_strips_pool_prefix() {
        let pooled = PoolFactory::wrap(
            handle(),
            &cfg(&[("pool.maximumPoolSize", "4"), ("pool.testOnAcquire", "false")]),
            false,
        )
        .unwrap();
        assert_eq!(pooled.settings().max_size, 4);
        assert!(!pooled.settings().test_on_acquire);
    }

    #[test]
    fn test_wrap_rejects_prefixed_and_bare_duplicate() {
        let err = PoolFactory::wrap(
            handle(),
            &cfg(&[("pool.maximumPoolSize", "4"), ("maximumPoolSize", "8")]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::PoolConstruction { .. }));
        assert!(err.to_string().contains("maximumPoolSize"));
    }

    #[test]
    fn test_wrap_rejects_xa() {
        let err = PoolFactory::wrap(handle(), &ConfigMap::new(), true).unwrap_err();
        assert!(matches!(err, SourceError::PoolConstruction { .. }));
        assert!(err.to_string().contains("XA"));
    }

    #[tokio::test]
    async fn test_wrap_default_settings() {
        let pooled = PoolFactory::wrap(handle(), &ConfigMap::new(), false).unwrap();
        assert_eq!(*pooled.settings(), PoolSettings::default());
        assert_eq!(pooled.settings().max_size, DEFAULT_MAX_POOL_SIZE);
    }

    #[test]
    fn test_wrap_rejects_zero_max_size() {
        let err = PoolFactory::wrap(handle(), &cfg(&[("maximumPoolSize", "0")]), false).unwrap_err();
        assert!(matches!(err, SourceError::PoolConstruction { .. }));
    }

    #[test]
    fn test_wrap_rejects_min_exceeding_max() {
        let err = PoolFactory::wrap(
            handle(),
            &cfg(&[("maximumPoolSize", "2"), ("minimumIdle", "5")]),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, SourceError::PoolConstruction { .. }));
        assert!(err.to_string().contains("minimumIdle"));
    }

    #[tokio::test]
    async fn test_idle_timeout_zero_disables_reaping() {
        let pooled = PoolFactory::wrap(handle(), &cfg(&[("idleTimeout", "0")]), false).unwrap();
        assert!(pooled.settings().idle_timeout_ms.is_none());
    }

    #[tokio::test]
    async fn test_pooled_source_reports_structural_fields() {
        let pooled = PoolFactory::wrap(handle(), &ConfigMap::new(), false).unwrap();
        assert_eq!(pooled.driver(), "sqlite-memory");
        assert_eq!(pooled.variant(), DriverVariant::InMemory);
        assert_eq!(pooled.database_name(), Some("scratch"));
    }
}
