//! Source construction orchestration and the service registry.
//!
//! [`build_source`] runs the whole construction pipeline: translate the
//! property bag, hand the descriptor to the named adapter, apply driver
//! tuning non-strictly from the residual keys, and optionally wrap the
//! result with a strictly-configured pool.
//!
//! [`ServiceRegistry`] owns published sources: each successful `publish`
//! runs the pre-publication hooks and registers the source under a caller
//! chosen id; `withdraw` removes it and ends its lifetime.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::adapter::AdapterRegistry;
use crate::config::{ConfigMap, translate};
use crate::error::{SourceError, SourceResult};
use crate::hook::PreHook;
use crate::pool::PoolFactory;
use crate::source::{ConnectionSource, DriverVariant};

/// Pooling request attached to a source request.
#[derive(Debug, Clone, Default)]
pub struct PoolRequest {
    /// Pool-namespace configuration, strict-applied after prefix stripping.
    pub config: ConfigMap,
    /// Request distributed-transaction capability from the pool.
    pub wants_xa: bool,
}

/// Everything needed to construct one connection source.
#[derive(Debug, Clone)]
pub struct SourceRequest {
    /// Name of the registered driver adapter.
    pub driver: String,
    /// Flat property bag consumed by translation.
    pub config: ConfigMap,
    /// When set, the built source is wrapped with a pool.
    pub pool: Option<PoolRequest>,
}

impl SourceRequest {
    pub fn new(driver: impl Into<String>, config: ConfigMap) -> Self {
        Self {
            driver: driver.into(),
            config,
            pool: None,
        }
    }

    pub fn pooled(mut self, pool: PoolRequest) -> Self {
        self.pool = Some(pool);
        self
    }
}

/// Run the construction pipeline for one request.
///
/// No I/O happens here; the returned source connects lazily. Driver-level
/// residual keys are applied non-strictly (unknown vendor keys are skipped),
/// pool keys strictly (a typo is a hard error).
///
/// # Errors
///
/// Any error from translation, adapter construction, tuning application, or
/// pool wrapping; `SourceError::DriverNotFound` when no adapter is
/// registered under the requested name.
pub fn build_source(
    registry: &AdapterRegistry,
    request: SourceRequest,
) -> SourceResult<Box<dyn ConnectionSource>> {
    let adapter = registry.get(&request.driver)?;
    let descriptor = translate(request.config)?;

    debug!(
        driver = %request.driver,
        database = descriptor.database_name.as_deref().unwrap_or(""),
        pooled = request.pool.is_some(),
        "Building connection source"
    );

    let mut handle = adapter.build(&descriptor)?;
    adapter
        .tuning()
        .apply(&mut handle, &descriptor.residual, false)?;

    match request.pool {
        Some(pool) => Ok(Box::new(PoolFactory::wrap(
            handle,
            &pool.config,
            pool.wants_xa,
        )?)),
        None => Ok(Box::new(handle)),
    }
}

/// Summary of a published connection source (no credentials exposed).
#[derive(Debug, Clone, Serialize)]
pub struct ServiceSummary {
    pub id: String,
    pub driver: String,
    pub variant: DriverVariant,
    pub database: Option<String>,
    pub pooled: bool,
}

fn summarize(id: &str, source: &dyn ConnectionSource) -> ServiceSummary {
    ServiceSummary {
        id: id.to_string(),
        driver: source.driver().to_string(),
        variant: source.variant(),
        database: source.database_name().map(String::from),
        pooled: source.pooled(),
    }
}

fn validate_id(id: &str) -> SourceResult<()> {
    if id.is_empty() {
        return Err(SourceError::configuration("Service id cannot be empty"));
    }
    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(SourceError::configuration(format!(
            "Service id contains invalid characters: {id}"
        )));
    }
    Ok(())
}

/// Registry of published connection-source services.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    services: Arc<RwLock<HashMap<String, Arc<dyn ConnectionSource>>>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Publish a constructed source under `id`.
    ///
    /// Every hook runs against the source first; any hook failure vetoes
    /// publication and the source is dropped. Hooks run outside the registry
    /// lock, so a duplicate id is re-checked at insertion time.
    ///
    /// # Errors
    ///
    /// `SourceError::AlreadyPublished` for a duplicate id, the hook's own
    /// error when one vetoes, `SourceError::Configuration` for an invalid id.
    pub async fn publish(
        &self,
        id: impl Into<String>,
        source: Box<dyn ConnectionSource>,
        hooks: &[Box<dyn PreHook>],
    ) -> SourceResult<ServiceSummary> {
        let id = id.into();
        validate_id(&id)?;

        {
            let services = self.services.read().await;
            if services.contains_key(&id) {
                return Err(SourceError::already_published(&id));
            }
        }

        for hook in hooks {
            hook.prepare(source.as_ref()).await?;
        }

        let summary = summarize(&id, source.as_ref());
        let source: Arc<dyn ConnectionSource> = Arc::from(source);

        // Re-check after the hooks ran to prevent a TOCTOU race; shut the
        // loser down outside the lock.
        let duplicate = {
            let mut services = self.services.write().await;
            if services.contains_key(&id) {
                Some(source)
            } else {
                services.insert(id.clone(), source);
                None
            }
        };

        if let Some(source) = duplicate {
            source.shutdown().await;
            return Err(SourceError::already_published(&id));
        }

        info!(
            id = %summary.id,
            driver = %summary.driver,
            variant = %summary.variant,
            pooled = summary.pooled,
            "Published connection source"
        );
        Ok(summary)
    }

    /// Look up a published source by id.
    pub async fn get(&self, id: &str) -> SourceResult<Arc<dyn ConnectionSource>> {
        let services = self.services.read().await;
        services
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::service_not_found(id))
    }

    /// Withdraw a published source, releasing its resources.
    pub async fn withdraw(&self, id: &str) -> SourceResult<()> {
        let removed = {
            let mut services = self.services.write().await;
            services.remove(id)
        };
        match removed {
            Some(source) => {
                source.shutdown().await;
                info!(id = %id, "Withdrew connection source");
                Ok(())
            }
            None => Err(SourceError::service_not_found(id)),
        }
    }

    /// Summaries of every published source.
    pub async fn summaries(&self) -> Vec<ServiceSummary> {
        let services = self.services.read().await;
        let mut all: Vec<_> = services
            .iter()
            .map(|(id, source)| summarize(id, source.as_ref()))
            .collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Number of published sources.
    pub async fn count(&self) -> usize {
        self.services.read().await.len()
    }

    /// Withdraw everything.
    pub async fn close_all(&self) {
        let drained: Vec<_> = {
            let mut services = self.services.write().await;
            services.drain().collect()
        };
        for (id, source) in drained {
            info!(id = %id, "Closing connection source");
            source.shutdown().await;
        }
    }
}
