//! dbbridge
//!
//! Adapts third-party database drivers (via sqlx) to a common
//! service-registration convention: a flat property bag is translated into a
//! structured descriptor, a driver adapter turns the descriptor into a
//! connection source, an optional pool wraps it, pre-publication hooks may
//! veto it, and a registry publishes what survives.
//!
//! Construction is pure and synchronous; all I/O is deferred to connection
//! acquisition on the published source.

pub mod adapter;
pub mod config;
pub mod error;
pub mod hook;
pub mod pool;
pub mod publish;
pub mod setters;
pub mod source;

pub use adapter::{AdapterRegistry, DriverAdapter};
pub use config::{ConfigMap, ConnectionDescriptor, translate};
pub use error::{SourceError, SourceResult};
pub use hook::{FnHook, PreHook};
pub use pool::{PoolFactory, PoolSettings, PooledSource};
pub use publish::{PoolRequest, ServiceRegistry, ServiceSummary, SourceRequest, build_source};
pub use setters::SetterTable;
pub use source::{ConnectionSource, DriverVariant, LiveConnection, SourceHandle};
