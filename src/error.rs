//! Error types for dbbridge.
//!
//! This module defines all error types using `thiserror` for ergonomic error
//! handling. The taxonomy mirrors the construction pipeline: configuration
//! parsing, driver construction, property application, pool wrapping, and
//! finally connection acquisition. Errors surface immediately to the caller;
//! nothing is retried or suppressed inside this crate, except that non-strict
//! property application skips unknown keys by design.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Driver construction failed ({driver}): {message}")]
    DriverConstruction { driver: String, message: String },

    #[error("Unknown property: {key}")]
    UnknownProperty { key: String },

    #[error("Pool construction failed: {message}")]
    PoolConstruction { message: String },

    /// Raised only at connection-acquisition time, never during construction.
    #[error("Connectivity error: {message}")]
    Connectivity { message: String },

    #[error("No driver adapter registered under '{driver}'")]
    DriverNotFound { driver: String },

    #[error("Service '{id}' is already published")]
    AlreadyPublished { id: String },

    #[error("Service not found: {id}")]
    ServiceNotFound { id: String },

    #[error("Pre-publication hook rejected source: {message}")]
    HookRejected { message: String },
}

impl SourceError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a driver construction error naming the adapter.
    pub fn driver_construction(driver: impl Into<String>, message: impl Into<String>) -> Self {
        Self::DriverConstruction {
            driver: driver.into(),
            message: message.into(),
        }
    }

    /// Create an unknown property error naming the offending key.
    pub fn unknown_property(key: impl Into<String>) -> Self {
        Self::UnknownProperty { key: key.into() }
    }

    /// Create a pool construction error.
    pub fn pool_construction(message: impl Into<String>) -> Self {
        Self::PoolConstruction {
            message: message.into(),
        }
    }

    /// Create a connectivity error.
    pub fn connectivity(message: impl Into<String>) -> Self {
        Self::Connectivity {
            message: message.into(),
        }
    }

    /// Create a driver not found error.
    pub fn driver_not_found(driver: impl Into<String>) -> Self {
        Self::DriverNotFound {
            driver: driver.into(),
        }
    }

    /// Create an already published error.
    pub fn already_published(id: impl Into<String>) -> Self {
        Self::AlreadyPublished { id: id.into() }
    }

    /// Create a service not found error.
    pub fn service_not_found(id: impl Into<String>) -> Self {
        Self::ServiceNotFound { id: id.into() }
    }

    /// Create a hook rejection error.
    pub fn hook_rejected(message: impl Into<String>) -> Self {
        Self::HookRejected {
            message: message.into(),
        }
    }

    /// Check if this error is retryable from the caller's perspective.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

/// Convert sqlx errors to SourceError.
///
/// sqlx surfaces both configuration-time and acquisition-time failures through
/// one type; configuration problems map to `Configuration`, everything that can
/// only happen while talking to a live server maps to `Connectivity`.
impl From<sqlx::Error> for SourceError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => SourceError::configuration(msg.to_string()),
            sqlx::Error::PoolTimedOut => {
                SourceError::connectivity("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => SourceError::connectivity("Connection pool is closed"),
            sqlx::Error::Io(io_err) => SourceError::connectivity(format!("I/O error: {io_err}")),
            sqlx::Error::Tls(tls_err) => SourceError::connectivity(format!("TLS error: {tls_err}")),
            sqlx::Error::Protocol(msg) => {
                SourceError::connectivity(format!("Protocol error: {msg}"))
            }
            sqlx::Error::Database(db_err) => SourceError::connectivity(db_err.to_string()),
            other => SourceError::connectivity(format!("Driver error: {other}")),
        }
    }
}

/// Result type alias for connection-source operations.
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SourceError::configuration("missing database name");
        assert!(err.to_string().contains("Invalid configuration"));
    }

    #[test]
    fn test_unknown_property_names_key() {
        let err = SourceError::unknown_property("dummy");
        assert!(err.to_string().contains("dummy"));
        assert!(matches!(err, SourceError::UnknownProperty { key } if key == "dummy"));
    }

    #[test]
    fn test_driver_construction_names_driver() {
        let err = SourceError::driver_construction("postgres", "server name required");
        assert!(err.to_string().contains("postgres"));
        assert!(err.to_string().contains("server name required"));
    }

    #[test]
    fn test_retryable() {
        assert!(SourceError::connectivity("refused").is_retryable());
        assert!(!SourceError::configuration("bad").is_retryable());
        assert!(!SourceError::pool_construction("no XA").is_retryable());
    }

    #[test]
    fn test_sqlx_pool_timeout_maps_to_connectivity() {
        let err: SourceError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, SourceError::Connectivity { .. }));
    }

    #[test]
    fn test_sqlx_pool_closed_maps_to_connectivity() {
        let err: SourceError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, SourceError::Connectivity { .. }));
    }
}
