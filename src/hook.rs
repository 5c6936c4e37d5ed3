//! Pre-publication hook contract.
//!
//! Hooks run after a source is fully constructed (and wrapped, when pooling
//! was requested) and before it is published. A hook failure vetoes
//! publication. Implementations live outside this crate - typical uses are
//! schema migration and reachability validation.

use async_trait::async_trait;

use crate::error::{SourceError, SourceResult};
use crate::source::ConnectionSource;

/// Optional validation step between construction and publication.
#[async_trait]
pub trait PreHook: Send + Sync {
    /// Inspect or prepare the source. Returning an error prevents the
    /// source from being published.
    async fn prepare(&self, source: &dyn ConnectionSource) -> SourceResult<()>;
}

/// Closure-backed hook for callers and tests that do not need a named type.
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> PreHook for FnHook<F>
where
    F: Fn(&dyn ConnectionSource) -> SourceResult<()> + Send + Sync,
{
    async fn prepare(&self, source: &dyn ConnectionSource) -> SourceResult<()> {
        (self.0)(source)
    }
}

impl SourceError {
    /// Wrap an arbitrary hook failure message as a hook rejection.
    pub fn veto(message: impl Into<String>) -> Self {
        SourceError::hook_rejected(message)
    }
}
