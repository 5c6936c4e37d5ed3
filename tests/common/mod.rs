//! Shared helpers for the integration tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a test-writer subscriber once per test binary so `RUST_LOG`
/// controls log output during test runs.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
