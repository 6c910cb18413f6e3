//! Tracing initialization. Engines log with the project id in fields;
//! RUST_LOG / LATTICE_LOG select the filter.

use tracing_subscriber::EnvFilter;

/// Initialize the global subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init_tracing() {
    let filter = std::env::var("LATTICE_LOG")
        .map(EnvFilter::new)
        .unwrap_or_else(|_| EnvFilter::from_default_env());

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
