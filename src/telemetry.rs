//! Tracing setup.

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Loads `.env` first so `RUST_LOG` from a local env file is honored, then
/// installs an env-filtered fmt subscriber. Safe to call more than once;
/// later calls are no-ops.
pub fn init_tracing() {
    let _ = dotenvy::dotenv();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
