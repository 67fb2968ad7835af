pub mod api;
pub mod config;
pub mod db;
pub mod evaluation;
pub mod models;
pub mod schedule;

use tracing_subscriber::EnvFilter;

/// Initialize tracing from `RUST_LOG`, defaulting to info for this crate.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dosetrack=info")),
        )
        .init();
}
