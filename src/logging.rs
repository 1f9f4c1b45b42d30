//! Tracing setup.

use tracing_subscriber::EnvFilter;

/// Filter directive enabling `level` for this crate only.
fn default_directive(level: &str) -> String {
    format!("{}={}", env!("CARGO_PKG_NAME").replace('-', "_"), level)
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn enable_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
