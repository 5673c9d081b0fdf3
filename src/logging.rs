// src/logging.rs
// Console logging through `tracing-subscriber`.

use tracing_subscriber::EnvFilter;

/// Human-readable output to stderr. Controlled by `RUST_LOG` (default: `info`).
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_cli() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install log subscriber: {e}"))
}
