//! Observability
//!
//! Structured logging via `tracing`. Warnings are the only signal of
//! degraded persistence, so every retry and every dropped write logs at
//! `warn` with the player and key attached.

pub mod config;

pub use config::LogConfig;

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber
///
/// Returns an error if a subscriber was already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()?;
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init()?;
    }

    tracing::info!(
        service = %config.service_name,
        version = %config.version,
        tags = ?config.formatted_tags(),
        "tracing initialized"
    );
    Ok(())
}
