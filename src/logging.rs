//! Tracing subscriber setup for the `xer` binary.
//!
//! Logs go to stderr so stdout stays parseable for scripts. The level comes
//! from `[logging].level` unless `RUST_LOG` is set.
//!
//! Use structured fields rather than formatted strings:
//!
//! ```rust
//! use tracing::info;
//! # let table = "TASK"; let inserted = 2;
//! info!(table, inserted, "inserted records");
//! ```

use anyhow::{anyhow, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. Call once, before any work is done.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_ascii_lowercase()))
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?,
        _ => registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| anyhow!("Failed to initialize logging: {}", e))?,
    }

    Ok(())
}
