//! Structured logging setup.
//!
//! Installs a `tracing-subscriber` fmt subscriber filtered by `RUST_LOG` when
//! set, otherwise by the configured level. Embedders that install their own
//! subscriber simply never call [`init_logging`].

use std::sync::OnceLock;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};

static INSTALLED: OnceLock<()> = OnceLock::new();

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.as_str().to_lowercase()))
        .map_err(|e| BridgeError::ConfigError(format!("Invalid log filter: {e}")))?;

    let installed = if config.json_format {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
    };

    // Another subscriber may already be global (tests, embedders); keep it.
    if let Err(e) = installed {
        tracing::debug!(error = %e, "Global subscriber already set");
    }

    let _ = INSTALLED.set(());
    tracing::info!(app = %config.app_name, level = %config.log_level, "Logging initialized");
    Ok(())
}
