//! Tracing subscriber setup for hosts embedding ConceptLink.

use tracing_subscriber::{EnvFilter, fmt};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{ConceptLinkError, Result};

/// Install a global fmt subscriber. `RUST_LOG` wins over the configured filter.
///
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let installed = match config.format {
        LogFormat::Text => fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .try_init(),
        LogFormat::Json => fmt().json().with_env_filter(env_filter).try_init(),
    };

    installed.map_err(|e| ConceptLinkError::config(format!("failed to install tracing: {e}")))
}
