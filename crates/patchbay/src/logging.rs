//! Tracing subscriber setup
//!
//! The logger service forwards structured log events to the process-wide
//! tracing subscriber installed here. Filtering is controlled through the
//! `PATCHBAY_LOG` environment variable with the usual `EnvFilter` syntax.

use patchbay_core::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Environment variable controlling the log filter
pub const LOG_ENV: &str = "PATCHBAY_LOG";

/// Install the global tracing subscriber
///
/// `default_level` applies when `PATCHBAY_LOG` is unset. Fails when a
/// subscriber is already installed.
pub fn init_logging(default_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::configuration(format!("failed to initialize logging: {e}")))
}
