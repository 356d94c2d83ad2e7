//! Tracing Setup
//!
//! Installs the global `tracing` subscriber with an env-filter. `RUST_LOG`
//! takes precedence when set; otherwise the crate logs at debug and
//! everything else at info.
//!
//! # Usage
//!
//! ```no_run
//! if let Err(error) = market_archiver::init_telemetry() {
//!     eprintln!("telemetry already installed: {error}");
//! }
//! tracing::info!("ready");
//! ```

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Filter applied when `RUST_LOG` is unset.
const DEFAULT_DIRECTIVES: &str = "info,market_archiver=debug";

/// Telemetry initialization failure.
#[derive(Debug, Error)]
#[error("telemetry init failed: {0}")]
pub struct TelemetryError(String);

/// Install the global tracing subscriber.
///
/// # Errors
///
/// [`TelemetryError`] when a global subscriber is already installed.
pub fn init() -> Result<(), TelemetryError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|error| TelemetryError(error.to_string()))
}

// =============================================================================
// Tests
// =============================================================================
