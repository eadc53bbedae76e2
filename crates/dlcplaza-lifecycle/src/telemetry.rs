//! Tracing subscriber setup.

use dlcplaza_types::{DlcError, LogFormat, LoggingConfig, Result};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` wins over the configured level when set.
///
/// # Errors
/// `Configuration` for an unparsable level, `Internal` if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level).map_err(|e| {
            DlcError::Configuration(format!("invalid log level {:?}: {e}", config.level))
        })?,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| DlcError::Internal(format!("tracing already initialised: {e}")))
}
