//! Tracing installation for the daemon process.
//!
//! The subscriber is process-global and installed at most once. The first
//! bootstrap wins: its filter and format are recorded, and every later
//! initialisation hands back the recorded settings untouched, so several
//! daemons bootstrapped in one process (as the integration tests do) never
//! fight over the subscriber.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

use courier_config::{Config, LogFormat};

static ACTIVE: OnceCell<TelemetrySettings> = OnceCell::new();

/// Filter and format the process-wide subscriber runs with.
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    filter: String,
    format: LogFormat,
}

impl TelemetrySettings {
    /// Filter expression the subscriber was installed with.
    #[must_use]
    pub fn filter(&self) -> &str {
        &self.filter
    }

    /// Output format the subscriber writes.
    #[must_use]
    pub const fn format(&self) -> LogFormat {
        self.format
    }
}

/// Errors encountered while configuring telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Configured log filter expression did not parse.
    #[error("invalid log filter '{filter}': {message}")]
    Filter {
        /// Offending filter expression.
        filter: String,
        /// Parser diagnostic.
        message: String,
    },
    /// The subscriber could not be registered as the global default.
    #[error("failed to install telemetry subscriber: {0}")]
    Install(#[from] TryInitError),
}

/// Installs the global tracing subscriber on first use.
///
/// Returns the settings the subscriber actually runs with; those are the
/// first caller's, never the current caller's.
///
/// # Errors
///
/// Returns a [`TelemetryError`] when the filter does not parse or the
/// subscriber cannot be registered.
pub fn initialise(config: &Config) -> Result<&'static TelemetrySettings, TelemetryError> {
    ACTIVE.get_or_try_init(|| install(config))
}

fn install(config: &Config) -> Result<TelemetrySettings, TelemetryError> {
    let filter =
        EnvFilter::try_new(config.log_filter()).map_err(|error| TelemetryError::Filter {
            filter: config.log_filter().to_owned(),
            message: error.to_string(),
        })?;

    let sink = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        // Colour only when a person is watching the stream.
        .with_ansi(io::stderr().is_terminal())
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let base = tracing_subscriber::registry().with(filter);
    match config.log_format() {
        LogFormat::Json => base.with(sink.json().flatten_event(true)).try_init()?,
        LogFormat::Compact => base.with(sink.compact()).try_init()?,
    }

    Ok(TelemetrySettings {
        filter: config.log_filter().to_owned(),
        format: config.log_format(),
    })
}
