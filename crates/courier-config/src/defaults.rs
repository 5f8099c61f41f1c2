//! Default values used by the binaries.

use crate::logging::LogFormat;

/// Default TCP port for socket channels.
pub const DEFAULT_TCP_PORT: u16 = 9461;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default channel name for singly-configured channels.
pub const DEFAULT_CHANNEL_NAME: &str = "default";

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter_string() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}
