//! Logging output configuration shared by the daemon and tools.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported logging output formats.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Structured JSON suitable for ingestion by logging stacks.
    #[default]
    Json,
    /// Human-readable single line output.
    Compact,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Json => "json",
            Self::Compact => "compact",
        };
        formatter.write_str(text)
    }
}

impl FromStr for LogFormat {
    type Err = LogFormatParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" => Ok(Self::Compact),
            other => Err(LogFormatParseError(other.to_owned())),
        }
    }
}

/// Error raised for an unrecognised log format.
#[derive(Debug, Error)]
#[error("unknown log format '{0}'")]
pub struct LogFormatParseError(String);
