//! Configuration surface shared by the Courier client and daemon.
//!
//! Configuration is resolved once at startup: a JSON file named by the
//! `COURIER_CONFIG` environment variable (when present) is merged with
//! defaults, and the `COURIER_LOG` variable may override the log filter.
//! Malformed settings and duplicate channel ids are fatal here, never
//! retried (configuration errors are startup errors by design).

mod channel;
mod defaults;
mod logging;
mod socket;

use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_protocol::CommunicationId;

pub use channel::{
    ChannelConfig, ChannelConfigError, ClientConnectionInfo, ClientConnectionInfoBuilder,
    ClientLoginInfo, DeploymentKind,
};
pub use defaults::{DEFAULT_CHANNEL_NAME, DEFAULT_LOG_FILTER, DEFAULT_TCP_PORT};
pub use logging::{LogFormat, LogFormatParseError};
pub use socket::{EndpointParseError, EndpointSetupError, SocketEndpoint};

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_VAR: &str = "COURIER_CONFIG";

/// Environment variable overriding the log filter.
pub const LOG_FILTER_VAR: &str = "COURIER_LOG";

/// Resolved daemon and client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Channels the daemon exposes and clients may target.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
    /// Log filter expression for the tracing subscriber.
    #[serde(default = "defaults::default_log_filter_string")]
    pub log_filter: String,
    /// Log output format.
    #[serde(default = "defaults::default_log_format")]
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            log_filter: defaults::default_log_filter_string(),
            log_format: defaults::default_log_format(),
        }
    }
}

impl Config {
    /// Loads configuration from the environment.
    ///
    /// Reads the file named by `COURIER_CONFIG` when the variable is set,
    /// otherwise starts from defaults; applies the `COURIER_LOG` override;
    /// validates the result.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed, or
    /// when validation fails.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match env::var_os(CONFIG_PATH_VAR) {
            Some(path) => Self::from_file(PathBuf::from(path))?,
            None => Self::default(),
        };
        if let Ok(filter) = env::var(LOG_FILTER_VAR)
            && !filter.trim().is_empty()
        {
            config.log_filter = filter;
        }
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from an explicit file path.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_file(path: PathBuf) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path).map_err(|source| ConfigError::ReadFile {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::ParseFile { path, source })
    }

    /// Validates channel consistency.
    ///
    /// Each channel's protocol/endpoint pairing must be coherent and no two
    /// channels may share a [`CommunicationId`] triple.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Channel`] or [`ConfigError::DuplicateChannel`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for channel in &self.channels {
            channel.validate()?;
            if !seen.insert(&channel.id) {
                return Err(ConfigError::DuplicateChannel {
                    id: channel.id.clone(),
                });
            }
        }
        Ok(())
    }

    /// Looks up a channel by id.
    #[must_use]
    pub fn channel(&self, id: &CommunicationId) -> Option<&ChannelConfig> {
        self.channels.iter().find(|channel| &channel.id == id)
    }

    /// Log filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Log output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }
}

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file '{path}': {source}")]
    ReadFile {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file '{path}': {source}")]
    ParseFile {
        /// File that could not be parsed.
        path: PathBuf,
        /// Underlying parse failure.
        #[source]
        source: serde_json::Error,
    },
    /// A channel's settings are inconsistent.
    #[error(transparent)]
    Channel(#[from] ChannelConfigError),
    /// Two channels share the same id triple.
    #[error("duplicate channel id '{id}'")]
    DuplicateChannel {
        /// Repeated channel id.
        id: CommunicationId,
    },
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use courier_protocol::{CompressionSettings, Kind, Protocol};

    use super::*;

    fn socket_channel(name: &str) -> ChannelConfig {
        ChannelConfig {
            id: CommunicationId::new(Protocol::Socket, Kind::ClientServer, name),
            endpoint: Some(SocketEndpoint::tcp("127.0.0.1", DEFAULT_TCP_PORT)),
            compression: CompressionSettings::None,
        }
    }

    #[test]
    fn default_config_validates() {
        Config::default().validate().expect("default is valid");
    }

    #[test]
    fn duplicate_channel_ids_are_fatal() {
        let config = Config {
            channels: vec![socket_channel("default"), socket_channel("default")],
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateChannel { .. })
        ));
    }

    #[test]
    fn channels_differing_only_by_name_coexist() {
        let config = Config {
            channels: vec![socket_channel("default"), socket_channel("backup")],
            ..Config::default()
        };
        config.validate().expect("distinct names are valid");
    }

    #[test]
    fn loads_config_from_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("courier.json");
        let mut file = std::fs::File::create(&path).expect("create file");
        file.write_all(
            br#"{
                "channels": [
                    {
                        "id": {"protocol": "socket", "kind": "client_server", "name": "default"},
                        "endpoint": "tcp://127.0.0.1:9461"
                    }
                ],
                "log_filter": "debug",
                "log_format": "compact"
            }"#,
        )
        .expect("write file");

        let config = Config::from_file(path).expect("load");
        assert_eq!(config.log_filter(), "debug");
        assert_eq!(config.log_format(), LogFormat::Compact);
        assert_eq!(config.channels.len(), 1);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let result = Config::from_file(PathBuf::from("/nonexistent/courier.json"));
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn channel_lookup_is_by_value_equality() {
        let config = Config {
            channels: vec![socket_channel("default")],
            ..Config::default()
        };
        let id = CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default");
        assert!(config.channel(&id).is_some());
        let other = CommunicationId::new(Protocol::Http, Kind::ClientServer, "default");
        assert!(config.channel(&other).is_none());
    }
}
