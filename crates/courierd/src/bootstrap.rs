//! Daemon bootstrap orchestration.
//!
//! The bootstrap sequence loads configuration, installs telemetry, and
//! binds one listener per configured remote channel. Embedded channels
//! need no listener; clients drive the shared [`Dispatcher`] in process.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use courier_config::{Config, ConfigError, EndpointSetupError, SocketEndpoint};
use courier_core::Dispatcher;
use courier_protocol::{CommunicationId, Protocol};

use crate::dispatch::{DispatchConnectionHandler, HttpConnectionHandler};
use crate::telemetry::{self, TelemetryError, TelemetrySettings};
use crate::transport::{ConnectionHandler, ListenerError, ListenerHandle, SocketListener};

const BOOTSTRAP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::bootstrap");

/// Trait abstracting configuration loading for testability.
pub trait ConfigLoader: Send + Sync {
    /// Loads the daemon configuration.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when the configuration cannot be produced.
    fn load(&self) -> Result<Config, ConfigError>;
}

/// Loader that delegates to [`Config::load`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Config::load()
    }
}

/// Loader that hands out a fixed configuration; used by tests.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps a prepared configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap and serving.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load or validate.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// A remote channel has no endpoint to bind.
    #[error("channel '{channel}' has no endpoint to bind")]
    MissingEndpoint {
        /// Offending channel id.
        channel: String,
    },
    /// Socket filesystem preparation failed.
    #[error("failed to prepare socket for channel '{channel}': {source}")]
    Socket {
        /// Offending channel id.
        channel: String,
        /// Filesystem error reported while preparing the socket directory.
        #[source]
        source: EndpointSetupError,
    },
    /// A channel listener failed to bind or run.
    #[error("listener for channel '{channel}' failed: {source}")]
    Listener {
        /// Offending channel id.
        channel: String,
        /// Underlying listener error.
        #[source]
        source: ListenerError,
    },
}

/// A running daemon: resolved configuration plus its live listeners.
pub struct Daemon {
    config: Config,
    dispatcher: Arc<Dispatcher>,
    telemetry: &'static TelemetrySettings,
    channels: Vec<ServingChannel>,
}

struct ServingChannel {
    id: CommunicationId,
    endpoint: SocketEndpoint,
    handle: ListenerHandle,
}

impl Daemon {
    /// Accessor for the resolved configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The dispatcher serving every channel.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Telemetry settings the process subscriber runs with.
    #[must_use]
    pub const fn telemetry(&self) -> &'static TelemetrySettings {
        self.telemetry
    }

    /// Binds and starts a listener for every configured remote channel.
    ///
    /// Embedded channels are skipped. A TCP channel configured with port 0
    /// is bound to a kernel-assigned port; [`Daemon::bound_endpoint`]
    /// reports the connectable endpoint.
    ///
    /// # Errors
    ///
    /// Returns a [`BootstrapError`] when any channel cannot be served;
    /// channels started before the failure keep running until shutdown.
    pub fn serve(&mut self) -> Result<(), BootstrapError> {
        let channels = self.config.channels.clone();
        for channel in &channels {
            let handler: Arc<dyn ConnectionHandler> = match channel.id.protocol {
                Protocol::Embedded => {
                    debug!(
                        target: BOOTSTRAP_TARGET,
                        channel = %channel.id,
                        "embedded channel needs no listener"
                    );
                    continue;
                }
                Protocol::Socket => Arc::new(DispatchConnectionHandler::new(
                    Arc::clone(&self.dispatcher),
                    channel.compression,
                )),
                Protocol::Http => {
                    Arc::new(HttpConnectionHandler::new(Arc::clone(&self.dispatcher)))
                }
            };

            let endpoint =
                channel
                    .endpoint
                    .clone()
                    .ok_or_else(|| BootstrapError::MissingEndpoint {
                        channel: channel.id.to_string(),
                    })?;
            endpoint
                .ensure_directories()
                .map_err(|source| BootstrapError::Socket {
                    channel: channel.id.to_string(),
                    source,
                })?;

            let listener =
                SocketListener::bind(&endpoint).map_err(|source| BootstrapError::Listener {
                    channel: channel.id.to_string(),
                    source,
                })?;
            let bound = listener.local_endpoint();
            let handle = listener
                .start(handler)
                .map_err(|source| BootstrapError::Listener {
                    channel: channel.id.to_string(),
                    source,
                })?;

            info!(
                target: BOOTSTRAP_TARGET,
                channel = %channel.id,
                endpoint = %bound,
                "channel serving"
            );
            self.channels.push(ServingChannel {
                id: channel.id.clone(),
                endpoint: bound,
                handle,
            });
        }
        Ok(())
    }

    /// Endpoint a channel is actually served on, once [`Daemon::serve`]
    /// has bound it.
    #[must_use]
    pub fn bound_endpoint(&self, id: &CommunicationId) -> Option<&SocketEndpoint> {
        self.channels
            .iter()
            .find(|channel| channel.id == *id)
            .map(|channel| &channel.endpoint)
    }

    /// Signals every listener to stop and waits for them to finish.
    pub fn shutdown(self) {
        for channel in &self.channels {
            channel.handle.shutdown();
        }
        for channel in self.channels {
            if let Err(error) = channel.handle.join() {
                warn!(
                    target: BOOTSTRAP_TARGET,
                    channel = %channel.id,
                    error = %error,
                    "listener did not shut down cleanly"
                );
            }
        }
    }

    /// Blocks on the listener threads; returns when all have stopped.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] wrapped in a
    /// [`BootstrapError::Listener`] when an accept loop panicked.
    pub fn wait(self) -> Result<(), BootstrapError> {
        for channel in self.channels {
            let id = channel.id.to_string();
            channel
                .handle
                .join()
                .map_err(|source| BootstrapError::Listener {
                    channel: id,
                    source,
                })?;
        }
        Ok(())
    }
}

/// Bootstraps the daemon around the supplied dispatcher.
///
/// Loads and validates configuration, installs telemetry, and returns a
/// daemon ready to [`Daemon::serve`].
///
/// # Errors
///
/// Returns a [`BootstrapError`] describing the failed stage.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    dispatcher: Arc<Dispatcher>,
) -> Result<Daemon, BootstrapError> {
    let config = loader
        .load()
        .map_err(|source| BootstrapError::Configuration { source })?;
    config
        .validate()
        .map_err(|source| BootstrapError::Configuration { source })?;
    let telemetry =
        telemetry::initialise(&config).map_err(|source| BootstrapError::Telemetry { source })?;

    info!(
        target: BOOTSTRAP_TARGET,
        channels = config.channels.len(),
        "daemon configured"
    );
    Ok(Daemon {
        config,
        dispatcher,
        telemetry,
        channels: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpStream;

    use courier_config::ChannelConfig;
    use courier_core::StaticAuthenticator;
    use courier_protocol::{
        CompressionSettings, Credentials, Kind, LoginRequest, WireRequest,
    };

    use super::*;

    fn socket_channel_config() -> Config {
        Config {
            channels: vec![ChannelConfig {
                id: CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default"),
                endpoint: Some(SocketEndpoint::tcp("127.0.0.1", 0)),
                compression: CompressionSettings::None,
            }],
            ..Config::default()
        }
    }

    fn dispatcher() -> Arc<Dispatcher> {
        Arc::new(
            Dispatcher::builder()
                .authenticator(Arc::new(StaticAuthenticator::new([(
                    "amy".to_owned(),
                    "secret".to_owned(),
                )])))
                .build(),
        )
    }

    #[test]
    fn serve_binds_configured_socket_channels() {
        let loader = StaticConfigLoader::new(socket_channel_config());
        let mut daemon = bootstrap_with(&loader, dispatcher()).expect("bootstrap");
        daemon.serve().expect("serve");

        let id = CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default");
        let endpoint = daemon.bound_endpoint(&id).expect("bound endpoint");
        let SocketEndpoint::Tcp { host, port } = endpoint else {
            panic!("expected tcp endpoint");
        };
        assert_ne!(*port, 0);

        let mut client = TcpStream::connect((host.as_str(), *port)).expect("connect");
        let line = WireRequest::Login(LoginRequest {
            credentials: Credentials::new("amy", "secret"),
            application: "console".to_owned(),
            origin: None,
        })
        .to_line()
        .expect("encode");
        client.write_all(&line).expect("write");
        client.flush().expect("flush");
        let mut response = String::new();
        BufReader::new(&client)
            .read_line(&mut response)
            .expect("read");
        assert!(response.contains(r#""result":"service""#));

        daemon.shutdown();
    }

    #[test]
    fn embedded_channels_are_not_bound() {
        let config = Config {
            channels: vec![ChannelConfig {
                id: CommunicationId::new(Protocol::Embedded, Kind::ClientServer, "local"),
                endpoint: None,
                compression: CompressionSettings::None,
            }],
            ..Config::default()
        };
        let loader = StaticConfigLoader::new(config);
        let mut daemon = bootstrap_with(&loader, dispatcher()).expect("bootstrap");
        daemon.serve().expect("serve");
        let id = CommunicationId::new(Protocol::Embedded, Kind::ClientServer, "local");
        assert!(daemon.bound_endpoint(&id).is_none());
        daemon.shutdown();
    }
}
