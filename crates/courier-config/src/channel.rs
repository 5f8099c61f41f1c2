//! Channel and connection configuration.
//!
//! A channel pairs a [`CommunicationId`] with the transport settings needed
//! to reach it. The client assembles a [`ClientConnectionInfo`] once through
//! its builder and treats it as immutable for the lifetime of the session;
//! a [`ClientLoginInfo`] extends it with the data consumed by one login
//! attempt.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use courier_protocol::{CommunicationId, CompressionSettings, Credentials, Protocol};

use crate::socket::SocketEndpoint;

/// Platform the client is deployed on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentKind {
    /// Installed desktop client.
    #[default]
    Desktop,
    /// Browser-delivered client.
    Web,
    /// Headless integration, e.g. a batch job or another service.
    Service,
}

/// One configured channel on the daemon side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Identity of the channel.
    pub id: CommunicationId,
    /// Endpoint the channel binds to. Absent for embedded channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<SocketEndpoint>,
    /// Compression applied to the channel's streams.
    #[serde(default)]
    pub compression: CompressionSettings,
}

impl ChannelConfig {
    /// Validates protocol/endpoint consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigError::MissingEndpoint`] when a remote
    /// protocol has no endpoint, and
    /// [`ChannelConfigError::UnexpectedEndpoint`] when an embedded channel
    /// carries one.
    pub fn validate(&self) -> Result<(), ChannelConfigError> {
        match (self.id.protocol, &self.endpoint) {
            (Protocol::Embedded, Some(_)) => Err(ChannelConfigError::UnexpectedEndpoint {
                id: self.id.clone(),
            }),
            (Protocol::Socket | Protocol::Http, None) => {
                Err(ChannelConfigError::MissingEndpoint {
                    id: self.id.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Immutable endpoint descriptor owned by a client session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConnectionInfo {
    communication_id: CommunicationId,
    deployment: DeploymentKind,
    compression: CompressionSettings,
    endpoint: Option<SocketEndpoint>,
    binding: Option<String>,
}

impl ClientConnectionInfo {
    /// Starts building connection info for the given channel.
    #[must_use]
    pub const fn builder(communication_id: CommunicationId) -> ClientConnectionInfoBuilder {
        ClientConnectionInfoBuilder {
            communication_id,
            deployment: DeploymentKind::Desktop,
            compression: CompressionSettings::None,
            endpoint: None,
            binding: None,
        }
    }

    /// Channel this connection targets.
    #[must_use]
    pub const fn communication_id(&self) -> &CommunicationId {
        &self.communication_id
    }

    /// Client deployment kind.
    #[must_use]
    pub const fn deployment(&self) -> DeploymentKind {
        self.deployment
    }

    /// Compression applied to the connection's streams.
    #[must_use]
    pub const fn compression(&self) -> CompressionSettings {
        self.compression
    }

    /// Remote endpoint, absent for embedded channels.
    #[must_use]
    pub const fn endpoint(&self) -> Option<&SocketEndpoint> {
        self.endpoint.as_ref()
    }

    /// Protocol-specific binding name, when configured.
    #[must_use]
    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }
}

/// Builder assembling one immutable [`ClientConnectionInfo`].
#[derive(Debug, Clone)]
pub struct ClientConnectionInfoBuilder {
    communication_id: CommunicationId,
    deployment: DeploymentKind,
    compression: CompressionSettings,
    endpoint: Option<SocketEndpoint>,
    binding: Option<String>,
}

impl ClientConnectionInfoBuilder {
    /// Sets the deployment kind.
    #[must_use]
    pub const fn deployment(mut self, deployment: DeploymentKind) -> Self {
        self.deployment = deployment;
        self
    }

    /// Sets the compression choice.
    #[must_use]
    pub const fn compression(mut self, compression: CompressionSettings) -> Self {
        self.compression = compression;
        self
    }

    /// Sets the remote endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: SocketEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Sets the protocol-specific binding name.
    #[must_use]
    pub fn binding(mut self, binding: impl Into<String>) -> Self {
        self.binding = Some(binding.into());
        self
    }

    /// Validates and finishes the connection info.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigError::MissingEndpoint`] when a remote
    /// protocol has no endpoint configured.
    pub fn build(self) -> Result<ClientConnectionInfo, ChannelConfigError> {
        let info = ClientConnectionInfo {
            communication_id: self.communication_id,
            deployment: self.deployment,
            compression: self.compression,
            endpoint: self.endpoint,
            binding: self.binding,
        };
        match (info.communication_id.protocol, &info.endpoint) {
            (Protocol::Socket | Protocol::Http, None) => {
                Err(ChannelConfigError::MissingEndpoint {
                    id: info.communication_id,
                })
            }
            _ => Ok(info),
        }
    }
}

/// Connection info plus the data consumed by one login attempt.
///
/// Created per attempt and handed to `connect`; not retained after an
/// authentication failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientLoginInfo {
    /// Connection the login travels over.
    pub connection: ClientConnectionInfo,
    /// Credentials to present.
    pub credentials: Credentials,
    /// Application context the client runs in.
    pub application: String,
    /// Originating network address, when known.
    pub origin: Option<String>,
}

impl ClientLoginInfo {
    /// Builds login info without an originating address.
    #[must_use]
    pub const fn new(
        connection: ClientConnectionInfo,
        credentials: Credentials,
        application: String,
    ) -> Self {
        Self {
            connection,
            credentials,
            application,
            origin: None,
        }
    }

    /// Records the originating network address.
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }
}

/// Errors raised while validating channel configuration.
#[derive(Debug, Error)]
pub enum ChannelConfigError {
    /// A remote channel was configured without an endpoint.
    #[error("channel '{id}' uses a remote protocol but has no endpoint")]
    MissingEndpoint {
        /// Offending channel id.
        id: CommunicationId,
    },
    /// An embedded channel was configured with an endpoint.
    #[error("embedded channel '{id}' must not carry an endpoint")]
    UnexpectedEndpoint {
        /// Offending channel id.
        id: CommunicationId,
    },
}
