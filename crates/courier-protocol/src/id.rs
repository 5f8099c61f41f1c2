//! Channel identification for protocol selection.
//!
//! A [`CommunicationId`] names one logical channel as a `protocol × kind ×
//! name` triple. Registries key transport implementations by value equality
//! of the triple; the id itself is created at configuration time and never
//! mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport family carried by a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    /// In-process dispatch with no serialization boundary.
    Embedded,
    /// JSONL exchange over a TCP or Unix stream socket.
    Socket,
    /// HTTP/1.1 POST exchange.
    Http,
}

impl Protocol {
    /// Returns the canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Embedded => "embedded",
            Self::Socket => "socket",
            Self::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = CommunicationIdParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "embedded" => Ok(Self::Embedded),
            "socket" => Ok(Self::Socket),
            "http" => Ok(Self::Http),
            other => Err(CommunicationIdParseError::UnknownProtocol(
                other.to_owned(),
            )),
        }
    }
}

/// Purpose of a channel within an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Business service invocation after a session is established.
    ClientServer,
    /// Authentication traffic establishing a session.
    Login,
}

impl Kind {
    /// Returns the canonical lower-case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ClientServer => "client_server",
            Self::Login => "login",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = CommunicationIdParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input {
            "client_server" => Ok(Self::ClientServer),
            "login" => Ok(Self::Login),
            other => Err(CommunicationIdParseError::UnknownKind(other.to_owned())),
        }
    }
}

/// Identifies one logical channel within an application.
///
/// Two ids compare equal exactly when protocol, kind, and name all match;
/// the hash is consistent with that equality. Within one application the
/// triple must name exactly one transport configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommunicationId {
    /// Transport family selecting the client implementation.
    pub protocol: Protocol,
    /// Communication purpose distinguishing channels of the same protocol.
    pub kind: Kind,
    /// Disambiguates multiple configured channels of the same protocol and
    /// kind.
    pub name: String,
}

impl CommunicationId {
    /// Builds an id from its three parts.
    #[must_use]
    pub fn new(protocol: Protocol, kind: Kind, name: impl Into<String>) -> Self {
        Self {
            protocol,
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for CommunicationId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}/{}/{}", self.protocol, self.kind, self.name)
    }
}

impl FromStr for CommunicationId {
    type Err = CommunicationIdParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let mut parts = input.splitn(3, '/');
        let protocol = parts
            .next()
            .ok_or_else(|| CommunicationIdParseError::Malformed(input.to_owned()))?
            .parse()?;
        let kind = parts
            .next()
            .ok_or_else(|| CommunicationIdParseError::Malformed(input.to_owned()))?
            .parse()?;
        let name = parts
            .next()
            .filter(|name| !name.is_empty())
            .ok_or_else(|| CommunicationIdParseError::Malformed(input.to_owned()))?;
        Ok(Self::new(protocol, kind, name))
    }
}

/// Errors encountered while parsing a [`CommunicationId`] from text.
#[derive(Debug, Error)]
pub enum CommunicationIdParseError {
    /// Protocol segment was not recognised.
    #[error("unknown protocol '{0}'")]
    UnknownProtocol(String),
    /// Kind segment was not recognised.
    #[error("unknown communication kind '{0}'")]
    UnknownKind(String),
    /// Input did not have the `protocol/kind/name` shape.
    #[error("malformed communication id '{0}'")]
    Malformed(String),
}
