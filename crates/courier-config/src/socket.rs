//! Channel endpoint addresses.
//!
//! Endpoints are written as URLs in configuration: `tcp://host:port` for
//! TCP (the port may be omitted to take the well-known default) and
//! `unix:///path/to.sock` for unix domain sockets. The typed
//! [`SocketEndpoint`] is what the daemon binds and the client dials;
//! serde carries the URL form, so a config file holds plain strings.

use std::fmt;
use std::fs::DirBuilder;
use std::str::FromStr;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::defaults::DEFAULT_TCP_PORT;

const TCP_SCHEME: &str = "tcp";
const UNIX_SCHEME: &str = "unix";

/// Where a remote channel binds or connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum SocketEndpoint {
    /// Unix domain socket endpoint.
    Unix {
        /// Filesystem path of the socket.
        path: Utf8PathBuf,
    },
    /// TCP socket endpoint.
    Tcp {
        /// Host name or address.
        host: String,
        /// Port number.
        port: u16,
    },
}

impl SocketEndpoint {
    /// Builds a unix domain socket endpoint.
    #[must_use]
    pub fn unix(path: impl Into<Utf8PathBuf>) -> Self {
        Self::Unix { path: path.into() }
    }

    /// Builds a TCP socket endpoint.
    #[must_use]
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port,
        }
    }

    /// Ensures the directory a unix socket lives in exists with owner-only
    /// permissions. TCP endpoints need no preparation.
    ///
    /// # Errors
    ///
    /// Returns an [`EndpointSetupError`] when the directory cannot be
    /// created.
    pub fn ensure_directories(&self) -> Result<(), EndpointSetupError> {
        let Self::Unix { path } = self else {
            return Ok(());
        };
        let Some(parent) = path.parent() else {
            return Err(EndpointSetupError::NoParentDirectory { path: path.clone() });
        };

        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }

        match builder.create(parent.as_std_path()) {
            Ok(()) => Ok(()),
            Err(source) if source.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
            Err(source) => Err(EndpointSetupError::CreateDirectory {
                path: parent.to_path_buf(),
                source,
            }),
        }
    }
}

impl fmt::Display for SocketEndpoint {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix { path } => write!(formatter, "{UNIX_SCHEME}://{path}"),
            Self::Tcp { host, port } => write!(formatter, "{TCP_SCHEME}://{host}:{port}"),
        }
    }
}

impl FromStr for SocketEndpoint {
    type Err = EndpointParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let url = Url::parse(input).map_err(|source| EndpointParseError::Url {
            input: input.to_owned(),
            source,
        })?;
        match url.scheme() {
            UNIX_SCHEME => {
                if url.path().trim().is_empty() {
                    return Err(EndpointParseError::UnixPath {
                        input: input.to_owned(),
                    });
                }
                Ok(Self::unix(url.path()))
            }
            TCP_SCHEME => {
                let host = url.host_str().ok_or_else(|| EndpointParseError::TcpHost {
                    input: input.to_owned(),
                })?;
                // The port may be left off; the well-known default applies.
                Ok(Self::tcp(host, url.port().unwrap_or(DEFAULT_TCP_PORT)))
            }
            other => Err(EndpointParseError::Scheme {
                scheme: other.to_owned(),
            }),
        }
    }
}

impl From<SocketEndpoint> for String {
    fn from(endpoint: SocketEndpoint) -> Self {
        endpoint.to_string()
    }
}

impl TryFrom<String> for SocketEndpoint {
    type Error = EndpointParseError;

    fn try_from(input: String) -> Result<Self, Self::Error> {
        input.parse()
    }
}

/// Errors encountered while parsing an endpoint URL.
#[derive(Debug, Error)]
pub enum EndpointParseError {
    /// Scheme is neither `tcp` nor `unix`.
    #[error("unsupported endpoint scheme '{scheme}'")]
    Scheme {
        /// Scheme that was requested.
        scheme: String,
    },
    /// TCP URL carries no host.
    #[error("endpoint '{input}' has no TCP host")]
    TcpHost {
        /// Offending endpoint text.
        input: String,
    },
    /// Unix URL carries no socket path.
    #[error("endpoint '{input}' has no socket path")]
    UnixPath {
        /// Offending endpoint text.
        input: String,
    },
    /// Input is not a URL at all.
    #[error("endpoint '{input}' is not a valid URL: {source}")]
    Url {
        /// Offending endpoint text.
        input: String,
        /// Underlying URL parse failure.
        #[source]
        source: url::ParseError,
    },
}

/// Errors raised while preparing a unix socket's directory.
#[derive(Debug, Error)]
pub enum EndpointSetupError {
    /// Socket path has no parent directory to create.
    #[error("socket path '{path}' has no parent directory")]
    NoParentDirectory {
        /// Offending socket path.
        path: Utf8PathBuf,
    },
    /// Socket directory could not be created.
    #[error("failed to create socket directory '{path}': {source}")]
    CreateDirectory {
        /// Directory that could not be created.
        path: Utf8PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },
}
