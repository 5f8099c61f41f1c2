//! Client-side communication failures.

use std::io;

use thiserror::Error;

use courier_protocol::{ErrorKind, RequestError};

/// Failures observed while talking to a Courier channel.
#[derive(Debug, Error)]
pub enum CommunicationError {
    /// Endpoint host could not be resolved.
    #[error("failed to resolve endpoint {endpoint}: {source}")]
    Resolve {
        /// Endpoint being resolved.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Connection to the endpoint failed.
    #[error("failed to connect to {endpoint}: {source}")]
    Connect {
        /// Endpoint being connected.
        endpoint: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Request envelope could not be encoded.
    #[error(transparent)]
    EncodeRequest(#[from] RequestError),
    /// Request could not be written to the channel.
    #[error("failed to send request: {source}")]
    SendRequest {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Response could not be read from the channel.
    #[error("failed to read response: {source}")]
    ReadResponse {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Response bytes did not parse as a result envelope.
    #[error("failed to parse response: {source}")]
    ParseMessage {
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// The channel closed without producing a response.
    #[error("channel closed without a response")]
    MissingResponse,
    /// The server answered with an error result.
    #[error("server error ({kind}): {message}")]
    Server {
        /// Wire classification reported by the server.
        kind: ErrorKind,
        /// Server-side failure description.
        message: String,
    },
    /// The server answered with a result of the wrong shape.
    #[error("unexpected result shape, expected {expected}")]
    UnexpectedResult {
        /// What the caller was waiting for.
        expected: &'static str,
    },
    /// The communication has not been started.
    #[error("communication has not been started")]
    NotStarted,
    /// A stateless bridge was used before its provider was initialised.
    #[error("stateless bridge has no provider identity; call init_provider first")]
    NotInitialized,
    /// Unix sockets are unavailable on this platform.
    #[cfg(not(unix))]
    #[error("unix sockets are unsupported for endpoint {0}")]
    UnsupportedUnixTransport(String),
}

impl CommunicationError {
    /// Wraps an error result received from the server.
    #[must_use]
    pub fn server(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Server {
            kind,
            message: message.into(),
        }
    }

    /// Whether a retry against a fresh connection could plausibly succeed.
    ///
    /// The table is deliberately explicit: connection-establishment
    /// failures, broken writes, read timeouts, and server-reported
    /// transport faults are transient; everything else is terminal.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connect { source, .. } => matches!(
                source.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::NotFound
                    | io::ErrorKind::AddrNotAvailable
            ),
            Self::SendRequest { source } => matches!(
                source.kind(),
                io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
            ),
            Self::ReadResponse { source } => matches!(
                source.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
            ),
            Self::Server {
                kind: ErrorKind::Transport,
                ..
            } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn io_error(kind: io::ErrorKind) -> io::Error {
        io::Error::new(kind, "test")
    }

    #[test]
    fn connection_refused_is_transient() {
        let error = CommunicationError::Connect {
            endpoint: "tcp://127.0.0.1:9461".to_owned(),
            source: io_error(io::ErrorKind::ConnectionRefused),
        };
        assert!(error.is_transient());
    }

    #[test]
    fn broken_pipe_on_send_is_transient() {
        let error = CommunicationError::SendRequest {
            source: io_error(io::ErrorKind::BrokenPipe),
        };
        assert!(error.is_transient());
    }

    #[test]
    fn server_transport_fault_is_transient() {
        assert!(CommunicationError::server(ErrorKind::Transport, "hiccup").is_transient());
    }

    #[test]
    fn business_errors_are_terminal() {
        assert!(!CommunicationError::server(ErrorKind::IllegalState, "locked").is_transient());
        assert!(!CommunicationError::server(ErrorKind::Unauthorized, "nope").is_transient());
        assert!(!CommunicationError::MissingResponse.is_transient());
        assert!(!CommunicationError::NotStarted.is_transient());
    }

    #[test]
    fn permission_denied_on_connect_is_terminal() {
        let error = CommunicationError::Connect {
            endpoint: "tcp://127.0.0.1:9461".to_owned(),
            source: io_error(io::ErrorKind::PermissionDenied),
        };
        assert!(!error.is_transient());
    }
}
