//! Error types for connection dispatch.

use std::io;

use thiserror::Error;

use courier_protocol::{ErrorKind, InvocationResult, RequestError};

/// Errors raised while serving one connection exchange.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Reading the request from the stream failed.
    #[error("failed to read request: {source}")]
    Read {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Request exceeded the configured size limit.
    #[error("request of {size} bytes exceeds limit of {limit} bytes")]
    RequestTooLarge {
        /// Observed request size so far.
        size: usize,
        /// Enforced limit.
        limit: usize,
    },
    /// Request envelope could not be parsed or failed validation.
    #[error(transparent)]
    Request(#[from] RequestError),
    /// Response could not be encoded.
    #[error("failed to encode response: {source}")]
    Encode {
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
    /// Writing the response to the stream failed.
    #[error("failed to write response: {source}")]
    Write {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

impl DispatchError {
    /// Wraps a stream read failure.
    #[must_use]
    pub fn read(source: io::Error) -> Self {
        Self::Read { source }
    }

    /// Wraps a stream write failure.
    #[must_use]
    pub fn write(source: io::Error) -> Self {
        Self::Write { source }
    }

    /// Renders the error as a wire result for the peer.
    ///
    /// Framing and size problems are the caller's fault and classify as
    /// invalid arguments; stream failures classify as transport errors.
    #[must_use]
    pub fn to_result(&self) -> InvocationResult {
        let kind = match self {
            Self::RequestTooLarge { .. } | Self::Request(_) => ErrorKind::InvalidArguments,
            Self::Read { .. } | Self::Encode { .. } | Self::Write { .. } => ErrorKind::Transport,
        };
        InvocationResult::error(kind, self.to_string())
    }
}
