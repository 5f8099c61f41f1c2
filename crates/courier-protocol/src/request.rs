//! Request envelopes and their wire parsing.
//!
//! Every client call is one envelope serialized as a single JSONL line (or
//! one HTTP body). [`WireRequest::parse`] mirrors the daemon-side contract:
//! trailing whitespace is trimmed, empty lines are rejected, and the parsed
//! envelope is validated before dispatch.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::service::ServiceDefinition;
use crate::stateless::StatelessRequest;

/// Opaque token binding calls to a server-side session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionToken(String);

impl SessionToken {
    /// Wraps a raw token value.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Authentication entry presented at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Account identifier.
    pub user: String,
    /// Shared secret for the account.
    pub secret: String,
}

impl Credentials {
    /// Builds a credentials pair.
    #[must_use]
    pub fn new(user: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            secret: secret.into(),
        }
    }
}

/// Login call establishing a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginRequest {
    /// Credentials to authenticate.
    pub credentials: Credentials,
    /// Application context the client runs in.
    pub application: String,
    /// Originating network address, when the transport knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// Session-bound service invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRequest {
    /// Target service definition.
    pub target: ServiceDefinition,
    /// Session the call belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionToken>,
    /// Operation within the target's dispatch table.
    pub operation: String,
    /// Positional arguments forwarded to the operation.
    #[serde(default)]
    pub arguments: Vec<Value>,
}

/// Envelope covering every request a channel can carry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WireRequest {
    /// Establish a session.
    Login(LoginRequest),
    /// Invoke an operation on a session-bound service.
    Call(CallRequest),
    /// Self-contained stateless invocation.
    Stateless(StatelessRequest),
    /// Release a session.
    Logout {
        /// Session to release.
        session: SessionToken,
    },
}

impl WireRequest {
    /// Parses one JSONL line into an envelope.
    ///
    /// Trailing ASCII whitespace (including the newline delimiter) is
    /// trimmed before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Malformed`] when the line is empty or does
    /// not match the envelope schema.
    pub fn parse(line: &[u8]) -> Result<Self, RequestError> {
        let trimmed = trim_trailing_whitespace(line);
        if trimmed.is_empty() {
            return Err(RequestError::malformed("empty request line"));
        }
        serde_json::from_slice(trimmed).map_err(RequestError::from_json_error)
    }

    /// Validates that required fields are present and non-blank.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidStructure`] when a target definition
    /// or operation is blank, or when a stateless request omits its
    /// definition.
    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            Self::Login(login) => {
                if login.credentials.user.trim().is_empty() {
                    return Err(RequestError::invalid_structure("login user is empty"));
                }
                Ok(())
            }
            Self::Call(call) => {
                if call.target.is_blank() {
                    return Err(RequestError::invalid_structure("call target is empty"));
                }
                if call.operation.trim().is_empty() {
                    return Err(RequestError::invalid_structure("call operation is empty"));
                }
                Ok(())
            }
            Self::Stateless(request) => {
                if request.definition.is_blank() {
                    return Err(RequestError::invalid_structure(
                        "stateless definition is empty",
                    ));
                }
                Ok(())
            }
            Self::Logout { session } => {
                if session.as_str().is_empty() {
                    return Err(RequestError::invalid_structure("logout session is empty"));
                }
                Ok(())
            }
        }
    }

    /// Serializes the envelope as one JSONL line (newline included).
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Serialize`] when encoding fails.
    pub fn to_line(&self) -> Result<Vec<u8>, RequestError> {
        let mut line = serde_json::to_vec(self).map_err(RequestError::Serialize)?;
        line.push(b'\n');
        Ok(line)
    }
}

/// Trims trailing ASCII whitespace from a byte slice.
fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|byte| !byte.is_ascii_whitespace())
        .map_or(0, |pos| pos + 1);
    bytes.get(..end).unwrap_or(bytes)
}

/// Errors surfaced while parsing or encoding request envelopes.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Line could not be parsed as a request envelope.
    #[error("malformed request: {message}")]
    Malformed {
        /// Parse failure description.
        message: String,
        /// Underlying serde error, when one exists.
        #[source]
        source: Option<serde_json::Error>,
    },
    /// Envelope parsed but violates a structural invariant.
    #[error("invalid request structure: {message}")]
    InvalidStructure {
        /// Violated invariant description.
        message: String,
    },
    /// Envelope could not be serialized.
    #[error("failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
}

impl RequestError {
    /// Creates a malformed error from a serde failure.
    #[must_use]
    pub fn from_json_error(source: serde_json::Error) -> Self {
        Self::Malformed {
            message: source.to_string(),
            source: Some(source),
        }
    }

    /// Creates a malformed error with a custom message.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
            source: None,
        }
    }

    /// Creates an invalid structure error.
    #[must_use]
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}
