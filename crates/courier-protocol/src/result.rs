//! Invocation result envelopes.
//!
//! Every exchange over a Courier channel terminates in exactly one
//! [`InvocationResult`] line. The envelope is a tagged sum so that error
//! information crosses the transport as explicit data; no exception identity
//! is expected to survive serialization.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::ServiceDescriptor;

/// Classification of a failure crossing the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Requested entity does not exist.
    NotFound,
    /// Arguments did not match the operation's expectations.
    InvalidArguments,
    /// Caller lacks a valid session or credentials.
    Unauthorized,
    /// Target refused the call in its current state.
    IllegalState,
    /// No service is registered under the requested definition.
    UnknownService,
    /// The service does not expose the requested operation.
    UnknownOperation,
    /// Transport-level failure observed while serving the call.
    Transport,
    /// Unclassified server-side failure.
    Internal,
}

impl ErrorKind {
    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidArguments => "invalid_arguments",
            Self::Unauthorized => "unauthorized",
            Self::IllegalState => "illegal_state",
            Self::UnknownService => "unknown_service",
            Self::UnknownOperation => "unknown_operation",
            Self::Transport => "transport",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Outcome of one server-side invocation, as sent back to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InvocationResult {
    /// Plain value produced by the call.
    Value {
        /// The raw result value.
        value: Value,
    },
    /// Handle to a (possibly fresh) remote service.
    Service {
        /// Descriptor the client turns into a new proxy.
        service: ServiceDescriptor,
    },
    /// Failure captured at the dispatch boundary.
    Error {
        /// Failure classification.
        kind: ErrorKind,
        /// Human-readable description.
        message: String,
        /// Underlying cause chain, when one was recorded.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<String>,
    },
}

impl InvocationResult {
    /// Wraps a raw value.
    #[must_use]
    pub const fn value(value: Value) -> Self {
        Self::Value { value }
    }

    /// Wraps a service descriptor.
    #[must_use]
    pub const fn service(service: ServiceDescriptor) -> Self {
        Self::Service { service }
    }

    /// Builds an error result without a recorded cause.
    #[must_use]
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::Error {
            kind,
            message: message.into(),
            cause: None,
        }
    }

    /// Builds an error result with a cause chain.
    #[must_use]
    pub fn error_with_cause(
        kind: ErrorKind,
        message: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self::Error {
            kind,
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    /// True for error results.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::service::ServiceDefinition;

    use super::*;

    #[test]
    fn value_result_round_trips() {
        let result = InvocationResult::value(json!({"total": 3}));
        let line = serde_json::to_string(&result).expect("serialize");
        assert!(line.contains("\"result\":\"value\""));
        let back: InvocationResult = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(back, result);
    }

    #[test]
    fn error_result_keeps_kind_and_cause() {
        let result = InvocationResult::error_with_cause(
            ErrorKind::IllegalState,
            "service not ready",
            "registry still loading",
        );
        let line = serde_json::to_string(&result).expect("serialize");
        let back: InvocationResult = serde_json::from_str(&line).expect("deserialize");
        assert!(back.is_error());
        let InvocationResult::Error { kind, cause, .. } = back else {
            panic!("expected error result");
        };
        assert_eq!(kind, ErrorKind::IllegalState);
        assert_eq!(cause.as_deref(), Some("registry still loading"));
    }

    #[test]
    fn service_result_carries_descriptor() {
        let descriptor = ServiceDescriptor::new(ServiceDefinition::new("login-server"));
        let result = InvocationResult::service(descriptor.clone());
        let line = serde_json::to_string(&result).expect("serialize");
        assert!(line.contains("\"result\":\"service\""));
        let back: InvocationResult = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(back, InvocationResult::Service {
            service: descriptor
        });
    }
}
