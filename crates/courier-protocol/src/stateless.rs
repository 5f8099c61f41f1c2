//! Stateless request snapshots.
//!
//! A stateless channel carries no server-side session. Continuity is
//! reconstructed on every call from the data the client echoes back: the
//! provider identity issued on the first contact plus the accumulated init
//! data. Each [`StatelessRequest`] is an immutable snapshot assembled by its
//! builder; the client-side bridge owns the "current" state between calls.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::service::ServiceDefinition;

/// Server-issued token correlating stateless calls of one logical session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderIdentity(String);

impl ProviderIdentity {
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

impl fmt::Display for ProviderIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

/// Operation-specific payload of a stateless request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum StatelessOperation {
    /// First contact: asks the server to issue a provider identity.
    Init,
    /// Runs a command against the reconstructed service state.
    ExecuteCommand {
        /// Named command and its payload.
        command: Value,
        /// Event that triggered the execution.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        event: Option<Value>,
    },
    /// Submits accumulated changes.
    Submit {
        /// Data to commit.
        commit_data: Value,
    },
}

/// One self-contained stateless call.
///
/// Always carries the target definition; the provider identity is optional
/// only on the initial [`StatelessOperation::Init`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatelessRequest {
    /// Target service definition.
    pub definition: ServiceDefinition,
    /// Identity echoed from the init response, once known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderIdentity>,
    /// Accumulated init data re-sent on every call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub init_data: Option<Value>,
    /// Operation payload.
    #[serde(flatten)]
    pub operation: StatelessOperation,
}

impl StatelessRequest {
    /// Starts building a request for the given definition.
    #[must_use]
    pub const fn builder(definition: ServiceDefinition) -> StatelessRequestBuilder {
        StatelessRequestBuilder {
            definition,
            provider: None,
            init_data: None,
        }
    }
}

/// Builder assembling one immutable [`StatelessRequest`] snapshot.
#[derive(Debug, Clone)]
pub struct StatelessRequestBuilder {
    definition: ServiceDefinition,
    provider: Option<ProviderIdentity>,
    init_data: Option<Value>,
}

impl StatelessRequestBuilder {
    /// Echoes a previously issued provider identity.
    #[must_use]
    pub fn provider(mut self, provider: ProviderIdentity) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Carries the accumulated init data.
    #[must_use]
    pub fn init_data(mut self, init_data: Value) -> Self {
        self.init_data = Some(init_data);
        self
    }

    /// Finishes as an init call.
    #[must_use]
    pub fn init(self) -> StatelessRequest {
        self.finish(StatelessOperation::Init)
    }

    /// Finishes as a command execution.
    #[must_use]
    pub fn execute_command(self, command: Value, event: Option<Value>) -> StatelessRequest {
        self.finish(StatelessOperation::ExecuteCommand { command, event })
    }

    /// Finishes as a submit call.
    #[must_use]
    pub fn submit(self, commit_data: Value) -> StatelessRequest {
        self.finish(StatelessOperation::Submit { commit_data })
    }

    fn finish(self, operation: StatelessOperation) -> StatelessRequest {
        StatelessRequest {
            definition: self.definition,
            provider: self.provider,
            init_data: self.init_data,
            operation,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn init_request_omits_provider() {
        let request = StatelessRequest::builder(ServiceDefinition::new("orders"))
            .init_data(json!({"tenant": "acme"}))
            .init();
        let line = serde_json::to_string(&request).expect("serialize");
        assert!(!line.contains("provider"));
        assert!(line.contains("\"operation\":\"init\""));
    }

    #[test]
    fn execute_request_round_trips_full_snapshot() {
        let request = StatelessRequest::builder(ServiceDefinition::new("orders"))
            .provider(ProviderIdentity::new("p-17"))
            .init_data(json!({"tenant": "acme"}))
            .execute_command(json!({"name": "echo", "payload": 1}), Some(json!("click")));
        let line = serde_json::to_string(&request).expect("serialize");
        let back: StatelessRequest = serde_json::from_str(&line).expect("deserialize");
        assert_eq!(back, request);
        assert_eq!(back.provider, Some(ProviderIdentity::new("p-17")));
    }
}
