//! Wire-safe service handles.

use serde::{Deserialize, Serialize};

use crate::request::SessionToken;
use crate::stateless::ProviderIdentity;

/// Names a service interface in the dispatch table.
///
/// Dispatch is by name rather than by runtime type information: each service
/// registered on the server declares the definition it answers to, and the
/// client addresses calls to that definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceDefinition {
    name: String,
}

impl ServiceDefinition {
    /// Builds a definition from a service name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// True when the name is empty or whitespace-only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.name.trim().is_empty()
    }
}

impl core::fmt::Display for ServiceDefinition {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Wire-safe handle to a remote service instance.
///
/// Returned inside service invocation results. For a stateful service the
/// descriptor carries the session token binding subsequent calls to the
/// server-side session; for a stateless service it may carry a freshly
/// issued provider identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Interface the handle resolves to.
    pub definition: ServiceDefinition,
    /// Provider identity issued by a stateless init call, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderIdentity>,
    /// Session token binding the handle to a server-side session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionToken>,
}

impl ServiceDescriptor {
    /// Builds a bare descriptor with neither provider nor session.
    #[must_use]
    pub fn new(definition: ServiceDefinition) -> Self {
        Self {
            definition,
            provider: None,
            session: None,
        }
    }

    /// Attaches a provider identity.
    #[must_use]
    pub fn with_provider(mut self, provider: ProviderIdentity) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attaches a session token.
    #[must_use]
    pub fn with_session(mut self, session: SessionToken) -> Self {
        self.session = Some(session);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn definition_serializes_as_plain_string() {
        let definition = ServiceDefinition::new("order-service");
        let json = serde_json::to_string(&definition).expect("serialize");
        assert_eq!(json, "\"order-service\"");
    }

    #[test]
    fn blank_definitions_are_detected() {
        assert!(ServiceDefinition::new("  ").is_blank());
        assert!(!ServiceDefinition::new("orders").is_blank());
    }

    #[test]
    fn descriptor_omits_absent_fields() {
        let descriptor = ServiceDescriptor::new(ServiceDefinition::new("orders"));
        let json = serde_json::to_string(&descriptor).expect("serialize");
        assert!(!json.contains("provider"));
        assert!(!json.contains("session"));
    }
}
