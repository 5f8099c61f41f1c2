//! Service dispatch table and registry.
//!
//! Services are addressed by name through an explicit dispatch table rather
//! than runtime reflection: each implementation declares the operations it
//! answers to and receives calls as `(operation, arguments)` pairs. The
//! registry is read-mostly — registration happens at bootstrap or session
//! setup, lookups happen concurrently from request-handling threads.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;

use courier_protocol::{ErrorKind, ServiceDefinition, SessionToken};

use crate::executor::ExecutionEnvironment;

/// Per-call context handed to a service invocation.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Session the call belongs to, when one was established.
    pub session: Option<SessionToken>,
    /// Originating network address, when the transport knows it.
    pub origin: Option<String>,
}

impl CallContext {
    /// Context for a session-bound call.
    #[must_use]
    pub const fn for_session(session: SessionToken) -> Self {
        Self {
            session: Some(session),
            origin: None,
        }
    }
}

/// A server-side service addressable through the dispatch table.
pub trait Service: Send + Sync {
    /// Definition the service answers to.
    fn definition(&self) -> ServiceDefinition;

    /// Operations the service exposes.
    fn operations(&self) -> &[&str];

    /// Invokes one operation.
    ///
    /// Implementations may assume the operation has been checked against
    /// [`Service::operations`] by the invocation handler.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] describing the business failure.
    fn invoke(
        &self,
        operation: &str,
        arguments: &[Value],
        context: &CallContext,
    ) -> Result<Value, ServiceError>;
}

/// Failures raised by service invocations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Requested entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Arguments did not match the operation's expectations.
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
    /// Caller lacks a valid session or permission.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// Target refused the call in its current state.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// No service is registered under the requested definition.
    #[error("no service registered for '{0}'")]
    UnknownService(String),
    /// The service does not expose the requested operation.
    #[error("service '{service}' has no operation '{operation}'")]
    UnknownOperation {
        /// Service that was addressed.
        service: String,
        /// Operation that was requested.
        operation: String,
    },
    /// Unclassified failure inside the service.
    #[error("internal service error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Maps the error onto its wire classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::UnknownService(_) => ErrorKind::UnknownService,
            Self::UnknownOperation { .. } => ErrorKind::UnknownOperation,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Read-mostly lookup of services by definition.
///
/// Writes occur at bootstrap or session-registration time; lookups are safe
/// from any number of request-handling threads.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a service under its definition.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceRegistryError::Duplicate`] when a service with the
    /// same definition is already registered; existing registrations are
    /// never silently overwritten.
    pub fn register(&self, service: Arc<dyn Service>) -> Result<(), ServiceRegistryError> {
        let definition = service.definition();
        let mut services = self
            .services
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if services.contains_key(definition.name()) {
            return Err(ServiceRegistryError::Duplicate {
                name: definition.name().to_owned(),
            });
        }
        services.insert(definition.name().to_owned(), service);
        Ok(())
    }

    /// Looks a service up by definition.
    #[must_use]
    pub fn get(&self, definition: &ServiceDefinition) -> Option<Arc<dyn Service>> {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(definition.name())
            .cloned()
    }

    /// Looks a service up, narrowed by an execution environment.
    ///
    /// The environment's overlay registry takes precedence, letting a
    /// substituted environment expose per-call instances in front of the
    /// shared registry.
    #[must_use]
    pub fn get_in(
        &self,
        definition: &ServiceDefinition,
        environment: &ExecutionEnvironment,
    ) -> Option<Arc<dyn Service>> {
        environment
            .overlay()
            .and_then(|overlay| overlay.get(definition))
            .or_else(|| self.get(definition))
    }

    /// Number of registered services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.services
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no services are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceRegistry")
            .field("services", &self.len())
            .finish()
    }
}

/// Errors raised while registering services.
#[derive(Debug, Error)]
pub enum ServiceRegistryError {
    /// A service with the same definition is already registered.
    #[error("service '{name}' is already registered")]
    Duplicate {
        /// Name that was registered twice.
        name: String,
    },
}


#[cfg(test)]
mod tests {
    #![expect(
        clippy::expect_used,
        reason = "test code uses expect for clarity and assertions"
    )]

    use std::sync::Arc;

    use super::test_support::EchoService;
    use super::*;

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ServiceRegistry::new();
        registry
            .register(Arc::new(EchoService::new("orders")))
            .expect("first registration");
        let result = registry.register(Arc::new(EchoService::new("orders")));
        assert!(matches!(
            result,
            Err(ServiceRegistryError::Duplicate { .. })
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_is_by_definition_name() {
        let registry = ServiceRegistry::new();
        registry
            .register(Arc::new(EchoService::new("orders")))
            .expect("register");
        assert!(registry.get(&ServiceDefinition::new("orders")).is_some());
        assert!(registry.get(&ServiceDefinition::new("billing")).is_none());
    }

    #[test]
    fn environment_overlay_takes_precedence() {
        let shared = Arc::new(ServiceRegistry::new());
        shared
            .register(Arc::new(EchoService::new("orders")))
            .expect("register shared");

        let overlay = Arc::new(ServiceRegistry::new());
        overlay
            .register(Arc::new(EchoService::new("scratch")))
            .expect("register overlay");

        let environment =
            ExecutionEnvironment::new(Arc::clone(&shared)).with_overlay(Arc::clone(&overlay));

        assert!(
            shared
                .get_in(&ServiceDefinition::new("scratch"), &environment)
                .is_some(),
            "overlay services are visible through the environment"
        );
        assert!(
            shared
                .get_in(&ServiceDefinition::new("orders"), &environment)
                .is_some(),
            "shared services remain visible"
        );
    }
}
