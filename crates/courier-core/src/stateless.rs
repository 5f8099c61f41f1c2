//! Server-side support for stateless channels.
//!
//! A stateless server holds nothing between calls. Logical continuity is
//! reconstructed on every request: the host rebuilds the target service
//! from the init data the client echoes, and the provider identity issued
//! on the first contact is only a correlation token, never a key into
//! retained state.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

use courier_protocol::{ProviderIdentity, ServiceDefinition};

use crate::service::{Service, ServiceError, ServiceRegistryError};

/// Rebuilds a stateless service instance from echoed init data.
pub trait StatelessServiceFactory: Send + Sync {
    /// Definition the factory serves.
    fn definition(&self) -> ServiceDefinition;

    /// Builds a fresh instance for one call.
    ///
    /// # Errors
    ///
    /// Returns a [`ServiceError`] when the init data cannot reconstruct a
    /// usable instance.
    fn create(&self, init_data: Option<&Value>) -> Result<Arc<dyn Service>, ServiceError>;
}

/// Table of stateless factories plus the identity issuer.
pub struct StatelessServiceHost {
    factories: RwLock<HashMap<String, Arc<dyn StatelessServiceFactory>>>,
    nonce: u64,
    counter: AtomicU64,
}

impl Default for StatelessServiceHost {
    fn default() -> Self {
        Self::new()
    }
}

impl StatelessServiceHost {
    /// Creates an empty host.
    #[must_use]
    pub fn new() -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the low 64 bits of the clock are enough for a per-process nonce"
        )]
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        Self {
            factories: RwLock::new(HashMap::new()),
            nonce,
            counter: AtomicU64::new(0),
        }
    }

    /// Registers a factory under its definition.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceRegistryError::Duplicate`] for a repeated
    /// definition.
    pub fn register(
        &self,
        factory: Arc<dyn StatelessServiceFactory>,
    ) -> Result<(), ServiceRegistryError> {
        let name = factory.definition().name().to_owned();
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(&name) {
            return Err(ServiceRegistryError::Duplicate { name });
        }
        factories.insert(name, factory);
        Ok(())
    }

    /// Rebuilds the service instance for one call.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownService`] for an unregistered
    /// definition, or the factory's error for unusable init data.
    pub fn create(
        &self,
        definition: &ServiceDefinition,
        init_data: Option<&Value>,
    ) -> Result<Arc<dyn Service>, ServiceError> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(definition.name())
            .cloned()
            .ok_or_else(|| ServiceError::UnknownService(definition.name().to_owned()))?;
        factory.create(init_data)
    }

    /// Issues a fresh provider identity.
    #[must_use]
    pub fn issue_identity(&self) -> ProviderIdentity {
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        ProviderIdentity::new(format!("p-{:x}-{sequence}", self.nonce))
    }
}

impl std::fmt::Debug for StatelessServiceHost {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        formatter
            .debug_struct("StatelessServiceHost")
            .field("factories", &len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![expect(
        clippy::expect_used,
        reason = "test code uses expect for clarity and assertions"
    )]

    use serde_json::json;

    use crate::service::CallContext;

    use super::*;

    struct CounterFactory;

    struct CounterService {
        start: i64,
    }

    impl Service for CounterService {
        fn definition(&self) -> ServiceDefinition {
            ServiceDefinition::new("counter")
        }

        fn operations(&self) -> &[&str] {
            &["current"]
        }

        fn invoke(
            &self,
            _operation: &str,
            _arguments: &[Value],
            _context: &CallContext,
        ) -> Result<Value, ServiceError> {
            Ok(json!(self.start))
        }
    }

    impl StatelessServiceFactory for CounterFactory {
        fn definition(&self) -> ServiceDefinition {
            ServiceDefinition::new("counter")
        }

        fn create(&self, init_data: Option<&Value>) -> Result<Arc<dyn Service>, ServiceError> {
            let start = init_data
                .and_then(Value::as_i64)
                .ok_or_else(|| ServiceError::InvalidArguments("init data must be an integer".into()))?;
            Ok(Arc::new(CounterService { start }))
        }
    }

    #[test]
    fn rebuilds_instances_from_init_data() {
        let host = StatelessServiceHost::new();
        host.register(Arc::new(CounterFactory)).expect("register");

        let service = host
            .create(&ServiceDefinition::new("counter"), Some(&json!(7)))
            .expect("create");
        let value = service
            .invoke("current", &[], &CallContext::default())
            .expect("invoke");
        assert_eq!(value, json!(7));
    }

    #[test]
    fn unknown_definitions_are_rejected() {
        let host = StatelessServiceHost::new();
        let result = host.create(&ServiceDefinition::new("missing"), None);
        assert!(matches!(result, Err(ServiceError::UnknownService(_))));
    }

    #[test]
    fn bad_init_data_surfaces_the_factory_error() {
        let host = StatelessServiceHost::new();
        host.register(Arc::new(CounterFactory)).expect("register");
        let result = host.create(&ServiceDefinition::new("counter"), Some(&json!("seven")));
        assert!(matches!(result, Err(ServiceError::InvalidArguments(_))));
    }

    #[test]
    fn issued_identities_are_unique() {
        let host = StatelessServiceHost::new();
        let first = host.issue_identity();
        let second = host.issue_identity();
        assert_ne!(first, second);
    }

    #[test]
    fn duplicate_factories_are_rejected() {
        let host = StatelessServiceHost::new();
        host.register(Arc::new(CounterFactory)).expect("register");
        assert!(host.register(Arc::new(CounterFactory)).is_err());
    }
}
