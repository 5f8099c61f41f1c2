//! Client-side channel abstraction.
//!
//! A [`ClientCommunication`] owns one configured channel: it knows how to
//! reach the server, performs the login handshake, and hands out proxies
//! that route calls over the channel. The transport-specific part is the
//! internal exchange seam; everything above it (result interpretation,
//! session establishment, proxy wiring) is shared across the embedded,
//! socket, and HTTP families.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use thiserror::Error;

use courier_config::ClientLoginInfo;
use courier_core::{CommandExecutor, ExecutionEnvironment};
use courier_protocol::{
    CommunicationId, InvocationResult, LoginRequest, ServiceDefinition, ServiceDescriptor,
    SessionToken, WireRequest,
};

use crate::errors::CommunicationError;
use crate::proxy::{LoginSession, ServiceProxy};
use crate::stateless::StatelessServiceBridge;

/// Performs one request/response round trip over a channel.
///
/// Implementations open whatever connection the transport needs, send the
/// envelope, and return the single result the server answers with.
pub(crate) trait Exchange: Send + Sync {
    fn round_trip(&self, request: &WireRequest) -> Result<InvocationResult, CommunicationError>;
}

/// One configured channel from the client's point of view.
pub trait ClientCommunication: Send + Sync {
    /// Identity of the channel this communication serves.
    fn communication_id(&self) -> &CommunicationId;

    /// Marks the communication as started. Idempotent.
    fn start(&self);

    /// Marks the communication as stopped. Idempotent; in-flight calls
    /// complete, new calls are rejected with
    /// [`CommunicationError::NotStarted`].
    fn stop(&self);

    /// Whether the communication currently accepts calls.
    fn is_started(&self) -> bool;

    /// Performs the login handshake and returns the established session.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Server`] for rejected credentials and
    /// transport-level errors for everything below.
    fn connect(&self, login: &ClientLoginInfo) -> Result<LoginSession, CommunicationError>;

    /// Releases a session on the server.
    ///
    /// Returns `true` when the server knew the session, `false` when it had
    /// already been released.
    ///
    /// # Errors
    ///
    /// Returns a [`CommunicationError`] when the exchange fails.
    fn disconnect(&self, session: &LoginSession) -> Result<bool, CommunicationError>;

    /// Builds a proxy for a session-bound service.
    ///
    /// Every call on the proxy is routed through the supplied executor
    /// chain before crossing the channel.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::NotStarted`] when the communication is
    /// stopped.
    fn create_stateful_proxy(
        &self,
        executor: Arc<dyn CommandExecutor>,
        environment: ExecutionEnvironment,
        definition: ServiceDefinition,
        session: &LoginSession,
    ) -> Result<ServiceProxy, CommunicationError>;

    /// Builds a bridge to a stateless service.
    ///
    /// The bridge owns the provider identity and accumulated init data
    /// between calls; the server keeps nothing.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::NotStarted`] when the communication is
    /// stopped.
    fn create_stateless_proxy(
        &self,
        executor: Arc<dyn CommandExecutor>,
        environment: ExecutionEnvironment,
        definition: ServiceDefinition,
    ) -> Result<StatelessServiceBridge, CommunicationError>;

    /// Whether a stateless bridge should retry against a fresh connection
    /// after this failure.
    fn should_stateless_entry_try_to_reconnect_on_this_failure(
        &self,
        failure: &CommunicationError,
    ) -> bool {
        failure.is_transient()
    }

    /// Interprets a result expected to carry a plain value.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Server`] for error results and
    /// [`CommunicationError::UnexpectedResult`] for service results.
    fn process_value_result(
        &self,
        result: InvocationResult,
    ) -> Result<Value, CommunicationError> {
        process_value(result)
    }

    /// Interprets a result expected to carry a service descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Server`] for error results and
    /// [`CommunicationError::UnexpectedResult`] for value results.
    fn process_service_result(
        &self,
        result: InvocationResult,
    ) -> Result<ServiceDescriptor, CommunicationError> {
        process_service(result)
    }
}

/// Interprets a result expected to carry a plain value.
pub(crate) fn process_value(result: InvocationResult) -> Result<Value, CommunicationError> {
    match result {
        InvocationResult::Value { value } => Ok(value),
        InvocationResult::Service { .. } => {
            Err(CommunicationError::UnexpectedResult { expected: "value" })
        }
        InvocationResult::Error { kind, message, .. } => {
            Err(CommunicationError::server(kind, message))
        }
    }
}

/// Interprets a result expected to carry a service descriptor.
pub(crate) fn process_service(
    result: InvocationResult,
) -> Result<ServiceDescriptor, CommunicationError> {
    match result {
        InvocationResult::Service { service } => Ok(service),
        InvocationResult::Value { .. } => Err(CommunicationError::UnexpectedResult {
            expected: "service descriptor",
        }),
        InvocationResult::Error { kind, message, .. } => {
            Err(CommunicationError::server(kind, message))
        }
    }
}

/// Performs the login handshake over an exchange.
pub(crate) fn login_over(
    exchange: &dyn Exchange,
    login: &ClientLoginInfo,
) -> Result<LoginSession, CommunicationError> {
    let request = WireRequest::Login(LoginRequest {
        credentials: login.credentials.clone(),
        application: login.application.clone(),
        origin: login.origin.clone(),
    });
    let descriptor = process_service(exchange.round_trip(&request)?)?;
    let session = descriptor
        .session
        .clone()
        .ok_or(CommunicationError::UnexpectedResult {
            expected: "session token",
        })?;
    Ok(LoginSession::new(descriptor, session))
}

/// Releases a session over an exchange.
pub(crate) fn logout_over(
    exchange: &dyn Exchange,
    session: &SessionToken,
) -> Result<bool, CommunicationError> {
    let request = WireRequest::Logout {
        session: session.clone(),
    };
    let value = process_value(exchange.round_trip(&request)?)?;
    value.as_bool().ok_or(CommunicationError::UnexpectedResult {
        expected: "boolean",
    })
}

/// Errors raised by the communication registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A communication is already registered under the id.
    #[error("communication '{0}' is already registered")]
    Duplicate(CommunicationId),
    /// No communication is registered under the id.
    #[error("unknown communication '{0}'")]
    Unknown(CommunicationId),
}

/// Id-keyed table of the communications a client process knows about.
///
/// Lookup failures are terminal: an unknown id is a wiring bug, not a
/// transient condition, so callers must not retry it.
#[derive(Default)]
pub struct CommunicationRegistry {
    entries: RwLock<HashMap<CommunicationId, Arc<dyn ClientCommunication>>>,
}

impl CommunicationRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a communication under its own id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] when the id is already taken.
    pub fn register(
        &self,
        communication: Arc<dyn ClientCommunication>,
    ) -> Result<(), RegistryError> {
        let id = communication.communication_id().clone();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(&id) {
            return Err(RegistryError::Duplicate(id));
        }
        entries.insert(id, communication);
        Ok(())
    }

    /// Looks up a communication by id.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Unknown`] when no communication is
    /// registered under the id.
    pub fn lookup(
        &self,
        id: &CommunicationId,
    ) -> Result<Arc<dyn ClientCommunication>, RegistryError> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| RegistryError::Unknown(id.clone()))
    }

    /// Ids of every registered communication.
    #[must_use]
    pub fn ids(&self) -> Vec<CommunicationId> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }
}

impl std::fmt::Debug for CommunicationRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        formatter
            .debug_struct("CommunicationRegistry")
            .field("entries", &len)
            .finish()
    }
}
