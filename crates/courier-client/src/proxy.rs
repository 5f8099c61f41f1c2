//! Client-side proxies for session-bound services.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::debug;

use courier_core::{CommandExecutor, ExecutionEnvironment, ExecutionError, FnCommand, TriggerEvent};
use courier_protocol::{
    CallRequest, ErrorKind, ServiceDefinition, ServiceDescriptor, SessionToken, WireRequest,
};

use crate::communication::{Exchange, process_value};
use crate::errors::CommunicationError;

const PROXY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::proxy");

/// An established session on a channel.
///
/// Wraps the descriptor returned by the login handshake together with the
/// token that binds subsequent calls to the server-side session.
#[derive(Debug, Clone)]
pub struct LoginSession {
    descriptor: ServiceDescriptor,
    token: SessionToken,
}

impl LoginSession {
    pub(crate) fn new(descriptor: ServiceDescriptor, token: SessionToken) -> Self {
        Self { descriptor, token }
    }

    /// Descriptor of the login server the session was established against.
    #[must_use]
    pub const fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    /// Token binding calls to the server-side session.
    #[must_use]
    pub const fn token(&self) -> &SessionToken {
        &self.token
    }
}

/// Proxy for one session-bound remote service.
///
/// Each invocation is wrapped as a command and routed through the proxy's
/// executor chain, so middleware layers (timing, environment substitution,
/// logout-on-drop) observe remote calls exactly like local ones.
pub struct ServiceProxy {
    exchange: Arc<dyn Exchange>,
    executor: Arc<dyn CommandExecutor>,
    environment: ExecutionEnvironment,
    definition: ServiceDefinition,
    session: SessionToken,
}

impl ServiceProxy {
    pub(crate) fn new(
        exchange: Arc<dyn Exchange>,
        executor: Arc<dyn CommandExecutor>,
        environment: ExecutionEnvironment,
        definition: ServiceDefinition,
        session: SessionToken,
    ) -> Self {
        Self {
            exchange,
            executor,
            environment,
            definition,
            session,
        }
    }

    /// Interface this proxy resolves to.
    #[must_use]
    pub const fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    /// Invokes an operation on the remote service.
    ///
    /// The session token is echoed with every call; session affinity lives
    /// in the request, not in the connection.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::Server`] for server-side failures and
    /// transport-level errors for everything below.
    pub fn invoke(
        &self,
        operation: &str,
        arguments: Vec<Value>,
    ) -> Result<Value, CommunicationError> {
        let request = WireRequest::Call(CallRequest {
            target: self.definition.clone(),
            session: Some(self.session.clone()),
            operation: operation.to_owned(),
            arguments,
        });
        debug!(
            target: PROXY_TARGET,
            service = self.definition.name(),
            operation,
            "invoking remote operation"
        );
        let exchange = Arc::clone(&self.exchange);
        run_via_executor(
            self.executor.as_ref(),
            &self.environment,
            operation,
            &TriggerEvent::new("proxy-call"),
            move || process_value(exchange.round_trip(&request)?),
        )
    }
}

impl std::fmt::Debug for ServiceProxy {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ServiceProxy")
            .field("definition", &self.definition)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Runs a remote call through an executor chain, preserving the typed
/// communication failure across the command boundary.
///
/// The executor API deals in [`ExecutionError`]; the original
/// [`CommunicationError`] is stashed on failure and restored afterwards so
/// callers keep the full error structure.
pub(crate) fn run_via_executor(
    executor: &dyn CommandExecutor,
    environment: &ExecutionEnvironment,
    name: &str,
    event: &TriggerEvent,
    call: impl Fn() -> Result<Value, CommunicationError> + Send + Sync,
) -> Result<Value, CommunicationError> {
    let failure: Mutex<Option<CommunicationError>> = Mutex::new(None);
    let command = FnCommand::new(name, |_env: &ExecutionEnvironment, _event: &TriggerEvent| {
        match call() {
            Ok(value) => Ok(value),
            Err(error) => {
                let message = error.to_string();
                *failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(error);
                Err(ExecutionError::Failed(message))
            }
        }
    });
    match executor.execute_command(&command, environment, event) {
        Ok(value) => Ok(value),
        Err(error) => {
            let stashed = failure
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            Err(stashed.unwrap_or_else(|| {
                CommunicationError::server(ErrorKind::Internal, error.to_string())
            }))
        }
    }
}
