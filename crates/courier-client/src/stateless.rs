//! Client-side bridge to stateless services.
//!
//! The server keeps no state between stateless calls; the bridge owns the
//! continuity instead. It stashes the provider identity issued by the init
//! handshake plus the accumulated init data and echoes both with every
//! subsequent call so the server can reconstruct the service instance.
//! The bridge is caller-serialized: one logical caller drives it at a time,
//! so it takes `&mut self` for state transitions and needs no locking.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use courier_core::{CommandExecutor, CommandSpec, ExecutionEnvironment, TriggerEvent};
use courier_protocol::{
    InvocationResult, ProviderIdentity, RequestError, ServiceDefinition, StatelessRequest,
    WireRequest,
};

use crate::communication::{Exchange, process_service, process_value};
use crate::errors::CommunicationError;
use crate::proxy::run_via_executor;

const BRIDGE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::stateless");

/// Reconnect decision applied to a failed stateless exchange.
type ReconnectPolicy = Box<dyn Fn(&CommunicationError) -> bool + Send + Sync>;

/// Bridge carrying one logical stateless session.
pub struct StatelessServiceBridge {
    exchange: Arc<dyn Exchange>,
    executor: Arc<dyn CommandExecutor>,
    environment: ExecutionEnvironment,
    definition: ServiceDefinition,
    reconnect: ReconnectPolicy,
    provider: Option<ProviderIdentity>,
    init_data: Option<Value>,
}

impl StatelessServiceBridge {
    pub(crate) fn new(
        exchange: Arc<dyn Exchange>,
        executor: Arc<dyn CommandExecutor>,
        environment: ExecutionEnvironment,
        definition: ServiceDefinition,
        reconnect: ReconnectPolicy,
    ) -> Self {
        Self {
            exchange,
            executor,
            environment,
            definition,
            reconnect,
            provider: None,
            init_data: None,
        }
    }

    /// Interface this bridge resolves to.
    #[must_use]
    pub const fn definition(&self) -> &ServiceDefinition {
        &self.definition
    }

    /// Provider identity issued by the init handshake, once known.
    #[must_use]
    pub const fn provider(&self) -> Option<&ProviderIdentity> {
        self.provider.as_ref()
    }

    /// Whether the init handshake has completed.
    #[must_use]
    pub const fn is_initialized(&self) -> bool {
        self.provider.is_some()
    }

    /// Performs the init handshake and stores the issued provider identity.
    ///
    /// The transition is atomic from the caller's point of view: on any
    /// failure the bridge keeps its previous provider and init data.
    ///
    /// # Errors
    ///
    /// Returns a [`CommunicationError`] when the handshake fails; the
    /// bridge state is unchanged.
    pub fn init_provider(&mut self, init_data: Value) -> Result<(), CommunicationError> {
        let request = WireRequest::Stateless(
            StatelessRequest::builder(self.definition.clone())
                .init_data(init_data.clone())
                .init(),
        );
        let descriptor = process_service(self.round_trip_with_retry(&request)?)?;
        let provider = descriptor
            .provider
            .ok_or(CommunicationError::UnexpectedResult {
                expected: "provider identity",
            })?;
        debug!(
            target: BRIDGE_TARGET,
            service = self.definition.name(),
            provider = %provider,
            "stateless provider initialised"
        );
        self.provider = Some(provider);
        self.init_data = Some(init_data);
        Ok(())
    }

    /// Executes a named command against the reconstructed service state.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::NotInitialized`] before the init
    /// handshake, otherwise a [`CommunicationError`] describing the failed
    /// exchange.
    pub fn execute_command(
        &self,
        spec: &CommandSpec,
        event: Option<TriggerEvent>,
    ) -> Result<Value, CommunicationError> {
        let provider = self.require_provider()?;
        let command = encode(spec)?;
        let wire_event = event.as_ref().map(encode).transpose()?;
        let request = WireRequest::Stateless(
            self.snapshot(provider)
                .execute_command(command, wire_event),
        );
        let trigger = event.unwrap_or_else(|| TriggerEvent::new("stateless-call"));
        run_via_executor(
            self.executor.as_ref(),
            &self.environment,
            &spec.name,
            &trigger,
            || process_value(self.round_trip_with_retry(&request)?),
        )
    }

    /// Submits accumulated changes.
    ///
    /// # Errors
    ///
    /// Returns [`CommunicationError::NotInitialized`] before the init
    /// handshake, otherwise a [`CommunicationError`] describing the failed
    /// exchange.
    pub fn submit(&self, commit_data: Value) -> Result<Value, CommunicationError> {
        let provider = self.require_provider()?;
        let request = WireRequest::Stateless(self.snapshot(provider).submit(commit_data));
        run_via_executor(
            self.executor.as_ref(),
            &self.environment,
            "submit",
            &TriggerEvent::new("stateless-submit"),
            || process_value(self.round_trip_with_retry(&request)?),
        )
    }

    /// Releases the bridge's local state.
    ///
    /// There is nothing to release on the server; subsequent calls need a
    /// fresh [`StatelessServiceBridge::init_provider`].
    pub fn close(&mut self) {
        debug!(
            target: BRIDGE_TARGET,
            service = self.definition.name(),
            "stateless bridge closed"
        );
        self.provider = None;
        self.init_data = None;
    }

    fn require_provider(&self) -> Result<ProviderIdentity, CommunicationError> {
        self.provider
            .clone()
            .ok_or(CommunicationError::NotInitialized)
    }

    /// Builder pre-filled with the echoed continuity data.
    fn snapshot(&self, provider: ProviderIdentity) -> courier_protocol::StatelessRequestBuilder {
        let mut builder = StatelessRequest::builder(self.definition.clone()).provider(provider);
        if let Some(init_data) = &self.init_data {
            builder = builder.init_data(init_data.clone());
        }
        builder
    }

    /// One exchange, retried at most once when the failure is judged
    /// recoverable by the owning communication's reconnect policy.
    fn round_trip_with_retry(
        &self,
        request: &WireRequest,
    ) -> Result<InvocationResult, CommunicationError> {
        match self.exchange.round_trip(request) {
            Ok(result) => Ok(result),
            Err(failure) if (self.reconnect)(&failure) => {
                debug!(
                    target: BRIDGE_TARGET,
                    service = self.definition.name(),
                    failure = %failure,
                    "retrying stateless exchange after transient failure"
                );
                self.exchange.round_trip(request)
            }
            Err(failure) => Err(failure),
        }
    }
}

impl std::fmt::Debug for StatelessServiceBridge {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("StatelessServiceBridge")
            .field("definition", &self.definition)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, CommunicationError> {
    serde_json::to_value(value)
        .map_err(|source| CommunicationError::EncodeRequest(RequestError::Serialize(source)))
}
