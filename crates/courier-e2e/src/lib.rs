//! End-to-end fixtures: a real daemon plus the services the scenario
//! tests talk to.
//!
//! Each test starts a [`TestServer`] bound to kernel-assigned ports so
//! scenarios can run in parallel, then drives it with `courier-client`
//! communications exactly as an application would.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{Value, json};

use courier_config::{ChannelConfig, Config, SocketEndpoint};
use courier_core::{
    CallContext, Command, CommandFactory, Dispatcher, ExecutionError, FnCommand, Service,
    ServiceError, StaticAuthenticator, StatelessServiceFactory,
};
use courier_protocol::{
    CommunicationId, CompressionSettings, Credentials, Kind, Protocol, ServiceDefinition,
};
use courierd::{BootstrapError, Daemon, StaticConfigLoader, bootstrap_with};

/// Stateful order book: accumulates entries for the lifetime of the
/// server-side service instance.
pub struct OrderBookService {
    entries: Mutex<Vec<Value>>,
}

impl OrderBookService {
    /// Creates an empty order book.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl Default for OrderBookService {
    fn default() -> Self {
        Self::new()
    }
}

impl Service for OrderBookService {
    fn definition(&self) -> ServiceDefinition {
        ServiceDefinition::new("order-book")
    }

    fn operations(&self) -> &[&str] {
        &["add", "list", "fail"]
    }

    fn invoke(
        &self,
        operation: &str,
        arguments: &[Value],
        _context: &CallContext,
    ) -> Result<Value, ServiceError> {
        match operation {
            "add" => {
                let entry = arguments
                    .first()
                    .cloned()
                    .ok_or_else(|| ServiceError::InvalidArguments("entry required".into()))?;
                let mut entries = self
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                entries.push(entry);
                Ok(json!(entries.len()))
            }
            "list" => {
                let entries = self
                    .entries
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(json!(*entries))
            }
            "fail" => Err(ServiceError::IllegalState("order book is locked".into())),
            other => Err(ServiceError::UnknownOperation {
                service: "order-book".to_owned(),
                operation: other.to_owned(),
            }),
        }
    }
}

/// Stateless draft service reconstructed from echoed init data.
struct DraftService {
    data: Value,
}

impl Service for DraftService {
    fn definition(&self) -> ServiceDefinition {
        ServiceDefinition::new("drafts")
    }

    fn operations(&self) -> &[&str] {
        &["peek", "submit"]
    }

    fn invoke(
        &self,
        operation: &str,
        arguments: &[Value],
        _context: &CallContext,
    ) -> Result<Value, ServiceError> {
        match operation {
            "peek" => Ok(self.data.clone()),
            "submit" => Ok(json!({
                "committed": arguments.first().cloned().unwrap_or(Value::Null),
                "from": self.data,
            })),
            other => Err(ServiceError::UnknownOperation {
                service: "drafts".to_owned(),
                operation: other.to_owned(),
            }),
        }
    }
}

/// Factory rebuilding [`DraftService`] instances per call.
pub struct DraftFactory;

impl StatelessServiceFactory for DraftFactory {
    fn definition(&self) -> ServiceDefinition {
        ServiceDefinition::new("drafts")
    }

    fn create(&self, init_data: Option<&Value>) -> Result<Arc<dyn Service>, ServiceError> {
        let data = init_data
            .cloned()
            .ok_or_else(|| ServiceError::InvalidArguments("draft init data required".into()))?;
        if !data.is_object() {
            return Err(ServiceError::InvalidArguments(
                "draft init data must be an object".into(),
            ));
        }
        Ok(Arc::new(DraftService { data }))
    }
}

/// Dispatcher wired with the demo services, stateless factory, and
/// commands the scenarios exercise.
///
/// # Panics
///
/// Panics when a fixture registration is duplicated, which cannot happen
/// on a freshly built dispatcher.
#[must_use]
#[expect(
    clippy::expect_used,
    reason = "a fresh dispatcher cannot hold duplicate registrations"
)]
pub fn demo_dispatcher() -> Arc<Dispatcher> {
    let dispatcher = Dispatcher::builder()
        .authenticator(Arc::new(StaticAuthenticator::new([(
            "amy".to_owned(),
            "secret".to_owned(),
        )])))
        .build();
    dispatcher
        .services()
        .register(Arc::new(OrderBookService::new()))
        .expect("register order book");
    dispatcher
        .stateless()
        .register(Arc::new(DraftFactory))
        .expect("register draft factory");

    dispatcher
        .commands()
        .register("peek-draft", peek_command())
        .expect("register peek command");
    dispatcher
        .commands()
        .register("explode", exploding_command())
        .expect("register explode command");
    Arc::new(dispatcher)
}

fn peek_command() -> Arc<dyn CommandFactory> {
    Arc::new(|_payload: &Value| {
        Ok(Box::new(FnCommand::new(
            "peek-draft",
            |env: &courier_core::ExecutionEnvironment, _event: &courier_core::TriggerEvent| {
                let definition = ServiceDefinition::new("drafts");
                let service = env
                    .registry()
                    .get_in(&definition, env)
                    .ok_or_else(|| ExecutionError::MissingService(definition.clone()))?;
                service
                    .invoke("peek", &[], &CallContext::default())
                    .map_err(|error| ExecutionError::Failed(error.to_string()))
            },
        )) as Box<dyn Command>)
    })
}

fn exploding_command() -> Arc<dyn CommandFactory> {
    Arc::new(|_payload: &Value| {
        Ok(Box::new(FnCommand::new(
            "explode",
            |_env: &courier_core::ExecutionEnvironment,
             _event: &courier_core::TriggerEvent|
             -> courier_core::ExecutionResult {
                Err(ExecutionError::IllegalState(
                    "draft is not executable".into(),
                ))
            },
        )) as Box<dyn Command>)
    })
}

/// Credentials accepted by [`demo_dispatcher`].
#[must_use]
pub fn valid_credentials() -> Credentials {
    Credentials::new("amy", "secret")
}

/// Socket channel bound to a kernel-assigned TCP port.
#[must_use]
pub fn socket_channel(name: &str, compression: CompressionSettings) -> ChannelConfig {
    ChannelConfig {
        id: CommunicationId::new(Protocol::Socket, Kind::ClientServer, name),
        endpoint: Some(SocketEndpoint::tcp("127.0.0.1", 0)),
        compression,
    }
}

/// HTTP channel bound to a kernel-assigned TCP port.
#[must_use]
pub fn http_channel(name: &str, compression: CompressionSettings) -> ChannelConfig {
    ChannelConfig {
        id: CommunicationId::new(Protocol::Http, Kind::ClientServer, name),
        endpoint: Some(SocketEndpoint::tcp("127.0.0.1", 0)),
        compression,
    }
}

/// A serving daemon that shuts its listeners down on drop.
pub struct TestServer {
    daemon: Option<Daemon>,
}

impl TestServer {
    /// Boots and serves a daemon over the given channels.
    ///
    /// # Errors
    ///
    /// Returns a [`BootstrapError`] when any channel cannot be served.
    pub fn start(
        channels: Vec<ChannelConfig>,
        dispatcher: Arc<Dispatcher>,
    ) -> Result<Self, BootstrapError> {
        let config = Config {
            channels,
            ..Config::default()
        };
        let mut daemon = bootstrap_with(&StaticConfigLoader::new(config), dispatcher)?;
        daemon.serve()?;
        Ok(Self {
            daemon: Some(daemon),
        })
    }

    /// Endpoint a channel was actually bound to.
    #[must_use]
    pub fn endpoint(&self, id: &CommunicationId) -> Option<SocketEndpoint> {
        self.daemon
            .as_ref()
            .and_then(|daemon| daemon.bound_endpoint(id))
            .cloned()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(daemon) = self.daemon.take() {
            daemon.shutdown();
        }
    }
}
