//! Server-side invocation handling.
//!
//! The [`InvocationHandler`] performs the actual service call and captures
//! its outcome — value or failure — into a wire-safe [`InvocationResult`].
//! The [`Dispatcher`] sits above it and routes whole request envelopes:
//! logins through the session manager, session-bound calls through the
//! service registry, and stateless requests through the provider host and
//! the command execution pipeline. Transports hand parsed envelopes in and
//! send the returned envelope back; they never interpret outcomes
//! themselves.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::debug;

use courier_protocol::{
    CallRequest, ErrorKind, InvocationResult, LoginRequest, ProviderIdentity, ServiceDefinition,
    ServiceDescriptor, StatelessOperation, StatelessRequest, WireRequest,
};

use crate::executor::{
    CommandExecutor, CommandRegistry, CommandSpec, DirectExecutor, ExecutionEnvironment,
    TimingExecutor, TriggerEvent,
};
use crate::service::{CallContext, Service, ServiceError, ServiceRegistry};
use crate::session::{Authenticator, SessionManager, StaticAuthenticator};
use crate::stateless::StatelessServiceHost;

/// Tracing target for dispatch operations.
const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Definition of the service handle returned by a successful login.
pub const LOGIN_SERVER: &str = "login-server";

/// Whether the server retains state for the caller between calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Session-bound: the server holds state for the proxy's lifetime.
    Stateful,
    /// Per-call: continuity is reconstructed from echoed data.
    Stateless,
}

/// Last-chance translation hook before an error crosses the transport.
///
/// A translator may downgrade selected failures to sentinel results — a
/// missing entity becoming a null value rather than a fault — while leaving
/// everything else to be wrapped as an error envelope.
pub trait ExceptionTranslator: Send + Sync {
    /// Returns a replacement result, or `None` to let the error pass.
    fn translate(
        &self,
        error: &ServiceError,
        definition: &ServiceDefinition,
        operation: &str,
    ) -> Option<InvocationResult>;
}

/// Translator that passes every error through untouched.
#[derive(Debug, Default, Clone, Copy)]
struct PassthroughTranslator;

impl ExceptionTranslator for PassthroughTranslator {
    fn translate(
        &self,
        _error: &ServiceError,
        _definition: &ServiceDefinition,
        _operation: &str,
    ) -> Option<InvocationResult> {
        None
    }
}

/// Translator downgrading not-found failures to a null value result.
#[derive(Debug, Default, Clone, Copy)]
pub struct NotFoundTranslator;

impl ExceptionTranslator for NotFoundTranslator {
    fn translate(
        &self,
        error: &ServiceError,
        _definition: &ServiceDefinition,
        _operation: &str,
    ) -> Option<InvocationResult> {
        matches!(error, ServiceError::NotFound(_)).then(|| InvocationResult::value(Value::Null))
    }
}

/// Performs service calls and captures their outcomes for the wire.
pub struct InvocationHandler {
    translator: Arc<dyn ExceptionTranslator>,
}

impl Default for InvocationHandler {
    fn default() -> Self {
        Self::new(Arc::new(PassthroughTranslator))
    }
}

impl InvocationHandler {
    /// Builds a handler with the given translation hook.
    #[must_use]
    pub const fn new(translator: Arc<dyn ExceptionTranslator>) -> Self {
        Self { translator }
    }

    /// Performs the actual call on the target service.
    ///
    /// This is a local call: the raw value or error is returned to the
    /// caller unwrapped, not yet packaged for transport.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::UnknownOperation`] when the operation is not
    /// in the target's dispatch table, or the service's own error.
    pub fn invoke_server_object_method(
        &self,
        service: &dyn Service,
        operation: &str,
        arguments: &[Value],
        context: &CallContext,
    ) -> Result<Value, ServiceError> {
        if !service.operations().contains(&operation) {
            return Err(ServiceError::UnknownOperation {
                service: service.definition().name().to_owned(),
                operation: operation.to_owned(),
            });
        }
        service.invoke(operation, arguments, context)
    }

    /// Wraps a successful raw result into a wire-safe envelope.
    ///
    /// Only stateless dispatch may attach a freshly issued provider
    /// identity; when one is present the envelope becomes a service
    /// descriptor the client turns into a handle.
    #[must_use]
    pub fn handle_execution_result(
        &self,
        state: StateKind,
        value: Value,
        definition: &ServiceDefinition,
        fresh_provider: Option<ProviderIdentity>,
    ) -> InvocationResult {
        match (state, fresh_provider) {
            (StateKind::Stateless, Some(provider)) => InvocationResult::service(
                ServiceDescriptor::new(definition.clone()).with_provider(provider),
            ),
            _ => InvocationResult::value(value),
        }
    }

    /// Translates or wraps an error at the transport boundary.
    ///
    /// The translation hook runs first; errors it declines are wrapped into
    /// an error envelope carrying the classification and message, so the
    /// client can re-raise an equivalent failure.
    #[must_use]
    pub fn handle_execution_exception(
        &self,
        error: &ServiceError,
        definition: &ServiceDefinition,
        operation: &str,
    ) -> InvocationResult {
        if let Some(result) = self.translator.translate(error, definition, operation) {
            return result;
        }
        debug!(
            target: DISPATCH_TARGET,
            service = definition.name(),
            operation,
            kind = %error.kind(),
            "invocation failed"
        );
        InvocationResult::error(error.kind(), error.to_string())
    }
}

/// Routes request envelopes to the core's subsystems.
pub struct Dispatcher {
    services: Arc<ServiceRegistry>,
    commands: Arc<CommandRegistry>,
    sessions: Arc<SessionManager>,
    stateless: Arc<StatelessServiceHost>,
    handler: InvocationHandler,
    executor: Arc<dyn CommandExecutor>,
}

impl Dispatcher {
    /// Starts building a dispatcher.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Shared service registry, for bootstrap registration.
    #[must_use]
    pub const fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    /// Command factory table, for bootstrap registration.
    #[must_use]
    pub const fn commands(&self) -> &Arc<CommandRegistry> {
        &self.commands
    }

    /// Session manager.
    #[must_use]
    pub const fn sessions(&self) -> &Arc<SessionManager> {
        &self.sessions
    }

    /// Stateless provider host, for bootstrap registration.
    #[must_use]
    pub const fn stateless(&self) -> &Arc<StatelessServiceHost> {
        &self.stateless
    }

    /// Routes one parsed envelope and produces the response envelope.
    ///
    /// Business failures never escape as panics or lost errors: every
    /// outcome is captured in the returned [`InvocationResult`].
    #[must_use]
    pub fn dispatch(&self, request: &WireRequest, origin: Option<&str>) -> InvocationResult {
        match request {
            WireRequest::Login(login) => self.dispatch_login(login, origin),
            WireRequest::Logout { session } => {
                InvocationResult::value(json!(self.sessions.logout(session)))
            }
            WireRequest::Call(call) => self.dispatch_call(call, origin),
            WireRequest::Stateless(stateless) => self.dispatch_stateless(stateless, origin),
        }
    }

    fn dispatch_login(&self, login: &LoginRequest, origin: Option<&str>) -> InvocationResult {
        let mut request = login.clone();
        if request.origin.is_none() {
            request.origin = origin.map(str::to_owned);
        }
        match self.sessions.login(&request) {
            Ok(token) => InvocationResult::service(
                ServiceDescriptor::new(ServiceDefinition::new(LOGIN_SERVER)).with_session(token),
            ),
            Err(error) => InvocationResult::error(ErrorKind::Unauthorized, error.to_string()),
        }
    }

    fn dispatch_call(&self, call: &CallRequest, origin: Option<&str>) -> InvocationResult {
        let Some(token) = &call.session else {
            return InvocationResult::error(
                ErrorKind::Unauthorized,
                "stateful call carries no session token",
            );
        };
        if self.sessions.resolve(token).is_none() {
            return InvocationResult::error(ErrorKind::Unauthorized, "unknown or expired session");
        }
        let Some(service) = self.services.get(&call.target) else {
            return InvocationResult::error(
                ErrorKind::UnknownService,
                format!("no service registered for '{}'", call.target.name()),
            );
        };

        debug!(
            target: DISPATCH_TARGET,
            service = call.target.name(),
            operation = %call.operation,
            "dispatching stateful call"
        );

        let context = CallContext {
            session: Some(token.clone()),
            origin: origin.map(str::to_owned),
        };
        match self.handler.invoke_server_object_method(
            service.as_ref(),
            &call.operation,
            &call.arguments,
            &context,
        ) {
            Ok(value) => self.handler.handle_execution_result(
                StateKind::Stateful,
                value,
                &call.target,
                None,
            ),
            Err(error) => {
                self.handler
                    .handle_execution_exception(&error, &call.target, &call.operation)
            }
        }
    }

    fn dispatch_stateless(
        &self,
        request: &StatelessRequest,
        origin: Option<&str>,
    ) -> InvocationResult {
        match &request.operation {
            StatelessOperation::Init => self.stateless_init(request),
            StatelessOperation::ExecuteCommand { command, event } => {
                self.stateless_execute(request, command, event.as_ref())
            }
            StatelessOperation::Submit { commit_data } => {
                self.stateless_submit(request, commit_data, origin)
            }
        }
    }

    fn stateless_init(&self, request: &StatelessRequest) -> InvocationResult {
        // Creating the instance validates the init data before an identity
        // is handed out.
        match self
            .stateless
            .create(&request.definition, request.init_data.as_ref())
        {
            Ok(_) => {
                let identity = self.stateless.issue_identity();
                debug!(
                    target: DISPATCH_TARGET,
                    service = request.definition.name(),
                    provider = %identity,
                    "stateless provider initialised"
                );
                self.handler.handle_execution_result(
                    StateKind::Stateless,
                    Value::Null,
                    &request.definition,
                    Some(identity),
                )
            }
            Err(error) => {
                self.handler
                    .handle_execution_exception(&error, &request.definition, "init")
            }
        }
    }

    fn stateless_execute(
        &self,
        request: &StatelessRequest,
        command: &Value,
        event: Option<&Value>,
    ) -> InvocationResult {
        if request.provider.is_none() {
            return InvocationResult::error(
                ErrorKind::IllegalState,
                "execute_command before init: provider identity is required",
            );
        }

        let service = match self
            .stateless
            .create(&request.definition, request.init_data.as_ref())
        {
            Ok(service) => service,
            Err(error) => {
                return self.handler.handle_execution_exception(
                    &error,
                    &request.definition,
                    "execute_command",
                );
            }
        };

        let spec = match parse_command_spec(command) {
            Ok(spec) => spec,
            Err(result) => return result,
        };
        let trigger = match parse_trigger_event(event) {
            Ok(trigger) => trigger,
            Err(result) => return result,
        };

        let overlay = ServiceRegistry::new();
        if let Err(error) = overlay.register(service) {
            return InvocationResult::error(ErrorKind::Internal, error.to_string());
        }
        let environment =
            ExecutionEnvironment::new(Arc::clone(&self.services)).with_overlay(Arc::new(overlay));

        let runnable = match self.commands.resolve(&spec) {
            Ok(runnable) => runnable,
            Err(error) => return InvocationResult::error(error.kind(), error.to_string()),
        };

        match self
            .executor
            .execute_command(runnable.as_ref(), &environment, &trigger)
        {
            Ok(value) => self.handler.handle_execution_result(
                StateKind::Stateless,
                value,
                &request.definition,
                None,
            ),
            Err(error) => InvocationResult::error(error.kind(), error.to_string()),
        }
    }

    fn stateless_submit(
        &self,
        request: &StatelessRequest,
        commit_data: &Value,
        origin: Option<&str>,
    ) -> InvocationResult {
        if request.provider.is_none() {
            return InvocationResult::error(
                ErrorKind::IllegalState,
                "submit before init: provider identity is required",
            );
        }
        let service = match self
            .stateless
            .create(&request.definition, request.init_data.as_ref())
        {
            Ok(service) => service,
            Err(error) => {
                return self
                    .handler
                    .handle_execution_exception(&error, &request.definition, "submit");
            }
        };
        let context = CallContext {
            session: None,
            origin: origin.map(str::to_owned),
        };
        match self.handler.invoke_server_object_method(
            service.as_ref(),
            "submit",
            std::slice::from_ref(commit_data),
            &context,
        ) {
            Ok(value) => self.handler.handle_execution_result(
                StateKind::Stateless,
                value,
                &request.definition,
                None,
            ),
            Err(error) => {
                self.handler
                    .handle_execution_exception(&error, &request.definition, "submit")
            }
        }
    }
}

fn parse_command_spec(command: &Value) -> Result<CommandSpec, InvocationResult> {
    serde_json::from_value(command.clone()).map_err(|error| {
        InvocationResult::error(
            ErrorKind::InvalidArguments,
            format!("malformed command spec: {error}"),
        )
    })
}

fn parse_trigger_event(event: Option<&Value>) -> Result<TriggerEvent, InvocationResult> {
    event.map_or_else(
        || Ok(TriggerEvent::default()),
        |value| {
            serde_json::from_value(value.clone()).map_err(|error| {
                InvocationResult::error(
                    ErrorKind::InvalidArguments,
                    format!("malformed trigger event: {error}"),
                )
            })
        },
    )
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Dispatcher")
            .field("services", &self.services)
            .field("sessions", &self.sessions)
            .finish()
    }
}

/// Assembles a [`Dispatcher`] from its collaborators.
///
/// Defaults: an empty static authenticator (every login fails), a timing
/// executor over direct execution, and no exception translation.
pub struct DispatcherBuilder {
    authenticator: Arc<dyn Authenticator>,
    translator: Arc<dyn ExceptionTranslator>,
    executor: Arc<dyn CommandExecutor>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            authenticator: Arc::new(StaticAuthenticator::default()),
            translator: Arc::new(PassthroughTranslator),
            executor: Arc::new(TimingExecutor::new(DirectExecutor)),
        }
    }
}

impl DispatcherBuilder {
    /// Sets the authenticator consulted at login.
    #[must_use]
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Sets the exception translation hook.
    #[must_use]
    pub fn translator(mut self, translator: Arc<dyn ExceptionTranslator>) -> Self {
        self.translator = translator;
        self
    }

    /// Sets the executor chain used for stateless command execution.
    #[must_use]
    pub fn executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    /// Finishes the dispatcher.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        Dispatcher {
            services: Arc::new(ServiceRegistry::new()),
            commands: Arc::new(CommandRegistry::new()),
            sessions: Arc::new(SessionManager::new(self.authenticator)),
            stateless: Arc::new(StatelessServiceHost::new()),
            handler: InvocationHandler::new(self.translator),
            executor: self.executor,
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(
        clippy::expect_used,
        reason = "test code uses expect for clarity and assertions"
    )]

    use rstest::{fixture, rstest};
    use serde_json::json;

    use courier_protocol::{Credentials, SessionToken};

    use crate::executor::{Command, CommandFactory, ExecutionError, FnCommand};
    use crate::service::test_support::EchoService;
    use crate::stateless::StatelessServiceFactory;

    use super::*;

    struct StashFactory;

    struct StashService {
        stashed: Value,
    }

    impl Service for StashService {
        fn definition(&self) -> ServiceDefinition {
            ServiceDefinition::new("stash")
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
                "peek" => Ok(self.stashed.clone()),
                "submit" => Ok(json!({
                    "stashed": self.stashed,
                    "committed": arguments.first().cloned().unwrap_or(Value::Null),
                })),
                other => Err(ServiceError::UnknownOperation {
                    service: "stash".to_owned(),
                    operation: other.to_owned(),
                }),
            }
        }
    }

    impl StatelessServiceFactory for StashFactory {
        fn definition(&self) -> ServiceDefinition {
            ServiceDefinition::new("stash")
        }

        fn create(&self, init_data: Option<&Value>) -> Result<Arc<dyn Service>, ServiceError> {
            Ok(Arc::new(StashService {
                stashed: init_data.cloned().unwrap_or(Value::Null),
            }))
        }
    }

    #[fixture]
    fn dispatcher() -> Dispatcher {
        let dispatcher = Dispatcher::builder()
            .authenticator(Arc::new(StaticAuthenticator::new([(
                "amy".to_owned(),
                "secret".to_owned(),
            )])))
            .build();
        dispatcher
            .services()
            .register(Arc::new(EchoService::new("orders")))
            .expect("register echo");
        dispatcher
            .stateless()
            .register(Arc::new(StashFactory))
            .expect("register factory");
        let peek_stash: Arc<dyn CommandFactory> = Arc::new(|_payload: &Value| {
            Ok(Box::new(FnCommand::new(
                "peek-stash",
                |env: &ExecutionEnvironment, _event: &TriggerEvent| {
                    let definition = ServiceDefinition::new("stash");
                    let service = env
                        .registry()
                        .get_in(&definition, env)
                        .ok_or(ExecutionError::MissingService(definition))?;
                    service
                        .invoke("peek", &[], &CallContext::default())
                        .map_err(|error| ExecutionError::Failed(error.to_string()))
                },
            )) as Box<dyn Command>)
        });
        dispatcher
            .commands()
            .register("peek-stash", peek_stash)
            .expect("register command");
        dispatcher
    }

    fn login_envelope(user: &str, secret: &str) -> WireRequest {
        WireRequest::Login(LoginRequest {
            credentials: Credentials::new(user, secret),
            application: "console".to_owned(),
            origin: None,
        })
    }

    fn login(dispatcher: &Dispatcher) -> SessionToken {
        let result = dispatcher.dispatch(&login_envelope("amy", "secret"), None);
        let InvocationResult::Service { service } = result else {
            panic!("expected service result, got {result:?}");
        };
        service.session.expect("session token")
    }

    #[rstest]
    fn login_returns_login_server_descriptor_with_session(dispatcher: Dispatcher) {
        let result = dispatcher.dispatch(&login_envelope("amy", "secret"), Some("10.0.0.5"));
        let InvocationResult::Service { service } = result else {
            panic!("expected service result");
        };
        assert_eq!(service.definition.name(), LOGIN_SERVER);
        assert!(service.session.is_some());
    }

    #[rstest]
    fn failed_login_is_unauthorized_and_leaves_no_session(dispatcher: Dispatcher) {
        let result = dispatcher.dispatch(&login_envelope("amy", "wrong"), None);
        let InvocationResult::Error { kind, .. } = result else {
            panic!("expected error result");
        };
        assert_eq!(kind, ErrorKind::Unauthorized);
        assert!(dispatcher.sessions().is_empty());
    }

    #[rstest]
    fn stateful_call_requires_a_live_session(dispatcher: Dispatcher) {
        let request = WireRequest::Call(CallRequest {
            target: ServiceDefinition::new("orders"),
            session: Some(SessionToken::new("s-forged")),
            operation: "echo".to_owned(),
            arguments: Vec::new(),
        });
        let result = dispatcher.dispatch(&request, None);
        assert!(matches!(
            result,
            InvocationResult::Error {
                kind: ErrorKind::Unauthorized,
                ..
            }
        ));
    }

    #[rstest]
    fn stateful_call_reaches_the_service(dispatcher: Dispatcher) {
        let session = login(&dispatcher);
        let request = WireRequest::Call(CallRequest {
            target: ServiceDefinition::new("orders"),
            session: Some(session),
            operation: "echo".to_owned(),
            arguments: vec![json!("ping")],
        });
        let result = dispatcher.dispatch(&request, None);
        let InvocationResult::Value { value } = result else {
            panic!("expected value result");
        };
        assert_eq!(value, json!({"echoed": ["ping"]}));
    }

    #[rstest]
    fn service_failure_surfaces_as_error_result(dispatcher: Dispatcher) {
        let session = login(&dispatcher);
        let request = WireRequest::Call(CallRequest {
            target: ServiceDefinition::new("orders"),
            session: Some(session),
            operation: "fail".to_owned(),
            arguments: Vec::new(),
        });
        let result = dispatcher.dispatch(&request, None);
        let InvocationResult::Error { kind, message, .. } = result else {
            panic!("expected error result, got {result:?}");
        };
        assert_eq!(kind, ErrorKind::IllegalState);
        assert!(message.contains("told to fail"));
    }

    #[rstest]
    fn unknown_operation_is_rejected_before_the_service_runs(dispatcher: Dispatcher) {
        let session = login(&dispatcher);
        let request = WireRequest::Call(CallRequest {
            target: ServiceDefinition::new("orders"),
            session: Some(session),
            operation: "drop-tables".to_owned(),
            arguments: Vec::new(),
        });
        let result = dispatcher.dispatch(&request, None);
        assert!(matches!(
            result,
            InvocationResult::Error {
                kind: ErrorKind::UnknownOperation,
                ..
            }
        ));
    }

    #[rstest]
    fn stateless_init_issues_a_provider_identity(dispatcher: Dispatcher) {
        let request = WireRequest::Stateless(
            StatelessRequest::builder(ServiceDefinition::new("stash"))
                .init_data(json!({"tenant": "acme"}))
                .init(),
        );
        let result = dispatcher.dispatch(&request, None);
        let InvocationResult::Service { service } = result else {
            panic!("expected service result");
        };
        assert!(service.provider.is_some());
        assert_eq!(service.definition.name(), "stash");
    }

    #[rstest]
    fn stateless_execute_requires_a_provider(dispatcher: Dispatcher) {
        let request = WireRequest::Stateless(
            StatelessRequest::builder(ServiceDefinition::new("stash"))
                .execute_command(json!({"name": "peek-stash"}), None),
        );
        let result = dispatcher.dispatch(&request, None);
        assert!(matches!(
            result,
            InvocationResult::Error {
                kind: ErrorKind::IllegalState,
                ..
            }
        ));
    }

    #[rstest]
    fn stateless_execute_sees_reconstructed_state(dispatcher: Dispatcher) {
        let provider = ProviderIdentity::new("p-test");
        let request = WireRequest::Stateless(
            StatelessRequest::builder(ServiceDefinition::new("stash"))
                .provider(provider)
                .init_data(json!({"tenant": "acme"}))
                .execute_command(json!({"name": "peek-stash"}), None),
        );
        let result = dispatcher.dispatch(&request, None);
        let InvocationResult::Value { value } = result else {
            panic!("expected value result, got {result:?}");
        };
        assert_eq!(value, json!({"tenant": "acme"}));
    }

    #[rstest]
    fn stateless_submit_invokes_the_submit_operation(dispatcher: Dispatcher) {
        let request = WireRequest::Stateless(
            StatelessRequest::builder(ServiceDefinition::new("stash"))
                .provider(ProviderIdentity::new("p-test"))
                .init_data(json!("initial"))
                .submit(json!("final")),
        );
        let result = dispatcher.dispatch(&request, None);
        let InvocationResult::Value { value } = result else {
            panic!("expected value result, got {result:?}");
        };
        assert_eq!(value, json!({"stashed": "initial", "committed": "final"}));
    }

    #[rstest]
    fn logout_reports_whether_a_session_existed(dispatcher: Dispatcher) {
        let session = login(&dispatcher);
        let result = dispatcher.dispatch(
            &WireRequest::Logout {
                session: session.clone(),
            },
            None,
        );
        assert_eq!(result, InvocationResult::value(json!(true)));
        let again = dispatcher.dispatch(&WireRequest::Logout { session }, None);
        assert_eq!(again, InvocationResult::value(json!(false)));
    }

    #[test]
    fn not_found_translator_downgrades_to_null() {
        let handler = InvocationHandler::new(Arc::new(NotFoundTranslator));
        let result = handler.handle_execution_exception(
            &ServiceError::NotFound("order 7".into()),
            &ServiceDefinition::new("orders"),
            "load",
        );
        assert_eq!(result, InvocationResult::value(Value::Null));

        let passthrough = handler.handle_execution_exception(
            &ServiceError::IllegalState("locked".into()),
            &ServiceDefinition::new("orders"),
            "load",
        );
        assert!(passthrough.is_error());
    }
}
