//! Generic command execution pipeline.
//!
//! A [`Command`] is a unit of business work decoupled from transport and
//! environment; a [`CommandExecutor`] decides where and how it runs.
//! Executors compose by explicit delegation, middleware style. The
//! documented order of application, outermost first, is: timing →
//! environment substitution → logout-on-drop → direct execution. Each layer
//! must preserve call semantics: for a command with no side effects tied to
//! the substituted environment, an N-layer chain produces the same
//! [`ExecutionResult`] as the base executor.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use courier_protocol::{ErrorKind, ServiceDefinition, SessionToken};

use crate::service::ServiceRegistry;

/// Tracing target for executor instrumentation.
const EXECUTOR_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::executor");

/// Event that triggered a command execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    /// What raised the event (a UI gesture, a timer, another service).
    pub source: String,
    /// Event-specific payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

impl TriggerEvent {
    /// Builds an event from its source.
    #[must_use]
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            payload: None,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Contextual services and resolvers a command runs against.
///
/// Environments are substitutable: an executor layer may swap the
/// environment wholesale before delegating, and an overlay registry can
/// expose per-call service instances in front of the shared registry.
#[derive(Debug, Clone)]
pub struct ExecutionEnvironment {
    registry: Arc<ServiceRegistry>,
    overlay: Option<Arc<ServiceRegistry>>,
    session: Option<SessionToken>,
}

impl ExecutionEnvironment {
    /// Builds an environment over the shared registry.
    #[must_use]
    pub const fn new(registry: Arc<ServiceRegistry>) -> Self {
        Self {
            registry,
            overlay: None,
            session: None,
        }
    }

    /// Attaches an overlay registry consulted before the shared one.
    #[must_use]
    pub fn with_overlay(mut self, overlay: Arc<ServiceRegistry>) -> Self {
        self.overlay = Some(overlay);
        self
    }

    /// Binds the environment to a session.
    #[must_use]
    pub fn with_session(mut self, session: SessionToken) -> Self {
        self.session = Some(session);
        self
    }

    /// Shared service registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Overlay registry, when one is attached.
    #[must_use]
    pub const fn overlay(&self) -> Option<&Arc<ServiceRegistry>> {
        self.overlay.as_ref()
    }

    /// Session the environment is bound to.
    #[must_use]
    pub const fn session(&self) -> Option<&SessionToken> {
        self.session.as_ref()
    }
}

/// Failures raised while executing a command.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// Command logic failed.
    #[error("command failed: {0}")]
    Failed(String),
    /// Command refused to run in the current state.
    #[error("illegal state: {0}")]
    IllegalState(String),
    /// A service the command depends on is not available.
    #[error("missing service '{0}'")]
    MissingService(ServiceDefinition),
    /// Command payload could not be interpreted.
    #[error("invalid command payload: {0}")]
    InvalidPayload(String),
    /// No command is registered under the requested name.
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

impl ExecutionError {
    /// Maps the error onto its wire classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Failed(_) => ErrorKind::Internal,
            Self::IllegalState(_) => ErrorKind::IllegalState,
            Self::MissingService(_) => ErrorKind::UnknownService,
            Self::InvalidPayload(_) => ErrorKind::InvalidArguments,
            Self::UnknownCommand(_) => ErrorKind::NotFound,
        }
    }
}

/// Outcome of one command run.
pub type ExecutionResult = Result<Value, ExecutionError>;

/// A unit of business work.
pub trait Command: Send + Sync {
    /// Name identifying the command.
    fn name(&self) -> &str;

    /// Runs the command against an environment.
    ///
    /// # Errors
    ///
    /// Returns an [`ExecutionError`] describing the failure.
    fn run(&self, environment: &ExecutionEnvironment, event: &TriggerEvent) -> ExecutionResult;
}

/// Command built from a closure; convenient for registration tables.
pub struct FnCommand<F> {
    name: String,
    run: F,
}

impl<F> FnCommand<F>
where
    F: Fn(&ExecutionEnvironment, &TriggerEvent) -> ExecutionResult + Send + Sync,
{
    /// Builds a command from a name and a closure.
    #[must_use]
    pub fn new(name: impl Into<String>, run: F) -> Self {
        Self {
            name: name.into(),
            run,
        }
    }
}

impl<F> Command for FnCommand<F>
where
    F: Fn(&ExecutionEnvironment, &TriggerEvent) -> ExecutionResult + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, environment: &ExecutionEnvironment, event: &TriggerEvent) -> ExecutionResult {
        (self.run)(environment, event)
    }
}

/// Executes commands, possibly by delegating to a wrapped executor.
pub trait CommandExecutor: Send + Sync {
    /// Runs one command in the given environment.
    fn execute_command(
        &self,
        command: &dyn Command,
        environment: &ExecutionEnvironment,
        event: &TriggerEvent,
    ) -> ExecutionResult;
}

impl<T: CommandExecutor + ?Sized> CommandExecutor for Arc<T> {
    fn execute_command(
        &self,
        command: &dyn Command,
        environment: &ExecutionEnvironment,
        event: &TriggerEvent,
    ) -> ExecutionResult {
        (**self).execute_command(command, environment, event)
    }
}

/// Base of every chain: runs the command directly.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl CommandExecutor for DirectExecutor {
    fn execute_command(
        &self,
        command: &dyn Command,
        environment: &ExecutionEnvironment,
        event: &TriggerEvent,
    ) -> ExecutionResult {
        command.run(environment, event)
    }
}

/// Delegating layer that records the wall-clock duration of each run.
pub struct TimingExecutor<E> {
    inner: E,
}

impl<E: CommandExecutor> TimingExecutor<E> {
    /// Wraps an executor with timing instrumentation.
    #[must_use]
    pub const fn new(inner: E) -> Self {
        Self { inner }
    }
}

impl<E: CommandExecutor> CommandExecutor for TimingExecutor<E> {
    fn execute_command(
        &self,
        command: &dyn Command,
        environment: &ExecutionEnvironment,
        event: &TriggerEvent,
    ) -> ExecutionResult {
        let started = Instant::now();
        let result = self.inner.execute_command(command, environment, event);
        debug!(
            target: EXECUTOR_TARGET,
            command = command.name(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            ok = result.is_ok(),
            "command executed"
        );
        result
    }
}

/// Delegating layer that substitutes a fixed environment before running.
///
/// The environment handed in at the call site is ignored; the layer's own
/// environment (typically carrying a session binding or an overlay
/// registry) is used instead.
pub struct EnvironmentSubstitutingExecutor<E> {
    inner: E,
    environment: ExecutionEnvironment,
}

impl<E: CommandExecutor> EnvironmentSubstitutingExecutor<E> {
    /// Wraps an executor with a fixed environment.
    #[must_use]
    pub const fn new(inner: E, environment: ExecutionEnvironment) -> Self {
        Self { inner, environment }
    }
}

impl<E: CommandExecutor> CommandExecutor for EnvironmentSubstitutingExecutor<E> {
    fn execute_command(
        &self,
        command: &dyn Command,
        _environment: &ExecutionEnvironment,
        event: &TriggerEvent,
    ) -> ExecutionResult {
        self.inner
            .execute_command(command, &self.environment, event)
    }
}

/// Delegating layer that fires a logout hook when it is dropped.
///
/// The hook models the "executor no longer referenced" lifecycle event: a
/// client that drops its last executor handle implicitly releases the
/// session behind it. The hook fires at most once.
pub struct LogoutOnDropExecutor<E> {
    inner: E,
    hook: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl<E: CommandExecutor> LogoutOnDropExecutor<E> {
    /// Wraps an executor with a drop hook.
    #[must_use]
    pub fn new(inner: E, hook: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            hook: Mutex::new(Some(Box::new(hook))),
        }
    }
}

impl<E: CommandExecutor> CommandExecutor for LogoutOnDropExecutor<E> {
    fn execute_command(
        &self,
        command: &dyn Command,
        environment: &ExecutionEnvironment,
        event: &TriggerEvent,
    ) -> ExecutionResult {
        self.inner.execute_command(command, environment, event)
    }
}

impl<E> Drop for LogoutOnDropExecutor<E> {
    fn drop(&mut self) {
        let hook = self
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(hook) = hook {
            hook();
        }
    }
}

/// Named command with its payload, as carried on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Registered command name.
    pub name: String,
    /// Command-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl CommandSpec {
    /// Builds a spec with a null payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            payload: Value::Null,
        }
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Builds commands from wire payloads.
pub trait CommandFactory: Send + Sync {
    /// Builds a command from the spec's payload.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::InvalidPayload`] when the payload does not
    /// match the command's expectations.
    fn build(&self, payload: &Value) -> Result<Box<dyn Command>, ExecutionError>;
}

impl<F> CommandFactory for F
where
    F: Fn(&Value) -> Result<Box<dyn Command>, ExecutionError> + Send + Sync,
{
    fn build(&self, payload: &Value) -> Result<Box<dyn Command>, ExecutionError> {
        self(payload)
    }
}

/// Name-keyed table of command factories.
///
/// The server resolves wire [`CommandSpec`]s through this table; an unknown
/// name is rejected, mirroring how unknown operations are rejected at the
/// service dispatch table.
#[derive(Default)]
pub struct CommandRegistry {
    factories: RwLock<HashMap<String, Arc<dyn CommandFactory>>>,
}

impl CommandRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under a command name.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::IllegalState`] when the name is already
    /// taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        factory: Arc<dyn CommandFactory>,
    ) -> Result<(), ExecutionError> {
        let key = name.into();
        let mut factories = self
            .factories
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if factories.contains_key(&key) {
            return Err(ExecutionError::IllegalState(format!(
                "command '{key}' is already registered"
            )));
        }
        factories.insert(key, factory);
        Ok(())
    }

    /// Resolves a wire spec into a runnable command.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::UnknownCommand`] for an unregistered name
    /// or a factory error for a bad payload.
    pub fn resolve(&self, spec: &CommandSpec) -> Result<Box<dyn Command>, ExecutionError> {
        let factory = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&spec.name)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownCommand(spec.name.clone()))?;
        factory.build(&spec.payload)
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = self
            .factories
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        formatter
            .debug_struct("CommandRegistry")
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

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;

    fn constant_command(value: Value) -> FnCommand<impl Fn(&ExecutionEnvironment, &TriggerEvent) -> ExecutionResult + Send + Sync>
    {
        FnCommand::new("constant", move |_env, _event| Ok(value.clone()))
    }

    fn empty_environment() -> ExecutionEnvironment {
        ExecutionEnvironment::new(Arc::new(ServiceRegistry::new()))
    }

    #[test]
    fn direct_executor_runs_the_command() {
        let command = constant_command(json!(41));
        let result = DirectExecutor
            .execute_command(&command, &empty_environment(), &TriggerEvent::new("test"));
        assert_eq!(result.expect("run"), json!(41));
    }

    #[test]
    fn layered_delegation_is_transparent() {
        let command = constant_command(json!({"answer": 42}));
        let environment = empty_environment();
        let event = TriggerEvent::new("test");

        let base = DirectExecutor.execute_command(&command, &environment, &event);

        let chain = TimingExecutor::new(EnvironmentSubstitutingExecutor::new(
            LogoutOnDropExecutor::new(DirectExecutor, || {}),
            environment.clone(),
        ));
        let chained = chain.execute_command(&command, &environment, &event);

        assert_eq!(base.expect("base"), chained.expect("chained"));
    }

    #[test]
    fn substituting_executor_replaces_the_environment() {
        let fixed = empty_environment().with_session(SessionToken::new("s-fixed"));
        let executor = EnvironmentSubstitutingExecutor::new(DirectExecutor, fixed);

        let command = FnCommand::new("observe-session", |env: &ExecutionEnvironment, _event: &TriggerEvent| {
            Ok(json!(env.session().map(SessionToken::as_str)))
        });

        let unrelated = empty_environment().with_session(SessionToken::new("s-other"));
        let result = executor
            .execute_command(&command, &unrelated, &TriggerEvent::new("test"))
            .expect("run");
        assert_eq!(result, json!("s-fixed"));
    }

    #[test]
    fn logout_hook_fires_exactly_once_on_drop() {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let executor = LogoutOnDropExecutor::new(DirectExecutor, move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let command = constant_command(json!(null));
        executor
            .execute_command(&command, &empty_environment(), &TriggerEvent::new("test"))
            .expect("run");
        assert_eq!(fired.load(Ordering::SeqCst), 0, "hook must not fire early");
        drop(executor);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn command_registry_rejects_duplicates_and_unknowns() {
        let registry = CommandRegistry::new();
        let factory: Arc<dyn CommandFactory> = Arc::new(|payload: &Value| {
            let value = payload.clone();
            Ok(Box::new(FnCommand::new("noop", move |_: &ExecutionEnvironment, _: &TriggerEvent| Ok(value.clone())))
                as Box<dyn Command>)
        });
        registry
            .register("noop", Arc::clone(&factory))
            .expect("first registration");
        assert!(registry.register("noop", factory).is_err());

        let unknown = registry.resolve(&CommandSpec::new("missing"));
        assert!(matches!(unknown, Err(ExecutionError::UnknownCommand(_))));
    }

    #[test]
    fn resolved_commands_run_with_their_payload() {
        let registry = CommandRegistry::new();
        registry
            .register(
                "double",
                Arc::new(|payload: &Value| {
                    let input = payload
                        .as_i64()
                        .ok_or_else(|| ExecutionError::InvalidPayload("expected an integer".into()))?;
                    Ok(Box::new(FnCommand::new("double", move |_: &ExecutionEnvironment, _: &TriggerEvent| {
                        Ok(json!(input * 2))
                    })) as Box<dyn Command>)
                }),
            )
            .expect("register");

        let command = registry
            .resolve(&CommandSpec::new("double").with_payload(json!(21)))
            .expect("resolve");
        let result = DirectExecutor
            .execute_command(&*command, &empty_environment(), &TriggerEvent::new("test"))
            .expect("run");
        assert_eq!(result, json!(42));
    }
}
