//! Transport-free server core for Courier.
//!
//! This crate hosts everything the daemon and the embedded client share:
//! the service dispatch table and registry, the command execution pipeline,
//! session management, stateless provider reconstruction, and the
//! invocation handler that turns raw call outcomes into wire-safe result
//! envelopes. Transports live elsewhere: `courierd` exposes a [`Dispatcher`]
//! over sockets and HTTP, while `courier-client` drives one directly for
//! embedded channels.

mod dispatch;
mod executor;
mod service;
mod session;
mod stateless;

pub use dispatch::{
    Dispatcher, DispatcherBuilder, ExceptionTranslator, InvocationHandler, NotFoundTranslator,
    StateKind, LOGIN_SERVER,
};
pub use executor::{
    Command, CommandExecutor, CommandFactory, CommandRegistry, CommandSpec, DirectExecutor,
    EnvironmentSubstitutingExecutor, ExecutionEnvironment, ExecutionError, ExecutionResult,
    FnCommand, LogoutOnDropExecutor, TimingExecutor, TriggerEvent,
};
pub use service::{CallContext, Service, ServiceError, ServiceRegistry, ServiceRegistryError};
pub use session::{AuthError, Authenticator, Session, SessionManager, StaticAuthenticator};
pub use stateless::{StatelessServiceFactory, StatelessServiceHost};
