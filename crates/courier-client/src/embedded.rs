//! Embedded channel: client and server share one process.
//!
//! No bytes cross a wire. Requests go straight into the shared
//! [`Dispatcher`], so error information reaches the caller without a
//! serialization boundary and transient transport failures cannot occur;
//! the stateless reconnect policy is therefore a constant `false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_config::ClientLoginInfo;
use courier_core::{CommandExecutor, Dispatcher, ExecutionEnvironment};
use courier_protocol::{CommunicationId, InvocationResult, ServiceDefinition, WireRequest};

use crate::communication::{ClientCommunication, Exchange, login_over, logout_over};
use crate::errors::CommunicationError;
use crate::proxy::{LoginSession, ServiceProxy};
use crate::stateless::StatelessServiceBridge;

/// In-process channel over a shared dispatcher.
pub struct EmbeddedCommunication {
    id: CommunicationId,
    inner: Arc<EmbeddedExchange>,
}

struct EmbeddedExchange {
    dispatcher: Arc<Dispatcher>,
    started: AtomicBool,
}

impl Exchange for EmbeddedExchange {
    fn round_trip(&self, request: &WireRequest) -> Result<InvocationResult, CommunicationError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(CommunicationError::NotStarted);
        }
        request.validate()?;
        Ok(self.dispatcher.dispatch(request, None))
    }
}

impl EmbeddedCommunication {
    /// Wraps a shared dispatcher as a channel.
    #[must_use]
    pub fn new(id: CommunicationId, dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            id,
            inner: Arc::new(EmbeddedExchange {
                dispatcher,
                started: AtomicBool::new(false),
            }),
        }
    }
}

impl ClientCommunication for EmbeddedCommunication {
    fn communication_id(&self) -> &CommunicationId {
        &self.id
    }

    fn start(&self) {
        self.inner.started.store(true, Ordering::Release);
    }

    fn stop(&self) {
        self.inner.started.store(false, Ordering::Release);
    }

    fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    fn connect(&self, login: &ClientLoginInfo) -> Result<LoginSession, CommunicationError> {
        login_over(self.inner.as_ref(), login)
    }

    fn disconnect(&self, session: &LoginSession) -> Result<bool, CommunicationError> {
        logout_over(self.inner.as_ref(), session.token())
    }

    fn create_stateful_proxy(
        &self,
        executor: Arc<dyn CommandExecutor>,
        environment: ExecutionEnvironment,
        definition: ServiceDefinition,
        session: &LoginSession,
    ) -> Result<ServiceProxy, CommunicationError> {
        if !self.is_started() {
            return Err(CommunicationError::NotStarted);
        }
        Ok(ServiceProxy::new(
            Arc::clone(&self.inner) as Arc<dyn Exchange>,
            executor,
            environment,
            definition,
            session.token().clone(),
        ))
    }

    fn create_stateless_proxy(
        &self,
        executor: Arc<dyn CommandExecutor>,
        environment: ExecutionEnvironment,
        definition: ServiceDefinition,
    ) -> Result<StatelessServiceBridge, CommunicationError> {
        if !self.is_started() {
            return Err(CommunicationError::NotStarted);
        }
        Ok(StatelessServiceBridge::new(
            Arc::clone(&self.inner) as Arc<dyn Exchange>,
            executor,
            environment,
            definition,
            Box::new(|_| false),
        ))
    }

    fn should_stateless_entry_try_to_reconnect_on_this_failure(
        &self,
        _failure: &CommunicationError,
    ) -> bool {
        false
    }
}

impl std::fmt::Debug for EmbeddedCommunication {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EmbeddedCommunication")
            .field("id", &self.id)
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use courier_config::ClientConnectionInfo;
    use courier_core::{
        CallContext, DirectExecutor, Service, ServiceError, ServiceRegistry, StaticAuthenticator,
        StatelessServiceFactory,
    };
    use courier_protocol::{Credentials, ErrorKind, Kind, Protocol};

    use super::*;

    struct LedgerService;

    impl Service for LedgerService {
        fn definition(&self) -> ServiceDefinition {
            ServiceDefinition::new("ledger")
        }

        fn operations(&self) -> &[&str] {
            &["balance"]
        }

        fn invoke(
            &self,
            _operation: &str,
            arguments: &[Value],
            _context: &CallContext,
        ) -> Result<Value, ServiceError> {
            let account = arguments
                .first()
                .and_then(Value::as_str)
                .ok_or_else(|| ServiceError::InvalidArguments("account name required".into()))?;
            Ok(json!({ "account": account, "balance": 120 }))
        }
    }

    struct LedgerFactory;

    impl StatelessServiceFactory for LedgerFactory {
        fn definition(&self) -> ServiceDefinition {
            ServiceDefinition::new("ledger-drafts")
        }

        fn create(
            &self,
            init_data: Option<&Value>,
        ) -> Result<Arc<dyn Service>, ServiceError> {
            init_data
                .ok_or_else(|| ServiceError::InvalidArguments("init data required".into()))?;
            Ok(Arc::new(LedgerService))
        }
    }

    fn communication() -> EmbeddedCommunication {
        let dispatcher = Dispatcher::builder()
            .authenticator(Arc::new(StaticAuthenticator::new([(
                "amy".to_owned(),
                "secret".to_owned(),
            )])))
            .build();
        dispatcher
            .services()
            .register(Arc::new(LedgerService))
            .expect("register service");
        dispatcher
            .stateless()
            .register(Arc::new(LedgerFactory))
            .expect("register factory");
        let id = CommunicationId::new(Protocol::Embedded, Kind::ClientServer, "local");
        EmbeddedCommunication::new(id, Arc::new(dispatcher))
    }

    fn login_info() -> ClientLoginInfo {
        let id = CommunicationId::new(Protocol::Embedded, Kind::ClientServer, "local");
        let connection = ClientConnectionInfo::builder(id).build().expect("info");
        ClientLoginInfo::new(
            connection,
            Credentials::new("amy", "secret"),
            "console".to_owned(),
        )
    }

    #[test]
    fn calls_before_start_are_rejected() {
        let communication = communication();
        let error = communication.connect(&login_info()).expect_err("must fail");
        assert!(matches!(error, CommunicationError::NotStarted));
    }

    #[test]
    fn login_call_logout_over_the_shared_dispatcher() {
        let communication = communication();
        communication.start();
        let session = communication.connect(&login_info()).expect("connect");

        let proxy = communication
            .create_stateful_proxy(
                Arc::new(DirectExecutor),
                ExecutionEnvironment::new(Arc::new(ServiceRegistry::new())),
                ServiceDefinition::new("ledger"),
                &session,
            )
            .expect("proxy");
        let value = proxy
            .invoke("balance", vec![json!("acme")])
            .expect("invoke");
        assert_eq!(value, json!({"account": "acme", "balance": 120}));

        assert!(communication.disconnect(&session).expect("logout"));
        assert!(!communication.disconnect(&session).expect("second logout"));
    }

    #[test]
    fn rejected_credentials_surface_as_unauthorized() {
        let communication = communication();
        communication.start();
        let mut login = login_info();
        login.credentials = Credentials::new("amy", "wrong");
        let error = communication.connect(&login).expect_err("must fail");
        assert!(matches!(
            error,
            CommunicationError::Server {
                kind: ErrorKind::Unauthorized,
                ..
            }
        ));
    }

    #[test]
    fn stateless_bridge_runs_against_the_dispatcher() {
        let communication = communication();
        communication.start();
        let mut bridge = communication
            .create_stateless_proxy(
                Arc::new(DirectExecutor),
                ExecutionEnvironment::new(Arc::new(ServiceRegistry::new())),
                ServiceDefinition::new("ledger-drafts"),
            )
            .expect("bridge");
        bridge
            .init_provider(json!({"tenant": "acme"}))
            .expect("init");
        assert!(bridge.is_initialized());
    }

    #[test]
    fn embedded_failures_never_request_reconnects() {
        let communication = communication();
        assert!(
            !communication.should_stateless_entry_try_to_reconnect_on_this_failure(
                &CommunicationError::MissingResponse
            )
        );
    }

    #[test]
    fn stop_is_idempotent_and_blocks_new_calls() {
        let communication = communication();
        communication.start();
        communication.start();
        assert!(communication.is_started());
        communication.stop();
        communication.stop();
        assert!(!communication.is_started());
        assert!(matches!(
            communication.connect(&login_info()),
            Err(CommunicationError::NotStarted)
        ));
    }
}
