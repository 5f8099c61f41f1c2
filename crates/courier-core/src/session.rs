//! Session establishment and lookup.
//!
//! The session manager owns the table of live sessions. Authentication is
//! delegated to an [`Authenticator`]; on success the manager mints an
//! opaque token the client echoes on every stateful call. Login is
//! all-or-nothing: a failed authentication leaves no partial session
//! behind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::info;

use courier_protocol::{LoginRequest, SessionToken};

/// Tracing target for session lifecycle events.
const SESSION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::session");

/// Validates login requests.
pub trait Authenticator: Send + Sync {
    /// Checks the presented credentials.
    ///
    /// # Errors
    ///
    /// Returns an [`AuthError`] when the credentials are not acceptable.
    fn authenticate(&self, login: &LoginRequest) -> Result<(), AuthError>;
}

/// Authenticator backed by a fixed user/secret table.
///
/// Intended for tests and embedded deployments; production deployments
/// register their own [`Authenticator`] implementation.
#[derive(Debug, Default)]
pub struct StaticAuthenticator {
    accounts: HashMap<String, String>,
}

impl StaticAuthenticator {
    /// Builds an authenticator from `(user, secret)` pairs.
    #[must_use]
    pub fn new(accounts: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }
}

impl Authenticator for StaticAuthenticator {
    fn authenticate(&self, login: &LoginRequest) -> Result<(), AuthError> {
        match self.accounts.get(&login.credentials.user) {
            Some(secret) if *secret == login.credentials.secret => Ok(()),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// One live session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Token identifying the session.
    pub token: SessionToken,
    /// Authenticated account.
    pub user: String,
    /// Application context presented at login.
    pub application: String,
    /// Originating network address, when the transport knew it.
    pub origin: Option<String>,
}

/// Owns the table of live sessions.
pub struct SessionManager {
    authenticator: Arc<dyn Authenticator>,
    sessions: RwLock<HashMap<SessionToken, Session>>,
    nonce: u64,
    counter: AtomicU64,
}

impl SessionManager {
    /// Builds a manager around an authenticator.
    #[must_use]
    pub fn new(authenticator: Arc<dyn Authenticator>) -> Self {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "the low 64 bits of the clock are enough for a per-process nonce"
        )]
        let nonce = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or_default();
        Self {
            authenticator,
            sessions: RwLock::new(HashMap::new()),
            nonce,
            counter: AtomicU64::new(0),
        }
    }

    /// Authenticates a login and mints a session.
    ///
    /// # Errors
    ///
    /// Returns the authenticator's [`AuthError`]; no session is created on
    /// failure.
    pub fn login(&self, login: &LoginRequest) -> Result<SessionToken, AuthError> {
        self.authenticator.authenticate(login)?;
        let sequence = self.counter.fetch_add(1, Ordering::Relaxed);
        let token = SessionToken::new(format!("s-{:x}-{sequence}", self.nonce));
        let session = Session {
            token: token.clone(),
            user: login.credentials.user.clone(),
            application: login.application.clone(),
            origin: login.origin.clone(),
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(token.clone(), session);
        info!(
            target: SESSION_TARGET,
            user = %login.credentials.user,
            application = %login.application,
            "session established"
        );
        Ok(token)
    }

    /// Resolves a token to its session.
    #[must_use]
    pub fn resolve(&self, token: &SessionToken) -> Option<Session> {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(token)
            .cloned()
    }

    /// Releases a session. Returns whether one existed.
    #[must_use]
    pub fn logout(&self, token: &SessionToken) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(token)
            .is_some();
        if removed {
            info!(target: SESSION_TARGET, session = %token, "session released");
        }
        removed
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SessionManager")
            .field("sessions", &self.len())
            .finish()
    }
}

/// Errors raised while authenticating.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// Presented credentials do not match any account.
    #[error("invalid credentials")]
    InvalidCredentials,
    /// Authenticator refused the login for another reason.
    #[error("login rejected: {0}")]
    Rejected(String),
}
