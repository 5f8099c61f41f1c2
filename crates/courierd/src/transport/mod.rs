//! Socket listeners for channel endpoints.
//!
//! The transport layer binds the configured endpoints and accepts
//! connections on background threads. What happens on a connection is the
//! dispatch layer's business: listeners only hand accepted streams to a
//! [`ConnectionHandler`].

mod errors;
mod handler;
mod listener;

pub use self::errors::ListenerError;
pub use self::handler::{ConnectionHandler, ConnectionStream};
pub use self::listener::{ListenerHandle, SocketListener};

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
