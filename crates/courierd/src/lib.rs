//! Courier daemon.
//!
//! Hosts the transport-free [`courier_core::Dispatcher`] over the remote
//! channel families: JSONL over TCP or unix sockets, and a minimal
//! HTTP/1.1 POST exchange. The bootstrap sequence loads configuration,
//! installs structured telemetry, and binds one listener per configured
//! channel; each accepted connection is served on its own thread with a
//! strict one-request-one-result exchange.

mod bootstrap;
mod dispatch;
mod telemetry;
mod transport;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Daemon, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use telemetry::{TelemetryError, TelemetrySettings};
