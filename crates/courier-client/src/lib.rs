//! Courier client.
//!
//! One [`ClientCommunication`] per configured channel: embedded channels
//! drive a shared [`courier_core::Dispatcher`] in process, socket channels
//! speak one JSONL exchange per connection, and HTTP channels speak one
//! POST exchange per round trip. Proxies returned by a communication route
//! every call through the caller's executor chain; stateless bridges own
//! the provider identity and init data the server refuses to keep.

mod communication;
mod embedded;
mod errors;
mod http;
mod proxy;
mod socket;
mod stateless;
mod transport;

pub use communication::{ClientCommunication, CommunicationRegistry, RegistryError};
pub use embedded::EmbeddedCommunication;
pub use errors::CommunicationError;
pub use http::HttpCommunication;
pub use proxy::{LoginSession, ServiceProxy};
pub use socket::SocketCommunication;
pub use stateless::StatelessServiceBridge;
