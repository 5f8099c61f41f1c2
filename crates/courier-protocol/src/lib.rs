//! Wire-level value types shared by the Courier client and daemon.
//!
//! The protocol crate defines the vocabulary both sides of a channel agree
//! on: channel identifiers, request envelopes, invocation results, stateless
//! request snapshots, and the compression transform applied to raw streams.
//! Everything here is a plain value type; transports and dispatchers live in
//! `courier-client` and `courierd`.

mod compress;
mod id;
mod request;
mod result;
mod service;
mod stateless;

pub use compress::{
    CompressionParseError, CompressionSettings, CompressionTransform, compress, decompress,
};
pub use id::{CommunicationId, CommunicationIdParseError, Kind, Protocol};
pub use request::{
    CallRequest, Credentials, LoginRequest, RequestError, SessionToken, WireRequest,
};
pub use result::{ErrorKind, InvocationResult};
pub use service::{ServiceDefinition, ServiceDescriptor};
pub use stateless::{
    ProviderIdentity, StatelessOperation, StatelessRequest, StatelessRequestBuilder,
};
