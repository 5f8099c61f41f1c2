//! Connection handlers routing request envelopes to the shared dispatcher.
//!
//! Two wire shapes are served: JSONL (one request line, one result line,
//! optionally whole-stream gzip) and a minimal HTTP/1.1 POST exchange.
//! Both delegate the actual work to the core [`courier_core::Dispatcher`];
//! everything here is framing.

mod errors;
mod http;
mod jsonl;

pub use self::errors::DispatchError;
pub use self::http::HttpConnectionHandler;
pub use self::jsonl::DispatchConnectionHandler;

const DISPATCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::dispatch");

/// Upper bound on a single request envelope in bytes.
pub(crate) const MAX_REQUEST_BYTES: usize = 256 * 1024;
