//! Minimal HTTP/1.1 connection handler.
//!
//! Serves one POST exchange per connection: the request body carries one
//! JSON request envelope, the response body one result envelope. A gzip
//! request body (`Content-Encoding: gzip`) gets a gzip response body.
//! This is deliberately not a general HTTP server; only what the Courier
//! HTTP channel sends is understood.

use std::io::{self, Read, Write};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

use courier_core::Dispatcher;
use courier_protocol::{
    CompressionSettings, ErrorKind, InvocationResult, WireRequest, compress, decompress,
};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::{DISPATCH_TARGET, MAX_REQUEST_BYTES};

const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Connection handler serving one HTTP POST exchange.
pub struct HttpConnectionHandler {
    dispatcher: Arc<Dispatcher>,
}

impl HttpConnectionHandler {
    /// Builds a handler over the shared dispatcher.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    fn serve(&self, mut stream: ConnectionStream) {
        let origin = stream.peer_origin();
        let response = match read_exchange(&mut stream) {
            Ok(exchange) => self.respond(&exchange, origin.as_deref()),
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "rejected http request");
                error.into_response()
            }
        };
        if let Err(error) = response.write_to(&mut stream) {
            warn!(target: DISPATCH_TARGET, error = %error, "failed to write http response");
        }
    }

    fn respond(&self, exchange: &HttpExchange, origin: Option<&str>) -> HttpResponse {
        let result = match WireRequest::parse(&exchange.body) {
            Ok(request) => match request.validate() {
                Ok(()) => {
                    debug!(target: DISPATCH_TARGET, origin, "dispatching http request");
                    self.dispatcher.dispatch(&request, origin)
                }
                Err(error) => {
                    warn!(target: DISPATCH_TARGET, %error, "invalid http request");
                    InvocationResult::error(ErrorKind::InvalidArguments, error.to_string())
                }
            },
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed http request");
                InvocationResult::error(ErrorKind::InvalidArguments, error.to_string())
            }
        };
        HttpResponse::result(&result, exchange.gzip)
    }
}

impl ConnectionHandler for HttpConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

/// One parsed request: the decoded body plus whether the peer spoke gzip.
struct HttpExchange {
    body: Vec<u8>,
    gzip: bool,
}

/// Rejections that map onto HTTP status codes.
#[derive(Debug, Error)]
enum HttpError {
    #[error("failed to read request: {0}")]
    Read(#[source] io::Error),
    #[error("malformed request head")]
    MalformedHead,
    #[error("method {0} not allowed")]
    MethodNotAllowed(String),
    #[error("missing or invalid content-length header")]
    MissingLength,
    #[error("request body of {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },
    #[error("request body is not a valid gzip stream: {0}")]
    BadEncoding(#[source] io::Error),
}

impl HttpError {
    fn status(&self) -> (u16, &'static str) {
        match self {
            Self::Read(_) | Self::MalformedHead | Self::BadEncoding(_) => (400, "Bad Request"),
            Self::MethodNotAllowed(_) => (405, "Method Not Allowed"),
            Self::MissingLength => (411, "Length Required"),
            Self::BodyTooLarge { .. } => (413, "Payload Too Large"),
        }
    }

    fn into_response(self) -> HttpResponse {
        let (status, reason) = self.status();
        let result = InvocationResult::error(ErrorKind::InvalidArguments, self.to_string());
        HttpResponse::with_status(status, reason, &result, false)
    }
}

struct HttpResponse {
    status: u16,
    reason: &'static str,
    gzip: bool,
    body: Vec<u8>,
}

impl HttpResponse {
    /// Renders a dispatch result as a 200 response.
    fn result(result: &InvocationResult, gzip: bool) -> Self {
        Self::with_status(200, "OK", result, gzip)
    }

    fn with_status(status: u16, reason: &'static str, result: &InvocationResult, gzip: bool) -> Self {
        let encoded = serde_json::to_vec(result).unwrap_or_else(|_| {
            br#"{"result":"error","kind":"internal","message":"unserializable result"}"#.to_vec()
        });
        let settings = if gzip {
            CompressionSettings::Gzip
        } else {
            CompressionSettings::None
        };
        match compress(settings, &encoded) {
            Ok(body) => Self {
                status,
                reason,
                gzip,
                body,
            },
            Err(_) => Self {
                status,
                reason,
                gzip: false,
                body: encoded,
            },
        }
    }

    fn write_to(&self, stream: &mut dyn Write) -> io::Result<()> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
            self.status,
            self.reason,
            self.body.len()
        );
        if self.gzip {
            head.push_str("Content-Encoding: gzip\r\n");
        }
        head.push_str("\r\n");
        stream.write_all(head.as_bytes())?;
        stream.write_all(&self.body)?;
        stream.flush()
    }
}

/// Reads and decodes one POST exchange from the stream.
fn read_exchange(stream: &mut ConnectionStream) -> Result<HttpExchange, HttpError> {
    let (head, leftover) = read_head(stream)?;
    let head = std::str::from_utf8(&head).map_err(|_| HttpError::MalformedHead)?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().ok_or(HttpError::MalformedHead)?;
    let mut parts = request_line.split_whitespace();
    let method = parts.next().ok_or(HttpError::MalformedHead)?;
    let _target = parts.next().ok_or(HttpError::MalformedHead)?;
    if !method.eq_ignore_ascii_case("POST") {
        return Err(HttpError::MethodNotAllowed(method.to_owned()));
    }

    let mut content_length = None;
    let mut gzip = false;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        } else if name.eq_ignore_ascii_case("content-encoding") {
            gzip = value.eq_ignore_ascii_case("gzip");
        }
    }
    let content_length = content_length.ok_or(HttpError::MissingLength)?;
    if content_length > MAX_REQUEST_BYTES {
        return Err(HttpError::BodyTooLarge {
            size: content_length,
            limit: MAX_REQUEST_BYTES,
        });
    }

    let mut body = leftover;
    while body.len() < content_length {
        let mut chunk = [0_u8; 1024];
        let wanted = (content_length - body.len()).min(chunk.len());
        let bytes_read = stream
            .read(&mut chunk[..wanted])
            .map_err(HttpError::Read)?;
        if bytes_read == 0 {
            return Err(HttpError::Read(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "body ended before content-length",
            )));
        }
        body.extend_from_slice(&chunk[..bytes_read]);
    }

    if gzip {
        body = decompress(CompressionSettings::Gzip, &body).map_err(HttpError::BadEncoding)?;
    }
    Ok(HttpExchange { body, gzip })
}

/// Reads the request head up to the blank line; returns head and any body
/// bytes read past it.
fn read_head(stream: &mut ConnectionStream) -> Result<(Vec<u8>, Vec<u8>), HttpError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];
    loop {
        let bytes_read = stream.read(&mut chunk).map_err(HttpError::Read)?;
        if bytes_read == 0 {
            return Err(HttpError::MalformedHead);
        }
        buffer.extend_from_slice(&chunk[..bytes_read]);
        if let Some(end) = find_head_end(&buffer) {
            let body = buffer.split_off(end + 4);
            buffer.truncate(end);
            return Ok((buffer, body));
        }
        if buffer.len() > MAX_HEAD_BYTES {
            return Err(HttpError::MalformedHead);
        }
    }
}

fn find_head_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}
