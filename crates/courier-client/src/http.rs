//! HTTP channel: one POST exchange per round trip.
//!
//! The request envelope travels as the body of a single `POST /invoke`;
//! the response body carries the result envelope. Under gzip the body is
//! compressed whole and `Content-Encoding: gzip` is set; the server
//! mirrors the encoding. The server closes the connection after the
//! response, so the client reads to end of stream and splits the head off
//! afterwards.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use courier_config::{ChannelConfigError, ClientConnectionInfo, ClientLoginInfo, SocketEndpoint};
use courier_core::{CommandExecutor, ExecutionEnvironment};
use courier_protocol::{
    CommunicationId, CompressionSettings, ErrorKind, InvocationResult, ServiceDefinition,
    WireRequest, compress, decompress,
};

use crate::communication::{ClientCommunication, Exchange, login_over, logout_over};
use crate::errors::CommunicationError;
use crate::proxy::{LoginSession, ServiceProxy};
use crate::stateless::StatelessServiceBridge;
use crate::transport;

const HTTP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::http");

/// Channel over a minimal HTTP/1.1 POST exchange.
pub struct HttpCommunication {
    id: CommunicationId,
    inner: Arc<HttpExchange>,
}

struct HttpExchange {
    endpoint: SocketEndpoint,
    compression: CompressionSettings,
    started: AtomicBool,
}

impl HttpCommunication {
    /// Builds a channel to the given endpoint.
    #[must_use]
    pub fn new(
        id: CommunicationId,
        endpoint: SocketEndpoint,
        compression: CompressionSettings,
    ) -> Self {
        Self {
            id,
            inner: Arc::new(HttpExchange {
                endpoint,
                compression,
                started: AtomicBool::new(false),
            }),
        }
    }

    /// Builds a channel from assembled connection info.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelConfigError::MissingEndpoint`] when the info
    /// carries no endpoint.
    pub fn from_connection_info(
        info: &ClientConnectionInfo,
    ) -> Result<Self, ChannelConfigError> {
        let endpoint = info
            .endpoint()
            .cloned()
            .ok_or_else(|| ChannelConfigError::MissingEndpoint {
                id: info.communication_id().clone(),
            })?;
        Ok(Self::new(
            info.communication_id().clone(),
            endpoint,
            info.compression(),
        ))
    }
}

impl Exchange for HttpExchange {
    fn round_trip(&self, request: &WireRequest) -> Result<InvocationResult, CommunicationError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(CommunicationError::NotStarted);
        }
        let encoded = serde_json::to_vec(request)
            .map_err(courier_protocol::RequestError::Serialize)
            .map_err(CommunicationError::EncodeRequest)?;
        let gzip = self.compression == CompressionSettings::Gzip;
        let body = compress(self.compression, &encoded)
            .map_err(|source| CommunicationError::SendRequest { source })?;

        let mut connection = transport::connect(&self.endpoint)?;
        let head = request_head(body.len(), gzip);
        connection
            .write_all(head.as_bytes())
            .and_then(|()| connection.write_all(&body))
            .and_then(|()| connection.flush())
            .map_err(|source| CommunicationError::SendRequest { source })?;
        let _ = connection.shutdown_write();

        debug!(
            target: HTTP_TARGET,
            endpoint = %self.endpoint,
            "request posted, awaiting response"
        );
        let mut response = Vec::new();
        connection
            .read_to_end(&mut response)
            .map_err(|source| CommunicationError::ReadResponse { source })?;
        parse_response(&response)
    }
}

fn request_head(length: usize, gzip: bool) -> String {
    let mut head = format!(
        "POST /invoke HTTP/1.1\r\nHost: courier\r\nContent-Type: application/json\r\nContent-Length: {length}\r\nConnection: close\r\n"
    );
    if gzip {
        head.push_str("Content-Encoding: gzip\r\n");
    }
    head.push_str("\r\n");
    head
}

/// Splits a full response into head and body and decodes the envelope.
fn parse_response(response: &[u8]) -> Result<InvocationResult, CommunicationError> {
    if response.is_empty() {
        return Err(CommunicationError::MissingResponse);
    }
    let end = response
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .ok_or(CommunicationError::MissingResponse)?;
    let head = std::str::from_utf8(response.get(..end).unwrap_or_default()).map_err(|_| {
        CommunicationError::ReadResponse {
            source: io::Error::new(io::ErrorKind::InvalidData, "response head is not utf-8"),
        }
    })?;
    let mut body = response.get(end + 4..).unwrap_or_default().to_vec();

    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse::<u16>().ok())
        .ok_or(CommunicationError::MissingResponse)?;
    let gzip = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.eq_ignore_ascii_case("content-encoding")
                && value.trim().eq_ignore_ascii_case("gzip")
        })
    });
    if gzip {
        body = decompress(CompressionSettings::Gzip, &body)
            .map_err(|source| CommunicationError::ReadResponse { source })?;
    }

    // Application failures arrive as an error envelope whatever the status
    // line says; only an unparseable body falls back to the status code.
    serde_json::from_slice(&body).map_err(|source| {
        if status == 200 {
            CommunicationError::ParseMessage { source }
        } else {
            CommunicationError::server(ErrorKind::Transport, format!("http status {status}"))
        }
    })
}

impl ClientCommunication for HttpCommunication {
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
            Box::new(CommunicationError::is_transient),
        ))
    }
}

impl std::fmt::Debug for HttpCommunication {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("HttpCommunication")
            .field("id", &self.id)
            .field("endpoint", &self.inner.endpoint)
            .field("compression", &self.inner.compression)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response_bytes(status_line: &str, headers: &str, body: &[u8]) -> Vec<u8> {
        let mut response = format!("{status_line}\r\n{headers}\r\n").into_bytes();
        response.extend_from_slice(body);
        response
    }

    #[test]
    fn parses_plain_value_response() {
        let body = serde_json::to_vec(&InvocationResult::value(json!(7))).expect("encode");
        let response = response_bytes(
            "HTTP/1.1 200 OK",
            &format!("Content-Length: {}\r\nConnection: close\r\n", body.len()),
            &body,
        );
        let result = parse_response(&response).expect("parse");
        assert_eq!(result, InvocationResult::value(json!(7)));
    }

    #[test]
    fn honours_gzip_content_encoding() {
        let encoded =
            serde_json::to_vec(&InvocationResult::value(json!({"ok": true}))).expect("encode");
        let body = compress(CompressionSettings::Gzip, &encoded).expect("compress");
        let response = response_bytes(
            "HTTP/1.1 200 OK",
            &format!(
                "Content-Length: {}\r\nContent-Encoding: gzip\r\n",
                body.len()
            ),
            &body,
        );
        let result = parse_response(&response).expect("parse");
        assert_eq!(result, InvocationResult::value(json!({"ok": true})));
    }

    #[test]
    fn error_envelope_wins_over_status_code() {
        let body = serde_json::to_vec(&InvocationResult::error(
            ErrorKind::InvalidArguments,
            "bad payload",
        ))
        .expect("encode");
        let response = response_bytes(
            "HTTP/1.1 413 Payload Too Large",
            &format!("Content-Length: {}\r\n", body.len()),
            &body,
        );
        let result = parse_response(&response).expect("parse");
        assert!(result.is_error());
    }

    #[test]
    fn unparseable_body_with_error_status_maps_to_transport() {
        let response = response_bytes("HTTP/1.1 502 Bad Gateway", "Content-Length: 9\r\n", b"oops here");
        let error = parse_response(&response).expect_err("must fail");
        assert!(matches!(
            error,
            CommunicationError::Server {
                kind: ErrorKind::Transport,
                ..
            }
        ));
        assert!(error.is_transient());
    }

    #[test]
    fn empty_response_is_missing_response() {
        assert!(matches!(
            parse_response(b""),
            Err(CommunicationError::MissingResponse)
        ));
    }

    #[test]
    fn request_head_carries_length_and_encoding() {
        let head = request_head(42, true);
        assert!(head.starts_with("POST /invoke HTTP/1.1\r\n"));
        assert!(head.contains("Content-Length: 42\r\n"));
        assert!(head.contains("Content-Encoding: gzip\r\n"));
        assert!(head.ends_with("\r\n\r\n"));
    }
}
