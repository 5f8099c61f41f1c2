//! Socket channel: one JSONL exchange per connection.
//!
//! Every round trip opens a fresh connection, writes the request as a
//! single JSONL line, and reads back the single result line. Under gzip
//! both directions are whole-stream compressed: the writer is finished so
//! the peer's decoder sees a complete stream, and the write direction is
//! half-closed to mark end of request explicitly.

use std::io::{self, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use courier_config::{ChannelConfigError, ClientConnectionInfo, ClientLoginInfo, SocketEndpoint};
use courier_core::{CommandExecutor, ExecutionEnvironment};
use courier_protocol::{
    CommunicationId, CompressionSettings, CompressionTransform, InvocationResult,
    ServiceDefinition, WireRequest,
};

use crate::communication::{ClientCommunication, Exchange, login_over, logout_over};
use crate::errors::CommunicationError;
use crate::proxy::{LoginSession, ServiceProxy};
use crate::stateless::StatelessServiceBridge;
use crate::transport;

const SOCKET_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::socket");

/// Upper bound on one response line, decompressed.
const MAX_RESPONSE_BYTES: usize = 256 * 1024;

/// Channel over a TCP or unix socket endpoint.
pub struct SocketCommunication {
    id: CommunicationId,
    inner: Arc<SocketExchange>,
}

struct SocketExchange {
    endpoint: SocketEndpoint,
    compression: CompressionSettings,
    started: AtomicBool,
}

impl SocketCommunication {
    /// Builds a channel to the given endpoint.
    #[must_use]
    pub fn new(
        id: CommunicationId,
        endpoint: SocketEndpoint,
        compression: CompressionSettings,
    ) -> Self {
        Self {
            id,
            inner: Arc::new(SocketExchange {
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

impl Exchange for SocketExchange {
    fn round_trip(&self, request: &WireRequest) -> Result<InvocationResult, CommunicationError> {
        if !self.started.load(Ordering::Acquire) {
            return Err(CommunicationError::NotStarted);
        }
        let line = request.to_line()?;

        let connection = transport::connect(&self.endpoint)?;
        let (read_half, write_half) =
            connection
                .split()
                .map_err(|source| CommunicationError::Connect {
                    endpoint: self.endpoint.to_string(),
                    source,
                })?;
        let mut transform = CompressionTransform::pair(self.compression, read_half, write_half);

        let send = |source: io::Error| CommunicationError::SendRequest { source };
        transform
            .writer()
            .ok_or_else(|| send(io::Error::from(io::ErrorKind::NotConnected)))?
            .write_all(&line)
            .map_err(send)?;
        if let Some(raw) = transform.finish_writer().map_err(send)? {
            // Half-close marks end of request; cleanup failures here must
            // not mask the response still travelling back.
            let _ = raw.shutdown_write();
        }

        debug!(
            target: SOCKET_TARGET,
            endpoint = %self.endpoint,
            "request sent, awaiting response line"
        );
        let reader = transform
            .reader()
            .ok_or(CommunicationError::MissingResponse)?;
        let bytes = read_response_line(reader)?;
        let result = serde_json::from_slice(&bytes)
            .map_err(|source| CommunicationError::ParseMessage { source })?;
        transform.close();
        Ok(result)
    }
}

/// Reads one bounded response line, tolerating interrupted reads.
fn read_response_line(reader: &mut (dyn Read + '_)) -> Result<Vec<u8>, CommunicationError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match reader.read(&mut byte) {
            Ok(0) => break,
            Ok(_) => {
                if byte[0] == b'\n' {
                    return Ok(line);
                }
                line.push(byte[0]);
                if line.len() > MAX_RESPONSE_BYTES {
                    return Err(CommunicationError::ReadResponse {
                        source: io::Error::new(
                            io::ErrorKind::InvalidData,
                            "response line exceeds size limit",
                        ),
                    });
                }
            }
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            Err(source) => return Err(CommunicationError::ReadResponse { source }),
        }
    }
    if line.is_empty() {
        Err(CommunicationError::MissingResponse)
    } else {
        Ok(line)
    }
}

impl ClientCommunication for SocketCommunication {
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

impl std::fmt::Debug for SocketCommunication {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SocketCommunication")
            .field("id", &self.id)
            .field("endpoint", &self.inner.endpoint)
            .field("compression", &self.inner.compression)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;

    use courier_config::ClientConnectionInfo;
    use courier_protocol::{Credentials, Kind, Protocol, ServiceDescriptor, SessionToken};

    use super::*;

    /// Accepts one connection and answers every request line with the
    /// canned result.
    fn canned_server(result: InvocationResult) -> SocketEndpoint {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            let mut reader = BufReader::new(stream.try_clone().expect("clone"));
            let mut line = String::new();
            reader.read_line(&mut line).expect("read request");
            let mut body = serde_json::to_vec(&result).expect("encode");
            body.push(b'\n');
            let mut stream = stream;
            stream.write_all(&body).expect("write response");
        });
        SocketEndpoint::tcp("127.0.0.1", port)
    }

    fn communication(endpoint: SocketEndpoint) -> SocketCommunication {
        SocketCommunication::new(
            CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default"),
            endpoint,
            CompressionSettings::None,
        )
    }

    fn login_info(endpoint: SocketEndpoint) -> ClientLoginInfo {
        let id = CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default");
        let connection = ClientConnectionInfo::builder(id)
            .endpoint(endpoint)
            .build()
            .expect("info");
        ClientLoginInfo::new(
            connection,
            Credentials::new("amy", "secret"),
            "console".to_owned(),
        )
    }

    #[test]
    fn connect_before_start_is_rejected() {
        let endpoint = SocketEndpoint::tcp("127.0.0.1", 1);
        let communication = communication(endpoint.clone());
        let error = communication
            .connect(&login_info(endpoint))
            .expect_err("must fail");
        assert!(matches!(error, CommunicationError::NotStarted));
    }

    #[test]
    fn login_handshake_reads_one_result_line() {
        let descriptor = ServiceDescriptor::new(ServiceDefinition::new("login-server"))
            .with_session(SessionToken::new("s-42"));
        let endpoint = canned_server(InvocationResult::service(descriptor));
        let communication = communication(endpoint.clone());
        communication.start();

        let session = communication
            .connect(&login_info(endpoint))
            .expect("connect");
        assert_eq!(session.token().as_str(), "s-42");
    }

    #[test]
    fn descriptor_without_session_is_rejected() {
        let descriptor = ServiceDescriptor::new(ServiceDefinition::new("login-server"));
        let endpoint = canned_server(InvocationResult::service(descriptor));
        let communication = communication(endpoint.clone());
        communication.start();

        let error = communication
            .connect(&login_info(endpoint))
            .expect_err("must fail");
        assert!(matches!(error, CommunicationError::UnexpectedResult { .. }));
    }

    #[test]
    fn closed_connection_without_reply_is_missing_response() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        thread::spawn(move || {
            let (stream, _) = listener.accept().expect("accept");
            drop(stream);
        });
        let endpoint = SocketEndpoint::tcp("127.0.0.1", port);
        let communication = communication(endpoint.clone());
        communication.start();

        let error = communication
            .connect(&login_info(endpoint))
            .expect_err("must fail");
        assert!(matches!(
            error,
            CommunicationError::MissingResponse | CommunicationError::SendRequest { .. }
        ));
    }

    #[test]
    fn from_connection_info_requires_an_endpoint() {
        let id = CommunicationId::new(Protocol::Socket, Kind::ClientServer, "default");
        let info = ClientConnectionInfo::builder(id)
            .endpoint(SocketEndpoint::tcp("127.0.0.1", 9000))
            .compression(CompressionSettings::Gzip)
            .build()
            .expect("info");
        let communication = SocketCommunication::from_connection_info(&info).expect("build");
        assert_eq!(
            communication.communication_id().to_string(),
            "socket/client_server/default"
        );
    }
}
