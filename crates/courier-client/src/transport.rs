//! Raw socket connections for remote channels.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
#[cfg(unix)]
use std::os::unix::net::UnixStream;
use std::time::Duration;

use courier_config::SocketEndpoint;

use crate::errors::CommunicationError;

/// How long to wait when establishing a connection.
pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected client stream over TCP or a unix domain socket.
#[derive(Debug)]
pub(crate) enum Connection {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

impl Connection {
    /// Clones the stream into independent read and write halves.
    pub(crate) fn split(self) -> io::Result<(Self, Self)> {
        match self {
            Self::Tcp(stream) => {
                let clone = stream.try_clone()?;
                Ok((Self::Tcp(clone), Self::Tcp(stream)))
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                let clone = stream.try_clone()?;
                Ok((Self::Unix(clone), Self::Unix(stream)))
            }
        }
    }

    /// Half-closes the writing direction so the peer observes end of
    /// stream while the reading direction stays open.
    pub(crate) fn shutdown_write(&self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.shutdown(Shutdown::Write),
            #[cfg(unix)]
            Self::Unix(stream) => stream.shutdown(Shutdown::Write),
        }
    }
}

impl Read for Connection {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for Connection {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

/// Opens a connection to the endpoint, honouring [`CONNECTION_TIMEOUT`].
pub(crate) fn connect(endpoint: &SocketEndpoint) -> Result<Connection, CommunicationError> {
    match endpoint {
        SocketEndpoint::Tcp { host, port } => {
            let address = resolve_tcp_address(endpoint, host, *port)?;
            let stream = TcpStream::connect_timeout(&address, CONNECTION_TIMEOUT).map_err(
                |source| CommunicationError::Connect {
                    endpoint: endpoint.to_string(),
                    source,
                },
            )?;
            Ok(Connection::Tcp(stream))
        }
        SocketEndpoint::Unix { path } => connect_unix(endpoint, path.as_str()),
    }
}

fn resolve_tcp_address(
    endpoint: &SocketEndpoint,
    host: &str,
    port: u16,
) -> Result<SocketAddr, CommunicationError> {
    let mut addresses =
        (host, port)
            .to_socket_addrs()
            .map_err(|source| CommunicationError::Resolve {
                endpoint: endpoint.to_string(),
                source,
            })?;
    addresses
        .next()
        .ok_or_else(|| CommunicationError::Resolve {
            endpoint: endpoint.to_string(),
            source: io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                "no addresses resolved for host",
            ),
        })
}

#[cfg(unix)]
fn connect_unix(
    endpoint: &SocketEndpoint,
    path: &str,
) -> Result<Connection, CommunicationError> {
    use socket2::{Domain, SockAddr, Socket, Type};

    let wrap = |source: io::Error| CommunicationError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None).map_err(wrap)?;
    let address = SockAddr::unix(path).map_err(wrap)?;
    socket
        .connect_timeout(&address, CONNECTION_TIMEOUT)
        .map_err(wrap)?;
    Ok(Connection::Unix(socket.into()))
}

#[cfg(not(unix))]
fn connect_unix(
    endpoint: &SocketEndpoint,
    _path: &str,
) -> Result<Connection, CommunicationError> {
    Err(CommunicationError::UnsupportedUnixTransport(
        endpoint.to_string(),
    ))
}
