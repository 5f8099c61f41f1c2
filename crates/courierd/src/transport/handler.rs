//! Connection handling abstractions for the daemon listeners.

use std::io::{self, Read, Write};
use std::net::TcpStream;

#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// Stream types accepted by the daemon listeners.
pub enum ConnectionStream {
    /// Accepted TCP connection.
    Tcp(TcpStream),
    /// Accepted unix-domain connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl ConnectionStream {
    /// Originating address of the peer, when the transport reports one.
    ///
    /// Unix peers have no meaningful address; only TCP peers yield an
    /// origin.
    #[must_use]
    pub fn peer_origin(&self) -> Option<String> {
        match self {
            Self::Tcp(stream) => stream.peer_addr().ok().map(|addr| addr.to_string()),
            #[cfg(unix)]
            Self::Unix(_) => None,
        }
    }

    /// Splits the stream into independently owned read and write halves.
    ///
    /// Both halves refer to the same underlying connection; shutting one
    /// down affects the other.
    ///
    /// # Errors
    ///
    /// Returns the IO error raised while duplicating the handle.
    pub fn split(self) -> io::Result<(Self, Self)> {
        match self {
            Self::Tcp(stream) => {
                let read_half = stream.try_clone()?;
                Ok((Self::Tcp(read_half), Self::Tcp(stream)))
            }
            #[cfg(unix)]
            Self::Unix(stream) => {
                let read_half = stream.try_clone()?;
                Ok((Self::Unix(read_half), Self::Unix(stream)))
            }
        }
    }
}

impl Read for ConnectionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for ConnectionStream {
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

/// Handles accepted connections.
///
/// Implementations run on a per-connection thread and should avoid
/// panicking; a panic takes down only that connection's thread but leaves
/// the peer without a response.
pub trait ConnectionHandler: Send + Sync + 'static {
    /// Handles a single connection.
    fn handle(&self, stream: ConnectionStream);
}
