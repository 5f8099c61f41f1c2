//! JSONL connection handler.
//!
//! One exchange per connection: the handler reads a single request line,
//! dispatches it, writes a single result line, and lets the connection
//! close. When the channel is configured for gzip the whole stream is
//! compressed in each direction; the client delimits its request by
//! finishing the gzip stream and shutting down its write half.

use std::io::{self, Read, Write};
use std::sync::Arc;

use tracing::{debug, warn};

use courier_core::Dispatcher;
use courier_protocol::{CompressionSettings, CompressionTransform, InvocationResult, WireRequest};

use crate::transport::{ConnectionHandler, ConnectionStream};

use super::{DISPATCH_TARGET, DispatchError, MAX_REQUEST_BYTES};

/// Connection handler serving one JSONL request/response exchange.
pub struct DispatchConnectionHandler {
    dispatcher: Arc<Dispatcher>,
    compression: CompressionSettings,
}

impl DispatchConnectionHandler {
    /// Builds a handler over the shared dispatcher.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher>, compression: CompressionSettings) -> Self {
        Self {
            dispatcher,
            compression,
        }
    }

    fn serve(&self, stream: ConnectionStream) {
        let origin = stream.peer_origin();
        let halves = match stream.split() {
            Ok(halves) => halves,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, error = %error, "failed to split connection");
                return;
            }
        };
        let (read_half, write_half) = halves;
        let mut transform = CompressionTransform::pair(self.compression, read_half, write_half);

        let Some(result) = self.read_and_dispatch(&mut transform, origin.as_deref()) else {
            debug!(target: DISPATCH_TARGET, "client disconnected without request");
            transform.close();
            return;
        };

        if let Err(error) = write_result(&mut transform, &result) {
            warn!(target: DISPATCH_TARGET, error = %error, "failed to write result");
        }
        transform.close();
    }

    fn read_and_dispatch(
        &self,
        transform: &mut CompressionTransform<ConnectionStream, ConnectionStream>,
        origin: Option<&str>,
    ) -> Option<InvocationResult> {
        let Some(reader) = transform.reader() else {
            return Some(
                DispatchError::read(io::Error::new(
                    io::ErrorKind::NotConnected,
                    "reading direction closed",
                ))
                .to_result(),
            );
        };
        let bytes = match read_request_line(reader) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "failed to read request");
                return Some(error.to_result());
            }
        };

        let request = match WireRequest::parse(&bytes) {
            Ok(request) => request,
            Err(error) => {
                warn!(target: DISPATCH_TARGET, %error, "malformed request");
                return Some(DispatchError::from(error).to_result());
            }
        };
        if let Err(error) = request.validate() {
            warn!(target: DISPATCH_TARGET, %error, "invalid request");
            return Some(DispatchError::from(error).to_result());
        }

        debug!(target: DISPATCH_TARGET, origin, "dispatching request");
        Some(self.dispatcher.dispatch(&request, origin))
    }
}

impl ConnectionHandler for DispatchConnectionHandler {
    fn handle(&self, stream: ConnectionStream) {
        self.serve(stream);
    }
}

/// Writes one result line and finishes the outbound stream.
fn write_result<R: Read, W: Write>(
    transform: &mut CompressionTransform<R, W>,
    result: &InvocationResult,
) -> Result<(), DispatchError> {
    let mut line = serde_json::to_vec(result).map_err(|source| DispatchError::Encode { source })?;
    line.push(b'\n');
    let writer = transform.writer().ok_or_else(|| {
        DispatchError::write(io::Error::new(
            io::ErrorKind::NotConnected,
            "writing direction closed",
        ))
    })?;
    writer.write_all(&line).map_err(DispatchError::write)?;
    // Finishing writes the gzip trailer so the peer's decoder sees a
    // complete stream.
    if let Some(mut raw) = transform.finish_writer().map_err(DispatchError::write)? {
        raw.flush().map_err(DispatchError::write)?;
    }
    Ok(())
}

/// Reads a bounded request line from the (possibly decompressing) stream.
///
/// Returns `Ok(None)` when the client disconnects without sending data. A
/// stream that ends without a newline still yields the partial line; the
/// envelope parser decides whether it is usable.
fn read_request_line(reader: &mut (dyn Read + '_)) -> Result<Option<Vec<u8>>, DispatchError> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 1024];

    loop {
        let bytes_read = read_with_retry(reader, &mut chunk).map_err(DispatchError::read)?;

        if bytes_read == 0 {
            return Ok(if buffer.is_empty() {
                None
            } else {
                Some(buffer)
            });
        }

        if let Some(newline_pos) = chunk[..bytes_read].iter().position(|b| *b == b'\n') {
            buffer.extend_from_slice(&chunk[..=newline_pos]);
            enforce_limit(buffer.len())?;
            return Ok(Some(buffer));
        }

        buffer.extend_from_slice(&chunk[..bytes_read]);
        enforce_limit(buffer.len())?;
    }
}

fn read_with_retry(reader: &mut (dyn Read + '_), buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

fn enforce_limit(size: usize) -> Result<(), DispatchError> {
    if size > MAX_REQUEST_BYTES {
        return Err(DispatchError::RequestTooLarge {
            size,
            limit: MAX_REQUEST_BYTES,
        });
    }
    Ok(())
}
