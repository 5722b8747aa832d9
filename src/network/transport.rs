//! Transport
//!
//! Owns the TCP stream of one session. Sends and receives whole buffers
//! only; a short transfer is an error, never a partial result.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::ConnectError;

/// A connected (or closed) stream socket
pub struct Transport {
    /// TCP stream, `None` once disconnected
    stream: Option<TcpStream>,

    /// Peer address for logging
    peer_addr: String,

    /// Configured read timeout, restored after event polling
    read_timeout: Option<Duration>,
}

impl Transport {
    /// Resolve `host:port` and connect to the first candidate that accepts.
    ///
    /// Candidates are tried in resolver order (IPv4 and IPv6 alike).
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Option<Duration>,
    ) -> Result<Self, ConnectError> {
        let candidates: Vec<_> = (host, port)
            .to_socket_addrs()
            .map_err(|source| ConnectError::ResolutionFailed {
                host: host.to_string(),
                port,
                source,
            })?
            .collect();

        if candidates.is_empty() {
            return Err(ConnectError::ResolutionFailed {
                host: host.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::NotFound, "no addresses returned"),
            });
        }

        let mut last_error = None;
        for addr in &candidates {
            let attempt = match connect_timeout {
                Some(timeout) => TcpStream::connect_timeout(addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(stream) => {
                    tracing::debug!("Connected to {} ({}:{})", addr, host, port);
                    return Self::from_stream(stream).map_err(|e| ConnectError::AllCandidatesFailed {
                        host: host.to_string(),
                        port,
                        attempts: candidates.len(),
                        last_error: Some(e),
                    });
                }
                Err(e) => {
                    tracing::debug!("Connect to {} failed: {}", addr, e);
                    last_error = Some(e);
                }
            }
        }

        Err(ConnectError::AllCandidatesFailed {
            host: host.to_string(),
            port,
            attempts: candidates.len(),
            last_error,
        })
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm; every exchange is a small request/response
        stream.set_nodelay(true)?;

        Ok(Self {
            stream: Some(stream),
            peer_addr,
            read_timeout: None,
        })
    }

    /// Configure socket timeouts (`None` blocks forever)
    pub fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> io::Result<()> {
        let stream = self.stream()?;
        stream.set_read_timeout(read)?;
        stream.set_write_timeout(write)?;
        self.read_timeout = read;
        Ok(())
    }

    /// Send the whole buffer or fail
    pub fn send_exact(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream_mut()?;
        stream.write_all(bytes)?;
        stream.flush()
    }

    /// Receive exactly `n` bytes or fail with `UnexpectedEof`
    pub fn recv_exact(&mut self, n: usize) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        let received = crate::protocol::read_full(self, &mut buf)?;
        if received < n {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("connection closed after {received} of {n} bytes"),
            ));
        }
        Ok(buf)
    }

    /// Close the socket. Calling it again is a no-op.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            // The peer may already be gone; nothing useful to do with the error
            let _ = stream.shutdown(Shutdown::Both);
            tracing::debug!("Disconnected from {}", self.peer_addr);
        }
    }

    /// Whether the socket is still open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }

    /// Wait up to `timeout` for at least one readable byte.
    ///
    /// Nothing is consumed. Returns `Ok(false)` on timeout.
    pub(crate) fn wait_readable(&mut self, timeout: Duration) -> io::Result<bool> {
        let restore = self.read_timeout;
        let stream = self.stream()?;
        // A zero duration is rejected by set_read_timeout
        stream.set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        let result = peek_one(stream);
        stream.set_read_timeout(restore)?;
        result
    }

    /// Whether a byte is readable right now, without blocking
    pub(crate) fn has_pending(&mut self) -> io::Result<bool> {
        let stream = self.stream()?;
        stream.set_nonblocking(true)?;
        let result = peek_one(stream);
        stream.set_nonblocking(false)?;
        result
    }

    fn stream(&self) -> io::Result<&TcpStream> {
        self.stream
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is disconnected"))
    }

    fn stream_mut(&mut self) -> io::Result<&mut TcpStream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "transport is disconnected"))
    }
}

fn peek_one(stream: &TcpStream) -> io::Result<bool> {
    let mut peeked = [0u8; 1];
    match stream.peek(&mut peeked) {
        Ok(0) => Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed by peer",
        )),
        Ok(_) => Ok(true),
        Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => Ok(false),
        Err(e) => Err(e),
    }
}

impl Read for Transport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream_mut()?.read(buf)
    }
}

impl Write for Transport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream_mut()?.flush()
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("peer_addr", &self.peer_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}
