//! Direct-TCP transport for SMB2
//!
//! SMB2 over port 445 frames each message with a 4-byte header: one
//! zero byte followed by a 24-bit big-endian payload length.
//!
//! The transport is built for forceful cancellation: the socket lives
//! behind an `Arc` and [`Transport::force_close`] can be called from any
//! thread without taking a lock. It sets the socket deadline to "now"
//! and shuts the socket down, so a peer that has stopped responding
//! surfaces an I/O error to whichever thread is blocked on it.

use crate::error::{SmbError, SmbResult};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Largest frame we will accept from a peer (matches the negotiated
/// transact size plus headroom)
const MAX_FRAME_SIZE: usize = 1 << 24;

/// A force-closeable framed TCP connection
pub struct Transport {
    stream: Arc<TcpStream>,
    host: String,
    closed: Arc<AtomicBool>,
}

impl Transport {
    /// Connect to `host:port` with a connect timeout; the same timeout
    /// is installed as the socket read/write deadline.
    pub fn connect(host: &str, port: u16, timeout: Duration) -> SmbResult<Self> {
        let addr = resolve_addr(host, port)?;

        let stream = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            SmbError::ConnectionFailed {
                host: host.to_string(),
                reason: e.to_string(),
            }
        })?;

        stream
            .set_read_timeout(Some(timeout))
            .and_then(|_| stream.set_write_timeout(Some(timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| SmbError::ConnectionFailed {
                host: host.to_string(),
                reason: e.to_string(),
            })?;

        debug!(host = %host, port = port, "TCP connection established");

        Ok(Transport {
            stream: Arc::new(stream),
            host: host.to_string(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// A handle that can force-close this transport from another thread
    pub fn closer(&self) -> TransportCloser {
        TransportCloser {
            stream: Arc::clone(&self.stream),
            closed: Arc::clone(&self.closed),
        }
    }

    fn io_err(&self, e: std::io::Error) -> SmbError {
        SmbError::Io {
            host: self.host.clone(),
            reason: e.to_string(),
        }
    }

    /// Send one framed message.
    pub fn send(&self, payload: &[u8]) -> SmbResult<()> {
        if self.is_closed() {
            return Err(SmbError::NotConnected);
        }
        if payload.len() >= MAX_FRAME_SIZE {
            return Err(SmbError::Protocol(format!(
                "frame too large: {} bytes",
                payload.len()
            )));
        }

        let len = payload.len() as u32;
        let header = [0u8, (len >> 16) as u8, (len >> 8) as u8, len as u8];

        let mut stream: &TcpStream = &self.stream;
        stream.write_all(&header).map_err(|e| self.io_err(e))?;
        stream.write_all(payload).map_err(|e| self.io_err(e))?;
        trace!(host = %self.host, bytes = payload.len(), "Frame sent");
        Ok(())
    }

    /// Receive one framed message.
    pub fn recv(&self) -> SmbResult<Vec<u8>> {
        if self.is_closed() {
            return Err(SmbError::NotConnected);
        }

        let mut stream: &TcpStream = &self.stream;

        let mut header = [0u8; 4];
        stream.read_exact(&mut header).map_err(|e| self.io_err(e))?;

        let len =
            ((header[1] as usize) << 16) | ((header[2] as usize) << 8) | header[3] as usize;
        if len == 0 || len >= MAX_FRAME_SIZE {
            return Err(SmbError::Protocol(format!("invalid frame length: {}", len)));
        }

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).map_err(|e| self.io_err(e))?;
        trace!(host = %self.host, bytes = len, "Frame received");
        Ok(payload)
    }

    /// Graceful close.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Cheap cloneable handle for interrupting a transport from another
/// thread. Holds no lock: sets the deadline to "now" then shuts the
/// socket down, so a blocked read or write unwinds with an error.
#[derive(Clone)]
pub struct TransportCloser {
    stream: Arc<TcpStream>,
    closed: Arc<AtomicBool>,
}

impl TransportCloser {
    pub fn force_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Sockets are safe for concurrent shutdown; a failure here means
        // the socket is already gone.
        let _ = self.stream.set_read_timeout(Some(Duration::from_millis(1)));
        let _ = self.stream.set_write_timeout(Some(Duration::from_millis(1)));
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}

/// Probe whether a TCP port is open within the timeout.
pub fn is_port_open(host: &str, port: u16, timeout: Duration) -> bool {
    match resolve_addr(host, port) {
        Ok(addr) => match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                let _ = stream.shutdown(Shutdown::Both);
                true
            }
            Err(_) => false,
        },
        Err(_) => false,
    }
}

fn resolve_addr(host: &str, port: u16) -> SmbResult<SocketAddr> {
    // Bracket bare IPv6 literals for the host:port form
    let spec = if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    };

    spec.to_socket_addrs()
        .map_err(|e| SmbError::ConnectionFailed {
            host: host.to_string(),
            reason: e.to_string(),
        })?
        .next()
        .ok_or_else(|| SmbError::ConnectionFailed {
            host: host.to_string(),
            reason: "no address found".to_string(),
        })
}
