//! Readiness-driven TCP transport
//!
//! A [`TcpTransport`] owns one non-blocking socket and exposes the small set of
//! primitives the HTTP/2 driver is built on:
//!
//! - [`TcpTransport::connect`] starts a non-blocking connect and reports whether
//!   it completed immediately or is still in progress
//! - [`TcpTransport::wait_readable`] / [`TcpTransport::wait_writable`] block the
//!   calling thread inside `poll(2)` for at most the given timeout
//! - [`TcpTransport::finish_connect`] confirms an in-progress connect after a
//!   writable event
//! - [`TcpTransport::send`] / [`TcpTransport::receive`] move raw bytes between
//!   the socket and a caller-owned buffer
//!
//! The transport performs no framing and never retries on its own: a timed-out
//! wait simply returns `false` and the caller decides what to do next.

use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, ToSocketAddrs};
use std::os::fd::AsRawFd;
use std::time::Duration;
use tracing::{debug, trace};

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Transport errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Host name did not resolve to any socket address
    #[error("Cannot resolve address: {0}")]
    Resolve(String),

    /// Connection refused or unreachable
    #[error("Connect to {addr} failed: {source}")]
    Connect {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// No readiness event arrived within the deadline
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Peer closed the connection during a read or write
    #[error("Connection closed by peer")]
    Closed,

    /// Socket was not ready although readiness was reported
    #[error("Operation would block")]
    WouldBlock,

    /// Any other socket error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of starting a non-blocking connect
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectStatus {
    /// The connection is established
    Connected,
    /// Completion must be confirmed by a writable event and `finish_connect`
    InProgress,
}

/// Readiness interest for a single wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    Both,
}

/// Non-blocking TCP socket with a cooperative readiness wait
#[derive(Debug)]
pub struct TcpTransport {
    socket: Socket,
    peer: SocketAddr,
    connected: bool,
}

impl TcpTransport {
    /// Resolve `host:port` and start a non-blocking connect to the first address
    pub fn connect(host: &str, port: u16) -> Result<(Self, ConnectStatus)> {
        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Resolve(format!("{}:{}: {}", host, port, e)))?
            .next()
            .ok_or_else(|| Error::Resolve(format!("{}:{}", host, port)))?;

        Self::connect_addr(addr)
    }

    /// Start a non-blocking connect to `addr`
    pub fn connect_addr(addr: SocketAddr) -> Result<(Self, ConnectStatus)> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        socket.set_nodelay(true)?;

        let status = match socket.connect(&SockAddr::from(addr)) {
            Ok(()) => ConnectStatus::Connected,
            Err(e) if is_in_progress(&e) => ConnectStatus::InProgress,
            Err(source) => return Err(Error::Connect { addr, source }),
        };

        debug!(%addr, ?status, "connect started");

        Ok((
            TcpTransport {
                socket,
                peer: addr,
                connected: status == ConnectStatus::Connected,
            },
            status,
        ))
    }

    /// Confirm completion of an in-progress connect
    ///
    /// Returns `Ok(false)` while the handshake is still pending, `Ok(true)` once
    /// the socket is connected, and `Error::Connect` when it failed.
    pub fn finish_connect(&mut self) -> Result<bool> {
        if self.connected {
            return Ok(true);
        }

        if let Some(source) = self.socket.take_error()? {
            return Err(Error::Connect {
                addr: self.peer,
                source,
            });
        }

        match self.socket.peer_addr() {
            Ok(_) => {
                self.connected = true;
                debug!(addr = %self.peer, "connect finished");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
            Err(source) => Err(Error::Connect {
                addr: self.peer,
                source,
            }),
        }
    }

    /// Whether the connect has completed
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Address this transport connects to
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Wait until the socket is readable or the timeout elapses
    pub fn wait_readable(&self, timeout: Duration) -> Result<bool> {
        self.wait(Interest::Readable, Some(timeout))
    }

    /// Wait until the socket is writable or the timeout elapses
    pub fn wait_writable(&self, timeout: Duration) -> Result<bool> {
        self.wait(Interest::Writable, Some(timeout))
    }

    /// Wait for readiness; `None` waits without a deadline
    ///
    /// Error and hang-up conditions count as ready so that the following
    /// read, write or `finish_connect` surfaces them.
    pub fn wait(&self, interest: Interest, timeout: Option<Duration>) -> Result<bool> {
        use libc::{poll, pollfd, POLLIN, POLLOUT};

        let mut pfd = pollfd {
            fd: self.socket.as_raw_fd(),
            events: match interest {
                Interest::Readable => POLLIN,
                Interest::Writable => POLLOUT,
                Interest::Both => POLLIN | POLLOUT,
            },
            revents: 0,
        };

        let timeout_ms = timeout
            .map(|d| d.as_millis().min(i32::MAX as u128) as i32)
            .unwrap_or(-1);

        let result = unsafe { poll(&mut pfd as *mut pollfd, 1, timeout_ms) };

        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(Error::Io(err));
        }

        trace!(?interest, ready = result > 0, "readiness wait");
        Ok(result > 0)
    }

    /// Write as many bytes from `buf` as the socket accepts
    pub fn send(&mut self, buf: &[u8]) -> Result<usize> {
        match self.socket.write(buf) {
            Ok(0) if !buf.is_empty() => Err(Error::Closed),
            Ok(n) => Ok(n),
            Err(e) => Err(classify(e)),
        }
    }

    /// Read available bytes into `buf`; `Ok(0)` means the peer closed
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<usize> {
        match self.socket.read(buf) {
            Ok(n) => Ok(n),
            Err(e) => Err(classify(e)),
        }
    }

    /// Shut down both directions of the socket
    pub fn close(&mut self) -> Result<()> {
        match self.socket.shutdown(Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }
}

fn is_in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS) || err.kind() == io::ErrorKind::WouldBlock
}

fn classify(err: io::Error) -> Error {
    match err.kind() {
        io::ErrorKind::WouldBlock => Error::WouldBlock,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted => Error::Closed,
        _ => Error::Io(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn connected_pair() -> (TcpTransport, std::net::TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let (mut transport, status) = TcpTransport::connect_addr(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        if status == ConnectStatus::InProgress {
            assert!(transport.wait_writable(Duration::from_secs(1)).unwrap());
        }
        assert!(transport.finish_connect().unwrap());

        (transport, server)
    }

    #[test]
    fn test_connect_and_receive() {
        let (mut transport, mut server) = connected_pair();

        server.write_all(b"Hello").unwrap();

        assert!(transport.wait_readable(Duration::from_secs(1)).unwrap());
        let mut buf = [0u8; 16];
        let n = transport.receive(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"Hello");
    }

    #[test]
    fn test_send() {
        let (mut transport, mut server) = connected_pair();

        assert!(transport.wait_writable(Duration::from_secs(1)).unwrap());
        assert_eq!(transport.send(b"ping").unwrap(), 4);

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");
    }

    #[test]
    fn test_wait_readable_times_out() {
        let (transport, _server) = connected_pair();

        let ready = transport.wait_readable(Duration::from_millis(50)).unwrap();
        assert!(!ready);
    }

    #[test]
    fn test_receive_reports_peer_close() {
        let (mut transport, server) = connected_pair();
        drop(server);

        assert!(transport.wait_readable(Duration::from_secs(1)).unwrap());
        let mut buf = [0u8; 8];
        assert_eq!(transport.receive(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_receive_without_data_would_block() {
        let (mut transport, _server) = connected_pair();

        let mut buf = [0u8; 8];
        let result = transport.receive(&mut buf);
        assert!(matches!(result, Err(Error::WouldBlock)));
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port with no listener
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap()
        };

        let result = TcpTransport::connect_addr(addr).and_then(|(mut transport, status)| {
            if status == ConnectStatus::InProgress {
                transport.wait_writable(Duration::from_secs(1))?;
            }
            transport.finish_connect()
        });

        assert!(matches!(result, Err(Error::Connect { .. })));
    }

    #[test]
    fn test_close_after_peer_drop() {
        let (mut transport, server) = connected_pair();
        let handle = thread::spawn(move || drop(server));
        handle.join().unwrap();

        transport.close().unwrap();
    }
}
