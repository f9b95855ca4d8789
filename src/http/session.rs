//! Session operations abstraction
//!
//! The HTTP/2 driver talks to its peer through [`SessionOps`], so the same
//! negotiation and framing code runs over the non-blocking [`TcpTransport`]
//! or over any scripted transport a test provides.

use super::{Error, Result};
use crate::net::{self, Interest, TcpTransport};
use std::time::Duration;

/// Session operations trait
///
/// Implementations never block indefinitely in `read` or `write`: callers
/// always `poll` first.
pub trait SessionOps {
    /// Poll the session for events
    ///
    /// Returns true if the session is ready for the requested operation
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool>;

    /// Read data from the session; `Ok(0)` means the peer closed
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write data to the session
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Close the session
    fn close(&mut self) -> Result<()>;
}

/// Poll events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollEvents {
    Read,
    Write,
    Both,
}

impl From<PollEvents> for Interest {
    fn from(events: PollEvents) -> Self {
        match events {
            PollEvents::Read => Interest::Readable,
            PollEvents::Write => Interest::Writable,
            PollEvents::Both => Interest::Both,
        }
    }
}

/// Session wrapping a transport with a per-wait timeout
pub struct HttpSession<S: SessionOps> {
    session: S,
    timeout: Option<Duration>,
}

impl<S: SessionOps> HttpSession<S> {
    /// Create a new session with a 10 second wait timeout
    pub fn new(session: S) -> Self {
        HttpSession {
            session,
            timeout: Some(Duration::from_secs(10)),
        }
    }

    /// Set the timeout for a single readiness wait
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Get the timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Wait for readability, then read
    ///
    /// Returns `Error::Timeout` when nothing arrived within one wait, and
    /// `Ok(0)` when the peer closed the connection.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Read, self.timeout)? {
            return Err(Error::Timeout);
        }

        match self.session.read(buf) {
            Err(Error::Network(net::Error::WouldBlock)) => Err(Error::Timeout),
            other => other,
        }
    }

    /// Wait for writability, then write once
    pub fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if !self.session.poll(PollEvents::Write, self.timeout)? {
            return Err(Error::Timeout);
        }

        match self.session.write(buf) {
            Err(Error::Network(net::Error::WouldBlock)) => Ok(0),
            other => other,
        }
    }

    /// Write the whole buffer, waiting for writability between partial writes
    pub fn write_all(&mut self, mut buf: &[u8]) -> Result<()> {
        while !buf.is_empty() {
            let n = self.write(buf)?;
            buf = &buf[n..];
        }
        Ok(())
    }

    /// Close the session
    pub fn close(&mut self) -> Result<()> {
        self.session.close()
    }

    /// Get a reference to the underlying session
    pub fn get_ref(&self) -> &S {
        &self.session
    }

    /// Get a mutable reference to the underlying session
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.session
    }
}

impl SessionOps for TcpTransport {
    fn poll(&self, events: PollEvents, timeout: Option<Duration>) -> Result<bool> {
        Ok(self.wait(events.into(), timeout)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.receive(buf).map_err(Error::from)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        self.send(buf).map_err(Error::from)
    }

    fn close(&mut self) -> Result<()> {
        TcpTransport::close(self).map_err(Error::from)
    }
}
