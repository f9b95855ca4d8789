//! HTTP layer for h2probe
//!
//! HTTP/1.1 is only spoken for the `Upgrade: h2c` exchange; everything after
//! the `101 Switching Protocols` head belongs to the [`h2`] module.
//!
//! # Architecture
//!
//! All I/O goes through the session operations abstraction:
//!
//! - `SessionOps` trait defines operations (poll, read, write, close)
//! - `HttpSession` adds a per-wait timeout on top of any `SessionOps`
//! - `TcpTransport` from [`crate::net`] is the production implementation
//!
//! # Examples
//!
//! ```no_run
//! use h2probe::http::h2::{H2ClientBuilder, NegotiationMode};
//!
//! let mut client = H2ClientBuilder::new()
//!     .mode(NegotiationMode::PriorKnowledge)
//!     .authority("127.0.0.1:8080")
//!     .path("/test")
//!     .connect_tcp("127.0.0.1", 8080)
//!     .unwrap();
//!
//! client.negotiate().unwrap();
//! client.await_server_settings().unwrap();
//! let stream_id = client.send_request().unwrap();
//! client.read_until_quiet().unwrap();
//! println!("{:?}", client.response(stream_id));
//! ```

pub mod h2;
pub mod headers;
pub mod message;
pub mod parser;
pub mod session;

pub use headers::Headers;
pub use message::{HttpRequest, HttpResponse, Method, Status, Version};
pub use parser::ResponseHeadParser;
pub use session::{HttpSession, PollEvents, SessionOps};

/// Result type for HTTP operations
pub type Result<T> = std::result::Result<T, Error>;

/// HTTP operation errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network error: {0}")]
    Network(#[from] crate::net::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid HTTP version: {0}")]
    InvalidVersion(String),

    #[error("Invalid HTTP status: {0}")]
    InvalidStatus(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("Timeout")]
    Timeout,

    #[error("Connection closed")]
    ConnectionClosed,
}

/// Maximum number of header fields in an HTTP/1.1 message
pub const MAX_HEADERS: usize = 64;

/// CRLF line ending
pub const CRLF: &str = "\r\n";
