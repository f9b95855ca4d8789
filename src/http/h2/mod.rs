//! HTTP/2 client driver (RFC 7540, RFC 7541)
//!
//! Drives a single HTTP/2 connection from a test harness over a
//! non-blocking socket, with byte-level control over what goes on the wire.
//!
//! # Architecture
//!
//! - [`frames`] / [`codec`]: frame model and the 9-byte header plus
//!   per-type payload encode/decode, inbound buffering and CONTINUATION
//!   coalescing
//! - [`settings`]: SETTINGS payload codec and the negotiated-value registry
//! - [`hpack`]: static/dynamic tables, full decoder, minimal encoder
//! - [`connection`]: per-socket [`ConnectionState`] and negotiation [`Phase`]
//! - [`upgrade`]: the HTTP/1.1 `Upgrade: h2c` request
//! - [`client`]: the negotiation state machine, [`H2Client`]
//! - [`dispatch`]: frame classification into [`FrameReport`]s
//!
//! TLS and ALPN are not handled here; a secured byte stream can be plugged
//! in through [`SessionOps`](crate::http::SessionOps).
//!
//! # Example
//!
//! ```no_run
//! use h2probe::http::h2::{H2ClientBuilder, NegotiationMode};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = H2ClientBuilder::new()
//!     .mode(NegotiationMode::Upgrade)
//!     .authority("127.0.0.1")
//!     .path("/test/index.txt")
//!     .connect_tcp("127.0.0.1", 8080)?;
//!
//! client.negotiate()?;
//! client.await_server_settings()?;
//! client.read_until_quiet()?;
//!
//! // The upgrade request itself is answered on stream 1
//! let response = client.response(1);
//! println!("status: {:?}", response.status());
//! for report in client.transcript() {
//!     println!("{}", report);
//! }
//! client.shutdown(true)?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod codec;
pub mod connection;
pub mod dispatch;
pub mod error;
pub mod frames;
pub mod hpack;
pub mod settings;
pub mod upgrade;

pub use client::{H2Client, H2ClientBuilder, H2Response, NegotiationMode};
pub use codec::{FrameDecoder, HeaderBlock, HeaderBlockAssembler};
pub use connection::{ConnectionState, Phase};
pub use dispatch::{Direction, FrameDetail, FrameReport};
pub use error::{Error, ErrorCode, Result};
pub use frames::{Frame, FrameBody, FrameFlags, FrameHeader, FrameType};
pub use hpack::{HeaderField, HpackError};
pub use settings::{Settings, SettingsBuilder, SettingsEntry, SettingsParameter};

/// HTTP/2 connection preface that must be sent by clients
///
/// From RFC 7540 Section 3.5:
/// "PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n"
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// Default initial window size (65535 bytes)
pub const DEFAULT_INITIAL_WINDOW_SIZE: u32 = 65535;

/// Default maximum frame size (16384 bytes)
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16384;

/// Default header table size (4096 bytes)
pub const DEFAULT_HEADER_TABLE_SIZE: u32 = 4096;

/// Maximum stream ID value (2^31 - 1)
pub const MAX_STREAM_ID: u32 = 0x7FFFFFFF;

/// Stream ID 0 (connection-level)
pub const CONNECTION_STREAM_ID: u32 = 0;
