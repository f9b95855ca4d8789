//! HTTP/2 error types
//!
//! Errors carry the wire context that produced them (frame type byte, stream
//! id, declared length, HPACK byte offset) so a failing test points straight
//! at the bytes at fault. Nothing in this crate retries on error.

use super::hpack::HpackError;
use std::fmt;

/// HTTP/2 errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from the HTTP/1.1 layer (session waits, upgrade response parsing)
    #[error("HTTP error: {0}")]
    Http(#[from] crate::http::Error),

    /// Connect, read, write or timeout failure of the socket
    #[error("Transport error: {0}")]
    Transport(#[from] crate::net::Error),

    /// Frame length, type or flag inconsistency
    #[error(
        "Frame format error in {} frame (sid: {stream_id}, length: {length}): {reason}",
        frame_type_name(.frame_type)
    )]
    FrameFormat {
        frame_type: u8,
        stream_id: u32,
        length: u32,
        reason: String,
    },

    /// Header block on `stream_id` failed to decode
    #[error("HPACK decode error on stream {stream_id}: {source}")]
    HpackDecode {
        stream_id: u32,
        #[source]
        source: HpackError,
    },

    /// Upgrade refused or connection startup did not complete
    #[error("Negotiation failed: {0}")]
    Negotiation(String),

    /// Protocol error detected (RFC 7540 Section 7 - Error code 0x1)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Invalid settings value
    #[error("Invalid settings value: {0}")]
    InvalidSettings(String),

    /// Operation not allowed in the current connection phase
    #[error("Connection not ready: {0}")]
    NotReady(String),

    /// Connection closed
    #[error("Connection closed")]
    ConnectionClosed,
}

impl Error {
    /// Build a [`Error::FrameFormat`] for a frame header
    pub fn frame_format(
        frame_type: u8,
        stream_id: u32,
        length: u32,
        reason: impl Into<String>,
    ) -> Self {
        Error::FrameFormat {
            frame_type,
            stream_id,
            length,
            reason: reason.into(),
        }
    }

    /// Whether the error came from the socket rather than from the peer's bytes
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Transport(_)
                | Error::Io(_)
                | Error::ConnectionClosed
                | Error::Http(crate::http::Error::Network(_))
                | Error::Http(crate::http::Error::Timeout)
                | Error::Http(crate::http::Error::ConnectionClosed)
        )
    }
}

fn frame_type_name(frame_type: &u8) -> String {
    match super::frames::FrameType::from_u8(*frame_type) {
        Some(kind) => kind.name().to_string(),
        None => format!("UNKNOWN(0x{:x})", frame_type),
    }
}

/// HTTP/2 error codes as defined in RFC 7540 Section 7
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    ProtocolError = 0x1,
    InternalError = 0x2,
    FlowControlError = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSizeError = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    CompressionError = 0x9,
    ConnectError = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl ErrorCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            0x0 => Some(ErrorCode::NoError),
            0x1 => Some(ErrorCode::ProtocolError),
            0x2 => Some(ErrorCode::InternalError),
            0x3 => Some(ErrorCode::FlowControlError),
            0x4 => Some(ErrorCode::SettingsTimeout),
            0x5 => Some(ErrorCode::StreamClosed),
            0x6 => Some(ErrorCode::FrameSizeError),
            0x7 => Some(ErrorCode::RefusedStream),
            0x8 => Some(ErrorCode::Cancel),
            0x9 => Some(ErrorCode::CompressionError),
            0xa => Some(ErrorCode::ConnectError),
            0xb => Some(ErrorCode::EnhanceYourCalm),
            0xc => Some(ErrorCode::InadequateSecurity),
            0xd => Some(ErrorCode::Http11Required),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::NoError => "NO_ERROR",
            ErrorCode::ProtocolError => "PROTOCOL_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
            ErrorCode::FlowControlError => "FLOW_CONTROL_ERROR",
            ErrorCode::SettingsTimeout => "SETTINGS_TIMEOUT",
            ErrorCode::StreamClosed => "STREAM_CLOSED",
            ErrorCode::FrameSizeError => "FRAME_SIZE_ERROR",
            ErrorCode::RefusedStream => "REFUSED_STREAM",
            ErrorCode::Cancel => "CANCEL",
            ErrorCode::CompressionError => "COMPRESSION_ERROR",
            ErrorCode::ConnectError => "CONNECT_ERROR",
            ErrorCode::EnhanceYourCalm => "ENHANCE_YOUR_CALM",
            ErrorCode::InadequateSecurity => "INADEQUATE_SECURITY",
            ErrorCode::Http11Required => "HTTP_1_1_REQUIRED",
        }
    }

    /// Name for a raw wire code, including codes this enum does not know
    pub fn describe(code: u32) -> String {
        match ErrorCode::from_u32(code) {
            Some(known) => known.to_string(),
            None => format!("UNKNOWN (0x{:x})", code),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u32())
    }
}

/// Result type for HTTP/2 operations
pub type Result<T> = std::result::Result<T, Error>;
