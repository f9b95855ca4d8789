//! HTTP/2 frame types
//!
//! A frame read off the wire is first a raw [`Frame`] (header plus opaque
//! payload). [`codec::decode_body`](super::codec::decode_body) turns it into
//! one of the [`FrameBody`] variants, one per RFC 7540 Section 6 frame type,
//! and [`codec::encode_body`](super::codec::encode_body) is the exact inverse.

use super::settings::SettingsEntry;
use bytes::Bytes;
use std::fmt;

/// Size of the fixed frame header
pub const FRAME_HEADER_SIZE: usize = 9;

/// Largest value the 24-bit length field can carry
pub const MAX_FRAME_LENGTH: u32 = (1 << 24) - 1;

/// HTTP/2 frame types (RFC 7540 Section 6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    RstStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    Goaway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

impl FrameType {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// `None` for type bytes outside 0x0..=0x9
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(FrameType::Data),
            0x1 => Some(FrameType::Headers),
            0x2 => Some(FrameType::Priority),
            0x3 => Some(FrameType::RstStream),
            0x4 => Some(FrameType::Settings),
            0x5 => Some(FrameType::PushPromise),
            0x6 => Some(FrameType::Ping),
            0x7 => Some(FrameType::Goaway),
            0x8 => Some(FrameType::WindowUpdate),
            0x9 => Some(FrameType::Continuation),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FrameType::Data => "DATA",
            FrameType::Headers => "HEADERS",
            FrameType::Priority => "PRIORITY",
            FrameType::RstStream => "RST_STREAM",
            FrameType::Settings => "SETTINGS",
            FrameType::PushPromise => "PUSH_PROMISE",
            FrameType::Ping => "PING",
            FrameType::Goaway => "GOAWAY",
            FrameType::WindowUpdate => "WINDOW_UPDATE",
            FrameType::Continuation => "CONTINUATION",
        }
    }

    /// Whether frames of this type must carry stream id 0
    pub fn is_connection_level(&self) -> bool {
        matches!(self, FrameType::Settings | FrameType::Ping | FrameType::Goaway)
    }

    /// Whether frames of this type must carry a non-zero stream id
    pub fn is_stream_level(&self) -> bool {
        matches!(
            self,
            FrameType::Data
                | FrameType::Headers
                | FrameType::Priority
                | FrameType::RstStream
                | FrameType::PushPromise
                | FrameType::Continuation
        )
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// HTTP/2 frame flags
///
/// The meaning of each bit depends on the frame type; unknown bits are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// END_STREAM flag (0x1)
    pub const END_STREAM: u8 = 0x1;

    /// ACK flag (0x1) - used for SETTINGS and PING
    pub const ACK: u8 = 0x1;

    /// END_HEADERS flag (0x4)
    pub const END_HEADERS: u8 = 0x4;

    /// PADDED flag (0x8)
    pub const PADDED: u8 = 0x8;

    /// PRIORITY flag (0x20)
    pub const PRIORITY: u8 = 0x20;

    pub fn empty() -> Self {
        FrameFlags(0)
    }

    pub fn from_u8(flags: u8) -> Self {
        FrameFlags(flags)
    }

    pub fn as_u8(&self) -> u8 {
        self.0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    /// Builder-style [`set`](Self::set) that applies only when `on` is true
    pub fn with(mut self, flag: u8, on: bool) -> Self {
        if on {
            self.set(flag);
        }
        self
    }

    pub fn is_set(&self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn is_end_stream(&self) -> bool {
        self.is_set(Self::END_STREAM)
    }

    pub fn is_ack(&self) -> bool {
        self.is_set(Self::ACK)
    }

    pub fn is_end_headers(&self) -> bool {
        self.is_set(Self::END_HEADERS)
    }

    pub fn is_padded(&self) -> bool {
        self.is_set(Self::PADDED)
    }

    pub fn is_priority(&self) -> bool {
        self.is_set(Self::PRIORITY)
    }
}

impl fmt::Display for FrameFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// The 9-byte frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Payload length, 24 bits
    pub length: u32,
    /// Raw type byte; may name a type this crate does not know
    pub frame_type: u8,
    pub flags: FrameFlags,
    /// Stream id with the reserved bit cleared
    pub stream_id: u32,
}

impl FrameHeader {
    pub fn new(length: u32, frame_type: u8, flags: FrameFlags, stream_id: u32) -> Self {
        FrameHeader {
            length,
            frame_type,
            flags,
            stream_id,
        }
    }

    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Type name, or `UNKNOWN` for unrecognized type bytes
    pub fn type_name(&self) -> &'static str {
        self.kind().map(|k| k.name()).unwrap_or("UNKNOWN")
    }
}

/// A frame as read from the wire: header plus undecoded payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Frame { header, payload }
    }

    pub fn stream_id(&self) -> u32 {
        self.header.stream_id
    }

    pub fn flags(&self) -> FrameFlags {
        self.header.flags
    }
}

/// Priority fields of HEADERS and PRIORITY frames (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrioritySpec {
    pub stream_dependency: u32,
    pub exclusive: bool,
    /// Wire weight byte; the effective weight is this value plus one
    pub weight: u8,
}

impl PrioritySpec {
    pub fn new(stream_dependency: u32, exclusive: bool, weight: u8) -> Self {
        PrioritySpec {
            stream_dependency,
            exclusive,
            weight,
        }
    }
}

/// DATA frame (RFC 7540 Section 6.1)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFrame {
    pub stream_id: u32,
    pub data: Bytes,
    pub end_stream: bool,
    /// Pad length when the PADDED flag is set
    pub pad_length: Option<u8>,
}

impl DataFrame {
    pub fn new(stream_id: u32, data: Bytes, end_stream: bool) -> Self {
        DataFrame {
            stream_id,
            data,
            end_stream,
            pad_length: None,
        }
    }

    pub fn with_padding(mut self, pad_length: u8) -> Self {
        self.pad_length = Some(pad_length);
        self
    }
}

/// HEADERS frame (RFC 7540 Section 6.2)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadersFrame {
    pub stream_id: u32,
    /// Header block fragment with padding and priority fields removed
    pub header_block: Bytes,
    pub end_stream: bool,
    pub end_headers: bool,
    pub priority: Option<PrioritySpec>,
    pub pad_length: Option<u8>,
}

impl HeadersFrame {
    pub fn new(stream_id: u32, header_block: Bytes, end_stream: bool, end_headers: bool) -> Self {
        HeadersFrame {
            stream_id,
            header_block,
            end_stream,
            end_headers,
            priority: None,
            pad_length: None,
        }
    }

    pub fn with_priority(mut self, priority: PrioritySpec) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_padding(mut self, pad_length: u8) -> Self {
        self.pad_length = Some(pad_length);
        self
    }
}

/// PRIORITY frame (RFC 7540 Section 6.3)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityFrame {
    pub stream_id: u32,
    pub priority: PrioritySpec,
}

/// RST_STREAM frame (RFC 7540 Section 6.4)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RstStreamFrame {
    pub stream_id: u32,
    /// Raw error code, see [`ErrorCode`](super::error::ErrorCode)
    pub error_code: u32,
}

/// SETTINGS frame (RFC 7540 Section 6.5)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsFrame {
    pub ack: bool,
    /// Entries in wire order, unknown ids included
    pub entries: Vec<SettingsEntry>,
}

impl SettingsFrame {
    pub fn new(entries: Vec<SettingsEntry>) -> Self {
        SettingsFrame {
            ack: false,
            entries,
        }
    }

    pub fn ack() -> Self {
        SettingsFrame {
            ack: true,
            entries: Vec::new(),
        }
    }
}

/// PUSH_PROMISE frame (RFC 7540 Section 6.6)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushPromiseFrame {
    pub stream_id: u32,
    pub promised_stream_id: u32,
    pub header_block: Bytes,
    pub end_headers: bool,
    pub pad_length: Option<u8>,
}

/// PING frame (RFC 7540 Section 6.7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingFrame {
    pub ack: bool,
    pub data: [u8; 8],
}

impl PingFrame {
    pub fn new(data: [u8; 8]) -> Self {
        PingFrame { ack: false, data }
    }

    pub fn ack(data: [u8; 8]) -> Self {
        PingFrame { ack: true, data }
    }
}

/// GOAWAY frame (RFC 7540 Section 6.8)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoawayFrame {
    pub last_stream_id: u32,
    pub error_code: u32,
    pub debug_data: Bytes,
}

impl GoawayFrame {
    pub fn new(last_stream_id: u32, error_code: u32, debug_data: Bytes) -> Self {
        GoawayFrame {
            last_stream_id,
            error_code,
            debug_data,
        }
    }
}

/// WINDOW_UPDATE frame (RFC 7540 Section 6.9)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowUpdateFrame {
    /// 0 for the connection window
    pub stream_id: u32,
    /// Increment with the reserved bit cleared
    pub increment: u32,
}

impl WindowUpdateFrame {
    pub fn new(stream_id: u32, increment: u32) -> Self {
        WindowUpdateFrame {
            stream_id,
            increment,
        }
    }
}

/// CONTINUATION frame (RFC 7540 Section 6.10)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationFrame {
    pub stream_id: u32,
    pub header_block: Bytes,
    pub end_headers: bool,
}

/// Decoded frame payload, one variant per frame type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameBody {
    Data(DataFrame),
    Headers(HeadersFrame),
    Priority(PriorityFrame),
    RstStream(RstStreamFrame),
    Settings(SettingsFrame),
    PushPromise(PushPromiseFrame),
    Ping(PingFrame),
    Goaway(GoawayFrame),
    WindowUpdate(WindowUpdateFrame),
    Continuation(ContinuationFrame),
    /// Frame of an extension type; must be ignored by the receiver
    Unknown {
        frame_type: u8,
        flags: FrameFlags,
        stream_id: u32,
        payload: Bytes,
    },
}

impl FrameBody {
    /// Raw type byte this body encodes to
    pub fn frame_type(&self) -> u8 {
        match self {
            FrameBody::Data(_) => FrameType::Data.as_u8(),
            FrameBody::Headers(_) => FrameType::Headers.as_u8(),
            FrameBody::Priority(_) => FrameType::Priority.as_u8(),
            FrameBody::RstStream(_) => FrameType::RstStream.as_u8(),
            FrameBody::Settings(_) => FrameType::Settings.as_u8(),
            FrameBody::PushPromise(_) => FrameType::PushPromise.as_u8(),
            FrameBody::Ping(_) => FrameType::Ping.as_u8(),
            FrameBody::Goaway(_) => FrameType::Goaway.as_u8(),
            FrameBody::WindowUpdate(_) => FrameType::WindowUpdate.as_u8(),
            FrameBody::Continuation(_) => FrameType::Continuation.as_u8(),
            FrameBody::Unknown { frame_type, .. } => *frame_type,
        }
    }

    pub fn stream_id(&self) -> u32 {
        match self {
            FrameBody::Data(f) => f.stream_id,
            FrameBody::Headers(f) => f.stream_id,
            FrameBody::Priority(f) => f.stream_id,
            FrameBody::RstStream(f) => f.stream_id,
            FrameBody::PushPromise(f) => f.stream_id,
            FrameBody::WindowUpdate(f) => f.stream_id,
            FrameBody::Continuation(f) => f.stream_id,
            FrameBody::Settings(_) | FrameBody::Ping(_) | FrameBody::Goaway(_) => 0,
            FrameBody::Unknown { stream_id, .. } => *stream_id,
        }
    }

    pub fn name(&self) -> &'static str {
        FrameType::from_u8(self.frame_type())
            .map(|k| k.name())
            .unwrap_or("UNKNOWN")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_type_conversion() {
        assert_eq!(FrameType::Data.as_u8(), 0x0);
        assert_eq!(FrameType::Continuation.as_u8(), 0x9);

        assert_eq!(FrameType::from_u8(0x4), Some(FrameType::Settings));
        assert_eq!(FrameType::from_u8(0xa), None);
        assert_eq!(FrameType::from_u8(0xff), None);
    }

    #[test]
    fn test_frame_type_scope() {
        assert!(FrameType::Settings.is_connection_level());
        assert!(FrameType::Headers.is_stream_level());
        // WINDOW_UPDATE may target either
        assert!(!FrameType::WindowUpdate.is_connection_level());
        assert!(!FrameType::WindowUpdate.is_stream_level());
    }

    #[test]
    fn test_frame_flags() {
        let flags = FrameFlags::empty()
            .with(FrameFlags::END_STREAM, true)
            .with(FrameFlags::PADDED, false)
            .with(FrameFlags::END_HEADERS, true);

        assert_eq!(flags.as_u8(), 0x05);
        assert!(flags.is_end_stream());
        assert!(flags.is_end_headers());
        assert!(!flags.is_padded());
        assert_eq!(flags.to_string(), "0x5");
    }

    #[test]
    fn test_header_type_name() {
        let header = FrameHeader::new(0, 0x4, FrameFlags::empty(), 0);
        assert_eq!(header.type_name(), "SETTINGS");

        let header = FrameHeader::new(0, 0xb, FrameFlags::empty(), 0);
        assert_eq!(header.kind(), None);
        assert_eq!(header.type_name(), "UNKNOWN");
    }

    #[test]
    fn test_body_accessors() {
        let body = FrameBody::WindowUpdate(WindowUpdateFrame::new(3, 100));
        assert_eq!(body.frame_type(), 0x8);
        assert_eq!(body.stream_id(), 3);
        assert_eq!(body.name(), "WINDOW_UPDATE");

        let body = FrameBody::Settings(SettingsFrame::ack());
        assert_eq!(body.stream_id(), 0);

        let body = FrameBody::Unknown {
            frame_type: 0xee,
            flags: FrameFlags::empty(),
            stream_id: 9,
            payload: Bytes::new(),
        };
        assert_eq!(body.frame_type(), 0xee);
        assert_eq!(body.name(), "UNKNOWN");
    }
}
