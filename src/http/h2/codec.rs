//! HTTP/2 frame encoding and decoding
//!
//! Encoding gives full control over frame construction so tests can build
//! deliberately malformed frames with [`encode_frame`]. Decoding is strict:
//! every length, padding and stream id rule of RFC 7540 Section 6 that can
//! be checked on a single frame is checked, and violations surface as
//! [`Error::FrameFormat`] carrying the frame's type, stream id and length.

use super::error::{Error, Result};
use super::frames::*;
use super::settings;
use super::CONNECTION_STREAM_ID;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

const STREAM_ID_MASK: u32 = 0x7FFF_FFFF;
const EXCLUSIVE_BIT: u32 = 0x8000_0000;

/// Encode a frame header
///
/// The reserved stream id bit is always written as 0 and the length is
/// truncated to 24 bits.
pub fn encode_header(
    length: u32,
    frame_type: u8,
    flags: FrameFlags,
    stream_id: u32,
) -> [u8; FRAME_HEADER_SIZE] {
    debug_assert!(length <= MAX_FRAME_LENGTH, "frame length {} exceeds 24 bits", length);

    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[..3].copy_from_slice(&length.to_be_bytes()[1..]);
    header[3] = frame_type;
    header[4] = flags.as_u8();
    header[5..].copy_from_slice(&(stream_id & STREAM_ID_MASK).to_be_bytes());
    header
}

/// Decode a frame header; the reserved stream id bit is ignored
pub fn decode_header(bytes: &[u8; FRAME_HEADER_SIZE]) -> FrameHeader {
    let length = u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]);
    let stream_id = u32::from_be_bytes([bytes[5], bytes[6], bytes[7], bytes[8]]) & STREAM_ID_MASK;

    FrameHeader {
        length,
        frame_type: bytes[3],
        flags: FrameFlags::from_u8(bytes[4]),
        stream_id,
    }
}

/// Encode a complete frame from raw parts without any validation
pub fn encode_frame(frame_type: u8, flags: FrameFlags, stream_id: u32, payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_SIZE + payload.len());
    buf.put_slice(&encode_header(
        payload.len() as u32,
        frame_type,
        flags,
        stream_id,
    ));
    buf.put_slice(payload);
    buf.freeze()
}

fn put_priority(buf: &mut BytesMut, priority: &PrioritySpec) {
    let mut dependency = priority.stream_dependency & STREAM_ID_MASK;
    if priority.exclusive {
        dependency |= EXCLUSIVE_BIT;
    }
    buf.put_u32(dependency);
    buf.put_u8(priority.weight);
}

/// Write `[pad length] content [padding]` for padded frame types
fn put_padded(buf: &mut BytesMut, pad_length: Option<u8>, content: impl FnOnce(&mut BytesMut)) {
    if let Some(pad) = pad_length {
        buf.put_u8(pad);
        content(buf);
        buf.put_bytes(0, pad as usize);
    } else {
        content(buf);
    }
}

/// Encode a typed frame, header included
pub fn encode_body(body: &FrameBody) -> Bytes {
    let mut payload = BytesMut::new();

    let flags = match body {
        FrameBody::Data(f) => {
            put_padded(&mut payload, f.pad_length, |b| b.put_slice(&f.data));
            FrameFlags::empty()
                .with(FrameFlags::END_STREAM, f.end_stream)
                .with(FrameFlags::PADDED, f.pad_length.is_some())
        }
        FrameBody::Headers(f) => {
            put_padded(&mut payload, f.pad_length, |b| {
                if let Some(priority) = &f.priority {
                    put_priority(b, priority);
                }
                b.put_slice(&f.header_block);
            });
            FrameFlags::empty()
                .with(FrameFlags::END_STREAM, f.end_stream)
                .with(FrameFlags::END_HEADERS, f.end_headers)
                .with(FrameFlags::PADDED, f.pad_length.is_some())
                .with(FrameFlags::PRIORITY, f.priority.is_some())
        }
        FrameBody::Priority(f) => {
            put_priority(&mut payload, &f.priority);
            FrameFlags::empty()
        }
        FrameBody::RstStream(f) => {
            payload.put_u32(f.error_code);
            FrameFlags::empty()
        }
        FrameBody::Settings(f) => {
            if !f.ack {
                payload.put_slice(&settings::encode_entries(&f.entries));
            }
            FrameFlags::empty().with(FrameFlags::ACK, f.ack)
        }
        FrameBody::PushPromise(f) => {
            put_padded(&mut payload, f.pad_length, |b| {
                b.put_u32(f.promised_stream_id & STREAM_ID_MASK);
                b.put_slice(&f.header_block);
            });
            FrameFlags::empty()
                .with(FrameFlags::END_HEADERS, f.end_headers)
                .with(FrameFlags::PADDED, f.pad_length.is_some())
        }
        FrameBody::Ping(f) => {
            payload.put_slice(&f.data);
            FrameFlags::empty().with(FrameFlags::ACK, f.ack)
        }
        FrameBody::Goaway(f) => {
            payload.put_u32(f.last_stream_id & STREAM_ID_MASK);
            payload.put_u32(f.error_code);
            payload.put_slice(&f.debug_data);
            FrameFlags::empty()
        }
        FrameBody::WindowUpdate(f) => {
            payload.put_u32(f.increment & STREAM_ID_MASK);
            FrameFlags::empty()
        }
        FrameBody::Continuation(f) => {
            payload.put_slice(&f.header_block);
            FrameFlags::empty().with(FrameFlags::END_HEADERS, f.end_headers)
        }
        FrameBody::Unknown {
            flags, payload: p, ..
        } => {
            payload.put_slice(p);
            *flags
        }
    };

    encode_frame(body.frame_type(), flags, body.stream_id(), &payload)
}

/// Decode the payload of a raw frame into its typed body
pub fn decode_body(frame: &Frame) -> Result<FrameBody> {
    let header = &frame.header;
    let payload = &frame.payload;
    let flags = header.flags;
    let sid = header.stream_id;
    let fail = |reason: String| Error::frame_format(header.frame_type, sid, header.length, reason);

    if payload.len() != header.length as usize {
        return Err(fail(format!(
            "payload has {} bytes, header declares {}",
            payload.len(),
            header.length
        )));
    }

    let kind = match header.kind() {
        Some(kind) => kind,
        None => {
            return Ok(FrameBody::Unknown {
                frame_type: header.frame_type,
                flags,
                stream_id: sid,
                payload: payload.clone(),
            })
        }
    };

    if kind.is_connection_level() && sid != CONNECTION_STREAM_ID {
        return Err(fail("must be sent on stream 0".to_string()));
    }
    if kind.is_stream_level() && sid == CONNECTION_STREAM_ID {
        return Err(fail("must not be sent on stream 0".to_string()));
    }

    let body = match kind {
        FrameType::Data => {
            let (data, pad_length) = strip_padding(payload, flags).map_err(fail)?;
            FrameBody::Data(DataFrame {
                stream_id: sid,
                data,
                end_stream: flags.is_end_stream(),
                pad_length,
            })
        }
        FrameType::Headers => {
            let (mut content, pad_length) = strip_padding(payload, flags).map_err(fail)?;
            let priority = if flags.is_priority() {
                if content.len() < 5 {
                    return Err(fail(format!(
                        "PRIORITY flag set but only {} bytes after padding",
                        content.len()
                    )));
                }
                Some(read_priority(&mut content))
            } else {
                None
            };
            FrameBody::Headers(HeadersFrame {
                stream_id: sid,
                header_block: content,
                end_stream: flags.is_end_stream(),
                end_headers: flags.is_end_headers(),
                priority,
                pad_length,
            })
        }
        FrameType::Priority => {
            expect_length(payload, 5).map_err(fail)?;
            let mut content = payload.clone();
            FrameBody::Priority(PriorityFrame {
                stream_id: sid,
                priority: read_priority(&mut content),
            })
        }
        FrameType::RstStream => {
            expect_length(payload, 4).map_err(fail)?;
            FrameBody::RstStream(RstStreamFrame {
                stream_id: sid,
                error_code: payload.clone().get_u32(),
            })
        }
        FrameType::Settings => {
            if flags.is_ack() {
                if !payload.is_empty() {
                    return Err(fail("SETTINGS ACK must have an empty payload".to_string()));
                }
                FrameBody::Settings(SettingsFrame::ack())
            } else {
                FrameBody::Settings(SettingsFrame::new(settings::decode_entries(payload)?))
            }
        }
        FrameType::PushPromise => {
            let (mut content, pad_length) = strip_padding(payload, flags).map_err(fail)?;
            if content.len() < 4 {
                return Err(fail("missing promised stream id".to_string()));
            }
            let promised_stream_id = content.get_u32() & STREAM_ID_MASK;
            FrameBody::PushPromise(PushPromiseFrame {
                stream_id: sid,
                promised_stream_id,
                header_block: content,
                end_headers: flags.is_end_headers(),
                pad_length,
            })
        }
        FrameType::Ping => {
            expect_length(payload, 8).map_err(fail)?;
            let mut data = [0u8; 8];
            data.copy_from_slice(payload);
            FrameBody::Ping(PingFrame {
                ack: flags.is_ack(),
                data,
            })
        }
        FrameType::Goaway => {
            if payload.len() < 8 {
                return Err(fail(format!("expected at least 8 bytes, got {}", payload.len())));
            }
            let mut content = payload.clone();
            let last_stream_id = content.get_u32() & STREAM_ID_MASK;
            let error_code = content.get_u32();
            FrameBody::Goaway(GoawayFrame {
                last_stream_id,
                error_code,
                debug_data: content,
            })
        }
        FrameType::WindowUpdate => {
            expect_length(payload, 4).map_err(fail)?;
            FrameBody::WindowUpdate(WindowUpdateFrame {
                stream_id: sid,
                increment: payload.clone().get_u32() & STREAM_ID_MASK,
            })
        }
        FrameType::Continuation => FrameBody::Continuation(ContinuationFrame {
            stream_id: sid,
            header_block: payload.clone(),
            end_headers: flags.is_end_headers(),
        }),
    };

    trace!(frame_type = body.name(), stream_id = sid, length = header.length, "decoded frame body");
    Ok(body)
}

fn expect_length(payload: &[u8], expected: usize) -> std::result::Result<(), String> {
    if payload.len() == expected {
        Ok(())
    } else {
        Err(format!("expected {} byte payload, got {}", expected, payload.len()))
    }
}

/// Remove the pad length byte and trailing padding when PADDED is set
fn strip_padding(
    payload: &Bytes,
    flags: FrameFlags,
) -> std::result::Result<(Bytes, Option<u8>), String> {
    if !flags.is_padded() {
        return Ok((payload.clone(), None));
    }

    let pad = *payload
        .first()
        .ok_or_else(|| "PADDED flag set on empty payload".to_string())?;

    if pad as usize > payload.len() - 1 {
        return Err(format!(
            "pad length {} exceeds remaining payload of {} bytes",
            pad,
            payload.len() - 1
        ));
    }

    Ok((payload.slice(1..payload.len() - pad as usize), Some(pad)))
}

fn read_priority(content: &mut Bytes) -> PrioritySpec {
    let dependency = content.get_u32();
    let weight = content.get_u8();
    PrioritySpec {
        stream_dependency: dependency & STREAM_ID_MASK,
        exclusive: dependency & EXCLUSIVE_BIT != 0,
        weight,
    }
}

/// Splits a byte stream into frames
///
/// Bytes arrive in arbitrary chunks; complete frames come out one at a time.
/// A header announcing more than `max_frame_size` bytes is rejected as soon
/// as its 9 bytes are buffered.
#[derive(Debug)]
pub struct FrameDecoder {
    buffer: BytesMut,
    max_frame_size: u32,
}

impl FrameDecoder {
    pub fn new(max_frame_size: u32) -> Self {
        FrameDecoder {
            buffer: BytesMut::with_capacity(4096),
            max_frame_size,
        }
    }

    pub fn set_max_frame_size(&mut self, max_frame_size: u32) {
        self.max_frame_size = max_frame_size;
    }

    pub fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    /// Append received bytes
    pub fn push(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes received but not yet returned as frames
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Next complete frame, or `None` if more bytes are needed
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.buffer.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut raw = [0u8; FRAME_HEADER_SIZE];
        raw.copy_from_slice(&self.buffer[..FRAME_HEADER_SIZE]);
        let header = decode_header(&raw);

        if header.length > self.max_frame_size {
            return Err(Error::frame_format(
                header.frame_type,
                header.stream_id,
                header.length,
                format!("exceeds maximum frame size {}", self.max_frame_size),
            ));
        }

        let total = FRAME_HEADER_SIZE + header.length as usize;
        if self.buffer.len() < total {
            return Ok(None);
        }

        self.buffer.advance(FRAME_HEADER_SIZE);
        let payload = self.buffer.split_to(header.length as usize).freeze();

        Ok(Some(Frame::new(header, payload)))
    }
}

/// A complete header block, possibly assembled from several frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderBlock {
    pub stream_id: u32,
    /// Type of the frame that opened the block (HEADERS or PUSH_PROMISE)
    pub frame_type: FrameType,
    pub end_stream: bool,
    pub priority: Option<PrioritySpec>,
    pub promised_stream_id: Option<u32>,
    pub block: Bytes,
    /// Number of frames that carried the block
    pub fragments: usize,
}

/// Coalesces HEADERS / PUSH_PROMISE fragments with their CONTINUATION frames
///
/// While a block is open, the only acceptable next frame is a CONTINUATION
/// on the same stream (RFC 7540 Section 6.10).
#[derive(Debug, Default)]
pub struct HeaderBlockAssembler {
    pending: Option<(HeaderBlock, BytesMut)>,
}

impl HeaderBlockAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a block is waiting for END_HEADERS
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Feed the next decoded frame
    ///
    /// Returns the completed block when `body` carries END_HEADERS, `None` for
    /// frames that are not part of a header block or leave it incomplete.
    pub fn accept(&mut self, header: &FrameHeader, body: &FrameBody) -> Result<Option<HeaderBlock>> {
        let fail = |reason: String| {
            Error::frame_format(header.frame_type, header.stream_id, header.length, reason)
        };

        if let Some((open, _)) = &self.pending {
            if !matches!(body, FrameBody::Continuation(_)) {
                return Err(fail(format!(
                    "expected CONTINUATION for stream {}",
                    open.stream_id
                )));
            }
        }

        match body {
            FrameBody::Headers(f) => Ok(self.open(
                HeaderBlock {
                    stream_id: f.stream_id,
                    frame_type: FrameType::Headers,
                    end_stream: f.end_stream,
                    priority: f.priority,
                    promised_stream_id: None,
                    block: Bytes::new(),
                    fragments: 1,
                },
                &f.header_block,
                f.end_headers,
            )),
            FrameBody::PushPromise(f) => Ok(self.open(
                HeaderBlock {
                    stream_id: f.stream_id,
                    frame_type: FrameType::PushPromise,
                    end_stream: false,
                    priority: None,
                    promised_stream_id: Some(f.promised_stream_id),
                    block: Bytes::new(),
                    fragments: 1,
                },
                &f.header_block,
                f.end_headers,
            )),
            FrameBody::Continuation(f) => {
                let (mut open, mut fragments) = self
                    .pending
                    .take()
                    .ok_or_else(|| fail("CONTINUATION without an open header block".to_string()))?;

                if open.stream_id != f.stream_id {
                    let reason = format!(
                        "CONTINUATION on stream {} while header block of stream {} is open",
                        f.stream_id, open.stream_id
                    );
                    self.pending = Some((open, fragments));
                    return Err(fail(reason));
                }

                fragments.extend_from_slice(&f.header_block);
                open.fragments += 1;

                if f.end_headers {
                    open.block = fragments.freeze();
                    Ok(Some(open))
                } else {
                    self.pending = Some((open, fragments));
                    Ok(None)
                }
            }
            _ => Ok(None),
        }
    }

    fn open(&mut self, mut block: HeaderBlock, fragment: &Bytes, end_headers: bool) -> Option<HeaderBlock> {
        if end_headers {
            block.block = fragment.clone();
            Some(block)
        } else {
            self.pending = Some((block, BytesMut::from(&fragment[..])));
            None
        }
    }
}
