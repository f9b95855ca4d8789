//! Per-socket HTTP/2 connection state
//!
//! [`ConnectionState`] is the single mutable context one driving thread
//! threads through the codec, the settings registry and the HPACK codec:
//! negotiation phase, local and peer settings, both HPACK tables, the
//! inbound frame buffer and the CONTINUATION assembler.

use super::codec::{self, FrameDecoder, HeaderBlock, HeaderBlockAssembler};
use super::error::{Error, Result};
use super::frames::{Frame, FrameBody};
use super::hpack::{Decoder, Encoder, HeaderField};
use super::settings::Settings;
use super::DEFAULT_HEADER_TABLE_SIZE;
use std::fmt;
use tracing::{debug, info};

/// Negotiation phase of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Socket connect in progress or not yet negotiated
    Connecting,
    /// HTTP/1.1 upgrade request sent, waiting for `101`
    Upgrading,
    /// Writing the connection preface and initial SETTINGS
    SendingPreface,
    /// Preface sent, waiting for the peer's SETTINGS
    AwaitingServerSettings,
    /// Frames flow in both directions
    Established,
    /// Shutdown started; only GOAWAY may still be written
    Closing,
    Closed,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Connecting => "Connecting",
            Phase::Upgrading => "Upgrading",
            Phase::SendingPreface => "SendingPreface",
            Phase::AwaitingServerSettings => "AwaitingServerSettings",
            Phase::Established => "Established",
            Phase::Closing => "Closing",
            Phase::Closed => "Closed",
        }
    }

    /// Whether HTTP/2 frames may be read in this phase
    pub fn frames_flow(&self) -> bool {
        matches!(self, Phase::AwaitingServerSettings | Phase::Established)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A frame read off the wire together with everything decoded from it
#[derive(Debug, Clone)]
pub struct InboundFrame {
    pub frame: Frame,
    pub body: FrameBody,
    /// Header block this frame completed, if any
    pub block: Option<HeaderBlock>,
    /// Decoded fields of `block`
    pub fields: Option<Vec<HeaderField>>,
}

/// Mutable state of one HTTP/2 connection
#[derive(Debug)]
pub struct ConnectionState {
    phase: Phase,
    local_settings: Settings,
    remote_settings: Settings,
    decoder: Decoder,
    encoder: Encoder,
    frames: FrameDecoder,
    assembler: HeaderBlockAssembler,
    next_stream_id: u32,
    last_peer_stream_id: u32,
}

impl ConnectionState {
    /// Create the state for a connection advertising `local_settings`
    ///
    /// The HPACK decoder and the inbound frame limit follow the values we
    /// advertise; the encoder starts at the RFC default table size until the
    /// peer's SETTINGS arrive.
    pub fn new(local_settings: Settings) -> Self {
        let decoder = Decoder::new(local_settings.header_table_size() as usize);
        let frames = FrameDecoder::new(local_settings.max_frame_size());
        let encoder = Encoder::new(DEFAULT_HEADER_TABLE_SIZE as usize);

        ConnectionState {
            phase: Phase::Connecting,
            local_settings,
            remote_settings: Settings::new(),
            decoder,
            encoder,
            frames,
            assembler: HeaderBlockAssembler::new(),
            next_stream_id: 1,
            last_peer_stream_id: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Move to `phase`, logging the transition
    pub fn set_phase(&mut self, phase: Phase) {
        if phase != self.phase {
            info!(from = %self.phase, to = %phase, "connection phase");
            self.phase = phase;
        }
    }

    pub fn local_settings(&self) -> &Settings {
        &self.local_settings
    }

    /// Settings received from the peer; empty until its first SETTINGS
    pub fn remote_settings(&self) -> &Settings {
        &self.remote_settings
    }

    pub fn remote_settings_mut(&mut self) -> &mut Settings {
        &mut self.remote_settings
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn encoder_mut(&mut self) -> &mut Encoder {
        &mut self.encoder
    }

    /// Stream id the next request will use
    pub fn next_stream_id(&self) -> u32 {
        self.next_stream_id
    }

    /// Skip ahead, e.g. past stream 1 consumed by an h2c upgrade
    pub fn set_next_stream_id(&mut self, stream_id: u32) {
        self.next_stream_id = stream_id;
    }

    /// Reserve the next client-initiated (odd) stream id
    pub fn allocate_stream_id(&mut self) -> Result<u32> {
        let id = self.next_stream_id;
        if id > super::MAX_STREAM_ID {
            return Err(Error::Protocol("stream ids exhausted".to_string()));
        }
        self.next_stream_id += 2;
        Ok(id)
    }

    /// Highest peer-initiated stream id seen (for GOAWAY)
    pub fn last_peer_stream_id(&self) -> u32 {
        self.last_peer_stream_id
    }

    /// Queue bytes read from the socket
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.frames.push(data);
    }

    /// Bytes queued but not yet consumed as frames
    pub fn buffered(&self) -> usize {
        self.frames.buffered()
    }

    /// Decode the next complete frame from the inbound buffer
    ///
    /// Runs the whole receive pipeline: framing, payload decode,
    /// CONTINUATION coalescing and HPACK decoding of completed blocks.
    /// Returns `None` when more bytes are needed.
    pub fn next_inbound(&mut self) -> Result<Option<InboundFrame>> {
        let frame = match self.frames.next_frame()? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let body = codec::decode_body(&frame)?;
        let block = self.assembler.accept(&frame.header, &body)?;

        let fields = match &block {
            Some(block) => {
                let fields = self
                    .decoder
                    .decode(&block.block)
                    .map_err(|source| Error::HpackDecode {
                        stream_id: block.stream_id,
                        source,
                    })?;
                debug!(
                    stream_id = block.stream_id,
                    fields = fields.len(),
                    fragments = block.fragments,
                    "decoded header block"
                );
                Some(fields)
            }
            None => None,
        };

        if let FrameBody::PushPromise(promise) = &body {
            self.last_peer_stream_id = self.last_peer_stream_id.max(promise.promised_stream_id);
        }

        Ok(Some(InboundFrame {
            frame,
            body,
            block,
            fields,
        }))
    }

    /// Encode a header list with the connection's HPACK encoder
    pub fn encode_headers(&mut self, fields: &[HeaderField]) -> Vec<u8> {
        self.encoder.encode(fields)
    }
}
