//! HTTP/2 client driver
//!
//! [`H2Client`] walks one connection through startup and a single request:
//!
//! ```text
//! Connecting -> Upgrading -> SendingPreface -> AwaitingServerSettings -> Established -> Closing -> Closed
//!            \______________/
//!              prior knowledge
//! ```
//!
//! Every wait is bounded by a per-call timeout. Nothing is retried: any
//! transport, framing, HPACK or negotiation error is returned to the caller,
//! who is expected to [`shutdown`](H2Client::shutdown) the connection.

use super::codec;
use super::connection::{ConnectionState, InboundFrame, Phase};
use super::dispatch::{Direction, FrameDetail, FrameReport};
use super::error::{Error, ErrorCode, Result};
use super::frames::*;
use super::hpack::HeaderField;
use super::settings::{self, Settings, SettingsBuilder};
use super::upgrade;
use super::CONNECTION_PREFACE;
use crate::http::{self, HttpResponse, HttpSession, ResponseHeadParser, SessionOps};
use crate::net::{self, ConnectStatus, TcpTransport};
use bytes::{Bytes, BytesMut};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

const READ_BUFFER_SIZE: usize = 16 * 1024;

/// How the client reaches HTTP/2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationMode {
    /// HTTP/1.1 request with `Upgrade: h2c`, then the preface
    Upgrade,
    /// Connection preface straight away
    #[default]
    PriorKnowledge,
}

/// Outcome of one readiness wait plus read
enum Fill {
    Read(usize),
    Idle,
    Closed,
}

/// HTTP/2 client
///
/// Owns the session and the connection state; driven from one thread.
pub struct H2Client<S: SessionOps> {
    session: HttpSession<S>,
    state: ConnectionState,
    mode: NegotiationMode,
    authority: String,
    path: String,
    headers: Vec<(String, String)>,
    wait_timeout: Duration,
    read_timeout: Duration,
    max_idle_waits: Option<u32>,
    read_buf: Vec<u8>,
    upgrade_response: Option<HttpResponse>,
    transcript: Vec<FrameReport>,
    settings_received: usize,
    peer_closed: bool,
}

impl<S: SessionOps> H2Client<S> {
    /// Create a client with default configuration
    pub fn new(session: S) -> Result<Self> {
        H2ClientBuilder::new().build(session)
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn mode(&self) -> NegotiationMode {
        self.mode
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn local_settings(&self) -> &Settings {
        self.state.local_settings()
    }

    pub fn remote_settings(&self) -> &Settings {
        self.state.remote_settings()
    }

    /// The `101` head received on the upgrade path
    pub fn upgrade_response(&self) -> Option<&HttpResponse> {
        self.upgrade_response.as_ref()
    }

    /// Every frame sent and received so far, in order
    pub fn transcript(&self) -> &[FrameReport] {
        &self.transcript
    }

    /// Number of received frames of `kind`
    pub fn count_received(&self, kind: FrameType) -> usize {
        self.transcript
            .iter()
            .filter(|r| r.is_inbound() && r.kind() == Some(kind))
            .count()
    }

    /// Number of non-ACK SETTINGS frames applied so far
    pub fn settings_received(&self) -> usize {
        self.settings_received
    }

    /// Whether the peer closed its side of the socket
    pub fn is_peer_closed(&self) -> bool {
        self.peer_closed
    }

    pub fn session(&self) -> &S {
        self.session.get_ref()
    }

    /// Run the configured startup protocol up to `AwaitingServerSettings`
    ///
    /// On the upgrade path this sends the HTTP/1.1 upgrade request, requires
    /// `HTTP/1.1 101`, keeps any frame bytes that followed the response head,
    /// and then sends the preface. Stream 1 belongs to the upgrade request,
    /// so the next request uses stream 3.
    pub fn negotiate(&mut self) -> Result<()> {
        if self.state.phase() != Phase::Connecting {
            return Err(Error::NotReady(format!(
                "negotiate in phase {}",
                self.state.phase()
            )));
        }

        if self.mode == NegotiationMode::Upgrade {
            self.upgrade()?;
        }

        self.send_preface()?;
        self.state.set_phase(Phase::AwaitingServerSettings);
        Ok(())
    }

    fn upgrade(&mut self) -> Result<()> {
        self.state.set_phase(Phase::Upgrading);

        let request = upgrade::build_upgrade_request(&self.authority, &self.path, self.state.local_settings())?;
        let wire = request.to_wire();
        debug!(bytes = wire.len(), path = %self.path, "sending upgrade request");
        self.session.write_all(&wire)?;

        let mut parser = ResponseHeadParser::new();
        let mut idle = 0;
        let response = loop {
            match self.fill(self.wait_timeout)? {
                Fill::Read(n) => {
                    let head = parser
                        .feed(&self.read_buf[..n])
                        .map_err(|e| Error::Negotiation(format!("malformed upgrade response: {}", e)))?;
                    if let Some(head) = head {
                        break head;
                    }
                }
                Fill::Idle => self.note_idle(&mut idle, "upgrade response")?,
                Fill::Closed => {
                    return Err(Error::Negotiation(
                        "connection closed before the upgrade response".to_string(),
                    ))
                }
            }
        };

        info!(
            status = %response.status(),
            reason = response.reason(),
            "upgrade response"
        );
        upgrade::check_upgrade_response(&response)?;

        if !response.headers().has_token("upgrade", "h2c") {
            warn!("101 response does not name h2c in Upgrade");
        }

        let leftover = parser.take_remainder();
        if !leftover.is_empty() {
            debug!(bytes = leftover.len(), "frame bytes arrived with the upgrade response");
            self.state.push_inbound(&leftover);
        }

        self.state.set_next_stream_id(3);
        self.upgrade_response = Some(response);
        Ok(())
    }

    fn send_preface(&mut self) -> Result<()> {
        self.state.set_phase(Phase::SendingPreface);
        self.session.write_all(CONNECTION_PREFACE)?;
        debug!(bytes = CONNECTION_PREFACE.len(), "sent connection preface");

        let settings = SettingsFrame::new(self.state.local_settings().entries());
        self.write_frame(&FrameBody::Settings(settings), None)
    }

    /// Read until the peer's SETTINGS has been applied and acknowledged
    ///
    /// Other frames arriving first are processed normally. The wait is
    /// unbounded unless `max_idle_waits` was configured.
    pub fn await_server_settings(&mut self) -> Result<()> {
        match self.state.phase() {
            Phase::AwaitingServerSettings => {}
            Phase::Established => return Ok(()),
            other => {
                return Err(Error::NotReady(format!(
                    "await_server_settings in phase {}",
                    other
                )))
            }
        }

        let mut idle = 0;
        loop {
            self.process_buffered()?;
            if self.state.phase() == Phase::Established {
                return Ok(());
            }

            match self.fill(self.wait_timeout)? {
                Fill::Read(n) => self.state.push_inbound(&self.read_buf[..n]),
                Fill::Idle => self.note_idle(&mut idle, "server SETTINGS")?,
                Fill::Closed => return Err(Error::ConnectionClosed),
            }
        }
    }

    /// Send the test request on a new stream
    ///
    /// `GET` with `:scheme http`, the configured `:authority` and `:path`,
    /// and any extra headers, as one HEADERS frame with END_HEADERS and
    /// END_STREAM (split into CONTINUATION frames only if the block exceeds
    /// the peer's MAX_FRAME_SIZE). Returns the stream id.
    pub fn send_request(&mut self) -> Result<u32> {
        if self.state.phase() != Phase::Established {
            return Err(Error::NotReady(format!(
                "send_request in phase {}",
                self.state.phase()
            )));
        }

        let stream_id = self.state.allocate_stream_id()?;

        let mut fields = vec![
            HeaderField::new(":method", "GET"),
            HeaderField::new(":scheme", "http"),
            HeaderField::new(":authority", self.authority.as_str()),
            HeaderField::new(":path", self.path.as_str()),
        ];
        fields.extend(
            self.headers
                .iter()
                .map(|(name, value)| HeaderField::new(name.to_ascii_lowercase(), value.as_str())),
        );

        let block = Bytes::from(self.state.encode_headers(&fields));
        let max = self.state.remote_settings().max_frame_size() as usize;

        let mut offset = max.min(block.len());
        let complete = offset == block.len();
        let headers = HeadersFrame::new(stream_id, block.slice(..offset), true, complete);
        self.write_frame(&FrameBody::Headers(headers), complete.then(|| fields.clone()))?;

        while offset < block.len() {
            let end = (offset + max).min(block.len());
            let last = end == block.len();
            let continuation = ContinuationFrame {
                stream_id,
                header_block: block.slice(offset..end),
                end_headers: last,
            };
            self.write_frame(&FrameBody::Continuation(continuation), last.then(|| fields.clone()))?;
            offset = end;
        }

        Ok(stream_id)
    }

    /// Process frames until nothing arrives within `read_timeout`
    ///
    /// Also returns when the peer closes. Returns the number of frames
    /// received.
    pub fn read_until_quiet(&mut self) -> Result<usize> {
        if !self.state.phase().frames_flow() {
            return Err(Error::NotReady(format!(
                "read_until_quiet in phase {}",
                self.state.phase()
            )));
        }

        let mut received = self.process_buffered()?;
        while !self.peer_closed {
            match self.fill(self.read_timeout)? {
                Fill::Read(n) => {
                    self.state.push_inbound(&self.read_buf[..n]);
                    received += self.process_buffered()?;
                }
                Fill::Idle => break,
                Fill::Closed => {}
            }
        }

        debug!(frames = received, "connection quiet");
        Ok(received)
    }

    /// Encode, send and record one frame
    pub fn send_frame(&mut self, body: &FrameBody) -> Result<()> {
        let phase = self.state.phase();
        if phase < Phase::SendingPreface || phase >= Phase::Closing {
            return Err(Error::NotReady(format!("send_frame in phase {}", phase)));
        }
        self.write_frame(body, None)
    }

    /// Write pre-encoded bytes, e.g. a deliberately malformed frame
    ///
    /// Raw bytes are not decoded and do not appear in the transcript.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state.phase() >= Phase::Closing {
            return Err(Error::NotReady(format!(
                "send_raw in phase {}",
                self.state.phase()
            )));
        }
        self.session.write_all(bytes)?;
        debug!(bytes = bytes.len(), "sent raw bytes");
        Ok(())
    }

    /// Close the connection, optionally announcing GOAWAY(NO_ERROR) first
    pub fn shutdown(&mut self, send_goaway: bool) -> Result<()> {
        let phase = self.state.phase();
        if phase >= Phase::Closing {
            return Ok(());
        }
        self.state.set_phase(Phase::Closing);

        let goaway = if send_goaway && phase >= Phase::AwaitingServerSettings && !self.peer_closed {
            let body = FrameBody::Goaway(GoawayFrame::new(
                self.state.last_peer_stream_id(),
                ErrorCode::NoError.as_u32(),
                Bytes::new(),
            ));
            self.write_frame(&body, None)
        } else {
            Ok(())
        };

        let closed = self.session.close().map_err(Error::from);
        self.state.set_phase(Phase::Closed);
        goaway.and(closed)
    }

    /// Collect what the peer sent on `stream_id`
    pub fn response(&self, stream_id: u32) -> H2Response {
        let mut response = H2Response {
            stream_id,
            headers: Vec::new(),
            trailers: Vec::new(),
            body: Bytes::new(),
            complete: false,
            reset: None,
        };
        let mut body = BytesMut::new();
        let mut in_promise = false;

        for report in self.transcript.iter().filter(|r| r.is_inbound()) {
            if report.stream_id != stream_id {
                continue;
            }

            match &report.detail {
                // Promised request headers belong to the pushed stream
                FrameDetail::PushPromise { end_headers, .. } => in_promise = !*end_headers,
                FrameDetail::Continuation { end_headers, .. } if in_promise => {
                    in_promise = !*end_headers
                }
                FrameDetail::Headers { fields: Some(fields), .. }
                | FrameDetail::Continuation { fields: Some(fields), .. } => {
                    if response.headers.is_empty() {
                        response.headers = fields.clone();
                    } else {
                        response.trailers.extend(fields.iter().cloned());
                    }
                }
                FrameDetail::Data { data, .. } => body.extend_from_slice(data),
                FrameDetail::RstStream { error_code } => response.reset = Some(*error_code),
                _ => {}
            }

            if report.ends_stream() {
                response.complete = true;
            }
        }

        response.body = body.freeze();
        response
    }

    fn write_frame(&mut self, body: &FrameBody, fields: Option<Vec<HeaderField>>) -> Result<()> {
        let wire = codec::encode_body(body);
        self.session.write_all(&wire)?;

        let mut raw = [0u8; FRAME_HEADER_SIZE];
        raw.copy_from_slice(&wire[..FRAME_HEADER_SIZE]);
        let header = codec::decode_header(&raw);
        self.record(FrameReport::new(Direction::Outbound, &header, body, fields));
        Ok(())
    }

    fn write_settings_ack(&mut self) -> Result<()> {
        let ack = settings::build_ack_frame();
        let body = codec::decode_body(&ack)?;
        let header = ack.header;
        self.session.write_all(&codec::encode_frame(
            header.frame_type,
            header.flags,
            header.stream_id,
            &ack.payload,
        ))?;
        self.record(FrameReport::new(Direction::Outbound, &header, &body, None));
        Ok(())
    }

    fn record(&mut self, report: FrameReport) {
        report.log();
        self.transcript.push(report);
    }

    /// Handle every complete frame already buffered
    fn process_buffered(&mut self) -> Result<usize> {
        let mut count = 0;
        while let Some(inbound) = self.state.next_inbound()? {
            self.handle(inbound)?;
            count += 1;
        }
        Ok(count)
    }

    fn handle(&mut self, inbound: InboundFrame) -> Result<()> {
        let InboundFrame {
            frame, body, fields, ..
        } = inbound;
        self.record(FrameReport::new(Direction::Inbound, &frame.header, &body, fields));

        match &body {
            FrameBody::Settings(f) if !f.ack => {
                settings::apply(&f.entries, &mut self.state)?;
                self.settings_received += 1;
                self.write_settings_ack()?;
                if self.state.phase() == Phase::AwaitingServerSettings {
                    self.state.set_phase(Phase::Established);
                }
            }
            FrameBody::Ping(f) if !f.ack => {
                self.write_frame(&FrameBody::Ping(PingFrame::ack(f.data)), None)?;
            }
            _ => {}
        }

        Ok(())
    }

    fn fill(&mut self, timeout: Duration) -> Result<Fill> {
        if self.peer_closed {
            return Ok(Fill::Closed);
        }

        self.session.set_timeout(Some(timeout));
        match self.session.read(&mut self.read_buf) {
            Ok(0) | Err(http::Error::Network(net::Error::Closed)) => {
                info!("peer closed the connection");
                self.peer_closed = true;
                Ok(Fill::Closed)
            }
            Ok(n) => {
                trace!(bytes = n, "read");
                Ok(Fill::Read(n))
            }
            Err(http::Error::Timeout) => {
                trace!(?timeout, "wait timed out");
                Ok(Fill::Idle)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn note_idle(&self, idle: &mut u32, waiting_for: &str) -> Result<()> {
        *idle += 1;
        match self.max_idle_waits {
            Some(max) if *idle >= max => Err(Error::Negotiation(format!(
                "no {} after {} waits of {:?}",
                waiting_for, idle, self.wait_timeout
            ))),
            _ => Ok(()),
        }
    }
}

/// What the peer sent on one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct H2Response {
    pub stream_id: u32,
    /// First header block, including `:status`
    pub headers: Vec<HeaderField>,
    /// Fields of later header blocks
    pub trailers: Vec<HeaderField>,
    /// Concatenated DATA payloads
    pub body: Bytes,
    /// END_STREAM was seen
    pub complete: bool,
    /// RST_STREAM error code, if the stream was reset
    pub reset: Option<u32>,
}

impl H2Response {
    /// Parsed `:status`
    pub fn status(&self) -> Option<u16> {
        self.header(":status").and_then(|s| s.parse().ok())
    }

    /// First value of `name` in the response headers
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|f| f.name == name.as_bytes())
            .and_then(|f| std::str::from_utf8(&f.value).ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }
}

/// HTTP/2 client builder
#[derive(Debug)]
pub struct H2ClientBuilder {
    mode: NegotiationMode,
    authority: String,
    path: String,
    headers: Vec<(String, String)>,
    wait_timeout: Duration,
    read_timeout: Duration,
    max_idle_waits: Option<u32>,
    settings: SettingsBuilder,
}

impl H2ClientBuilder {
    /// Create a builder advertising the default client SETTINGS
    pub fn new() -> Self {
        H2ClientBuilder {
            mode: NegotiationMode::default(),
            authority: "localhost".to_string(),
            path: "/".to_string(),
            headers: Vec::new(),
            wait_timeout: Duration::from_millis(100),
            read_timeout: Duration::from_millis(200),
            max_idle_waits: None,
            settings: SettingsBuilder::new()
                .header_table_size(4096)
                .enable_push(false)
                .max_concurrent_streams(255)
                .initial_window_size(65534)
                .max_frame_size(16384)
                .max_header_list_size(32768),
        }
    }

    pub fn mode(mut self, mode: NegotiationMode) -> Self {
        self.mode = mode;
        self
    }

    /// `Host` of the upgrade request and `:authority` of the request
    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into();
        self
    }

    /// Request target for both the upgrade request and `:path`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Extra regular header for the HTTP/2 request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Timeout of a single readiness wait
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Quiet period that ends [`H2Client::read_until_quiet`]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Give up after this many consecutive empty waits while connecting,
    /// upgrading or awaiting SETTINGS
    pub fn max_idle_waits(mut self, max: Option<u32>) -> Self {
        self.max_idle_waits = max;
        self
    }

    /// Replace all advertised settings, e.g. with an empty set
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings
            .entries()
            .iter()
            .fold(SettingsBuilder::new(), |b, e| b.raw(e.id, e.value));
        self
    }

    pub fn header_table_size(mut self, size: u32) -> Self {
        self.settings = self.settings.header_table_size(size);
        self
    }

    pub fn enable_push(mut self, enable: bool) -> Self {
        self.settings = self.settings.enable_push(enable);
        self
    }

    pub fn max_concurrent_streams(mut self, max: u32) -> Self {
        self.settings = self.settings.max_concurrent_streams(max);
        self
    }

    pub fn initial_window_size(mut self, size: u32) -> Self {
        self.settings = self.settings.initial_window_size(size);
        self
    }

    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_frame_size(size);
        self
    }

    pub fn max_header_list_size(mut self, size: u32) -> Self {
        self.settings = self.settings.max_header_list_size(size);
        self
    }

    /// Build a client over an already connected session
    pub fn build<S: SessionOps>(self, session: S) -> Result<H2Client<S>> {
        let local_settings = self.settings.build()?;

        let mut session = HttpSession::new(session);
        session.set_timeout(Some(self.wait_timeout));

        Ok(H2Client {
            session,
            state: ConnectionState::new(local_settings),
            mode: self.mode,
            authority: self.authority,
            path: self.path,
            headers: self.headers,
            wait_timeout: self.wait_timeout,
            read_timeout: self.read_timeout,
            max_idle_waits: self.max_idle_waits,
            read_buf: vec![0u8; READ_BUFFER_SIZE],
            upgrade_response: None,
            transcript: Vec::new(),
            settings_received: 0,
            peer_closed: false,
        })
    }

    /// Connect a non-blocking TCP socket and build a client over it
    ///
    /// An in-progress connect is completed by waiting for writability and
    /// checking the socket error.
    pub fn connect_tcp(self, host: &str, port: u16) -> Result<H2Client<TcpTransport>> {
        let (mut transport, status) = TcpTransport::connect(host, port)?;

        if status == ConnectStatus::InProgress {
            let mut idle = 0u32;
            loop {
                if transport.wait_writable(self.wait_timeout)? && transport.finish_connect()? {
                    break;
                }
                idle += 1;
                trace!(idle, "connect still in progress");
                if let Some(max) = self.max_idle_waits {
                    if idle >= max {
                        return Err(net::Error::Timeout(self.wait_timeout * idle).into());
                    }
                }
            }
        }

        info!(peer = %transport.peer_addr(), "connected");
        self.build(transport)
    }
}

impl Default for H2ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
