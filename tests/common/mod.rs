//! Shared helpers for integration tests: logging setup and a scripted peer

#![allow(dead_code)]

use bytes::Bytes;
use h2probe::http::h2::codec::{encode_body, FrameDecoder};
use h2probe::http::h2::frames::{DataFrame, FrameBody, HeadersFrame, SettingsFrame};
use h2probe::http::h2::{Frame, FrameType, SettingsEntry, CONNECTION_PREFACE};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::Once;
use std::thread::{self, JoinHandle};
use std::time::Duration;

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_target(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Proptest configuration with `cases` cases
pub fn test_proptest_config(cases: u32) -> proptest::test_runner::Config {
    proptest::test_runner::Config {
        cases,
        ..proptest::test_runner::Config::default()
    }
}

/// Server side of one connection, driven by a test script
pub struct Peer {
    stream: TcpStream,
    frames: FrameDecoder,
}

impl Peer {
    fn new(stream: TcpStream) -> Self {
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        Peer {
            stream,
            frames: FrameDecoder::new(1 << 24),
        }
    }

    /// Read an HTTP/1.1 head up to and including the blank line
    pub fn read_http_head(&mut self) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            self.stream.read_exact(&mut byte).unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    pub fn read_preface(&mut self) {
        let mut preface = [0u8; 24];
        self.stream.read_exact(&mut preface).unwrap();
        assert_eq!(&preface[..], CONNECTION_PREFACE);
    }

    pub fn read_frame(&mut self) -> Frame {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(frame) = self.frames.next_frame().unwrap() {
                return frame;
            }
            let n = self.stream.read(&mut buf).unwrap();
            assert!(n > 0, "client closed while a frame was expected");
            self.frames.push(&buf[..n]);
        }
    }

    /// Read the next frame and check its type
    pub fn expect_frame(&mut self, kind: FrameType) -> Frame {
        let frame = self.read_frame();
        assert_eq!(frame.header.kind(), Some(kind), "unexpected {:?}", frame.header);
        frame
    }

    pub fn send(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).unwrap();
    }

    pub fn send_body(&mut self, body: FrameBody) {
        self.send(&encode_body(&body));
    }

    /// Prior-knowledge server startup; returns the client's SETTINGS frame
    pub fn accept_prior_knowledge(&mut self) -> Frame {
        self.read_preface();
        let settings = self.expect_frame(FrameType::Settings);
        self.send_body(server_settings());
        let ack = self.expect_frame(FrameType::Settings);
        assert!(ack.flags().is_ack());
        self.send_body(FrameBody::Settings(SettingsFrame::ack()));
        settings
    }

    /// Answer `stream_id` with `:status 200` and `body`
    pub fn respond(&mut self, stream_id: u32, body: &'static [u8]) {
        let mut encoder = hpack::Encoder::new();
        let block = encoder.encode(vec![
            (&b":status"[..], &b"200"[..]),
            (&b"content-type"[..], &b"text/plain"[..]),
        ]);
        self.send_body(FrameBody::Headers(HeadersFrame::new(
            stream_id,
            Bytes::from(block),
            false,
            true,
        )));
        self.send_body(FrameBody::Data(DataFrame::new(
            stream_id,
            Bytes::from_static(body),
            true,
        )));
    }

    /// Read until the client closes, returning any frames seen
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            while let Some(frame) = self.frames.next_frame().unwrap() {
                frames.push(frame);
            }
            match self.stream.read(&mut buf) {
                Ok(0) | Err(_) => return frames,
                Ok(n) => self.frames.push(&buf[..n]),
            }
        }
    }
}

pub fn server_settings() -> FrameBody {
    FrameBody::Settings(SettingsFrame::new(vec![
        SettingsEntry::new(0x3, 100),
        SettingsEntry::new(0x4, 1 << 20),
        SettingsEntry::new(0x5, 16384),
    ]))
}

/// Listen on an ephemeral port and run `script` for the first connection
pub fn spawn_peer<F>(script: F) -> (u16, JoinHandle<()>)
where
    F: FnOnce(Peer) + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        script(Peer::new(stream));
    });

    (port, handle)
}
