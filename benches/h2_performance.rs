//! HTTP/2 codec benchmarks
//!
//! Measures the hot paths of a probe run:
//! - Frame header encode/decode
//! - Per-type payload decoding
//! - SETTINGS payload codec
//! - HPACK block encode/decode
//! - The inbound pipeline of a whole server response
//!
//! Run with: cargo bench --bench h2_performance

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use h2probe::http::h2::codec::{decode_body, decode_header, encode_body, encode_header, FrameDecoder};
use h2probe::http::h2::frames::{
    DataFrame, FrameBody, GoawayFrame, HeadersFrame, PingFrame, SettingsFrame, WindowUpdateFrame,
};
use h2probe::http::h2::hpack::{Decoder, Encoder, HeaderField};
use h2probe::http::h2::settings::{decode_entries, encode_entries};
use h2probe::http::h2::{ConnectionState, FrameFlags, Settings, SettingsEntry};
use std::time::Duration;

fn request_fields() -> Vec<HeaderField> {
    vec![
        HeaderField::new(":method", "GET"),
        HeaderField::new(":scheme", "http"),
        HeaderField::new(":authority", "127.0.0.1:8080"),
        HeaderField::new(":path", "/test/index.txt?x=y&a=b"),
        HeaderField::new("user-agent", "h2probe"),
        HeaderField::new("accept", "*/*"),
        HeaderField::new("x-probe", "1"),
    ]
}

// ========== Frame header ==========

fn bench_frame_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_header");

    group.bench_function("encode", |b| {
        b.iter(|| {
            encode_header(
                black_box(1024),
                black_box(0x0),
                black_box(FrameFlags::from_u8(0x1)),
                black_box(1),
            )
        });
    });

    let bytes = encode_header(36, 0x4, FrameFlags::empty(), 0);
    group.bench_function("decode", |b| {
        b.iter(|| decode_header(black_box(&bytes)));
    });

    group.finish();
}

// ========== Payload decoding ==========

fn bench_decode_body(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_body");

    let bodies = [
        (
            "settings",
            FrameBody::Settings(SettingsFrame::new(vec![
                SettingsEntry::new(0x3, 100),
                SettingsEntry::new(0x4, 65535),
                SettingsEntry::new(0x5, 16384),
            ])),
        ),
        ("ping", FrameBody::Ping(PingFrame::new(*b"h2probe!"))),
        ("window_update", FrameBody::WindowUpdate(WindowUpdateFrame::new(0, 1 << 20))),
        (
            "goaway",
            FrameBody::Goaway(GoawayFrame::new(1, 0, Bytes::from_static(b"bye"))),
        ),
        (
            "headers_padded",
            FrameBody::Headers(
                HeadersFrame::new(1, Bytes::from_static(&[0x88, 0x5f, 0x87]), false, true)
                    .with_padding(16),
            ),
        ),
    ];

    for (name, body) in bodies.iter() {
        let mut decoder = FrameDecoder::new(16384);
        decoder.push(&encode_body(body));
        let frame = match decoder.next_frame() {
            Ok(Some(frame)) => frame,
            _ => panic!("benchmark frame {} did not decode", name),
        };

        group.bench_with_input(BenchmarkId::from_parameter(name), &frame, |b, frame| {
            b.iter(|| decode_body(black_box(frame)));
        });
    }

    for size in [1024usize, 16384] {
        let body = FrameBody::Data(DataFrame::new(1, Bytes::from(vec![0x61; size]), false));
        let wire = encode_body(&body);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("data", size), &wire, |b, wire| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new(16384);
                decoder.push(black_box(wire));
                decoder.next_frame()
            });
        });
    }

    group.finish();
}

// ========== SETTINGS ==========

fn bench_settings(c: &mut Criterion) {
    let mut group = c.benchmark_group("settings");

    let entries = Settings::builder()
        .header_table_size(4096)
        .enable_push(false)
        .max_concurrent_streams(255)
        .initial_window_size(65534)
        .max_frame_size(16384)
        .build()
        .map(|settings| settings.entries())
        .unwrap_or_default();
    let payload = encode_entries(&entries);

    group.bench_function("encode", |b| {
        b.iter(|| encode_entries(black_box(&entries)));
    });

    group.bench_function("decode", |b| {
        b.iter(|| decode_entries(black_box(&payload)));
    });

    group.finish();
}

// ========== HPACK ==========

fn bench_hpack(c: &mut Criterion) {
    let mut group = c.benchmark_group("hpack");
    let fields = request_fields();

    group.bench_function("encode_literal", |b| {
        b.iter(|| {
            let mut encoder = Encoder::new(4096);
            encoder.encode(black_box(&fields))
        });
    });

    group.bench_function("encode_indexed_warm", |b| {
        let mut encoder = Encoder::with_indexing(4096);
        encoder.encode(&fields);
        b.iter(|| encoder.encode(black_box(&fields)));
    });

    let block = Encoder::new(4096).encode(&fields);
    group.bench_function("decode_literal", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new(4096);
            decoder.decode(black_box(&block))
        });
    });

    // Block produced by the hpack crate, with its own indexing choices
    let pairs: Vec<(&[u8], &[u8])> = fields
        .iter()
        .map(|f| (f.name.as_slice(), f.value.as_slice()))
        .collect();
    let reference = hpack::Encoder::new().encode(pairs);
    group.bench_function("decode_reference", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new(4096);
            decoder.decode(black_box(&reference))
        });
    });

    group.finish();
}

// ========== Inbound pipeline ==========

fn bench_inbound_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("inbound_pipeline");

    let mut response = Encoder::new(4096);
    let block = response.encode(&[
        HeaderField::new(":status", "200"),
        HeaderField::new("content-type", "text/plain"),
    ]);

    let mut wire = Vec::new();
    for body in [
        FrameBody::Settings(SettingsFrame::new(vec![SettingsEntry::new(0x3, 100)])),
        FrameBody::Settings(SettingsFrame::ack()),
        FrameBody::Headers(HeadersFrame::new(1, Bytes::from(block), false, true)),
        FrameBody::Data(DataFrame::new(1, Bytes::from(vec![0x61; 4096]), true)),
        FrameBody::Goaway(GoawayFrame::new(1, 0, Bytes::new())),
    ] {
        wire.extend_from_slice(&encode_body(&body));
    }

    group.throughput(Throughput::Bytes(wire.len() as u64));
    group.bench_function("server_response", |b| {
        b.iter(|| {
            let mut state = ConnectionState::new(Settings::default());
            state.push_inbound(black_box(&wire));
            let mut count = 0;
            while let Ok(Some(inbound)) = state.next_inbound() {
                black_box(inbound);
                count += 1;
            }
            count
        });
    });

    group.finish();
}

criterion_group! {
    name = framing;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(500);
    targets =
        bench_frame_header,
        bench_decode_body,
        bench_settings
}

criterion_group! {
    name = header_compression;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(500);
    targets = bench_hpack
}

criterion_group! {
    name = pipeline;
    config = Criterion::default()
        .measurement_time(Duration::from_secs(5))
        .sample_size(200);
    targets = bench_inbound_pipeline
}

criterion_main!(framing, header_compression, pipeline);
