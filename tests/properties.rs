//! Property tests for the frame, SETTINGS and HPACK codecs

mod common;

use common::{init_test_logging, test_proptest_config};
use h2probe::http::h2::codec::{decode_body, decode_header, encode_body, encode_header, FrameDecoder};
use h2probe::http::h2::frames::{FrameBody, WindowUpdateFrame, MAX_FRAME_LENGTH};
use h2probe::http::h2::hpack::{Decoder, Encoder, HeaderField};
use h2probe::http::h2::settings::{decode_entries, encode_entries};
use h2probe::http::h2::{FrameFlags, FrameHeader, SettingsEntry};
use proptest::prelude::*;

// ============================================================================
// Generators
// ============================================================================

fn arb_settings_entry() -> impl Strategy<Value = SettingsEntry> {
    (any::<u16>(), any::<u32>()).prop_map(|(id, value)| SettingsEntry::new(id, value))
}

fn arb_token() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(
        prop_oneof![b'a'..=b'z', b'0'..=b'9', Just(b'-')],
        1..24,
    )
}

fn arb_value() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0x20u8..0x7f, 0..64)
}

fn arb_fields() -> impl Strategy<Value = Vec<HeaderField>> {
    proptest::collection::vec(
        (arb_token(), arb_value()).prop_map(|(n, v)| HeaderField::new(n, v)),
        0..16,
    )
}

// ============================================================================
// Frame header
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(500))]

    /// decode_header(encode_header(x)) == x for every in-range header
    #[test]
    fn frame_header_roundtrip(
        length in 0..=MAX_FRAME_LENGTH,
        frame_type in any::<u8>(),
        flags in any::<u8>(),
        stream_id in 0u32..=0x7FFF_FFFF,
    ) {
        init_test_logging();
        let flags = FrameFlags::from_u8(flags);
        let bytes = encode_header(length, frame_type, flags, stream_id);
        prop_assert_eq!(
            decode_header(&bytes),
            FrameHeader::new(length, frame_type, flags, stream_id)
        );
    }

    /// The reserved bit never reaches the wire and is ignored on read
    #[test]
    fn reserved_bit_cleared(stream_id in any::<u32>()) {
        init_test_logging();
        let bytes = encode_header(0, 0x8, FrameFlags::empty(), stream_id);
        prop_assert_eq!(bytes[5] & 0x80, 0);

        let mut raw = bytes;
        raw[5] |= 0x80;
        prop_assert_eq!(decode_header(&raw).stream_id, stream_id & 0x7FFF_FFFF);
    }

    /// WINDOW_UPDATE increments survive a full frame round trip
    #[test]
    fn window_update_roundtrip(stream_id in 0u32..=0x7FFF_FFFF, increment in 1u32..=0x7FFF_FFFF) {
        init_test_logging();
        let body = FrameBody::WindowUpdate(WindowUpdateFrame::new(stream_id, increment));
        let mut decoder = FrameDecoder::new(16384);
        decoder.push(&encode_body(&body));
        let frame = decoder.next_frame().unwrap().unwrap();
        prop_assert_eq!(decode_body(&frame).unwrap(), body);
    }
}

// ============================================================================
// SETTINGS payload
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(500))]

    /// decode(encode(entries)) == entries, order preserved
    #[test]
    fn settings_roundtrip(entries in proptest::collection::vec(arb_settings_entry(), 0..32)) {
        init_test_logging();
        let payload = encode_entries(&entries);
        prop_assert_eq!(payload.len(), entries.len() * 6);
        prop_assert_eq!(decode_entries(&payload).unwrap(), entries);
    }

    /// Lengths that are not a multiple of 6 are rejected
    #[test]
    fn settings_bad_length(payload in proptest::collection::vec(any::<u8>(), 0..64)) {
        init_test_logging();
        prop_assume!(payload.len() % 6 != 0);
        prop_assert!(decode_entries(&payload).is_err());
    }
}

// ============================================================================
// HPACK interoperability
// ============================================================================

proptest! {
    #![proptest_config(test_proptest_config(200))]

    /// Blocks from our encoder decode with the hpack crate
    #[test]
    fn hpack_encoder_interop(fields in arb_fields(), indexing in any::<bool>()) {
        init_test_logging();
        let mut encoder = if indexing { Encoder::with_indexing(4096) } else { Encoder::new(4096) };
        let mut reference = hpack::Decoder::new();

        // Two blocks so dynamic table references are exercised
        for _ in 0..2 {
            let block = encoder.encode(&fields);
            let decoded = reference.decode(&block).unwrap();
            let expected: Vec<(Vec<u8>, Vec<u8>)> =
                fields.iter().map(|f| (f.name.clone(), f.value.clone())).collect();
            prop_assert_eq!(decoded, expected);
        }
    }

    /// Blocks from the hpack crate decode with our decoder
    #[test]
    fn hpack_decoder_interop(fields in arb_fields()) {
        init_test_logging();
        let mut reference = hpack::Encoder::new();
        let mut decoder = Decoder::new(4096);

        for _ in 0..2 {
            let pairs: Vec<(&[u8], &[u8])> =
                fields.iter().map(|f| (f.name.as_slice(), f.value.as_slice())).collect();
            let block = reference.encode(pairs);
            prop_assert_eq!(decoder.decode(&block).unwrap(), fields.clone());
        }
    }

    /// Our encoder and decoder agree, including table size updates
    #[test]
    fn hpack_self_roundtrip(fields in arb_fields(), table_size in 0usize..4096) {
        init_test_logging();
        let mut encoder = Encoder::with_indexing(4096);
        let mut decoder = Decoder::new(4096);

        prop_assert_eq!(decoder.decode(&encoder.encode(&fields)).unwrap(), fields.clone());
        encoder.set_max_table_size(table_size);
        prop_assert_eq!(decoder.decode(&encoder.encode(&fields)).unwrap(), fields.clone());
        prop_assert_eq!(decoder.table().max_size(), table_size);
        prop_assert!(decoder.table().size() <= table_size);
    }
}
