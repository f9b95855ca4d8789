//! HTTP/2 settings registry
//!
//! SETTINGS payloads are decoded into an ordered list of [`SettingsEntry`]
//! values so that unknown ids survive a round trip, and folded into a
//! [`Settings`] map that answers with RFC 7540 defaults for ids never sent.

use super::connection::ConnectionState;
use super::error::{Error, Result};
use super::frames::{Frame, FrameFlags, FrameHeader, FrameType, MAX_FRAME_LENGTH};
use super::{
    CONNECTION_STREAM_ID, DEFAULT_HEADER_TABLE_SIZE, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE,
};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// Size of one encoded entry
pub const SETTINGS_ENTRY_SIZE: usize = 6;

/// HTTP/2 settings parameters (RFC 7540 Section 6.5.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SettingsParameter {
    HeaderTableSize = 0x1,
    EnablePush = 0x2,
    MaxConcurrentStreams = 0x3,
    InitialWindowSize = 0x4,
    MaxFrameSize = 0x5,
    MaxHeaderListSize = 0x6,
    /// RFC 8441
    EnableConnectProtocol = 0x8,
    /// RFC 9218
    NoRfc7540Priorities = 0x9,
}

impl SettingsParameter {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x1 => Some(SettingsParameter::HeaderTableSize),
            0x2 => Some(SettingsParameter::EnablePush),
            0x3 => Some(SettingsParameter::MaxConcurrentStreams),
            0x4 => Some(SettingsParameter::InitialWindowSize),
            0x5 => Some(SettingsParameter::MaxFrameSize),
            0x6 => Some(SettingsParameter::MaxHeaderListSize),
            0x8 => Some(SettingsParameter::EnableConnectProtocol),
            0x9 => Some(SettingsParameter::NoRfc7540Priorities),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SettingsParameter::HeaderTableSize => "SETTINGS_HEADER_TABLE_SIZE",
            SettingsParameter::EnablePush => "SETTINGS_ENABLE_PUSH",
            SettingsParameter::MaxConcurrentStreams => "SETTINGS_MAX_CONCURRENT_STREAMS",
            SettingsParameter::InitialWindowSize => "SETTINGS_INITIAL_WINDOW_SIZE",
            SettingsParameter::MaxFrameSize => "SETTINGS_MAX_FRAME_SIZE",
            SettingsParameter::MaxHeaderListSize => "SETTINGS_MAX_HEADER_LIST_SIZE",
            SettingsParameter::EnableConnectProtocol => "SETTINGS_ENABLE_CONNECT_PROTOCOL",
            SettingsParameter::NoRfc7540Priorities => "SETTINGS_NO_RFC7540_PRIORITIES",
        }
    }
}

impl fmt::Display for SettingsParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u16())
    }
}

/// One `(id, value)` pair of a SETTINGS payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SettingsEntry {
    pub id: u16,
    pub value: u32,
}

impl SettingsEntry {
    pub fn new(id: u16, value: u32) -> Self {
        SettingsEntry { id, value }
    }

    pub fn parameter(&self) -> Option<SettingsParameter> {
        SettingsParameter::from_u16(self.id)
    }

    /// Check the value range RFC 7540 Section 6.5.2 imposes on known ids
    pub fn validate(&self) -> Result<()> {
        let invalid = |what: &str| -> Result<()> {
            Err(Error::InvalidSettings(format!(
                "{} = {} {}",
                self.parameter().map(|p| p.name()).unwrap_or("UNKNOWN"),
                self.value,
                what
            )))
        };

        match self.parameter() {
            Some(SettingsParameter::EnablePush)
            | Some(SettingsParameter::EnableConnectProtocol)
            | Some(SettingsParameter::NoRfc7540Priorities)
                if self.value > 1 =>
            {
                invalid("is not 0 or 1")
            }
            Some(SettingsParameter::InitialWindowSize) if self.value > 0x7FFF_FFFF => {
                invalid("exceeds maximum (2^31-1)")
            }
            Some(SettingsParameter::MaxFrameSize)
                if !(DEFAULT_MAX_FRAME_SIZE..=MAX_FRAME_LENGTH).contains(&self.value) =>
            {
                invalid("outside valid range (16384-16777215)")
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for SettingsEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.parameter() {
            Some(p) => write!(f, "{}: {}", p.name(), self.value),
            None => write!(f, "UNKNOWN (0x{:x}): {}", self.id, self.value),
        }
    }
}

/// Decode a SETTINGS payload into its entries, preserving order
pub fn decode_entries(payload: &[u8]) -> Result<Vec<SettingsEntry>> {
    if payload.len() % SETTINGS_ENTRY_SIZE != 0 {
        return Err(Error::frame_format(
            FrameType::Settings.as_u8(),
            CONNECTION_STREAM_ID,
            payload.len() as u32,
            "length is not a multiple of 6",
        ));
    }

    let mut buf = payload;
    let mut entries = Vec::with_capacity(payload.len() / SETTINGS_ENTRY_SIZE);
    while buf.has_remaining() {
        let id = buf.get_u16();
        let value = buf.get_u32();
        entries.push(SettingsEntry { id, value });
    }

    Ok(entries)
}

/// Encode entries into a SETTINGS payload, in the given order
pub fn encode_entries(entries: &[SettingsEntry]) -> Bytes {
    let mut buf = BytesMut::with_capacity(entries.len() * SETTINGS_ENTRY_SIZE);
    for entry in entries {
        buf.put_u16(entry.id);
        buf.put_u32(entry.value);
    }
    buf.freeze()
}

/// Empty SETTINGS frame with the ACK flag: `{type: 0x4, flags: 0x1, sid: 0, length: 0}`
pub fn build_ack_frame() -> Frame {
    Frame::new(
        FrameHeader::new(
            0,
            FrameType::Settings.as_u8(),
            FrameFlags::from_u8(FrameFlags::ACK),
            CONNECTION_STREAM_ID,
        ),
        Bytes::new(),
    )
}

/// Fold received entries into the connection's view of the peer
///
/// Every entry is validated before any is stored. A HEADER_TABLE_SIZE
/// entry also resizes the dynamic table used to encode requests, evicting
/// from the back as needed.
pub fn apply(entries: &[SettingsEntry], state: &mut ConnectionState) -> Result<()> {
    for entry in entries {
        entry.validate()?;
    }

    for entry in entries {
        match entry.parameter() {
            Some(SettingsParameter::HeaderTableSize) => {
                state.encoder_mut().set_max_table_size(entry.value as usize);
            }
            Some(_) => {}
            None => warn!(id = entry.id, value = entry.value, "unknown setting"),
        }
        debug!(setting = %entry, "applied peer setting");
        state.remote_settings_mut().set(entry.id, entry.value);
    }

    Ok(())
}

/// Negotiated values keyed by setting id
///
/// Unknown ids are stored but no getter reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<u16, u32>,
}

impl Settings {
    /// Settings with nothing sent: every getter returns its default
    pub fn new() -> Self {
        Settings::default()
    }

    pub fn builder() -> SettingsBuilder {
        SettingsBuilder::new()
    }

    pub fn get(&self, id: u16) -> Option<u32> {
        self.values.get(&id).copied()
    }

    pub fn set(&mut self, id: u16, value: u32) {
        self.values.insert(id, value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Header table size (default: 4096)
    pub fn header_table_size(&self) -> u32 {
        self.param(SettingsParameter::HeaderTableSize).unwrap_or(DEFAULT_HEADER_TABLE_SIZE)
    }

    /// Enable push (default: true)
    pub fn enable_push(&self) -> bool {
        self.param(SettingsParameter::EnablePush).map_or(true, |v| v == 1)
    }

    /// Max concurrent streams (None = unlimited)
    pub fn max_concurrent_streams(&self) -> Option<u32> {
        self.param(SettingsParameter::MaxConcurrentStreams)
    }

    /// Initial window size (default: 65535)
    pub fn initial_window_size(&self) -> u32 {
        self.param(SettingsParameter::InitialWindowSize).unwrap_or(DEFAULT_INITIAL_WINDOW_SIZE)
    }

    /// Max frame size (default: 16384)
    pub fn max_frame_size(&self) -> u32 {
        self.param(SettingsParameter::MaxFrameSize).unwrap_or(DEFAULT_MAX_FRAME_SIZE)
    }

    /// Max header list size (None = unlimited)
    pub fn max_header_list_size(&self) -> Option<u32> {
        self.param(SettingsParameter::MaxHeaderListSize)
    }

    fn param(&self, parameter: SettingsParameter) -> Option<u32> {
        self.get(parameter.as_u16())
    }

    /// Explicitly set values as entries, ordered by id
    pub fn entries(&self) -> Vec<SettingsEntry> {
        self.values
            .iter()
            .map(|(&id, &value)| SettingsEntry { id, value })
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.entries().iter().try_for_each(SettingsEntry::validate)
    }
}

/// Builder for [`Settings`]
#[derive(Debug, Default)]
pub struct SettingsBuilder {
    settings: Settings,
}

impl SettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header_table_size(self, size: u32) -> Self {
        self.with(SettingsParameter::HeaderTableSize, size)
    }

    pub fn enable_push(self, enable: bool) -> Self {
        self.with(SettingsParameter::EnablePush, enable as u32)
    }

    pub fn max_concurrent_streams(self, max: u32) -> Self {
        self.with(SettingsParameter::MaxConcurrentStreams, max)
    }

    pub fn initial_window_size(self, size: u32) -> Self {
        self.with(SettingsParameter::InitialWindowSize, size)
    }

    pub fn max_frame_size(self, size: u32) -> Self {
        self.with(SettingsParameter::MaxFrameSize, size)
    }

    pub fn max_header_list_size(self, size: u32) -> Self {
        self.with(SettingsParameter::MaxHeaderListSize, size)
    }

    /// Set an arbitrary id, including ones this crate does not know
    pub fn raw(mut self, id: u16, value: u32) -> Self {
        self.settings.set(id, value);
        self
    }

    fn with(self, parameter: SettingsParameter, value: u32) -> Self {
        self.raw(parameter.as_u16(), value)
    }

    /// Build the settings, rejecting out-of-range values
    pub fn build(self) -> Result<Settings> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// HEADER_TABLE_SIZE=4096, ENABLE_PUSH=0, MAX_CONCURRENT_STREAMS=255,
    /// INITIAL_WINDOW_SIZE=65534, MAX_FRAME_SIZE=16384, MAX_HEADER_LIST_SIZE=32768
    const CLIENT_SETTINGS: [u8; 36] = [
        0x00, 0x01, 0x00, 0x00, 0x10, 0x00, //
        0x00, 0x02, 0x00, 0x00, 0x00, 0x00, //
        0x00, 0x03, 0x00, 0x00, 0x00, 0xff, //
        0x00, 0x04, 0x00, 0x00, 0xff, 0xfe, //
        0x00, 0x05, 0x00, 0x00, 0x40, 0x00, //
        0x00, 0x06, 0x00, 0x00, 0x80, 0x00,
    ];

    #[test]
    fn test_decode_client_settings_payload() {
        let entries = decode_entries(&CLIENT_SETTINGS).unwrap();
        let pairs: Vec<(u16, u32)> = entries.iter().map(|e| (e.id, e.value)).collect();

        assert_eq!(
            pairs,
            vec![(1, 4096), (2, 0), (3, 255), (4, 65534), (5, 16384), (6, 32768)]
        );
    }

    #[test]
    fn test_builder_encodes_in_id_order() {
        let settings = SettingsBuilder::new()
            .max_header_list_size(32768)
            .max_frame_size(16384)
            .initial_window_size(65534)
            .max_concurrent_streams(255)
            .enable_push(false)
            .header_table_size(4096)
            .build()
            .unwrap();

        assert_eq!(&encode_entries(&settings.entries())[..], &CLIENT_SETTINGS[..]);
    }

    #[test]
    fn test_encode_preserves_order_and_unknown_ids() {
        let entries = vec![
            SettingsEntry::new(0x4, 100),
            SettingsEntry::new(0xf0, 7),
            SettingsEntry::new(0x1, 0),
        ];
        let payload = encode_entries(&entries);
        assert_eq!(decode_entries(&payload).unwrap(), entries);
    }

    #[test]
    fn test_decode_rejects_partial_entry() {
        let err = decode_entries(&CLIENT_SETTINGS[..7]).unwrap_err();
        assert!(matches!(err, Error::FrameFormat { frame_type: 0x4, length: 7, .. }));
    }

    #[test]
    fn test_ack_frame() {
        let ack = build_ack_frame();
        assert_eq!(ack.header.frame_type, 0x4);
        assert_eq!(ack.header.flags.as_u8(), 0x1);
        assert_eq!(ack.header.stream_id, 0);
        assert_eq!(ack.header.length, 0);
        assert!(ack.payload.is_empty());
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::new();
        assert_eq!(settings.header_table_size(), 4096);
        assert!(settings.enable_push());
        assert_eq!(settings.max_concurrent_streams(), None);
        assert_eq!(settings.initial_window_size(), 65535);
        assert_eq!(settings.max_frame_size(), 16384);
        assert_eq!(settings.max_header_list_size(), None);

        assert_eq!(settings.header_table_size(), DEFAULT_HEADER_TABLE_SIZE);
        assert_eq!(settings.initial_window_size(), DEFAULT_INITIAL_WINDOW_SIZE);
        assert_eq!(settings.max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_validation() {
        assert!(SettingsBuilder::new().max_frame_size(16383).build().is_err());
        assert!(SettingsBuilder::new().max_frame_size(1 << 24).build().is_err());
        assert!(SettingsBuilder::new().max_frame_size(MAX_FRAME_LENGTH).build().is_ok());
        assert!(SettingsBuilder::new().initial_window_size(0x8000_0000).build().is_err());
        assert!(SettingsBuilder::new().raw(0x2, 2).build().is_err());
        assert!(SettingsBuilder::new().raw(0xff, u32::MAX).build().is_ok());
    }

    #[test]
    fn test_apply_updates_state_and_resizes_table() {
        let mut state = ConnectionState::new(Settings::new());
        state
            .encoder_mut()
            .table_mut()
            .insert(b"x-long".to_vec(), vec![b'a'; 100]);

        let entries = [
            SettingsEntry::new(0x1, 64),
            SettingsEntry::new(0x3, 100),
            SettingsEntry::new(0x77, 1),
        ];
        apply(&entries, &mut state).unwrap();

        assert_eq!(state.remote_settings().header_table_size(), 64);
        assert_eq!(state.remote_settings().max_concurrent_streams(), Some(100));
        assert_eq!(state.remote_settings().get(0x77), Some(1));
        assert_eq!(state.encoder().table().max_size(), 64);
        assert!(state.encoder().table().is_empty());
    }

    #[test]
    fn test_apply_rejects_invalid_without_partial_update() {
        let mut state = ConnectionState::new(Settings::new());
        let entries = [SettingsEntry::new(0x3, 10), SettingsEntry::new(0x5, 10)];

        assert!(matches!(apply(&entries, &mut state), Err(Error::InvalidSettings(_))));
        assert!(state.remote_settings().is_empty());
    }

    #[test]
    fn test_entry_display() {
        assert_eq!(
            SettingsEntry::new(0x1, 4096).to_string(),
            "SETTINGS_HEADER_TABLE_SIZE: 4096"
        );
        assert_eq!(SettingsEntry::new(0x10, 1).to_string(), "UNKNOWN (0x10): 1");
    }
}
