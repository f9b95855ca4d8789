//! Frame classification for logs and transcripts
//!
//! Every frame the client sends or receives becomes a [`FrameReport`]:
//! type, flags, stream id and length, plus the type-specific fields worth
//! asserting on. Classification never fails. Unknown frame types are
//! reported generically.

use super::error::ErrorCode;
use super::frames::{FrameBody, FrameFlags, FrameHeader, FrameType, PrioritySpec};
use super::hpack::HeaderField;
use super::settings::SettingsEntry;
use bytes::Bytes;
use std::fmt;
use tracing::{debug, info, warn};

/// Which way a frame travelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn marker(&self) -> &'static str {
        match self {
            Direction::Inbound => "<",
            Direction::Outbound => ">",
        }
    }

    fn verb(&self) -> &'static str {
        match self {
            Direction::Inbound => "Received",
            Direction::Outbound => "Sent",
        }
    }
}

/// Type-specific content of a reported frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDetail {
    Data {
        end_stream: bool,
        pad_length: Option<u8>,
        data: Bytes,
    },
    Headers {
        end_stream: bool,
        end_headers: bool,
        pad_length: Option<u8>,
        priority: Option<PrioritySpec>,
        /// Decoded block, present when this frame completed it
        fields: Option<Vec<HeaderField>>,
    },
    Priority(PrioritySpec),
    RstStream {
        error_code: u32,
    },
    Settings {
        ack: bool,
        entries: Vec<SettingsEntry>,
    },
    PushPromise {
        promised_stream_id: u32,
        end_headers: bool,
        fields: Option<Vec<HeaderField>>,
    },
    Ping {
        ack: bool,
        data: [u8; 8],
    },
    Goaway {
        last_stream_id: u32,
        error_code: u32,
        debug_data: Bytes,
    },
    WindowUpdate {
        increment: u32,
    },
    Continuation {
        end_headers: bool,
        fields: Option<Vec<HeaderField>>,
    },
    Unknown,
}

/// One line of the connection transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameReport {
    pub direction: Direction,
    pub frame_type: u8,
    pub flags: FrameFlags,
    pub stream_id: u32,
    pub length: u32,
    pub detail: FrameDetail,
}

impl FrameReport {
    /// Classify a decoded frame
    ///
    /// `fields` is the header list completed by this frame, if any.
    pub fn new(
        direction: Direction,
        header: &FrameHeader,
        body: &FrameBody,
        fields: Option<Vec<HeaderField>>,
    ) -> Self {
        let detail = match body {
            FrameBody::Data(f) => FrameDetail::Data {
                end_stream: f.end_stream,
                pad_length: f.pad_length,
                data: f.data.clone(),
            },
            FrameBody::Headers(f) => FrameDetail::Headers {
                end_stream: f.end_stream,
                end_headers: f.end_headers,
                pad_length: f.pad_length,
                priority: f.priority,
                fields,
            },
            FrameBody::Priority(f) => FrameDetail::Priority(f.priority),
            FrameBody::RstStream(f) => FrameDetail::RstStream {
                error_code: f.error_code,
            },
            FrameBody::Settings(f) => FrameDetail::Settings {
                ack: f.ack,
                entries: f.entries.clone(),
            },
            FrameBody::PushPromise(f) => FrameDetail::PushPromise {
                promised_stream_id: f.promised_stream_id,
                end_headers: f.end_headers,
                fields,
            },
            FrameBody::Ping(f) => FrameDetail::Ping {
                ack: f.ack,
                data: f.data,
            },
            FrameBody::Goaway(f) => FrameDetail::Goaway {
                last_stream_id: f.last_stream_id,
                error_code: f.error_code,
                debug_data: f.debug_data.clone(),
            },
            FrameBody::WindowUpdate(f) => FrameDetail::WindowUpdate {
                increment: f.increment,
            },
            FrameBody::Continuation(f) => FrameDetail::Continuation {
                end_headers: f.end_headers,
                fields,
            },
            FrameBody::Unknown { .. } => FrameDetail::Unknown,
        };

        FrameReport {
            direction,
            frame_type: header.frame_type,
            flags: header.flags,
            stream_id: header.stream_id,
            length: header.length,
            detail,
        }
    }

    pub fn kind(&self) -> Option<FrameType> {
        FrameType::from_u8(self.frame_type)
    }

    /// Frame type name, `UNKNOWN(0x..)` for extension types
    pub fn type_name(&self) -> String {
        match self.kind() {
            Some(kind) => kind.name().to_string(),
            None => format!("UNKNOWN(0x{:x})", self.frame_type),
        }
    }

    pub fn is_inbound(&self) -> bool {
        self.direction == Direction::Inbound
    }

    /// Decoded header fields carried by this frame, if its block completed here
    pub fn fields(&self) -> Option<&[HeaderField]> {
        match &self.detail {
            FrameDetail::Headers { fields, .. }
            | FrameDetail::PushPromise { fields, .. }
            | FrameDetail::Continuation { fields, .. } => fields.as_deref(),
            _ => None,
        }
    }

    /// Whether the frame closes its stream from the sender's side
    pub fn ends_stream(&self) -> bool {
        matches!(
            self.detail,
            FrameDetail::Data { end_stream: true, .. } | FrameDetail::Headers { end_stream: true, .. }
        )
    }

    /// `< Received SETTINGS frame (flags: 0x0, sid: 0, length: 36)`
    pub fn summary(&self) -> String {
        format!(
            "{} {} {} frame (flags: {}, sid: {}, length: {})",
            self.direction.marker(),
            self.direction.verb(),
            self.type_name(),
            self.flags,
            self.stream_id,
            self.length
        )
    }

    /// Indented detail lines, one per setting, header field or field group
    pub fn detail_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        match &self.detail {
            FrameDetail::Data { pad_length, data, .. } => {
                if let Some(pad) = pad_length {
                    lines.push(format!("padding: {}", pad));
                }
                lines.push(format!("data: {} bytes", data.len()));
            }
            FrameDetail::Headers {
                pad_length,
                priority,
                fields,
                ..
            } => {
                if let Some(pad) = pad_length {
                    lines.push(format!("padding: {}", pad));
                }
                if let Some(p) = priority {
                    lines.push(priority_line(p));
                }
                push_fields(&mut lines, fields);
            }
            FrameDetail::Priority(p) => lines.push(priority_line(p)),
            FrameDetail::RstStream { error_code } => {
                lines.push(format!("error: {}", ErrorCode::describe(*error_code)));
            }
            FrameDetail::Settings { entries, .. } => {
                lines.extend(entries.iter().map(|e| e.to_string()));
            }
            FrameDetail::PushPromise {
                promised_stream_id,
                fields,
                ..
            } => {
                lines.push(format!("promised stream: {}", promised_stream_id));
                push_fields(&mut lines, fields);
            }
            FrameDetail::Ping { data, .. } => {
                let hex: String = data.iter().map(|b| format!("{:02x}", b)).collect();
                lines.push(format!("opaque data: {}", hex));
            }
            FrameDetail::Goaway {
                last_stream_id,
                error_code,
                debug_data,
            } => {
                lines.push(format!("last stream: {}", last_stream_id));
                lines.push(format!("error: {}", ErrorCode::describe(*error_code)));
                if !debug_data.is_empty() {
                    lines.push(format!("debug: {}", String::from_utf8_lossy(debug_data)));
                }
            }
            FrameDetail::WindowUpdate { increment } => {
                lines.push(format!("increment: {}", increment));
            }
            FrameDetail::Continuation { fields, .. } => push_fields(&mut lines, fields),
            FrameDetail::Unknown => {}
        }

        lines
    }

    /// Emit the report through `tracing`
    pub fn log(&self) {
        match (&self.detail, self.direction) {
            (FrameDetail::Unknown, _) => {
                warn!(frame_type = self.frame_type, length = self.length, "{}", self.summary())
            }
            (FrameDetail::Goaway { .. }, Direction::Inbound) => warn!("{}", self.summary()),
            _ => info!("{}", self.summary()),
        }

        for line in self.detail_lines() {
            debug!(stream_id = self.stream_id, " - {}", line);
        }
    }
}

fn priority_line(p: &PrioritySpec) -> String {
    format!(
        "depends on: {} (exclusive: {}), weight: {}",
        p.stream_dependency, p.exclusive, p.weight
    )
}

fn push_fields(lines: &mut Vec<String>, fields: &Option<Vec<HeaderField>>) {
    if let Some(fields) = fields {
        lines.extend(fields.iter().map(|f| f.to_string()));
    }
}

impl fmt::Display for FrameReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.summary())?;
        for line in self.detail_lines() {
            write!(f, "\n - {}", line)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::h2::frames::{HeadersFrame, SettingsFrame, WindowUpdateFrame};

    fn header_for(body: &FrameBody, length: u32, flags: u8) -> FrameHeader {
        FrameHeader::new(length, body.frame_type(), FrameFlags::from_u8(flags), body.stream_id())
    }

    #[test]
    fn test_settings_report() {
        let body = FrameBody::Settings(SettingsFrame::new(vec![
            SettingsEntry::new(0x1, 4096),
            SettingsEntry::new(0x42, 7),
        ]));
        let report = FrameReport::new(Direction::Inbound, &header_for(&body, 12, 0), &body, None);

        assert_eq!(
            report.to_string(),
            "< Received SETTINGS frame (flags: 0x0, sid: 0, length: 12)\n \
             - SETTINGS_HEADER_TABLE_SIZE: 4096\n \
             - UNKNOWN (0x42): 7"
        );
    }

    #[test]
    fn test_window_update_report() {
        let body = FrameBody::WindowUpdate(WindowUpdateFrame::new(3, 5));
        let report = FrameReport::new(Direction::Inbound, &header_for(&body, 4, 0), &body, None);
        assert_eq!(report.detail, FrameDetail::WindowUpdate { increment: 5 });
        assert_eq!(report.detail_lines(), vec!["increment: 5".to_string()]);
    }

    #[test]
    fn test_headers_report_with_fields() {
        let body = FrameBody::Headers(
            HeadersFrame::new(1, Bytes::from_static(&[0x88]), true, true)
                .with_priority(PrioritySpec::new(0, true, 15))
                .with_padding(2),
        );
        let fields = vec![HeaderField::new(":status", "200")];
        let report = FrameReport::new(
            Direction::Outbound,
            &header_for(&body, 9, 0x2d),
            &body,
            Some(fields.clone()),
        );

        assert!(report.summary().starts_with("> Sent HEADERS frame (flags: 0x2d, sid: 1"));
        assert_eq!(report.fields(), Some(fields.as_slice()));
        assert!(report.ends_stream());
        assert_eq!(
            report.detail_lines(),
            vec![
                "padding: 2".to_string(),
                "depends on: 0 (exclusive: true), weight: 15".to_string(),
                ":status: 200".to_string(),
            ]
        );
    }

    #[test]
    fn test_unknown_frame_reported_generically() {
        let body = FrameBody::Unknown {
            frame_type: 0xfa,
            flags: FrameFlags::empty(),
            stream_id: 0,
            payload: Bytes::from_static(b"xyz"),
        };
        let report = FrameReport::new(Direction::Inbound, &header_for(&body, 3, 0), &body, None);

        assert_eq!(report.kind(), None);
        assert_eq!(
            report.summary(),
            "< Received UNKNOWN(0xfa) frame (flags: 0x0, sid: 0, length: 3)"
        );
        assert!(report.detail_lines().is_empty());
        report.log();
    }
}
