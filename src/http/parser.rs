//! Incremental HTTP/1.1 response head parsing
//!
//! The parser stops at the blank line that ends the head. Whatever follows
//! stays in the parser so the caller can hand it to the HTTP/2 frame decoder:
//! a server that accepts `Upgrade: h2c` usually sends its first SETTINGS frame
//! in the same segment as the `101` head.

use super::{Error, Headers, HttpResponse, Result, Status, Version};

/// Largest response head accepted before giving up
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Parse a status line of the form `VERSION CODE [REASON]`
///
/// The reason phrase is returned exactly as sent and may be empty
/// (`HTTP/1.1 101 ` is a valid line).
pub fn parse_status_line(line: &str) -> Result<(Version, Status, String)> {
    let mut parts = line.splitn(3, ' ');

    let version = Version::from_str(parts.next().unwrap_or_default())?;
    let code = parts
        .next()
        .ok_or_else(|| Error::Parse(format!("Missing status code: {:?}", line)))?;

    if code.len() != 3 {
        return Err(Error::InvalidStatus(code.to_string()));
    }
    let code = code
        .parse::<u16>()
        .map_err(|_| Error::InvalidStatus(code.to_string()))?;
    let status = Status::new(code)?;
    let reason = parts.next().unwrap_or("").to_string();

    Ok((version, status, reason))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParserState {
    StatusLine,
    Headers,
    Complete,
}

/// Response head parser fed with arbitrary chunks
#[derive(Debug)]
pub struct ResponseHeadParser {
    state: ParserState,
    buffer: Vec<u8>,
    consumed: usize,
    version: Version,
    status: Option<Status>,
    reason: String,
    headers: Headers,
}

impl ResponseHeadParser {
    pub fn new() -> Self {
        ResponseHeadParser {
            state: ParserState::StatusLine,
            buffer: Vec::new(),
            consumed: 0,
            version: Version::default(),
            status: None,
            reason: String::new(),
            headers: Headers::new(),
        }
    }

    /// Feed received bytes
    ///
    /// Returns `Ok(Some(head))` once the blank line has been seen and
    /// `Ok(None)` while more bytes are needed. Bytes after the head are kept
    /// and available through [`take_remainder`](Self::take_remainder).
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<HttpResponse>> {
        if self.state == ParserState::Complete {
            self.buffer.extend_from_slice(data);
            return Ok(None);
        }

        self.buffer.extend_from_slice(data);

        while let Some(pos) = find_crlf(&self.buffer[self.consumed..]) {
            let line = std::str::from_utf8(&self.buffer[self.consumed..self.consumed + pos])
                .map_err(|_| Error::Parse("Response head is not valid UTF-8".to_string()))?
                .to_string();
            self.consumed += pos + 2;

            match self.state {
                ParserState::StatusLine => {
                    let (version, status, reason) = parse_status_line(&line)?;
                    self.version = version;
                    self.status = Some(status);
                    self.reason = reason;
                    self.state = ParserState::Headers;
                }
                ParserState::Headers if line.is_empty() => {
                    self.state = ParserState::Complete;
                    self.buffer.drain(..self.consumed);
                    self.consumed = 0;
                    return self.finish().map(Some);
                }
                ParserState::Headers => {
                    let (name, value) = Headers::parse_header_line(&line)?;
                    self.headers.insert(name, value)?;
                }
                ParserState::Complete => unreachable!("handled above"),
            }
        }

        if self.buffer.len() > MAX_HEAD_SIZE {
            return Err(Error::Parse(format!(
                "Response head exceeds {} bytes",
                MAX_HEAD_SIZE
            )));
        }

        Ok(None)
    }

    fn finish(&mut self) -> Result<HttpResponse> {
        let status = self
            .status
            .ok_or_else(|| Error::Parse("Missing status line".to_string()))?;

        Ok(HttpResponse::new(
            self.version,
            status,
            std::mem::take(&mut self.reason),
            std::mem::take(&mut self.headers),
        ))
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParserState::Complete
    }

    /// Bytes received after the head
    pub fn take_remainder(&mut self) -> Vec<u8> {
        if self.state == ParserState::Complete {
            std::mem::take(&mut self.buffer)
        } else {
            Vec::new()
        }
    }
}

impl Default for ResponseHeadParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        let (version, status, reason) = parse_status_line("HTTP/1.1 200 OK").unwrap();
        assert_eq!(version, Version::Http11);
        assert_eq!(status.code(), 200);
        assert_eq!(reason, "OK");
    }

    #[test]
    fn test_parse_status_line_empty_reason() {
        let (_, status, reason) = parse_status_line("HTTP/1.1 101 ").unwrap();
        assert_eq!(status, Status::SWITCHING_PROTOCOLS);
        assert_eq!(reason, "");

        let (_, status, reason) = parse_status_line("HTTP/1.1 101").unwrap();
        assert_eq!(status.code(), 101);
        assert_eq!(reason, "");
    }

    #[test]
    fn test_parse_status_line_errors() {
        assert!(parse_status_line("HTTP/2.0 200 OK").is_err());
        assert!(parse_status_line("HTTP/1.1").is_err());
        assert!(parse_status_line("HTTP/1.1 2000 OK").is_err());
        assert!(parse_status_line("HTTP/1.1 abc OK").is_err());
    }

    #[test]
    fn test_head_with_trailing_frame_bytes() {
        let mut parser = ResponseHeadParser::new();
        let mut data = b"HTTP/1.1 101 \r\nConnection: Upgrade\r\nUpgrade: h2c\r\n\r\n".to_vec();
        data.extend_from_slice(&[0x00, 0x00, 0x00, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00]);

        let head = parser.feed(&data).unwrap().unwrap();
        assert_eq!(head.status().code(), 101);
        assert_eq!(head.reason(), "");
        assert_eq!(head.headers().get("upgrade"), Some("h2c"));
        assert!(parser.is_complete());
        assert_eq!(parser.take_remainder(), vec![0, 0, 0, 4, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_head_split_across_feeds() {
        let mut parser = ResponseHeadParser::new();

        assert!(parser.feed(b"HTTP/1.1 ").unwrap().is_none());
        assert!(parser.feed(b"200 OK\r\nContent-").unwrap().is_none());
        assert!(parser.feed(b"Length: 4\r\n\r").unwrap().is_none());
        let head = parser.feed(b"\nbody").unwrap().unwrap();

        assert_eq!(head.status().code(), 200);
        assert_eq!(head.headers().get("Content-Length"), Some("4"));
        assert_eq!(parser.take_remainder(), b"body");
    }

    #[test]
    fn test_remainder_empty_before_completion() {
        let mut parser = ResponseHeadParser::new();
        parser.feed(b"HTTP/1.1 101 \r\n").unwrap();
        assert!(parser.take_remainder().is_empty());
    }

    #[test]
    fn test_oversized_head() {
        let mut parser = ResponseHeadParser::new();
        let data = vec![b'a'; MAX_HEAD_SIZE + 1];
        assert!(parser.feed(&data).is_err());
    }

    #[test]
    fn test_find_crlf() {
        assert_eq!(find_crlf(b"Hello\r\nWorld"), Some(5));
        assert_eq!(find_crlf(b"NoEOL"), None);
        assert_eq!(find_crlf(b"\r\n"), Some(0));
    }
}
