//! HPACK header codec (RFC 7541)
//!
//! # Decoding
//!
//! [`Decoder`] accepts every representation of RFC 7541 Section 6:
//!
//! | Pattern    | Representation                           |
//! |------------|------------------------------------------|
//! | `1xxxxxxx` | indexed header field                     |
//! | `01xxxxxx` | literal with incremental indexing        |
//! | `001xxxxx` | dynamic table size update                |
//! | `0001xxxx` | literal never indexed                    |
//! | `0000xxxx` | literal without indexing                 |
//!
//! String literals may be raw or Huffman coded; Huffman strings are decoded
//! with the `hpack` crate's RFC 7541 Appendix B table.
//!
//! # Encoding
//!
//! [`Encoder`] is deliberately small. It never Huffman-codes and, per field:
//!
//! 1. emits an indexed field (`1xxxxxxx`) when name and value match a static
//!    or dynamic table entry,
//! 2. otherwise emits a literal with an indexed name when the name is in a
//!    table, and a literal with a literal name (`0x00` / `0x40`) when not.
//!
//! Literals are "without indexing" (`0000xxxx`) unless incremental indexing
//! was enabled with [`Encoder::with_indexing`], in which case they use
//! `01xxxxxx` and enter the encoder's dynamic table. A pending table budget
//! change is announced with a size update (`001xxxxx`) at the start of the
//! next block. Any conforming encoder produces blocks this crate's decoder
//! and every other HPACK decoder accept.

use std::collections::VecDeque;
use std::fmt;
use tracing::trace;

/// Per-entry overhead in dynamic table accounting (RFC 7541 Section 4.1)
pub const ENTRY_OVERHEAD: usize = 32;

/// Number of static table entries
pub const STATIC_TABLE_LEN: usize = 61;

/// One header name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        HeaderField {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Accounted size: name length + value length + 32
    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }

    /// Name as text, with invalid UTF-8 replaced
    pub fn name_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.name)
    }

    /// Value as text, with invalid UTF-8 replaced
    pub fn value_str(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.value)
    }
}

impl fmt::Display for HeaderField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name_str(), self.value_str())
    }
}

/// HPACK decoding failures
///
/// `offset` is the position inside the header block where the failing
/// representation or string starts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HpackError {
    #[error("truncated {what} at offset {offset}")]
    Truncated { offset: usize, what: &'static str },

    #[error("integer at offset {offset} overflows")]
    IntegerOverflow { offset: usize },

    #[error("index {index} at offset {offset} is outside the table (dynamic entries: {dynamic_len})")]
    InvalidIndex {
        offset: usize,
        index: usize,
        dynamic_len: usize,
    },

    #[error("invalid Huffman string at offset {offset}: {reason}")]
    Huffman { offset: usize, reason: String },

    #[error("dynamic table size update to {requested} at offset {offset} exceeds limit {limit}")]
    TableSizeTooLarge {
        offset: usize,
        requested: usize,
        limit: usize,
    },

    #[error("dynamic table size update at offset {offset} follows a header field")]
    MisplacedSizeUpdate { offset: usize },
}

impl HpackError {
    pub fn offset(&self) -> usize {
        match self {
            HpackError::Truncated { offset, .. }
            | HpackError::IntegerOverflow { offset }
            | HpackError::InvalidIndex { offset, .. }
            | HpackError::Huffman { offset, .. }
            | HpackError::TableSizeTooLarge { offset, .. }
            | HpackError::MisplacedSizeUpdate { offset } => *offset,
        }
    }
}

/// RFC 7541 Appendix A, index 1 first
pub const STATIC_TABLE: [(&[u8], &[u8]); STATIC_TABLE_LEN] = [
    (b":authority", b""),
    (b":method", b"GET"),
    (b":method", b"POST"),
    (b":path", b"/"),
    (b":path", b"/index.html"),
    (b":scheme", b"http"),
    (b":scheme", b"https"),
    (b":status", b"200"),
    (b":status", b"204"),
    (b":status", b"206"),
    (b":status", b"304"),
    (b":status", b"400"),
    (b":status", b"404"),
    (b":status", b"500"),
    (b"accept-charset", b""),
    (b"accept-encoding", b"gzip, deflate"),
    (b"accept-language", b""),
    (b"accept-ranges", b""),
    (b"accept", b""),
    (b"access-control-allow-origin", b""),
    (b"age", b""),
    (b"allow", b""),
    (b"authorization", b""),
    (b"cache-control", b""),
    (b"content-disposition", b""),
    (b"content-encoding", b""),
    (b"content-language", b""),
    (b"content-length", b""),
    (b"content-location", b""),
    (b"content-range", b""),
    (b"content-type", b""),
    (b"cookie", b""),
    (b"date", b""),
    (b"etag", b""),
    (b"expect", b""),
    (b"expires", b""),
    (b"from", b""),
    (b"host", b""),
    (b"if-match", b""),
    (b"if-modified-since", b""),
    (b"if-none-match", b""),
    (b"if-range", b""),
    (b"if-unmodified-since", b""),
    (b"last-modified", b""),
    (b"link", b""),
    (b"location", b""),
    (b"max-forwards", b""),
    (b"proxy-authenticate", b""),
    (b"proxy-authorization", b""),
    (b"range", b""),
    (b"referer", b""),
    (b"refresh", b""),
    (b"retry-after", b""),
    (b"server", b""),
    (b"set-cookie", b""),
    (b"strict-transport-security", b""),
    (b"transfer-encoding", b""),
    (b"user-agent", b""),
    (b"vary", b""),
    (b"via", b""),
    (b"www-authenticate", b""),
];

/// Connection-scoped dynamic table
///
/// Newest entry first; index 0 here is HPACK index 62.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        DynamicTable {
            entries: VecDeque::new(),
            size: 0,
            max_size,
        }
    }

    /// Insert at the front, evicting from the back to stay within budget
    ///
    /// An entry larger than the whole budget empties the table and is not
    /// stored (RFC 7541 Section 4.4).
    pub fn insert(&mut self, name: Vec<u8>, value: Vec<u8>) {
        let field = HeaderField { name, value };
        let size = field.size();

        if size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }

        self.size += size;
        self.entries.push_front(field);
        self.evict();
    }

    /// Change the byte budget, evicting oldest entries as needed
    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict();
    }

    fn evict(&mut self) {
        while self.size > self.max_size {
            match self.entries.pop_back() {
                Some(old) => self.size -= old.size(),
                None => break,
            }
        }
    }

    /// Entry by 0-based position, newest first
    pub fn get(&self, position: usize) -> Option<&HeaderField> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Accounted size of all entries
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderField> {
        self.entries.iter()
    }
}

/// Look up a 1-based HPACK index across the static and dynamic tables
pub fn lookup(table: &DynamicTable, index: usize) -> Option<(&[u8], &[u8])> {
    match index {
        0 => None,
        1..=STATIC_TABLE_LEN => Some(STATIC_TABLE[index - 1]),
        _ => table
            .get(index - STATIC_TABLE_LEN - 1)
            .map(|f| (f.name.as_slice(), f.value.as_slice())),
    }
}

/// Append an integer with an N-bit prefix (RFC 7541 Section 5.1)
pub fn encode_integer(buf: &mut Vec<u8>, value: usize, prefix_bits: u8, pattern: u8) {
    let max = (1usize << prefix_bits) - 1;
    if value < max {
        buf.push(pattern | value as u8);
        return;
    }

    buf.push(pattern | max as u8);
    let mut rest = value - max;
    while rest >= 0x80 {
        buf.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    buf.push(rest as u8);
}

/// Read an integer with an N-bit prefix starting at `pos`
///
/// Returns the value and the position after it.
pub fn decode_integer(block: &[u8], pos: usize, prefix_bits: u8) -> Result<(usize, usize), HpackError> {
    let first = *block.get(pos).ok_or(HpackError::Truncated {
        offset: pos,
        what: "integer",
    })?;

    let max = (1usize << prefix_bits) - 1;
    let mut value = first as usize & max;
    if value < max {
        return Ok((value, pos + 1));
    }

    let mut shift = 0u32;
    let mut cursor = pos + 1;
    loop {
        let byte = *block.get(cursor).ok_or(HpackError::Truncated {
            offset: pos,
            what: "integer",
        })?;
        cursor += 1;

        // Larger values cannot be meaningful lengths or indices
        if shift > 28 {
            return Err(HpackError::IntegerOverflow { offset: pos });
        }
        value += ((byte & 0x7f) as usize) << shift;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok((value, cursor));
        }
    }
}

/// Read a raw or Huffman-coded string literal starting at `pos`
pub fn decode_string(block: &[u8], pos: usize) -> Result<(Vec<u8>, usize), HpackError> {
    let huffman = block
        .get(pos)
        .map(|b| b & 0x80 != 0)
        .ok_or(HpackError::Truncated {
            offset: pos,
            what: "string length",
        })?;
    let (length, start) = decode_integer(block, pos, 7)?;

    let end = start
        .checked_add(length)
        .filter(|&end| end <= block.len())
        .ok_or(HpackError::Truncated {
            offset: pos,
            what: "string",
        })?;
    let raw = &block[start..end];

    let bytes = if huffman {
        ::hpack::huffman::HuffmanDecoder::new()
            .decode(raw)
            .map_err(|e| HpackError::Huffman {
                offset: pos,
                reason: format!("{:?}", e),
            })?
    } else {
        raw.to_vec()
    };

    Ok((bytes, end))
}

/// Append a raw (non-Huffman) string literal
pub fn encode_string(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_integer(buf, bytes.len(), 7, 0x00);
    buf.extend_from_slice(bytes);
}

/// Header block decoder owning the connection's decoding table
#[derive(Debug, Clone)]
pub struct Decoder {
    table: DynamicTable,
    /// Upper bound for size updates: the HEADER_TABLE_SIZE we advertised
    limit: usize,
}

impl Decoder {
    /// Create a decoder for a locally advertised HEADER_TABLE_SIZE
    pub fn new(header_table_size: usize) -> Self {
        Decoder {
            table: DynamicTable::new(header_table_size),
            limit: header_table_size,
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Decode a complete header block into its fields, in order
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>, HpackError> {
        let mut fields = Vec::new();
        let mut pos = 0;

        while pos < block.len() {
            let start = pos;
            let byte = block[pos];

            if byte & 0x80 != 0 {
                let (index, next) = decode_integer(block, pos, 7)?;
                let (name, value) = self.entry(start, index)?;
                fields.push(HeaderField::new(name, value));
                pos = next;
            } else if byte & 0xc0 == 0x40 {
                let (field, next) = self.literal(block, pos, 6)?;
                self.table.insert(field.name.clone(), field.value.clone());
                fields.push(field);
                pos = next;
            } else if byte & 0xe0 == 0x20 {
                if !fields.is_empty() {
                    return Err(HpackError::MisplacedSizeUpdate { offset: start });
                }
                let (size, next) = decode_integer(block, pos, 5)?;
                if size > self.limit {
                    return Err(HpackError::TableSizeTooLarge {
                        offset: start,
                        requested: size,
                        limit: self.limit,
                    });
                }
                trace!(size, "dynamic table size update");
                self.table.set_max_size(size);
                pos = next;
            } else {
                // 0001xxxx never indexed, 0000xxxx without indexing
                let (field, next) = self.literal(block, pos, 4)?;
                fields.push(field);
                pos = next;
            }
        }

        Ok(fields)
    }

    fn entry(&self, offset: usize, index: usize) -> Result<(Vec<u8>, Vec<u8>), HpackError> {
        lookup(&self.table, index)
            .map(|(n, v)| (n.to_vec(), v.to_vec()))
            .ok_or(HpackError::InvalidIndex {
                offset,
                index,
                dynamic_len: self.table.len(),
            })
    }

    fn literal(&self, block: &[u8], pos: usize, prefix_bits: u8) -> Result<(HeaderField, usize), HpackError> {
        let (name_index, next) = decode_integer(block, pos, prefix_bits)?;

        let (name, next) = if name_index == 0 {
            decode_string(block, next)?
        } else {
            (self.entry(pos, name_index)?.0, next)
        };
        let (value, next) = decode_string(block, next)?;

        Ok((HeaderField { name, value }, next))
    }
}

/// Minimal request header encoder, see the module documentation
#[derive(Debug, Clone)]
pub struct Encoder {
    table: DynamicTable,
    indexing: bool,
    pending_size_update: Option<usize>,
}

impl Encoder {
    /// Encoder that never adds to its dynamic table
    pub fn new(header_table_size: usize) -> Self {
        Encoder {
            table: DynamicTable::new(header_table_size),
            indexing: false,
            pending_size_update: None,
        }
    }

    /// Encoder that indexes every literal it emits
    pub fn with_indexing(header_table_size: usize) -> Self {
        Encoder {
            indexing: true,
            ..Encoder::new(header_table_size)
        }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    pub fn table_mut(&mut self) -> &mut DynamicTable {
        &mut self.table
    }

    /// Follow the peer's HEADER_TABLE_SIZE
    pub fn set_max_table_size(&mut self, size: usize) {
        if size != self.table.max_size() {
            self.table.set_max_size(size);
            self.pending_size_update = Some(size);
        }
    }

    /// Encode `fields` into one header block
    pub fn encode(&mut self, fields: &[HeaderField]) -> Vec<u8> {
        let mut buf = Vec::new();

        if let Some(size) = self.pending_size_update.take() {
            encode_integer(&mut buf, size, 5, 0x20);
        }

        for field in fields {
            let (exact, name_only) = self.find(field);

            if let Some(index) = exact {
                encode_integer(&mut buf, index, 7, 0x80);
                continue;
            }

            let (prefix_bits, pattern) = if self.indexing { (6, 0x40) } else { (4, 0x00) };
            match name_only {
                Some(index) => encode_integer(&mut buf, index, prefix_bits, pattern),
                None => {
                    buf.push(pattern);
                    encode_string(&mut buf, &field.name);
                }
            }
            encode_string(&mut buf, &field.value);

            if self.indexing {
                self.table.insert(field.name.clone(), field.value.clone());
            }
        }

        buf
    }

    /// Encode `(name, value)` string pairs
    pub fn encode_pairs(&mut self, pairs: &[(&str, &str)]) -> Vec<u8> {
        let fields: Vec<HeaderField> = pairs
            .iter()
            .map(|(n, v)| HeaderField::new(n.as_bytes(), v.as_bytes()))
            .collect();
        self.encode(&fields)
    }

    /// Exact-match index and name-match index, static table first
    fn find(&self, field: &HeaderField) -> (Option<usize>, Option<usize>) {
        let mut name_only = None;

        for (i, (name, value)) in STATIC_TABLE.iter().enumerate() {
            if *name == field.name.as_slice() {
                if *value == field.value.as_slice() {
                    return (Some(i + 1), None);
                }
                name_only.get_or_insert(i + 1);
            }
        }

        for (i, entry) in self.table.iter().enumerate() {
            if entry.name == field.name {
                let index = i + STATIC_TABLE_LEN + 1;
                if entry.value == field.value {
                    return (Some(index), None);
                }
                name_only.get_or_insert(index);
            }
        }

        (None, name_only)
    }
}
