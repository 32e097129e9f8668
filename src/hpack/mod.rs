//! HPACK header compression (RFC 7541)
//!
//! One [`Encoder`]/[`Decoder`] pair exists per connection and lives as long
//! as the connection: each header block mutates the shared dynamic table, so
//! encoding must happen exactly once per transmitted block, in wire order,
//! and received blocks must be decoded in arrival order across all streams.
//! A failed decode leaves the two tables out of sync and is unrecoverable
//! short of a connection teardown.

pub mod table;

use crate::error::{Error, Result};
use crate::huffman::HuffmanCoder;
use bytes::{BufMut, Bytes, BytesMut};

pub use table::{DynamicTable, HeaderEntry, ENTRY_OVERHEAD, STATIC_TABLE};

/// Default dynamic table budget (RFC 7540 SETTINGS_HEADER_TABLE_SIZE default)
pub const DEFAULT_TABLE_SIZE: usize = 4096;

// Leading-bit patterns for the representations of RFC 7541 Section 6.
// Literal-without-indexing is the all-zero pattern and needs no constant.
const INDEXED: u8 = 0x80;
const LITERAL_WITH_INDEXING: u8 = 0x40;
const SIZE_UPDATE: u8 = 0x20;
const LITERAL_NEVER_INDEXED: u8 = 0x10;

/// Encode an integer with an N-bit prefix (RFC 7541 Section 5.1)
///
/// Values below `2^N - 1` fit in the prefix; larger values continue in
/// base-128 groups with the top bit flagging continuation.
pub fn encode_integer(dst: &mut BytesMut, value: usize, prefix_bits: u8, pattern: u8) {
    let max_prefix = (1usize << prefix_bits) - 1;

    if value < max_prefix {
        dst.put_u8(pattern | value as u8);
    } else {
        dst.put_u8(pattern | max_prefix as u8);
        let mut remaining = value - max_prefix;
        while remaining >= 128 {
            dst.put_u8((remaining & 0x7f) as u8 | 0x80);
            remaining >>= 7;
        }
        dst.put_u8(remaining as u8);
    }
}

/// Decode an N-bit-prefix integer, advancing `pos` past it
pub fn decode_integer(src: &[u8], pos: &mut usize, prefix_bits: u8) -> Result<usize> {
    if *pos >= src.len() {
        return Err(Error::HpackDecoding("integer runs past the block".to_string()));
    }

    let max_prefix = (1usize << prefix_bits) - 1;
    let first = (src[*pos] as usize) & max_prefix;
    *pos += 1;

    if first < max_prefix {
        return Ok(first);
    }

    let mut value = max_prefix;
    let mut shift = 0u32;
    loop {
        if *pos >= src.len() {
            return Err(Error::HpackDecoding("integer runs past the block".to_string()));
        }
        let byte = src[*pos];
        *pos += 1;

        if shift > 28 {
            return Err(Error::HpackDecoding("integer too large".to_string()));
        }
        let increment = ((byte & 0x7f) as usize) << shift;
        value = value
            .checked_add(increment)
            .ok_or_else(|| Error::HpackDecoding("integer overflow".to_string()))?;
        shift += 7;

        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
}

/// Encode a string literal: 1-bit Huffman flag, 7-bit-prefix length, bytes
pub fn encode_string(dst: &mut BytesMut, value: &str, huffman: bool, coder: &HuffmanCoder) {
    if huffman {
        let encoded = coder.encode(value.as_bytes());
        encode_integer(dst, encoded.len(), 7, 0x80);
        dst.extend_from_slice(&encoded);
    } else {
        encode_integer(dst, value.len(), 7, 0x00);
        dst.extend_from_slice(value.as_bytes());
    }
}

/// Decode a string literal, advancing `pos` past it
pub fn decode_string(src: &[u8], pos: &mut usize, coder: &HuffmanCoder) -> Result<String> {
    if *pos >= src.len() {
        return Err(Error::HpackDecoding("string runs past the block".to_string()));
    }

    let huffman = src[*pos] & 0x80 != 0;
    let length = decode_integer(src, pos, 7)?;

    if src.len() - *pos < length {
        return Err(Error::HpackDecoding(format!(
            "string length {length} overruns the block"
        )));
    }
    let raw = &src[*pos..*pos + length];
    *pos += length;

    let bytes = if huffman { coder.decode(raw)? } else { raw.to_vec() };
    String::from_utf8(bytes).map_err(|_| Error::HpackDecoding("string is not valid UTF-8".to_string()))
}

/// Resolve an index against the combined static + dynamic space
fn lookup(table: &DynamicTable, index: usize) -> Result<HeaderEntry> {
    if index == 0 {
        return Err(Error::HpackDecoding("index 0 is not addressable".to_string()));
    }
    if index <= STATIC_TABLE.len() {
        return table::static_entry(index)
            .ok_or_else(|| Error::HpackDecoding(format!("invalid static index {index}")));
    }
    table
        .get(index - STATIC_TABLE.len() - 1)
        .cloned()
        .ok_or_else(|| Error::HpackDecoding(format!("index {index} beyond table bounds")))
}

/// HPACK encoder: one per connection, one direction
pub struct Encoder {
    table: DynamicTable,
    coder: HuffmanCoder,
    pending_size_update: Option<usize>,
}

impl Encoder {
    /// Create an encoder with the default table budget
    pub fn new() -> Self {
        Self::with_table_size(DEFAULT_TABLE_SIZE)
    }

    /// Create an encoder with an explicit table budget
    pub fn with_table_size(max_size: usize) -> Self {
        Encoder {
            table: DynamicTable::new(max_size),
            coder: HuffmanCoder::new(),
            pending_size_update: None,
        }
    }

    /// Current dynamic table occupancy in bytes
    pub fn table_size(&self) -> usize {
        self.table.size()
    }

    /// Change the dynamic table budget.
    ///
    /// The new budget takes effect immediately (evicting as needed) and a
    /// size-update instruction is emitted at the start of the next encoded
    /// block so the peer's decoder mirrors the change.
    pub fn set_max_table_size(&mut self, max_size: usize) {
        self.table.set_max_size(max_size);
        self.pending_size_update = Some(max_size);
    }

    /// Encode a header list into one compressed block.
    ///
    /// Every call mutates the shared dynamic table; blocks must be encoded
    /// exactly once, in the order they go on the wire. Names are lowercased
    /// on the wire. `huffman` selects Huffman coding for literal strings;
    /// it is applied unconditionally when set rather than per-string
    /// whichever is shorter.
    pub fn encode(&mut self, headers: &[HeaderEntry], huffman: bool) -> Bytes {
        let mut dst = BytesMut::new();

        if let Some(size) = self.pending_size_update.take() {
            encode_integer(&mut dst, size, 5, SIZE_UPDATE);
        }

        for header in headers {
            self.encode_entry(&mut dst, header, huffman);
        }

        dst.freeze()
    }

    fn encode_entry(&mut self, dst: &mut BytesMut, header: &HeaderEntry, huffman: bool) {
        let name = header.name.to_ascii_lowercase();
        let value = header.value.as_str();

        // Exact match anywhere in the combined index space
        if let Some(index) = table::find_static(&name, value) {
            encode_integer(dst, index, 7, INDEXED);
            return;
        }
        if let Some(position) = self.table.find(&name, value) {
            encode_integer(dst, STATIC_TABLE.len() + position + 1, 7, INDEXED);
            return;
        }

        // Literal with incremental indexing, naming by index when possible
        let name_index = table::find_static_name(&name)
            .or_else(|| self.table.find_name(&name).map(|p| STATIC_TABLE.len() + p + 1));
        match name_index {
            Some(index) => encode_integer(dst, index, 6, LITERAL_WITH_INDEXING),
            None => {
                dst.put_u8(LITERAL_WITH_INDEXING);
                encode_string(dst, &name, huffman, &self.coder);
            }
        }
        encode_string(dst, value, huffman, &self.coder);

        self.table.insert(HeaderEntry::new(name, value));
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

/// HPACK decoder: one per connection, one direction
pub struct Decoder {
    table: DynamicTable,
    coder: HuffmanCoder,
    /// Ceiling for size-update instructions, from our SETTINGS
    max_allowed_table_size: usize,
    /// Budget for one decoded header list, None = unlimited
    max_header_list_size: Option<usize>,
}

impl Decoder {
    /// Create a decoder with the default table budget
    pub fn new() -> Self {
        Self::with_table_size(DEFAULT_TABLE_SIZE)
    }

    /// Create a decoder with an explicit table budget
    pub fn with_table_size(max_size: usize) -> Self {
        Decoder {
            table: DynamicTable::new(max_size),
            coder: HuffmanCoder::new(),
            max_allowed_table_size: max_size,
            max_header_list_size: None,
        }
    }

    /// Current dynamic table occupancy in bytes
    pub fn table_size(&self) -> usize {
        self.table.size()
    }

    /// Raise or lower the ceiling that size-update instructions may request
    /// (driven by the SETTINGS_HEADER_TABLE_SIZE we advertised)
    pub fn set_max_allowed_table_size(&mut self, max_size: usize) {
        self.max_allowed_table_size = max_size;
        if self.table.max_size() > max_size {
            self.table.set_max_size(max_size);
        }
    }

    /// Cap the total decoded size of one header list
    pub fn set_max_header_list_size(&mut self, max_size: Option<usize>) {
        self.max_header_list_size = max_size;
    }

    /// Decode one complete header block.
    ///
    /// Blocks must be handed over in wire arrival order across all streams;
    /// the dynamic table is a single shared automaton and reordering
    /// desynchronizes it from the peer's encoder.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderEntry>> {
        let mut headers = Vec::new();
        let mut pos = 0usize;
        let mut list_size = 0usize;

        while pos < block.len() {
            let first = block[pos];

            let entry = if first & INDEXED != 0 {
                let index = decode_integer(block, &mut pos, 7)?;
                lookup(&self.table, index)?
            } else if first & LITERAL_WITH_INDEXING != 0 {
                let entry = self.decode_literal(block, &mut pos, 6)?;
                self.table.insert(entry.clone());
                entry
            } else if first & SIZE_UPDATE != 0 {
                let new_size = decode_integer(block, &mut pos, 5)?;
                if new_size > self.max_allowed_table_size {
                    return Err(Error::HpackDecoding(format!(
                        "table size update {new_size} exceeds advertised maximum {}",
                        self.max_allowed_table_size
                    )));
                }
                self.table.set_max_size(new_size);
                continue;
            } else {
                // LITERAL_NEVER_INDEXED and LITERAL_WITHOUT_INDEXING share
                // the 4-bit prefix layout and neither touches the table.
                debug_assert!(
                    (first & 0xf0) == 0 || (first & LITERAL_NEVER_INDEXED) != 0,
                    "unhandled representation byte {first:#x}"
                );
                self.decode_literal(block, &mut pos, 4)?
            };

            list_size += entry.size();
            if let Some(limit) = self.max_header_list_size {
                if list_size > limit {
                    return Err(Error::HpackDecoding(format!(
                        "header list exceeds {limit} bytes"
                    )));
                }
            }
            headers.push(entry);
        }

        Ok(headers)
    }

    fn decode_literal(
        &mut self,
        block: &[u8],
        pos: &mut usize,
        prefix_bits: u8,
    ) -> Result<HeaderEntry> {
        let index = decode_integer(block, pos, prefix_bits)?;
        let name = if index == 0 {
            decode_string(block, pos, &self.coder)?
        } else {
            lookup(&self.table, index)?.name
        };
        let value = decode_string(block, pos, &self.coder)?;
        Ok(HeaderEntry::new(name, value))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, value: impl Into<String>) -> HeaderEntry {
        HeaderEntry::new(name, value)
    }

    #[test]
    fn test_integer_prefix_fit() {
        // RFC 7541 C.1.1: 10 with a 5-bit prefix
        let mut buf = BytesMut::new();
        encode_integer(&mut buf, 10, 5, 0x00);
        assert_eq!(&buf[..], &[0x0a]);

        let mut pos = 0;
        assert_eq!(decode_integer(&buf, &mut pos, 5).unwrap(), 10);
        assert_eq!(pos, 1);
    }

    #[test]
    fn test_integer_continuation() {
        // RFC 7541 C.1.2: 1337 with a 5-bit prefix
        let mut buf = BytesMut::new();
        encode_integer(&mut buf, 1337, 5, 0x00);
        assert_eq!(&buf[..], &[0x1f, 0x9a, 0x0a]);

        let mut pos = 0;
        assert_eq!(decode_integer(&buf, &mut pos, 5).unwrap(), 1337);
    }

    #[test]
    fn test_integer_truncated() {
        let mut pos = 0;
        assert!(decode_integer(&[0x1f, 0x9a], &mut pos, 5).is_err());
    }

    #[test]
    fn test_integer_overflow_rejected() {
        // Endless continuation bytes must not wrap around
        let bogus = [0x1f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f];
        let mut pos = 0;
        assert!(decode_integer(&bogus, &mut pos, 5).is_err());
    }

    #[test]
    fn test_string_roundtrip_both_modes() {
        let coder = HuffmanCoder::new();
        for huffman in [false, true] {
            let mut buf = BytesMut::new();
            encode_string(&mut buf, "no-cache", huffman, &coder);
            assert_eq!(buf[0] & 0x80 != 0, huffman);

            let mut pos = 0;
            let decoded = decode_string(&buf, &mut pos, &coder).unwrap();
            assert_eq!(decoded, "no-cache");
            assert_eq!(pos, buf.len());
        }
    }

    #[test]
    fn test_string_overrun_rejected() {
        let coder = HuffmanCoder::new();
        // Declares 10 bytes, provides 2
        let bogus = [0x0a, b'h', b'i'];
        let mut pos = 0;
        assert!(decode_string(&bogus, &mut pos, &coder).is_err());
    }

    #[test]
    fn test_rfc7541_c31_first_request() {
        // C.3.1: GET http://www.example.com/ without Huffman
        let mut encoder = Encoder::new();
        let headers = vec![
            entry(":method", "GET"),
            entry(":scheme", "http"),
            entry(":path", "/"),
            entry(":authority", "www.example.com"),
        ];
        let block = encoder.encode(&headers, false);
        let expected: &[u8] = &[
            0x82, 0x86, 0x84, 0x41, 0x0f, b'w', b'w', b'w', b'.', b'e', b'x', b'a', b'm', b'p',
            b'l', b'e', b'.', b'c', b'o', b'm',
        ];
        assert_eq!(&block[..], expected);
        assert_eq!(encoder.table_size(), 57); // :authority entry only
    }

    #[test]
    fn test_rfc7541_c41_first_request_huffman() {
        // C.4.1: same request, Huffman-coded literals
        let mut encoder = Encoder::new();
        let headers = vec![
            entry(":method", "GET"),
            entry(":scheme", "http"),
            entry(":path", "/"),
            entry(":authority", "www.example.com"),
        ];
        let block = encoder.encode(&headers, true);
        let expected: &[u8] = &[
            0x82, 0x86, 0x84, 0x41, 0x8c, 0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab,
            0x90, 0xf4, 0xff,
        ];
        assert_eq!(&block[..], expected);
    }

    #[test]
    fn test_second_request_hits_dynamic_table() {
        let mut encoder = Encoder::new();
        let headers = vec![
            entry(":method", "GET"),
            entry(":scheme", "http"),
            entry(":path", "/"),
            entry(":authority", "www.example.com"),
        ];
        encoder.encode(&headers, false);
        let block = encoder.encode(&headers, false);
        // :authority is now dynamic index 62 = 0x80 | 62
        assert_eq!(&block[..], &[0x82, 0x86, 0x84, 0xbe]);
    }

    #[test]
    fn test_roundtrip_plain_and_huffman() {
        let headers = vec![
            entry(":method", "GET"),
            entry(":path", "/search?q=hello world"),
            entry(":scheme", "https"),
            entry(":authority", "example.com"),
            entry("accept", "text/html"),
            entry("accept", ""),
            entry("x-custom-header", "with value"),
            entry("x-custom-header", "other value"),
        ];

        for huffman in [false, true] {
            let mut encoder = Encoder::new();
            let mut decoder = Decoder::new();
            let block = encoder.encode(&headers, huffman);
            let decoded = decoder.decode(&block).unwrap();
            assert_eq!(decoded, headers, "huffman={huffman}");
        }
    }

    #[test]
    fn test_wire_order_keeps_tables_in_sync() {
        // Several blocks through one encoder/decoder pair, decoded in the
        // order they were produced.
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();

        let block_a = encoder.encode(&[entry("x-request-id", "aaa")], false);
        let block_b = encoder.encode(&[entry("x-request-id", "aaa")], false);
        let block_c = encoder.encode(&[entry("x-request-id", "bbb")], false);

        // Second block is a one-byte dynamic index hit
        assert_eq!(block_b.len(), 1);

        assert_eq!(decoder.decode(&block_a).unwrap(), vec![entry("x-request-id", "aaa")]);
        assert_eq!(decoder.decode(&block_b).unwrap(), vec![entry("x-request-id", "aaa")]);
        assert_eq!(decoder.decode(&block_c).unwrap(), vec![entry("x-request-id", "bbb")]);
    }

    #[test]
    fn test_uppercase_names_lowercased_on_wire() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();
        let block = encoder.encode(&[entry("X-Custom", "V")], false);
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded, vec![entry("x-custom", "V")]);
    }

    #[test]
    fn test_indexed_static_entry_decodes() {
        let mut decoder = Decoder::new();
        // 0x82 = indexed, static 2 = :method GET
        let decoded = decoder.decode(&[0x82]).unwrap();
        assert_eq!(decoded, vec![entry(":method", "GET")]);
    }

    #[test]
    fn test_never_indexed_literal_decodes_without_insertion() {
        let coder = HuffmanCoder::new();
        let mut block = BytesMut::new();
        block.put_u8(0x10); // never indexed, literal name
        encode_string(&mut block, "authorization", false, &coder);
        encode_string(&mut block, "secret", false, &coder);

        let mut decoder = Decoder::new();
        let decoded = decoder.decode(&block).unwrap();
        assert_eq!(decoded, vec![entry("authorization", "secret")]);
        assert_eq!(decoder.table_size(), 0);
    }

    #[test]
    fn test_index_out_of_range_is_an_error() {
        let mut decoder = Decoder::new();
        // Index 70 with an empty dynamic table
        let mut block = BytesMut::new();
        encode_integer(&mut block, 70, 7, 0x80);
        assert!(matches!(
            decoder.decode(&block),
            Err(Error::HpackDecoding(_))
        ));
    }

    #[test]
    fn test_size_update_respects_settings_ceiling() {
        let mut decoder = Decoder::with_table_size(4096);

        // In-bounds update is accepted
        let mut ok = BytesMut::new();
        encode_integer(&mut ok, 1024, 5, 0x20);
        decoder.decode(&ok).unwrap();

        // Update above the advertised maximum is a decode error
        let mut too_big = BytesMut::new();
        encode_integer(&mut too_big, 8192, 5, 0x20);
        assert!(decoder.decode(&too_big).is_err());
    }

    #[test]
    fn test_encoder_size_change_reaches_decoder() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();

        encoder.set_max_table_size(128);
        let block = encoder.encode(&[entry("x-a", "1")], false);
        // Block opens with the size-update instruction
        assert_eq!(block[0] & 0xe0, 0x20);

        decoder.decode(&block).unwrap();
        // The decoder mirrored the shrink; a large entry now evicts itself
        let block = encoder.encode(&[entry("x-long-name", "v".repeat(200))], false);
        decoder.decode(&block).unwrap();
        assert_eq!(decoder.table_size(), encoder.table_size());
        assert_eq!(decoder.table_size(), 0);
    }

    #[test]
    fn test_header_list_budget_enforced() {
        let mut encoder = Encoder::new();
        let mut decoder = Decoder::new();
        decoder.set_max_header_list_size(Some(64));

        let block = encoder.encode(
            &[entry("x-big", "v".repeat(100))],
            false,
        );
        assert!(decoder.decode(&block).is_err());
    }
}
