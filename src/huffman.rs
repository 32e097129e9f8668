//! Huffman coding for HPACK string literals
//!
//! The fixed code from RFC 7541 Appendix B, kept as a parallel pair of
//! arrays: one bit pattern and one bit length per symbol, 256 byte values
//! plus the EOS marker. EOS (`0x3fffffff`, 30 bits) is never emitted for a
//! symbol; its most-significant bits serve as the all-ones padding that
//! fills the final byte of an encoded string.
//!
//! Encoding packs codes MSB-first into a byte stream. Decoding walks a
//! binary prefix tree built once from the table; up to 7 trailing set bits
//! are accepted as padding, anything else that does not complete a symbol
//! is an error.

use crate::error::{Error, Result};

/// Code bit patterns, one per symbol (0-255), EOS last
#[rustfmt::skip]
pub const HUFFMAN_CODES: [u32; 257] = [
    0x1ff8, 0x7fffd8, 0xfffffe2, 0xfffffe3, 0xfffffe4, 0xfffffe5, 0xfffffe6, 0xfffffe7,
    0xfffffe8, 0xffffea, 0x3ffffffc, 0xfffffe9, 0xfffffea, 0x3ffffffd, 0xfffffeb, 0xfffffec,
    0xfffffed, 0xfffffee, 0xfffffef, 0xffffff0, 0xffffff1, 0xffffff2, 0x3ffffffe, 0xffffff3,
    0xffffff4, 0xffffff5, 0xffffff6, 0xffffff7, 0xffffff8, 0xffffff9, 0xffffffa, 0xffffffb,
    0x14, 0x3f8, 0x3f9, 0xffa, 0x1ff9, 0x15, 0xf8, 0x7fa,
    0x3fa, 0x3fb, 0xf9, 0x7fb, 0xfa, 0x16, 0x17, 0x18,
    0x0, 0x1, 0x2, 0x19, 0x1a, 0x1b, 0x1c, 0x1d,
    0x1e, 0x1f, 0x5c, 0xfb, 0x7ffc, 0x20, 0xffb, 0x3fc,
    0x1ffa, 0x21, 0x5d, 0x5e, 0x5f, 0x60, 0x61, 0x62,
    0x63, 0x64, 0x65, 0x66, 0x67, 0x68, 0x69, 0x6a,
    0x6b, 0x6c, 0x6d, 0x6e, 0x6f, 0x70, 0x71, 0x72,
    0xfc, 0x73, 0xfd, 0x1ffb, 0x7fff0, 0x1ffc, 0x3ffc, 0x22,
    0x7ffd, 0x3, 0x23, 0x4, 0x24, 0x5, 0x25, 0x26,
    0x27, 0x6, 0x74, 0x75, 0x28, 0x29, 0x2a, 0x7,
    0x2b, 0x76, 0x2c, 0x8, 0x9, 0x2d, 0x77, 0x78,
    0x79, 0x7a, 0x7b, 0x7ffe, 0x7fc, 0x3ffd, 0x1ffd, 0xffffffc,
    0xfffe6, 0x3fffd2, 0xfffe7, 0xfffe8, 0x3fffd3, 0x3fffd4, 0x3fffd5, 0x7fffd9,
    0x3fffd6, 0x7fffda, 0x7fffdb, 0x7fffdc, 0x7fffdd, 0x7fffde, 0xffffeb, 0x7fffdf,
    0xffffec, 0xffffed, 0x3fffd7, 0x7fffe0, 0xffffee, 0x7fffe1, 0x7fffe2, 0x7fffe3,
    0x7fffe4, 0x1fffdc, 0x3fffd8, 0x7fffe5, 0x3fffd9, 0x7fffe6, 0x7fffe7, 0xffffef,
    0x3fffda, 0x1fffdd, 0xfffe9, 0x3fffdb, 0x3fffdc, 0x7fffe8, 0x7fffe9, 0x1fffde,
    0x7fffea, 0x3fffdd, 0x3fffde, 0xfffff0, 0x1fffdf, 0x3fffdf, 0x7fffeb, 0x7fffec,
    0x1fffe0, 0x1fffe1, 0x3fffe0, 0x1fffe2, 0x7fffed, 0x3fffe1, 0x7fffee, 0x7fffef,
    0xfffea, 0x3fffe2, 0x3fffe3, 0x3fffe4, 0x7ffff0, 0x3fffe5, 0x3fffe6, 0x7ffff1,
    0x3ffffe0, 0x3ffffe1, 0xfffeb, 0x7fff1, 0x3fffe7, 0x7ffff2, 0x3fffe8, 0x1ffffec,
    0x3ffffe2, 0x3ffffe3, 0x3ffffe4, 0x7ffffde, 0x7ffffdf, 0x3ffffe5, 0xfffff1, 0x1ffffed,
    0x7fff2, 0x1fffe3, 0x3ffffe6, 0x7ffffe0, 0x7ffffe1, 0x3ffffe7, 0x7ffffe2, 0xfffff2,
    0x1fffe4, 0x1fffe5, 0x3ffffe8, 0x3ffffe9, 0xffffffd, 0x7ffffe3, 0x7ffffe4, 0x7ffffe5,
    0xfffec, 0xfffff3, 0xfffed, 0x1fffe6, 0x3fffe9, 0x1fffe7, 0x1fffe8, 0x7ffff3,
    0x3fffea, 0x3fffeb, 0x1ffffee, 0x1ffffef, 0xfffff4, 0xfffff5, 0x3ffffea, 0x7ffff4,
    0x3ffffeb, 0x7ffffe6, 0x3ffffec, 0x3ffffed, 0x7ffffe7, 0x7ffffe8, 0x7ffffe9, 0x7ffffea,
    0x7ffffeb, 0xffffffe, 0x7ffffec, 0x7ffffed, 0x7ffffee, 0x7ffffef, 0x7fffff0, 0x3ffffee,
    0x3fffffff,
];

/// Code bit lengths, parallel to [`HUFFMAN_CODES`]
#[rustfmt::skip]
pub const HUFFMAN_CODE_LENGTHS: [u8; 257] = [
    13, 23, 28, 28, 28, 28, 28, 28, 28, 24, 30, 28, 28, 30, 28, 28,
    28, 28, 28, 28, 28, 28, 30, 28, 28, 28, 28, 28, 28, 28, 28, 28,
     6, 10, 10, 12, 13,  6,  8, 11, 10, 10,  8, 11,  8,  6,  6,  6,
     5,  5,  5,  6,  6,  6,  6,  6,  6,  6,  7,  8, 15,  6, 12, 10,
    13,  6,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,  7,
     7,  7,  7,  7,  7,  7,  7,  7,  8,  7,  8, 13, 19, 13, 14,  6,
    15,  5,  6,  5,  6,  5,  6,  6,  6,  5,  7,  7,  6,  6,  6,  5,
     6,  7,  6,  5,  5,  6,  7,  7,  7,  7,  7, 15, 11, 14, 13, 28,
    20, 22, 20, 20, 22, 22, 22, 23, 22, 23, 23, 23, 23, 23, 24, 23,
    24, 24, 22, 23, 24, 23, 23, 23, 23, 21, 22, 23, 22, 23, 23, 24,
    22, 21, 20, 22, 22, 23, 23, 21, 23, 22, 22, 24, 21, 22, 23, 23,
    21, 21, 22, 21, 23, 22, 23, 23, 20, 22, 22, 22, 23, 22, 22, 23,
    26, 26, 20, 19, 22, 23, 22, 25, 26, 26, 26, 27, 27, 26, 24, 25,
    19, 21, 26, 27, 27, 26, 27, 24, 21, 21, 26, 26, 28, 27, 27, 27,
    20, 24, 20, 21, 22, 21, 21, 23, 22, 22, 25, 25, 24, 24, 26, 23,
    26, 27, 26, 26, 27, 27, 27, 27, 27, 28, 27, 27, 27, 27, 27, 26,
    30,
];

/// The end-of-string marker: symbol index 256
const EOS: usize = 256;

/// One node in the decode tree. Leaves carry a symbol; interior nodes carry
/// child slots for the 0 and 1 bit.
#[derive(Debug, Clone, Copy, Default)]
struct Node {
    children: [Option<u16>; 2],
    symbol: Option<u16>,
}

/// Huffman coder for HPACK string literals
///
/// Construction builds the decode tree from the code table; one coder can be
/// shared by any number of encode/decode calls because no state survives a
/// call.
#[derive(Debug, Clone)]
pub struct HuffmanCoder {
    tree: Vec<Node>,
}

impl HuffmanCoder {
    /// Build the coder (decode tree included) from the fixed code table
    pub fn new() -> Self {
        let mut tree = vec![Node::default()];

        for symbol in 0..HUFFMAN_CODES.len() {
            let code = HUFFMAN_CODES[symbol];
            let len = HUFFMAN_CODE_LENGTHS[symbol];

            let mut node = 0usize;
            for bit_index in (0..len).rev() {
                let bit = ((code >> bit_index) & 1) as usize;
                node = match tree[node].children[bit] {
                    Some(next) => next as usize,
                    None => {
                        tree.push(Node::default());
                        let next = (tree.len() - 1) as u16;
                        tree[node].children[bit] = Some(next);
                        next as usize
                    }
                };
            }
            tree[node].symbol = Some(symbol as u16);
        }

        HuffmanCoder { tree }
    }

    /// Huffman-encode a byte string.
    ///
    /// Codes are concatenated MSB-first; the final partial byte is padded
    /// with 1-bits (a prefix of EOS) per RFC 7541 Section 5.2.
    pub fn encode(&self, src: &[u8]) -> Vec<u8> {
        let mut dst = Vec::with_capacity(src.len());
        let mut accumulator: u64 = 0;
        let mut bits: u32 = 0;

        for &byte in src {
            let code = HUFFMAN_CODES[byte as usize];
            let code_bits = u32::from(HUFFMAN_CODE_LENGTHS[byte as usize]);
            accumulator = (accumulator << code_bits) | u64::from(code);
            bits += code_bits;

            while bits >= 8 {
                bits -= 8;
                dst.push((accumulator >> bits) as u8);
                accumulator &= (1u64 << bits) - 1;
            }
        }

        if bits > 0 {
            let padding = 8 - bits;
            accumulator = (accumulator << padding) | ((1u64 << padding) - 1);
            dst.push(accumulator as u8);
        }

        dst
    }

    /// Decode a Huffman-encoded byte string.
    ///
    /// Trailing padding that is a strict all-ones prefix shorter than 8 bits
    /// is discarded silently; any other incomplete code, a full EOS, or
    /// padding containing a 0 bit fails the decode.
    pub fn decode(&self, src: &[u8]) -> Result<Vec<u8>> {
        let mut dst = Vec::with_capacity(src.len() * 2);
        let mut node = 0usize;
        let mut path_bits: u32 = 0;
        let mut path_all_ones = true;

        for &byte in src {
            for bit_index in (0..8).rev() {
                let bit = ((byte >> bit_index) & 1) as usize;
                node = match self.tree[node].children[bit] {
                    Some(next) => next as usize,
                    None => {
                        return Err(Error::HpackDecoding(
                            "invalid Huffman code in string literal".to_string(),
                        ))
                    }
                };
                path_bits += 1;
                path_all_ones &= bit == 1;

                if let Some(symbol) = self.tree[node].symbol {
                    if symbol as usize == EOS {
                        return Err(Error::HpackDecoding(
                            "EOS symbol inside Huffman string".to_string(),
                        ));
                    }
                    dst.push(symbol as u8);
                    node = 0;
                    path_bits = 0;
                    path_all_ones = true;
                }
            }
        }

        // Whatever remains must be padding: fewer than 8 set bits.
        if path_bits >= 8 || !path_all_ones {
            return Err(Error::HpackDecoding(
                "invalid Huffman padding (must be a short all-ones prefix)".to_string(),
            ));
        }

        Ok(dst)
    }
}

impl Default for HuffmanCoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7541_examples() {
        // RFC 7541 Appendix C.4 wire samples
        let coder = HuffmanCoder::new();

        let encoded = coder.encode(b"www.example.com");
        assert_eq!(
            encoded,
            [0xf1, 0xe3, 0xc2, 0xe5, 0xf2, 0x3a, 0x6b, 0xa0, 0xab, 0x90, 0xf4, 0xff]
        );

        let encoded = coder.encode(b"no-cache");
        assert_eq!(encoded, [0xa8, 0xeb, 0x10, 0x64, 0x9c, 0xbf]);

        let encoded = coder.encode(b"custom-key");
        assert_eq!(encoded, [0x25, 0xa8, 0x49, 0xe9, 0x5b, 0xa9, 0x7d, 0x7f]);
    }

    #[test]
    fn test_roundtrip_ascii() {
        let coder = HuffmanCoder::new();
        for input in [
            &b"www.example.com"[..],
            b"no-cache",
            b"custom-key",
            b"custom-value",
            b"",
            b"a",
            b"Hello, World!",
            b"0123456789 :;/?#[]@",
        ] {
            let decoded = coder.decode(&coder.encode(input)).unwrap();
            assert_eq!(decoded, input, "roundtrip failed for {input:?}");
        }
    }

    #[test]
    fn test_roundtrip_all_byte_values() {
        let coder = HuffmanCoder::new();
        let input: Vec<u8> = (0..=255).collect();
        let decoded = coder.decode(&coder.encode(&input)).unwrap();
        assert_eq!(decoded, input);
    }

    #[test]
    fn test_compresses_typical_text() {
        let coder = HuffmanCoder::new();
        let input = b"www.example.com";
        assert!(coder.encode(input).len() < input.len());
    }

    #[test]
    fn test_bad_padding_rejected() {
        let coder = HuffmanCoder::new();
        // '0' encodes as 00000 (5 bits); pad with zeros instead of ones.
        let bogus = [0b0000_0000];
        assert!(coder.decode(&bogus).is_err());
    }

    #[test]
    fn test_eight_bit_padding_rejected() {
        let coder = HuffmanCoder::new();
        // A full byte of ones is not valid padding (must be < 8 bits).
        let mut encoded = coder.encode(b"0");
        encoded.push(0xff);
        assert!(coder.decode(&encoded).is_err());
    }

    #[test]
    fn test_empty_input() {
        let coder = HuffmanCoder::new();
        assert!(coder.encode(b"").is_empty());
        assert!(coder.decode(b"").unwrap().is_empty());
    }
}
