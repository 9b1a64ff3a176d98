//! Primitive binary codec.
//!
//! Bit-exact encoding of the leaf values every structured operation is built from:
//!
//! | Kind | Encoding |
//! |---|---|
//! | boolean | 1 byte, `0x00` or `0x01` |
//! | int / long | zigzag, then base-128 varint, least significant group first |
//! | float / double | 4 / 8 bytes IEEE754 little-endian |
//! | bytes / string | varint length, then the raw bytes (UTF-8 for strings) |
//! | fixed | exactly `size` raw bytes |
//!
//! ```rust
//! use opcua_avro::binary::{BinaryReader, BinaryWriter};
//!
//! let mut writer = BinaryWriter::new(Vec::new());
//! writer.write_long(-3).unwrap();
//! writer.write_string("abc").unwrap();
//!
//! let bytes = writer.into_inner();
//! assert_eq!(bytes, vec![0x05, 0x06, b'a', b'b', b'c']);
//!
//! let mut reader = BinaryReader::new(bytes.as_slice());
//! assert_eq!(reader.read_long().unwrap(), -3);
//! assert_eq!(reader.read_string().unwrap(), "abc");
//! ```

mod reader;
mod writer;

pub use reader::BinaryReader;
pub use writer::BinaryWriter;

/// Longest varint needed for a 64-bit value.
pub const MAX_VARINT_LEN: usize = 10;

/// Map a signed value onto an unsigned one so small magnitudes stay small.
pub const fn zigzag_encode(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

/// Inverse of [`zigzag_encode`].
pub const fn zigzag_decode(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

/// Number of bytes the varint encoding of `n` occupies.
pub const fn varint_len(n: i64) -> usize {
    let mut value = zigzag_encode(n);
    let mut len = 1;
    while value >= 0x80 {
        value >>= 7;
        len += 1;
    }
    len
}
