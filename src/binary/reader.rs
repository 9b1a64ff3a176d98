//! Blocking primitive reader over any [`Read`] stream.

use std::io::{ErrorKind, Read};

use super::zigzag_decode;
use crate::{CodecError, CodecOptions, Result};

/// Reads primitive values from a byte stream.
///
/// The reader never buffers ahead; every call consumes exactly the bytes of one value, so the
/// same stream can be handed to another reader between messages.
#[derive(Debug)]
pub struct BinaryReader<R> {
    inner: R,
    max_string_length: usize,
    max_bytes_length: usize,
    position: u64,
}

impl<R: Read> BinaryReader<R> {
    /// Create a reader with the default length limits.
    pub fn new(inner: R) -> Self {
        Self::with_options(inner, &CodecOptions::default())
    }

    /// Create a reader using the length limits from `options`.
    pub fn with_options(inner: R, options: &CodecOptions) -> Self {
        Self {
            inner,
            max_string_length: options.max_string_length,
            max_bytes_length: options.max_bytes_length,
            position: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        match self.read_byte("boolean")? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(CodecError::decoding(format!(
                "Invalid boolean byte {other:#04x} at offset {}",
                self.position - 1
            ))),
        }
    }

    pub fn read_long(&mut self) -> Result<i64> {
        let first = self.read_byte("varint")?;
        self.finish_varint(first)
    }

    /// Read a varint, returning `None` when the stream ends cleanly before its first byte.
    pub fn try_read_long(&mut self) -> Result<Option<i64>> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::io("reading varint", e)),
            }
        }
        self.position += 1;
        self.finish_varint(byte[0]).map(Some)
    }

    pub fn read_int(&mut self) -> Result<i32> {
        let value = self.read_long()?;
        i32::try_from(value)
            .map_err(|_| CodecError::decoding(format!("Value {value} is out of range for int")))
    }

    pub fn read_float(&mut self) -> Result<f32> {
        let mut buf = [0u8; 4];
        self.read_fixed(&mut buf)?;
        Ok(f32::from_le_bytes(buf))
    }

    pub fn read_double(&mut self) -> Result<f64> {
        let mut buf = [0u8; 8];
        self.read_fixed(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        let length = self.read_length("Byte string", self.max_bytes_length)?;
        let mut buf = vec![0u8; length];
        self.read_fixed(&mut buf)?;
        Ok(buf)
    }

    /// Read a UTF-8 string, dropping one trailing NUL written by zero-terminating producers.
    pub fn read_string(&mut self) -> Result<String> {
        let length = self.read_length("String", self.max_string_length)?;
        let mut buf = vec![0u8; length];
        self.read_fixed(&mut buf)?;
        if buf.last() == Some(&0) {
            buf.pop();
        }
        String::from_utf8(buf)
            .map_err(|e| CodecError::decoding(format!("String is not valid UTF-8: {e}")))
    }

    /// Fill `buf` completely, retrying short reads until the stream ends.
    pub fn read_fixed(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(CodecError::end_of_stream(format!(
                        "{} byte buffer ({} of {} bytes read)",
                        buf.len(),
                        filled,
                        buf.len()
                    )));
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::io("reading fixed buffer", e)),
            }
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read a non-negative length prefix and check it against `limit` before any allocation.
    pub fn read_length(&mut self, what: &str, limit: usize) -> Result<usize> {
        let length = self.read_long()?;
        if length < 0 {
            return Err(CodecError::decoding(format!("{what} has negative length {length}")));
        }
        if length as u64 > limit as u64 {
            return Err(CodecError::limit_exceeded(what, length as u64, limit as u64));
        }
        Ok(length as usize)
    }

    fn read_byte(&mut self, context: &str) -> Result<u8> {
        let mut byte = [0u8; 1];
        loop {
            match self.inner.read(&mut byte) {
                Ok(0) => return Err(CodecError::end_of_stream(context)),
                Ok(_) => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::io(format!("reading {context}"), e)),
            }
        }
        self.position += 1;
        Ok(byte[0])
    }

    fn finish_varint(&mut self, first: u8) -> Result<i64> {
        let mut value = u64::from(first & 0x7f);
        let mut shift = 7;
        let mut byte = first;
        while byte & 0x80 != 0 {
            if shift >= 64 {
                return Err(CodecError::decoding("Varint is longer than 10 bytes"));
            }
            byte = self.read_byte("varint")?;
            // Only the lowest bit of the tenth byte fits in 64 bits
            if shift == 63 && byte & 0x7e != 0 {
                return Err(CodecError::decoding("Varint overflows 64 bits"));
            }
            value |= u64::from(byte & 0x7f) << shift;
            shift += 7;
        }
        Ok(zigzag_decode(value))
    }
}
