//! Primitive writer over any [`Write`] sink.

use std::io::Write;

use super::{MAX_VARINT_LEN, zigzag_encode};
use crate::{CodecError, CodecOptions, Result};

/// Writes primitive values to a byte sink.
#[derive(Debug)]
pub struct BinaryWriter<W> {
    inner: W,
    max_string_length: usize,
    max_bytes_length: usize,
    written: u64,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self::with_options(inner, &CodecOptions::default())
    }

    pub fn with_options(inner: W, options: &CodecOptions) -> Self {
        Self {
            inner,
            max_string_length: options.max_string_length,
            max_bytes_length: options.max_bytes_length,
            written: 0,
        }
    }

    /// A writer without length limits, for container headers and block framing.
    pub fn unbounded(inner: W) -> Self {
        Self { inner, max_string_length: usize::MAX, max_bytes_length: usize::MAX, written: 0 }
    }

    pub fn bytes_written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_boolean(&mut self, value: bool) -> Result<()> {
        self.write_raw(&[u8::from(value)])
    }

    pub fn write_long(&mut self, value: i64) -> Result<()> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let mut n = zigzag_encode(value);
        let mut len = 0;
        loop {
            let group = (n & 0x7f) as u8;
            n >>= 7;
            if n == 0 {
                buf[len] = group;
                len += 1;
                break;
            }
            buf[len] = group | 0x80;
            len += 1;
        }
        self.write_raw(&buf[..len])
    }

    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.write_long(i64::from(value))
    }

    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_double(&mut self, value: f64) -> Result<()> {
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_bytes(&mut self, value: &[u8]) -> Result<()> {
        self.write_length("Byte string", value.len(), self.max_bytes_length)?;
        self.write_raw(value)
    }

    pub fn write_string(&mut self, value: &str) -> Result<()> {
        self.write_length("String", value.len(), self.max_string_length)?;
        self.write_raw(value.as_bytes())
    }

    /// Write raw bytes without a length prefix.
    pub fn write_fixed(&mut self, value: &[u8]) -> Result<()> {
        self.write_raw(value)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush().map_err(|e| CodecError::io("flushing writer", e))
    }

    fn write_length(&mut self, what: &str, length: usize, limit: usize) -> Result<()> {
        if length > limit {
            return Err(CodecError::limit_exceeded(what, length as u64, limit as u64));
        }
        self.write_long(length as i64)
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(|e| CodecError::io("writing primitive", e))?;
        self.written += bytes.len() as u64;
        Ok(())
    }
}
