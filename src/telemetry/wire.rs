//! Little-endian cursor primitives for the F1 wire format
//!
//! Reads never panic: running past the end of the buffer yields
//! `DecodeError::Truncated` so a short datagram can be dropped cleanly.

use super::DecodeError;

/// Forward-only reader over a datagram
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    #[must_use]
    pub const fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes consumed so far
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    fn take<const N: usize>(&mut self) -> Result<[u8; N], DecodeError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + N)
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: N,
            })?;
        self.pos += N;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take::<1>()?[0])
    }

    pub fn i8(&mut self) -> Result<i8, DecodeError> {
        Ok(i8::from_le_bytes(self.take::<1>()?))
    }

    pub fn u16(&mut self) -> Result<u16, DecodeError> {
        Ok(u16::from_le_bytes(self.take::<2>()?))
    }

    pub fn i16(&mut self) -> Result<i16, DecodeError> {
        Ok(i16::from_le_bytes(self.take::<2>()?))
    }

    pub fn u32(&mut self) -> Result<u32, DecodeError> {
        Ok(u32::from_le_bytes(self.take::<4>()?))
    }

    pub fn u64(&mut self) -> Result<u64, DecodeError> {
        Ok(u64::from_le_bytes(self.take::<8>()?))
    }

    pub fn f32(&mut self) -> Result<f32, DecodeError> {
        Ok(f32::from_le_bytes(self.take::<4>()?))
    }

    pub fn f64(&mut self) -> Result<f64, DecodeError> {
        Ok(f64::from_le_bytes(self.take::<8>()?))
    }

    /// Read four consecutive values (wheel order RL, RR, FL, FR)
    pub fn quad<T>(
        &mut self,
        mut read: impl FnMut(&mut Self) -> Result<T, DecodeError>,
    ) -> Result<[T; 4], DecodeError> {
        Ok([read(self)?, read(self)?, read(self)?, read(self)?])
    }

    /// Read a fixed-width, NUL-padded UTF-8 string
    pub fn fixed_str(&mut self, width: usize) -> Result<String, DecodeError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + width)
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: width,
            })?;
        self.pos += width;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(width);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Copy `len` raw bytes
    pub fn bytes(&mut self, len: usize) -> Result<Vec<u8>, DecodeError> {
        let bytes = self
            .buf
            .get(self.pos..self.pos + len)
            .ok_or(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
            })?;
        self.pos += len;
        Ok(bytes.to_vec())
    }

    /// Skip fields this crate does not model
    pub fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len,
            });
        }
        self.pos += len;
        Ok(())
    }

    /// Consume everything that is left
    #[must_use]
    pub fn rest(&mut self) -> Vec<u8> {
        let out = self.buf.get(self.pos..).unwrap_or_default().to_vec();
        self.pos = self.buf.len();
        out
    }
}

/// Append-only writer producing the same layout `Reader` consumes
#[derive(Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn i8(&mut self, v: i8) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn i16(&mut self, v: i16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn fixed_str(&mut self, s: &str, width: usize) {
        let bytes = s.as_bytes();
        let n = bytes.len().min(width);
        self.buf.extend_from_slice(&bytes[..n]);
        self.zeros(width - n);
    }

    pub fn bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }
}
