//! Little-endian cursor over a byte buffer
//!
//! Every read is bounds-checked and reports what it was reading, so truncated
//! files fail with a typed error instead of a panic.

use crate::error::{FormatError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Forward-only reader over a borrowed buffer
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current offset
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left after the cursor
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, what: &'static str) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(FormatError::Truncated {
                what,
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_i64(&mut self, what: &'static str) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8, what)?))
    }

    pub fn read_f64(&mut self, what: &'static str) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8, what)?))
    }

    /// Read a non-negative count that must fit in memory addressing
    pub fn read_count(&mut self, what: &'static str) -> Result<usize> {
        let value = self.read_i64(what)?;
        usize::try_from(value).map_err(|_| FormatError::InvalidCount { field: what, value })
    }

    /// Read `n` i64 values, checking the length up front
    pub fn read_i64_array(&mut self, n: usize, what: &'static str) -> Result<Vec<i64>> {
        let len = byte_len(n, what, self.pos, self.remaining())?;
        let bytes = self.take(len, what)?;
        let mut out = vec![0i64; n];
        LittleEndian::read_i64_into(bytes, &mut out);
        Ok(out)
    }

    /// Read `n` f64 values, checking the length up front
    pub fn read_f64_array(&mut self, n: usize, what: &'static str) -> Result<Vec<f64>> {
        let len = byte_len(n, what, self.pos, self.remaining())?;
        let bytes = self.take(len, what)?;
        let mut out = vec![0f64; n];
        LittleEndian::read_f64_into(bytes, &mut out);
        Ok(out)
    }
}

fn byte_len(n: usize, what: &'static str, offset: usize, available: usize) -> Result<usize> {
    n.checked_mul(8).ok_or(FormatError::Truncated {
        what,
        offset,
        needed: usize::MAX,
        available,
    })
}

/// Append-only little-endian writer
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn write_i64(&mut self, value: i64) {
        let mut word = [0u8; 8];
        LittleEndian::write_i64(&mut word, value);
        self.buf.extend_from_slice(&word);
    }

    pub fn write_f64(&mut self, value: f64) {
        let mut word = [0u8; 8];
        LittleEndian::write_f64(&mut word, value);
        self.buf.extend_from_slice(&word);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Peek the i64 at `offset` without consuming anything
pub fn peek_i64(buf: &[u8], offset: usize) -> Option<i64> {
    buf.get(offset..offset + 8).map(LittleEndian::read_i64)
}
