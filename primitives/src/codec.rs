//! Deterministic binary codec.
//!
//! Fixed-order, non self-describing encoding shared by transactions,
//! blocks, results and warp messages. All integers are big-endian.
//!
//! Encoding format:
//! - Fixed-size fields (ids, integers, bool) are written directly
//! - Variable-length fields are length-prefixed (u32 BE)
//! - Repeated fields are count-prefixed (u32 BE) then concatenated
//! - Bools are a single byte, `0` or `1`; anything else is rejected
//!
//! Decoders read through [`Reader`] and call [`Reader::finish`] when the
//! buffer must be fully consumed.

use crate::error::CodecError;
use crate::types::Id;

/// A cursor for reading bytes during decoding.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if n > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_be_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_be_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_be_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(CodecError::InvalidBool(b)),
        }
    }

    pub fn read_id(&mut self) -> Result<Id, CodecError> {
        self.read_array()
    }

    pub fn read_signature(&mut self) -> Result<[u8; 64], CodecError> {
        self.read_array()
    }

    /// Read a u32-prefixed byte string, rejecting lengths above `max`.
    ///
    /// The bound is checked before the body is sliced, so an attacker-chosen
    /// length never drives an allocation.
    pub fn read_var_bytes(&mut self, field: &'static str, max: usize) -> Result<Vec<u8>, CodecError> {
        let len = self.read_u32()? as usize;
        if len > max {
            return Err(CodecError::TooLarge { field, size: len, max });
        }
        Ok(self.read_bytes(len)?.to_vec())
    }

    pub fn read_string(&mut self, field: &'static str, max: usize) -> Result<String, CodecError> {
        let bytes = self.read_var_bytes(field, max)?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Read a u32 element count, rejecting counts that could not fit in the
    /// rest of the buffer given `min_item_size` bytes per element.
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize, CodecError> {
        let count = self.read_u32()? as usize;
        let needed = count.saturating_mul(min_item_size.max(1));
        if needed > self.remaining() {
            return Err(CodecError::UnexpectedEof {
                needed,
                remaining: self.remaining(),
            });
        }
        Ok(count)
    }

    /// Require the buffer to be fully consumed.
    pub fn finish(self) -> Result<(), CodecError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(CodecError::TrailingBytes { remaining }),
        }
    }
}

// ── Encoding helpers ──

pub fn write_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

pub fn write_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_be_bytes());
}

pub fn write_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

pub fn write_id(buf: &mut Vec<u8>, id: &Id) {
    buf.extend_from_slice(id);
}

pub fn write_var_bytes(buf: &mut Vec<u8>, data: &[u8]) {
    write_u32(buf, data.len() as u32);
    buf.extend_from_slice(data);
}

pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_var_bytes(buf, s.as_bytes());
}
