//!
//! Little-endian byte cursor and writer used by the container and blob codecs.
//!
//! Every read is bounds checked and fails with `MalformedContainer` instead of
//! reading past the end of the buffer.
//!

use crate::base::AnimError;

/// Bounds-checked reader over a borrowed byte slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'t> {
    buf: &'t [u8],
    pos: usize,
}

impl<'t> ByteCursor<'t> {
    /// Creates a cursor positioned at the start of `buf`.
    pub fn new(buf: &'t [u8]) -> ByteCursor<'t> {
        ByteCursor { buf, pos: 0 }
    }

    /// Current absolute position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes left after the current position.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.len().saturating_sub(self.pos)
    }

    /// Moves to an absolute position. Seeking to the very end is allowed.
    pub fn seek(&mut self, pos: usize) -> Result<(), AnimError> {
        if pos > self.buf.len() {
            return Err(AnimError::malformed(format!(
                "seek to 0x{:X} past end of 0x{:X} byte buffer",
                pos,
                self.buf.len()
            )));
        }
        self.pos = pos;
        Ok(())
    }

    /// Borrows the next `len` bytes and advances past them.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'t [u8], AnimError> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let bytes = &self.buf[self.pos..end];
                self.pos = end;
                Ok(bytes)
            }
            None => Err(AnimError::malformed(format!(
                "read of {} bytes at 0x{:X} past end of 0x{:X} byte buffer",
                len,
                self.pos,
                self.buf.len()
            ))),
        }
    }

    /// Reads a fixed-size byte array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], AnimError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8, AnimError> {
        Ok(self.read_array::<1>()?[0])
    }

    #[inline]
    pub fn read_u16(&mut self) -> Result<u16, AnimError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_u32(&mut self) -> Result<u32, AnimError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    #[inline]
    pub fn read_f32(&mut self) -> Result<f32, AnimError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Reads a u32 at an absolute position without moving the cursor.
    pub fn peek_u32_at(&self, pos: usize) -> Result<u32, AnimError> {
        let mut probe = self.clone();
        probe.seek(pos)?;
        probe.read_u32()
    }
}

/// Growable little-endian writer.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> ByteWriter {
        ByteWriter { buf: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> ByteWriter {
        ByteWriter {
            buf: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    #[inline]
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    #[inline]
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    #[inline]
    pub fn put_u16(&mut self, value: u16) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline]
    pub fn put_u32(&mut self, value: u32) {
        self.put_bytes(&value.to_le_bytes());
    }

    #[inline]
    pub fn put_f32(&mut self, value: f32) {
        self.put_bytes(&value.to_le_bytes());
    }

    /// Appends `count` zero bytes.
    pub fn put_zeros(&mut self, count: usize) {
        self.buf.resize(self.buf.len() + count, 0);
    }

    /// Overwrites an already written u32.
    pub fn patch_u32(&mut self, pos: usize, value: u32) {
        self.buf[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}
