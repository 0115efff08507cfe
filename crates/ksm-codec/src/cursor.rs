//! Little-endian byte cursor over the container buffer.
//!
//! [`Reader`] borrows the input and tracks an absolute offset; every read is
//! bounds-checked and a short buffer surfaces as a malformed-file error at the
//! failing offset. [`Writer`] appends to an owned buffer and can patch
//! already-written bytes in place, which the build uses to rewrite the header,
//! the declaration section and the code section after fixups.

use crate::error::{CodecError, CodecResult};

// ══════════════════════════════════════════════════════════════════════════════
// Reader
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
pub struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    /// Current absolute offset.
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.offset)
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.bytes.len()
    }

    /// Move to an absolute offset. Seeking to the end is allowed.
    pub fn seek(&mut self, offset: usize) -> CodecResult<()> {
        if offset > self.bytes.len() {
            return Err(CodecError::malformed(offset, "seek past end of data"));
        }
        self.offset = offset;
        Ok(())
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        let slice = self
            .offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(self.offset..end))
            .ok_or_else(|| CodecError::malformed(self.offset, "unexpected end of data"))?;
        self.offset += len;
        Ok(slice)
    }

    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        self.take(len)
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    /// Read a word split into its low 24 bits and its high byte.
    pub fn read_u24_u8(&mut self) -> CodecResult<(u32, u8)> {
        let word = self.read_u32()?;
        Ok((word & 0x00FF_FFFF, (word >> 24) as u8))
    }

    /// Read a word-count-prefixed, NUL-terminated, zero-padded UTF-8 string.
    pub fn read_padded_string(&mut self) -> CodecResult<String> {
        let start = self.offset;
        let words = self.read_u32()? as usize;
        let len = words
            .checked_mul(4)
            .ok_or_else(|| CodecError::malformed(start, "string length overflow"))?;
        let raw = self.take(len)?;
        let text = raw.split(|&b| b == 0).next().unwrap_or_default();
        std::str::from_utf8(text)
            .map(str::to_string)
            .map_err(|_| CodecError::malformed(start, "string is not valid UTF-8"))
    }

    /// Read words until `end`. `end` must be word-aligned relative to the
    /// current offset, not behind it and not past the buffer.
    pub fn read_words_until(&mut self, end: usize) -> CodecResult<Vec<u32>> {
        if end > self.bytes.len() {
            return Err(CodecError::malformed(
                self.offset,
                format!("padding runs to {end:#x}, past end of data"),
            ));
        }
        if end < self.offset || (end - self.offset) % 4 != 0 {
            return Err(CodecError::malformed(
                self.offset,
                format!("padding does not end on a word boundary at {end:#x}"),
            ));
        }
        let mut words = Vec::new();
        while self.offset < end {
            words.push(self.read_u32()?);
        }
        Ok(words)
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Writer
// ══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default)]
pub struct Writer {
    bytes: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Number of bytes written so far, which is also the offset of the next
    /// write.
    pub fn position(&self) -> usize {
        self.bytes.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    pub fn write_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.bytes.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.write_u32(v as u32);
    }

    pub fn write_f32(&mut self, v: f32) {
        self.write_u32(v.to_bits());
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.bytes.extend_from_slice(b);
    }

    pub fn write_words(&mut self, words: &[u32]) {
        for &word in words {
            self.write_u32(word);
        }
    }

    /// Zero-fill up to the next 4-byte boundary.
    pub fn align4(&mut self) {
        while self.bytes.len() % 4 != 0 {
            self.bytes.push(0);
        }
    }

    /// Write a string as word count, UTF-8 bytes, NUL, zero padding.
    pub fn write_padded_string(&mut self, text: &str) {
        self.write_u32(padded_string_words(text) as u32);
        self.bytes.extend_from_slice(text.as_bytes());
        self.bytes.push(0);
        self.align4();
    }

    /// Overwrite already-written bytes starting at `offset`.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) -> CodecResult<()> {
        let target = offset
            .checked_add(bytes.len())
            .and_then(|end| self.bytes.get_mut(offset..end))
            .ok_or_else(|| {
                CodecError::Internal(format!(
                    "patch of {} bytes at {offset:#x} past end of output",
                    bytes.len()
                ))
            })?;
        target.copy_from_slice(bytes);
        Ok(())
    }

    pub fn patch_u32(&mut self, offset: usize, v: u32) -> CodecResult<()> {
        self.patch(offset, &v.to_le_bytes())
    }
}

/// Number of words a padded string occupies, excluding its count word.
pub fn padded_string_words(text: &str) -> usize {
    (text.len() + 1).div_ceil(4)
}
