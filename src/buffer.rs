//! Growable byte buffer with varint and length-prefixed string codecs
//!
//! Writes always append; reads advance a separate cursor. Varints are
//! little-endian base-128: seven payload bits per byte, with the high bit
//! set on every byte except the last.
//!
//! ```
//! use diskindex::buffer::Buffer;
//!
//! let mut b = Buffer::new();
//! b.put_varint(300);
//! b.put_string(b"name");
//!
//! let mut r = Buffer::from_vec(b.into_inner());
//! assert_eq!(r.get_varint().unwrap(), 300);
//! assert_eq!(r.get_string().unwrap(), b"name");
//! assert!(r.is_exhausted());
//! ```

use crate::error::BufferError;

/// Longest possible encoding of a u64
pub const MAX_VARINT_LEN: usize = 10;

/// Append-only byte buffer with a read cursor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    data: Vec<u8>,
    pos: usize,
}

impl Buffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Wrap existing bytes for decoding, cursor at the start
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Append a varint
    pub fn put_varint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.data.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.data.push(value as u8);
    }

    /// Decode a varint at the cursor
    pub fn get_varint(&mut self) -> Result<u64, BufferError> {
        let start = self.pos;
        let mut value = 0u64;
        let mut shift = 0u32;

        loop {
            let Some(&byte) = self.data.get(self.pos) else {
                // Rewind so a failed decode leaves the cursor untouched
                self.pos = start;
                return Err(BufferError::Truncated {
                    needed: 1,
                    remaining: 0,
                });
            };

            let payload = u64::from(byte & 0x7f);
            if shift > 63 || (shift == 63 && payload > 1) {
                self.pos = start;
                return Err(BufferError::Overflow { offset: start });
            }

            value |= payload << shift;
            self.pos += 1;

            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    /// Append a varint length followed by the raw bytes
    pub fn put_string(&mut self, bytes: &[u8]) {
        self.put_varint(bytes.len() as u64);
        self.data.extend_from_slice(bytes);
    }

    /// Decode a length-prefixed byte string at the cursor
    pub fn get_string(&mut self) -> Result<Vec<u8>, BufferError> {
        let start = self.pos;
        let declared = self.get_varint()?;
        let remaining = self.remaining();

        let len = match usize::try_from(declared) {
            Ok(len) if len <= remaining => len,
            _ => {
                self.pos = start;
                return Err(BufferError::Truncated {
                    needed: usize::try_from(declared).unwrap_or(usize::MAX),
                    remaining,
                });
            }
        };

        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }

    /// Append raw bytes without a length prefix
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Bytes not yet consumed by the cursor
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once the cursor has consumed every byte
    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Total encoded length
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Take ownership of the encoded bytes
    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}
