//! Bounds-checked sequential reader over a borrowed byte buffer.
//!
//! Every read returns a slice of the underlying buffer (no copying) and
//! advances the offset. A read that would run past the end fails with
//! [`ParseError::OutOfBounds`] and leaves the offset untouched.

use crate::error::ParseError;

/// Sequential decoder over a fixed byte buffer.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! fixed_readers {
    ($($le:ident, $be:ident => $ty:ty;)*) => {
        $(
            #[doc = concat!("Read a little-endian `", stringify!($ty), "`.")]
            pub fn $le(&mut self) -> Result<$ty, ParseError> {
                Ok(<$ty>::from_le_bytes(self.read_array()?))
            }

            #[doc = concat!("Read a big-endian `", stringify!($ty), "`.")]
            pub fn $be(&mut self) -> Result<$ty, ParseError> {
                Ok(<$ty>::from_be_bytes(self.read_array()?))
            }
        )*
    };
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current read offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// True once every byte has been consumed.
    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// The whole underlying buffer.
    pub fn buffer(&self) -> &'a [u8] {
        self.data
    }

    /// Return the next `n` bytes and advance past them.
    pub fn read(&mut self, n: usize) -> Result<&'a [u8], ParseError> {
        if n > self.remaining() {
            return Err(ParseError::OutOfBounds {
                needed: n,
                remaining: self.remaining(),
            });
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    /// Read exactly `N` bytes into an owned array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ParseError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read(N)?);
        Ok(out)
    }

    /// Advance to just past the next occurrence of `pattern`.
    ///
    /// Returns the number of bytes skipped before the match. The offset is
    /// unchanged if the pattern does not occur.
    pub fn search(&mut self, pattern: &[u8]) -> Result<usize, ParseError> {
        if pattern.is_empty() {
            return Ok(0);
        }
        let rest = &self.data[self.pos..];
        let skipped = rest
            .windows(pattern.len())
            .position(|w| w == pattern)
            .ok_or(ParseError::NotFound)?;
        self.pos += skipped + pattern.len();
        Ok(skipped)
    }

    /// Single-byte form of [`search`](Self::search).
    pub fn search_byte(&mut self, needle: u8) -> Result<usize, ParseError> {
        self.search(&[needle])
    }

    /// Like [`search`](Self::search), but returns the bytes skipped over.
    pub fn scan(&mut self, pattern: &[u8]) -> Result<&'a [u8], ParseError> {
        let start = self.pos;
        let skipped = self.search(pattern)?;
        Ok(&self.data[start..start + skipped])
    }

    pub fn read_u8(&mut self) -> Result<u8, ParseError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, ParseError> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    fixed_readers! {
        read_u16_le, read_u16_be => u16;
        read_u32_le, read_u32_be => u32;
        read_u64_le, read_u64_be => u64;
        read_i16_le, read_i16_be => i16;
        read_i32_le, read_i32_be => i32;
        read_i64_le, read_i64_be => i64;
    }
}
