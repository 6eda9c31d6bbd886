//! Low-level byte stream parser for module image decoding.
//!
//! This module provides the [`crate::image::parser::Parser`] type, a cursor-based binary
//! data reader used to decode the module image container format. It offers bounds-checked
//! access to binary data so that truncated or corrupted images surface as
//! [`crate::Error::Malformed`] instead of panics or buffer overruns.
//!
//! # Examples
//!
//! ```rust
//! use dynload::image::parser::Parser;
//!
//! let data = [0x01, 0x02, 0x03, 0x04];
//! let mut parser = Parser::new(&data);
//!
//! let value = parser.read_u32()?;
//! assert_eq!(value, 0x0403_0201);
//! assert!(!parser.has_more_data());
//! # Ok::<(), dynload::Error>(())
//! ```

use crate::Result;

/// A cursor-based reader for the module image container format.
///
/// `Parser` maintains an internal position and validates every read against the
/// remaining data, so malformed input is reported as a typed error rather than
/// causing a panic. All multi-byte integers are little-endian, and strings are
/// `u16` length-prefixed UTF-8.
///
/// # Examples
///
/// ```rust
/// use dynload::image::parser::Parser;
///
/// // A length-prefixed string: 5 bytes, "hello"
/// let data = [0x05, 0x00, b'h', b'e', b'l', b'l', b'o'];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_str()?, "hello");
/// # Ok::<(), dynload::Error>(())
/// ```
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] over a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the current position within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Take `len` bytes starting at the current position, advancing past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .ok_or_else(|| malformed_error!("length overflow at offset {}", self.position))?;
        if end > self.data.len() {
            return Err(malformed_error!(
                "unexpected end of image - need {} byte(s) at offset {}, {} available",
                len,
                self.position,
                self.data.len() - self.position
            ));
        }

        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a single byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if no data remains.
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Read a little-endian `u16`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    /// Read a little-endian `u32`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a `u16` length-prefixed UTF-8 string.
    ///
    /// On failure the position is restored to where it was before the length
    /// prefix, like every other failed read.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the prefix points past the end of the
    /// data or the bytes are not valid UTF-8.
    pub fn read_str(&mut self) -> Result<String> {
        let start = self.position;
        let len = self.read_u16()? as usize;
        let offset = self.position;
        let bytes = match self.read_bytes(len) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.position = start;
                return Err(err);
            }
        };
        match std::str::from_utf8(bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(_) => {
                self.position = start;
                Err(malformed_error!(
                    "string at offset {} is not valid UTF-8",
                    offset
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn read_integers_little_endian() {
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07];
        let mut parser = Parser::new(&data);

        assert_eq!(parser.read_u32().unwrap(), 0x0403_0201);
        assert_eq!(parser.read_u16().unwrap(), 0x0605);
        assert_eq!(parser.read_u8().unwrap(), 0x07);
        assert!(!parser.has_more_data());
    }

    #[test]
    fn read_str_roundtrip() {
        let mut data = vec![0x03, 0x00];
        data.extend_from_slice(b"abc");
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_str().unwrap(), "abc");
    }

    #[test]
    fn read_str_rejects_invalid_utf8() {
        let data = [0x02, 0x00, 0xFF, 0xFE];
        let mut parser = Parser::new(&data);
        assert!(matches!(parser.read_str(), Err(Error::Malformed { .. })));
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn failed_str_read_leaves_position() {
        // Prefix claims 5 bytes, only 1 follows
        let data = [0x05, 0x00, b'a'];
        let mut parser = Parser::new(&data);
        assert!(matches!(parser.read_str(), Err(Error::Malformed { .. })));
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn truncated_read_is_malformed() {
        let data = [0x01, 0x02];
        let mut parser = Parser::new(&data);
        assert!(matches!(parser.read_u32(), Err(Error::Malformed { .. })));
        // Position is unchanged after a failed read
        assert_eq!(parser.pos(), 0);
    }

    #[test]
    fn empty_parser() {
        let parser = Parser::new(&[]);
        assert!(parser.is_empty());
        assert_eq!(parser.len(), 0);
        assert!(!parser.has_more_data());
    }
}
