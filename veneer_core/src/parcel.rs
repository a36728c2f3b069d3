// Copyright 2026 the Veneer Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Flat byte container for passing handles between processes.
//!
//! Values are appended in little-endian order and read back through a
//! cursor in the same order. Strings are a `u32` byte length followed by
//! UTF-8 bytes. A [`Parcel`] carries no type information of its own;
//! [`SurfaceControl::write_to_parcel`](crate::SurfaceControl::write_to_parcel)
//! prefixes its record with a tag byte so a reader can reject data that is
//! not a surface.

use crate::error::ParcelError;

/// A growable byte buffer with a read cursor.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Parcel {
    buf: Vec<u8>,
    pos: usize,
}

impl Parcel {
    /// Creates an empty parcel.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps bytes received from elsewhere, with the cursor at the start.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { buf: bytes, pos: 0 }
    }

    /// Returns the written bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the parcel and returns the written bytes.
    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Total number of bytes written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current read position.
    #[must_use]
    pub fn data_position(&self) -> usize {
        self.pos
    }

    /// Moves the read cursor, clamped to the end of the data.
    pub fn set_data_position(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    /// Bytes left to read.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Clears the contents and rewinds the cursor, keeping the allocation.
    pub fn recycle(&mut self) {
        self.buf.clear();
        self.pos = 0;
    }

    // -- Writing --

    /// Appends one byte.
    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    /// Appends a `u32`.
    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a `u64`.
    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Appends a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails with [`ParcelError::TooLong`] if the string is longer than
    /// `u32::MAX` bytes; nothing is written in that case.
    pub fn write_str(&mut self, s: &str) -> Result<(), ParcelError> {
        let len = u32::try_from(s.len()).map_err(|_| ParcelError::TooLong(s.len()))?;
        self.write_u32(len);
        self.buf.extend_from_slice(s.as_bytes());
        Ok(())
    }

    /// Appends an optional string as a presence byte and the string.
    ///
    /// # Errors
    ///
    /// Fails like [`write_str`](Self::write_str).
    pub fn write_option_str(&mut self, s: Option<&str>) -> Result<(), ParcelError> {
        match s {
            Some(s) => {
                let len = u32::try_from(s.len()).map_err(|_| ParcelError::TooLong(s.len()))?;
                self.write_u8(1);
                self.write_u32(len);
                self.buf.extend_from_slice(s.as_bytes());
            }
            None => self.write_u8(0),
        }
        Ok(())
    }

    /// Appends the written bytes of another parcel.
    pub fn append(&mut self, other: &Self) {
        self.buf.extend_from_slice(&other.buf);
    }

    // -- Reading --

    fn take(&mut self, needed: usize) -> Result<&[u8], ParcelError> {
        if self.remaining() < needed {
            return Err(ParcelError::Truncated {
                offset: self.pos,
                needed,
            });
        }
        let start = self.pos;
        self.pos += needed;
        Ok(&self.buf[start..self.pos])
    }

    /// Reads one byte.
    ///
    /// # Errors
    ///
    /// Fails with [`ParcelError::Truncated`] at the end of the data.
    pub fn read_u8(&mut self) -> Result<u8, ParcelError> {
        Ok(self.take(1)?[0])
    }

    /// Reads a `u32`.
    ///
    /// # Errors
    ///
    /// Fails with [`ParcelError::Truncated`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32, ParcelError> {
        let mut raw = [0; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    /// Reads a `u64`.
    ///
    /// # Errors
    ///
    /// Fails with [`ParcelError::Truncated`] if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64, ParcelError> {
        let mut raw = [0; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails if the data is truncated or not UTF-8.
    pub fn read_str(&mut self) -> Result<String, ParcelError> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?.to_vec();
        String::from_utf8(bytes).map_err(|_| ParcelError::BadUtf8)
    }

    /// Reads a string written by [`write_option_str`](Self::write_option_str).
    ///
    /// # Errors
    ///
    /// Fails if the data is truncated, not UTF-8, or the presence byte is
    /// neither 0 nor 1.
    pub fn read_option_str(&mut self) -> Result<Option<String>, ParcelError> {
        match self.read_u8()? {
            0 => Ok(None),
            1 => self.read_str().map(Some),
            tag => Err(ParcelError::BadTag(tag)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_read_back_in_order() {
        let mut p = Parcel::new();
        p.write_u8(7);
        p.write_u32(0xdead_beef);
        p.write_u64(u64::MAX - 1);
        p.write_str("nav-bar").unwrap();
        p.write_option_str(None).unwrap();
        p.write_option_str(Some("wm")).unwrap();

        assert_eq!(p.read_u8(), Ok(7));
        assert_eq!(p.read_u32(), Ok(0xdead_beef));
        assert_eq!(p.read_u64(), Ok(u64::MAX - 1));
        assert_eq!(p.read_str().as_deref(), Ok("nav-bar"));
        assert_eq!(p.read_option_str(), Ok(None));
        assert_eq!(p.read_option_str(), Ok(Some("wm".to_owned())));
        assert_eq!(p.remaining(), 0);
    }

    #[test]
    fn encoding_is_little_endian() {
        let mut p = Parcel::new();
        p.write_u32(0x0102_0304);
        p.write_str("ab").unwrap();
        assert_eq!(p.as_bytes(), &[4, 3, 2, 1, 2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn truncated_read_reports_offset() {
        let mut p = Parcel::from_bytes(vec![1, 2, 3]);
        assert_eq!(p.read_u8(), Ok(1));
        assert_eq!(
            p.read_u32(),
            Err(ParcelError::Truncated {
                offset: 1,
                needed: 4
            })
        );
        // A failed read leaves the cursor alone.
        assert_eq!(p.data_position(), 1);
    }

    #[test]
    fn string_length_past_end_is_truncated() {
        let mut p = Parcel::new();
        p.write_u32(100);
        p.write_u8(b'x');
        assert!(matches!(
            p.read_str(),
            Err(ParcelError::Truncated { needed: 100, .. })
        ));
    }

    #[test]
    fn invalid_utf8_is_rejected() {
        let mut p = Parcel::new();
        p.write_u32(2);
        p.write_u8(0xff);
        p.write_u8(0xfe);
        assert_eq!(p.read_str(), Err(ParcelError::BadUtf8));
    }

    #[test]
    fn recycle_and_rewind() {
        let mut p = Parcel::new();
        p.write_u64(42);
        assert_eq!(p.read_u64(), Ok(42));
        p.set_data_position(0);
        assert_eq!(p.read_u64(), Ok(42));
        p.set_data_position(1_000);
        assert_eq!(p.data_position(), 8);

        p.recycle();
        assert!(p.is_empty());
        assert_eq!(p.data_position(), 0);
    }
}
