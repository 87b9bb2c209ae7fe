//! Seekable byte cursor with explicit endianness.
//!
//! Every font parser reads through [`ByteCursor`]. Reads past the end of the
//! source fail with [`Error::UnexpectedEof`], which callers treat as a parse
//! failure of the current font only.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// Sequential, seekable reader over an in-memory byte source.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    inner: Cursor<&'a [u8]>,
}

fn eof(_: std::io::Error) -> Error {
    Error::UnexpectedEof
}

impl<'a> ByteCursor<'a> {
    /// Create a cursor positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            inner: Cursor::new(data),
        }
    }

    /// Total length of the source.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the source is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Current position.
    pub fn tell(&self) -> usize {
        self.inner.position() as usize
    }

    /// Bytes left after the current position.
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.tell())
    }

    /// Move to an absolute position. Positions past the end are rejected.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        self.inner.set_position(pos as u64);
        Ok(())
    }

    /// Advance by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        let target = self.tell().checked_add(n).ok_or(Error::UnexpectedEof)?;
        self.seek(target)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.inner.read_u8().map_err(eof)
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.inner.read_i8().map_err(eof)
    }

    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.inner.read_u16::<BigEndian>().map_err(eof)
    }

    pub fn read_i16_be(&mut self) -> Result<i16> {
        self.inner.read_i16::<BigEndian>().map_err(eof)
    }

    /// Read a 24-bit big-endian unsigned integer.
    pub fn read_u24_be(&mut self) -> Result<u32> {
        self.inner.read_u24::<BigEndian>().map_err(eof)
    }

    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.inner.read_u32::<BigEndian>().map_err(eof)
    }

    pub fn read_i32_be(&mut self) -> Result<i32> {
        self.inner.read_i32::<BigEndian>().map_err(eof)
    }

    pub fn read_u16_le(&mut self) -> Result<u16> {
        self.inner.read_u16::<LittleEndian>().map_err(eof)
    }

    pub fn read_i16_le(&mut self) -> Result<i16> {
        self.inner.read_i16::<LittleEndian>().map_err(eof)
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.inner.read_u32::<LittleEndian>().map_err(eof)
    }

    /// Read an unsigned big-endian integer of `size` bytes (1-4), as used by
    /// CFF offset arrays.
    pub fn read_offset(&mut self, size: u8) -> Result<u32> {
        match size {
            1 => self.read_u8().map(u32::from),
            2 => self.read_u16_be().map(u32::from),
            3 => self.read_u24_be(),
            4 => self.read_u32_be(),
            _ => Err(Error::InvalidFontFile(format!("invalid offset size {}", size))),
        }
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let start = self.tell();
        let end = start.checked_add(n).ok_or(Error::UnexpectedEof)?;
        if end > self.data.len() {
            return Err(Error::UnexpectedEof);
        }
        self.inner.set_position(end as u64);
        Ok(&self.data[start..end])
    }

    /// Read `buf.len()` bytes into `buf`.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner.read_exact(buf).map_err(eof)
    }

    /// Read `n` single-byte characters (Latin-1), trimming trailing NULs.
    pub fn read_fixed_string(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        let s: String = bytes.iter().map(|&b| b as char).collect();
        Ok(s.trim_end_matches('\0').to_string())
    }

    /// Read `n` bytes of UTF-16BE text.
    pub fn read_utf16be_string(&mut self, n: usize) -> Result<String> {
        let bytes = self.read_bytes(n)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Ok(String::from_utf16_lossy(&units))
    }

    /// Read a NUL-terminated string (the terminator is consumed).
    pub fn read_cstring(&mut self) -> Result<String> {
        let mut s = String::new();
        loop {
            match self.read_u8()? {
                0 => break,
                b => s.push(b as char),
            }
        }
        Ok(s)
    }

    /// The full underlying source.
    pub fn data(&self) -> &'a [u8] {
        self.data
    }
}
