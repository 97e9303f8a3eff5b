//! Little-endian primitives over already written bytes.
//!
//! Appending goes through [`byteorder::WriteBytesExt`] on a `Vec<u8>`.
//! [`ByteWindow`] covers the other half: overwriting fixed positions inside a
//! buffer that already holds an encoded header.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, ZipWriteError};

/// Cursor over a fixed byte slice that overwrites in place.
///
/// Every `put_*` checks the remaining room before touching the slice, so a
/// failed call leaves the bytes exactly as they were.
pub struct ByteWindow<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> ByteWindow<'a> {
    /// Open a window positioned at `offset`
    pub fn new(buf: &'a mut [u8], offset: usize) -> Result<Self> {
        if offset > buf.len() {
            return Err(ZipWriteError::format(format!(
                "window offset {offset} beyond {} bytes",
                buf.len()
            )));
        }
        Ok(Self { buf, pos: offset })
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    fn claim(&mut self, len: usize) -> Result<&mut [u8]> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                ZipWriteError::format(format!(
                    "{len}-byte field at {} overruns a {}-byte window",
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let field = &mut self.buf[self.pos..end];
        self.pos = end;
        Ok(field)
    }

    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        LittleEndian::write_u16(self.claim(2)?, value);
        Ok(())
    }

    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        LittleEndian::write_u32(self.claim(4)?, value);
        Ok(())
    }

    pub fn put_u64(&mut self, value: u64) -> Result<()> {
        LittleEndian::write_u64(self.claim(8)?, value);
        Ok(())
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.claim(bytes.len())?.copy_from_slice(bytes);
        Ok(())
    }
}
