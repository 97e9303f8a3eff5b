use super::ZipSink;
use crate::error::{Result, ZipWriteError};
use async_trait::async_trait;

/// In-memory sink backed by a growable buffer
#[derive(Debug)]
pub struct MemorySink {
    data: Vec<u8>,
    position: usize,
    seekable: bool,
}

impl MemorySink {
    /// Create a seekable in-memory sink
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
            seekable: true,
        }
    }

    /// Create a forward-only sink, as seen by a writer streaming to a pipe
    pub fn streaming() -> Self {
        Self {
            seekable: false,
            ..Self::new()
        }
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl Default for MemorySink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ZipSink for MemorySink {
    fn current_offset(&self) -> u64 {
        self.position as u64
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let end = self.position + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[self.position..end].copy_from_slice(buf);
        self.position = end;
        Ok(())
    }

    fn supports_seek(&self) -> bool {
        self.seekable
    }

    async fn seek(&mut self, offset: u64) -> Result<()> {
        if !self.seekable {
            return Err(ZipWriteError::precondition("streaming sink cannot seek"));
        }
        // Seeking past the end would leave a hole in a buffer meant to be contiguous
        if offset > self.data.len() as u64 {
            return Err(ZipWriteError::precondition(format!(
                "seek to {offset} beyond end of {} written bytes",
                self.data.len()
            )));
        }
        self.position = offset as usize;
        Ok(())
    }
}
