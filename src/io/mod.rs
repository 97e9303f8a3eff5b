mod local;
mod memory;
mod split;

pub use local::LocalFileSink;
pub use memory::MemorySink;
pub use split::{SplitFileSink, volume_path};

use crate::error::{Result, ZipWriteError};
use async_trait::async_trait;

/// Trait for the destination a ZIP archive is written to.
///
/// Only appending is mandatory. Seeking, split volumes and reopening of
/// closed volumes are optional capabilities; the defaults describe a plain
/// forward-only stream.
#[async_trait]
pub trait ZipSink: Send + Sync {
    /// Position the next write lands at, relative to the current volume
    fn current_offset(&self) -> u64;

    /// Write the whole buffer at the current offset
    async fn write_all(&mut self, buf: &[u8]) -> Result<()>;

    /// Flush buffered bytes to the underlying storage
    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Whether [`seek`](ZipSink::seek) is usable
    fn supports_seek(&self) -> bool {
        false
    }

    /// Move the write cursor to an absolute offset in the current volume
    async fn seek(&mut self, offset: u64) -> Result<()> {
        Err(ZipWriteError::precondition(format!(
            "sink cannot seek (requested offset {offset})"
        )))
    }

    /// Whether the sink spreads the archive over several volumes
    fn is_split_archive(&self) -> bool {
        false
    }

    /// Zero-based index of the volume currently open for writing
    fn current_volume_index(&self) -> u32 {
        0
    }

    /// Whether `len` more bytes would exceed the current volume's capacity
    fn would_overflow(&self, _len: u64) -> bool {
        false
    }

    /// Close the current volume and open the next one, returning the new offset
    async fn start_next_volume(&mut self) -> Result<u64> {
        Err(ZipWriteError::precondition("sink is not a split archive"))
    }

    /// Open an already closed volume for patching
    async fn open_volume(&self, index: u32) -> Result<Box<dyn ZipSink>> {
        Err(ZipWriteError::precondition(format!(
            "sink cannot reopen volume {index}"
        )))
    }
}
