use super::ZipSink;
use crate::error::Result;
use async_trait::async_trait;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};

/// Local file sink with seek support
pub struct LocalFileSink {
    file: File,
    position: u64,
}

impl LocalFileSink {
    /// Create (or truncate) the file at `path`
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path).await?;
        Ok(Self { file, position: 0 })
    }

    /// Open an existing file for in-place rewriting, cursor at the start
    pub async fn open_existing(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().write(true).open(path).await?;
        Ok(Self { file, position: 0 })
    }

    /// Flush and release the file handle
    pub async fn close(mut self) -> Result<()> {
        self.file.flush().await?;
        self.file.sync_all().await?;
        Ok(())
    }
}

#[async_trait]
impl ZipSink for LocalFileSink {
    fn current_offset(&self) -> u64 {
        self.position
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        self.file.write_all(buf).await?;
        self.position += buf.len() as u64;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }

    fn supports_seek(&self) -> bool {
        true
    }

    async fn seek(&mut self, offset: u64) -> Result<()> {
        // tokio queues writes in the background; settle them before moving the cursor
        self.file.flush().await?;
        self.position = self.file.seek(SeekFrom::Start(offset)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_seek_rewrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.zip");

        let mut sink = LocalFileSink::create(&path).await.unwrap();
        sink.write_all(b"0123456789").await.unwrap();
        sink.seek(2).await.unwrap();
        sink.write_all(b"ab").await.unwrap();
        assert_eq!(sink.current_offset(), 4);
        sink.seek(10).await.unwrap();
        sink.write_all(b"!").await.unwrap();
        sink.close().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"01ab456789!");
    }
}
