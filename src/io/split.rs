use super::{LocalFileSink, ZipSink};
use crate::error::{Result, ZipWriteError};
use crate::options::MIN_SPLIT_SIZE;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of a closed volume.
///
/// Volume `index` (zero based) of `archive.zip` is stored as `archive.z01`,
/// `archive.z02`, ... The volume still being written keeps the archive's own
/// name, so the last volume always ends up as `archive.zip`.
pub fn volume_path(archive: &Path, index: u32) -> PathBuf {
    let stem = archive
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    archive.with_file_name(format!("{stem}.z{:02}", index + 1))
}

/// Sink spreading an archive over fixed-capacity volume files
pub struct SplitFileSink {
    path: PathBuf,
    current: Option<LocalFileSink>,
    volume: u32,
    split_size: u64,
}

impl SplitFileSink {
    /// Start a split archive at `path` with volumes of `split_size` bytes
    pub async fn create(path: &Path, split_size: u64) -> Result<Self> {
        if split_size < MIN_SPLIT_SIZE {
            return Err(ZipWriteError::precondition(format!(
                "split size {split_size} is below the minimum of {MIN_SPLIT_SIZE} bytes"
            )));
        }
        let current = LocalFileSink::create(path).await?;
        Ok(Self {
            path: path.to_path_buf(),
            current: Some(current),
            volume: 0,
            split_size,
        })
    }

    /// Capacity of each volume
    pub fn split_size(&self) -> u64 {
        self.split_size
    }

    /// Path of the volume currently being written
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn current(&mut self) -> Result<&mut LocalFileSink> {
        self.current
            .as_mut()
            .ok_or_else(|| ZipWriteError::precondition("no volume is open"))
    }

    /// Flush and close the last volume
    pub async fn close(mut self) -> Result<()> {
        if let Some(current) = self.current.take() {
            current.close().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ZipSink for SplitFileSink {
    fn current_offset(&self) -> u64 {
        self.current.as_ref().map_or(0, |c| c.current_offset())
    }

    async fn write_all(&mut self, buf: &[u8]) -> Result<()> {
        let mut rest = buf;
        while !rest.is_empty() {
            let room = self.split_size.saturating_sub(self.current_offset());
            if room == 0 {
                self.start_next_volume().await?;
                continue;
            }
            let take = rest.len().min(room as usize);
            self.current()?.write_all(&rest[..take]).await?;
            rest = &rest[take..];
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.current()?.flush().await
    }

    fn supports_seek(&self) -> bool {
        true
    }

    async fn seek(&mut self, offset: u64) -> Result<()> {
        self.current()?.seek(offset).await
    }

    fn is_split_archive(&self) -> bool {
        true
    }

    fn current_volume_index(&self) -> u32 {
        self.volume
    }

    fn would_overflow(&self, len: u64) -> bool {
        self.current_offset().saturating_add(len) > self.split_size
    }

    async fn start_next_volume(&mut self) -> Result<u64> {
        let current = self
            .current
            .take()
            .ok_or_else(|| ZipWriteError::precondition("no volume is open"))?;
        current.close().await?;

        let closed = volume_path(&self.path, self.volume);
        tokio::fs::rename(&self.path, &closed).await?;
        debug!(volume = self.volume, path = %closed.display(), "closed split volume");

        self.current = Some(LocalFileSink::create(&self.path).await?);
        self.volume += 1;
        Ok(0)
    }

    async fn open_volume(&self, index: u32) -> Result<Box<dyn ZipSink>> {
        if index >= self.volume {
            return Err(ZipWriteError::precondition(format!(
                "volume {index} is not closed yet (current volume is {})",
                self.volume
            )));
        }
        let path = volume_path(&self.path, index);
        debug!(volume = index, path = %path.display(), "reopening closed volume");
        Ok(Box::new(LocalFileSink::open_existing(&path).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_names_are_zero_padded() {
        let base = Path::new("/tmp/out/archive.zip");
        assert_eq!(volume_path(base, 0), Path::new("/tmp/out/archive.z01"));
        assert_eq!(volume_path(base, 8), Path::new("/tmp/out/archive.z09"));
        assert_eq!(volume_path(base, 9), Path::new("/tmp/out/archive.z10"));
        assert_eq!(volume_path(base, 41), Path::new("/tmp/out/archive.z42"));
    }

    #[tokio::test]
    async fn test_writes_span_volume_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("span.zip");
        let mut sink = SplitFileSink::create(&path, MIN_SPLIT_SIZE).await.unwrap();

        let data = vec![7u8; MIN_SPLIT_SIZE as usize + 100];
        sink.write_all(&data).await.unwrap();
        assert_eq!(sink.current_volume_index(), 1);
        assert_eq!(sink.current_offset(), 100);
        assert!(sink.would_overflow(MIN_SPLIT_SIZE));
        assert!(!sink.would_overflow(10));
        sink.close().await.unwrap();

        let first = std::fs::read(volume_path(&path, 0)).unwrap();
        assert_eq!(first.len() as u64, MIN_SPLIT_SIZE);
        assert_eq!(std::fs::read(&path).unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_open_volume_rejects_current() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("open.zip");
        let sink = SplitFileSink::create(&path, MIN_SPLIT_SIZE).await.unwrap();
        assert!(sink.open_volume(0).await.is_err());
    }

    #[tokio::test]
    async fn test_rejects_small_split_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.zip");
        assert!(SplitFileSink::create(&path, 100).await.is_err());
    }
}
