use tracing::debug;

use crate::error::{Result, ZipWriteError};
use crate::io::ZipSink;
use crate::options::WriterOptions;

use super::encoder::local_header_len;
use super::model::{ArchiveModel, EntryHeader, SizeState};
use super::structures::{FLAG_DATA_DESCRIPTOR, SPLIT_ARCHIVE_SIGNATURE};

/// Header writing session over one sink.
///
/// Entries go through [`start_entry`](Self::start_entry), their data through
/// [`write_data`](Self::write_data) and their final CRC and sizes through
/// [`finish_entry`](Self::finish_entry). [`finalize`](Self::finalize) writes
/// the central directory and end records.
pub struct ZipHeaderWriter<S: ZipSink> {
    sink: S,
    model: ArchiveModel,
}

impl<S: ZipSink> ZipHeaderWriter<S> {
    /// Start a session. Split sinks get the spanning marker written first.
    pub async fn new(mut sink: S, options: WriterOptions) -> Result<Self> {
        let mut model = ArchiveModel::new(options)?;
        model.set_split_archive(sink.is_split_archive());
        if sink.is_split_archive() && sink.current_offset() == 0 && sink.current_volume_index() == 0 {
            sink.write_all(SPLIT_ARCHIVE_SIGNATURE).await?;
        }
        Ok(Self { sink, model })
    }

    pub fn model(&self) -> &ArchiveModel {
        &self.model
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink, for writers that push entry data themselves
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (S, ArchiveModel) {
        (self.sink, self.model)
    }

    /// Write an entry's local header at the sink's current position.
    ///
    /// In a split archive the header never straddles volumes: if it would not
    /// fit, the next volume is started first. Returns the entry's index.
    #[tracing::instrument(skip(self, entry), fields(name = %entry.file_name))]
    pub async fn start_entry(&mut self, mut entry: EntryHeader) -> Result<usize> {
        self.model.ensure_open()?;
        if entry.streaming && !self.sink.supports_seek() {
            entry.flags |= FLAG_DATA_DESCRIPTOR;
        }

        let len = local_header_len(&entry, self.model.options()) as u64;
        if self.sink.is_split_archive() && self.sink.would_overflow(len) {
            debug!(len, "local header does not fit, starting next volume");
            self.sink.start_next_volume().await?;
        }
        entry.local_header_offset = self.sink.current_offset();
        entry.disk_number_start = self.sink.current_volume_index();

        let index = self.model.push_entry(entry)?;
        let written = match self.model.encode_local_header(index) {
            Ok(header) => self.sink.write_all(&header).await,
            Err(err) => Err(err),
        };
        if let Err(err) = written {
            self.model.discard_last_entry();
            return Err(err);
        }
        Ok(index)
    }

    /// Write entry data (already compressed and encrypted) to the sink
    pub async fn write_data(&mut self, data: &[u8]) -> Result<()> {
        self.model.ensure_open()?;
        self.sink.write_all(data).await
    }

    /// Record an entry's real CRC and sizes once its data is written.
    ///
    /// Pending entries are patched in place when the sink can seek, otherwise
    /// a data descriptor is appended right after the data.
    #[tracing::instrument(skip(self))]
    pub async fn finish_entry(
        &mut self,
        index: usize,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Result<()> {
        self.model
            .record_sizes(index, crc32, compressed_size, uncompressed_size)?;
        if !matches!(self.model.entry(index)?.size_state(), SizeState::Pending(_)) {
            return Ok(());
        }

        if self.sink.supports_seek() {
            self.model.patch_local_header(index, &mut self.sink).await
        } else {
            let descriptor = self.model.encode_trailing_descriptor(index)?;
            self.sink.write_all(&descriptor).await
        }
    }

    /// Write the central directory, Zip64 end records and end of central directory.
    ///
    /// The trailer is never split across volumes. When it does not fit in the
    /// current volume a new one is started and the trailer re-encoded for it.
    #[tracing::instrument(skip(self))]
    pub async fn finalize(&mut self) -> Result<()> {
        self.model.ensure_open()?;
        if let Some(entry) = self
            .model
            .entries()
            .iter()
            .find(|entry| matches!(entry.size_state(), SizeState::Pending(_)))
        {
            return Err(ZipWriteError::precondition(format!(
                "entry {} still has placeholder sizes",
                entry.file_name
            )));
        }

        loop {
            let cd_offset = self.sink.current_offset();
            let disk = self.sink.current_volume_index();
            let trailer = self.model.encode_trailer(cd_offset, disk)?;
            let len = trailer.len() as u64;

            if self.sink.is_split_archive() && self.sink.would_overflow(len) {
                if cd_offset == 0 {
                    return Err(ZipWriteError::format(format!(
                        "trailer of {len} bytes does not fit in an empty volume"
                    )));
                }
                debug!(len, disk, "trailer does not fit, starting next volume");
                self.sink.start_next_volume().await?;
                continue;
            }

            self.sink.write_all(&trailer).await?;
            self.sink.flush().await?;
            self.model.seal();
            debug!(
                entries = self.model.entries().len(),
                zip64 = self.model.is_zip64(),
                "archive finalized"
            );
            return Ok(());
        }
    }
}
