//! In-memory model of the archive being written.

use crate::error::{Result, ZipWriteError};
use crate::options::WriterOptions;

use super::structures::*;

/// Width reserved for an entry's sizes in its local header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeWidth {
    /// Literal 32-bit size fields
    Narrow,
    /// Sentinels in the header, 64-bit values in the Zip64 extra field
    Zip64,
}

/// Where an entry's CRC and sizes stand relative to its local header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeState {
    /// Final values were known when the local header was encoded
    Known,
    /// The local header holds placeholders of the given width
    Pending(SizeWidth),
    /// Placeholders were replaced, in place or by a data descriptor
    Patched(SizeWidth),
}

/// One archive member, covering both the local and the central view
#[derive(Debug, Clone)]
pub struct EntryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    /// MS-DOS date in the high word, time in the low word
    pub last_modified: u32,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub file_name: String,
    pub external_attributes: u32,
    pub disk_number_start: u32,
    pub local_header_offset: u64,
    pub aes: Option<AesExtraDataRecord>,
    /// Sizes are not final when the local header is written
    pub streaming: bool,
    pub(crate) sizes: SizeState,
    pub(crate) local_width: Option<SizeWidth>,
}

impl EntryHeader {
    pub fn new(file_name: impl Into<String>, compression_method: CompressionMethod) -> Self {
        let file_name = file_name.into();
        let mut flags = 0;
        if !file_name.is_ascii() {
            flags |= FLAG_UTF8;
        }
        // MS-DOS directory attribute
        let external_attributes = if file_name.ends_with('/') { 0x10 } else { 0 };
        Self {
            version_made_by: VERSION_DEFAULT,
            version_needed: VERSION_DEFAULT,
            flags,
            compression_method,
            last_modified: DOS_EPOCH,
            crc32: 0,
            compressed_size: 0,
            uncompressed_size: 0,
            file_name,
            external_attributes,
            disk_number_start: 0,
            local_header_offset: 0,
            aes: None,
            streaming: false,
            sizes: SizeState::Known,
            local_width: None,
        }
    }

    pub fn with_sizes(mut self, compressed: u64, uncompressed: u64) -> Self {
        self.compressed_size = compressed;
        self.uncompressed_size = uncompressed;
        self
    }

    pub fn with_crc32(mut self, crc32: u32) -> Self {
        self.crc32 = crc32;
        self
    }

    pub fn with_last_modified(mut self, dos_datetime: u32) -> Self {
        self.last_modified = dos_datetime;
        self
    }

    pub fn with_external_attributes(mut self, attributes: u32) -> Self {
        self.external_attributes = attributes;
        self
    }

    /// Declare that CRC and sizes are only placeholders at local header time.
    ///
    /// `estimated_uncompressed` decides the width reserved for the sizes, so it
    /// must not be smaller than the real value when that can reach Zip64 range.
    pub fn streaming(mut self, estimated_uncompressed: u64) -> Self {
        self.streaming = true;
        self.crc32 = 0;
        self.compressed_size = 0;
        self.uncompressed_size = estimated_uncompressed;
        self
    }

    /// Mark the entry as AES encrypted, moving the real method into the AES record
    pub fn with_aes(mut self, key_strength: AesKeyStrength) -> Self {
        let inner = match self.compression_method {
            CompressionMethod::Aes => self
                .aes
                .as_ref()
                .map_or(CompressionMethod::Stored, |aes| aes.compression_method),
            method => method,
        };
        self.aes = Some(AesExtraDataRecord::new(key_strength, inner));
        self.compression_method = CompressionMethod::Aes;
        self.flags |= FLAG_ENCRYPTED;
        self.version_needed = self.version_needed.max(VERSION_AES);
        self.version_made_by = self.version_made_by.max(VERSION_AES);
        self
    }

    pub fn is_directory(&self) -> bool {
        self.file_name.ends_with('/')
    }

    pub fn size_state(&self) -> SizeState {
        self.sizes
    }

    /// Width the local header used, once it has been encoded
    pub fn local_width(&self) -> Option<SizeWidth> {
        self.local_width
    }

    /// Whether the local header carries a Zip64 extra field
    pub fn zip64_extra_in_local(&self) -> bool {
        self.local_width == Some(SizeWidth::Zip64)
    }

    /// Width the local header needs for the sizes currently on the entry
    pub fn required_local_width(&self, options: &WriterOptions) -> SizeWidth {
        if options.uncompressed_needs_zip64(self.uncompressed_size)
            || options.value_needs_zip64(self.compressed_size)
        {
            SizeWidth::Zip64
        } else {
            SizeWidth::Narrow
        }
    }

    /// Whether the central record needs the Zip64 extra field
    pub fn central_needs_zip64(&self, options: &WriterOptions) -> bool {
        options.uncompressed_needs_zip64(self.uncompressed_size)
            || options.value_needs_zip64(self.compressed_size)
            || options.value_needs_zip64(self.local_header_offset)
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let date = (self.last_modified >> 16) as u16;
        let day = (date & 0x1F) as u8;
        let month = ((date >> 5) & 0x0F) as u8;
        let year = ((date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let time = self.last_modified as u16;
        let second = ((time & 0x1F) * 2) as u8;
        let minute = ((time >> 5) & 0x3F) as u8;
        let hour = ((time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }

    pub(crate) fn name_len(&self) -> Result<u16> {
        u16::try_from(self.file_name.len()).map_err(|_| {
            ZipWriteError::precondition(format!(
                "file name is {} bytes, at most 65535 allowed",
                self.file_name.len()
            ))
        })
    }
}

/// Aggregate root for one archive writing session.
///
/// Entries are kept in the order their local headers were written, which is
/// also the central directory order.
#[derive(Debug)]
pub struct ArchiveModel {
    pub(crate) entries: Vec<EntryHeader>,
    pub end_of_central_directory: EndOfCentralDirectory,
    pub zip64_end_record: Option<Zip64EOCD>,
    pub zip64_locator: Option<Zip64EOCDLocator>,
    pub(crate) options: WriterOptions,
    zip64: bool,
    split_archive: bool,
    sealed: bool,
}

impl ArchiveModel {
    pub fn new(options: WriterOptions) -> Result<Self> {
        options.validate()?;
        let end_of_central_directory = EndOfCentralDirectory {
            comment: options.comment.clone(),
            ..Default::default()
        };
        Ok(Self {
            entries: Vec::new(),
            end_of_central_directory,
            zip64_end_record: None,
            zip64_locator: None,
            options,
            zip64: false,
            split_archive: false,
            sealed: false,
        })
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    pub fn entries(&self) -> &[EntryHeader] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Result<&EntryHeader> {
        self.entries
            .get(index)
            .ok_or_else(|| ZipWriteError::precondition(format!("no entry at index {index}")))
    }

    pub(crate) fn entry_mut(&mut self, index: usize) -> Result<&mut EntryHeader> {
        self.ensure_open()?;
        self.entries
            .get_mut(index)
            .ok_or_else(|| ZipWriteError::precondition(format!("no entry at index {index}")))
    }

    /// Whether any record so far needed Zip64. Never resets once set.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    pub(crate) fn mark_zip64(&mut self) {
        if !self.zip64 {
            tracing::debug!("archive escalated to zip64");
        }
        self.zip64 = true;
    }

    pub fn is_split_archive(&self) -> bool {
        self.split_archive
    }

    pub fn set_split_archive(&mut self, split: bool) {
        self.split_archive = split;
    }

    /// Whether the trailer has been written
    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.sealed {
            return Err(ZipWriteError::precondition(
                "archive is finalized, entries are immutable",
            ));
        }
        Ok(())
    }

    /// Set the archive comment written after the end of central directory record
    pub fn set_comment(&mut self, comment: Option<String>) -> Result<()> {
        self.ensure_open()?;
        if let Some(text) = &comment {
            if text.len() > u16::MAX as usize {
                return Err(ZipWriteError::precondition(format!(
                    "archive comment is {} bytes, at most 65535 allowed",
                    text.len()
                )));
            }
        }
        self.end_of_central_directory.comment = comment;
        Ok(())
    }

    /// Append an entry whose offset and disk number are already set.
    ///
    /// Offsets must grow within a disk and disk numbers must never go back.
    pub fn push_entry(&mut self, entry: EntryHeader) -> Result<usize> {
        self.ensure_open()?;
        entry.name_len()?;
        if !self.split_archive && entry.disk_number_start != 0 {
            return Err(ZipWriteError::format(format!(
                "entry {} starts on disk {} in a single-volume archive",
                entry.file_name, entry.disk_number_start
            )));
        }
        if let Some(last) = self.entries.last() {
            if entry.disk_number_start < last.disk_number_start {
                return Err(ZipWriteError::format(format!(
                    "entry {} starts on disk {} after disk {}",
                    entry.file_name, entry.disk_number_start, last.disk_number_start
                )));
            }
            if entry.disk_number_start == last.disk_number_start
                && entry.local_header_offset <= last.local_header_offset
            {
                return Err(ZipWriteError::format(format!(
                    "entry {} at offset {} does not follow offset {}",
                    entry.file_name, entry.local_header_offset, last.local_header_offset
                )));
            }
        }
        self.entries.push(entry);
        Ok(self.entries.len() - 1)
    }

    /// Drop the most recent entry, for a local header that never reached the sink
    pub(crate) fn discard_last_entry(&mut self) -> Option<EntryHeader> {
        self.entries.pop()
    }

    /// Backfill an entry's CRC and sizes once its data has been written.
    ///
    /// Entries whose sizes were known up front only accept the same values.
    pub fn record_sizes(
        &mut self,
        index: usize,
        crc32: u32,
        compressed_size: u64,
        uncompressed_size: u64,
    ) -> Result<()> {
        let entry = self.entry_mut(index)?;
        match entry.sizes {
            SizeState::Pending(_) => {
                entry.crc32 = crc32;
                entry.compressed_size = compressed_size;
                entry.uncompressed_size = uncompressed_size;
                Ok(())
            }
            SizeState::Known
                if entry.crc32 == crc32
                    && entry.compressed_size == compressed_size
                    && entry.uncompressed_size == uncompressed_size =>
            {
                Ok(())
            }
            SizeState::Known => Err(ZipWriteError::format(format!(
                "entry {} was written with final sizes that differ from the recorded ones",
                entry.file_name
            ))),
            SizeState::Patched(_) => Err(ZipWriteError::precondition(format!(
                "sizes of entry {} were already patched",
                entry.file_name
            ))),
        }
    }

    /// Width of a pending entry, checked against its now known sizes
    pub(crate) fn pending_width(&self, index: usize) -> Result<SizeWidth> {
        let entry = self.entry(index)?;
        let width = match entry.sizes {
            SizeState::Pending(width) => width,
            state => {
                return Err(ZipWriteError::precondition(format!(
                    "entry {} has no pending sizes ({state:?})",
                    entry.file_name
                )));
            }
        };
        if width == SizeWidth::Narrow && entry.required_local_width(&self.options) == SizeWidth::Zip64
        {
            return Err(ZipWriteError::format(format!(
                "entry {} grew to {} bytes but its local header only reserved 32-bit sizes",
                entry.file_name, entry.uncompressed_size
            )));
        }
        Ok(width)
    }

    pub(crate) fn mark_patched(&mut self, index: usize) -> Result<()> {
        let entry = self.entry_mut(index)?;
        if let SizeState::Pending(width) = entry.sizes {
            entry.sizes = SizeState::Patched(width);
        }
        Ok(())
    }

    /// Number of entries whose data starts on `disk`
    pub fn entries_on_disk(&self, disk: u32) -> u64 {
        self.entries
            .iter()
            .filter(|entry| entry.disk_number_start == disk)
            .count() as u64
    }
}
