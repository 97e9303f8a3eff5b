//! Central directory and end-of-archive records.

use tracing::trace;

use crate::error::{Result, ZipWriteError};

use super::model::ArchiveModel;
use super::structures::*;

impl ArchiveModel {
    /// Encode everything that follows the last entry's data.
    ///
    /// `cd_offset` is where the central directory will start and `disk` the
    /// volume it lands on. The model's end records are updated to the values
    /// written. Calling again with another position re-encodes from scratch,
    /// which is what a writer does after rolling onto a fresh volume.
    pub fn encode_trailer(&mut self, cd_offset: u64, disk: u32) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let this_disk = if self.is_split_archive() { disk } else { 0 };
        self.check_disk_numbers(this_disk)?;

        let mut buf = Vec::new();
        for index in 0..self.entries.len() {
            let record = self.encode_central_entry(index)?;
            buf.extend_from_slice(&record);
        }
        let cd_size = buf.len() as u64;
        let total_entries = self.entries.len() as u64;
        let disk_entries = if self.is_split_archive() {
            self.entries_on_disk(this_disk)
        } else {
            total_entries
        };
        trace!(cd_offset, cd_size, total_entries, disk_entries, "encoded central directory");

        if total_entries >= SENTINEL_U16 as u64
            || self.options.value_needs_zip64(cd_size)
            || self.options.value_needs_zip64(cd_offset)
            || this_disk >= SENTINEL_U16 as u32
        {
            self.mark_zip64();
        }

        let eocd = &mut self.end_of_central_directory;
        eocd.disk_number = this_disk;
        eocd.disk_with_cd = this_disk;
        eocd.disk_entries = disk_entries;
        eocd.total_entries = total_entries;
        eocd.cd_size = cd_size;
        eocd.cd_offset = cd_offset;

        if self.is_zip64() {
            let (version_made_by, version_needed) = self
                .entries
                .first()
                .map_or((VERSION_ZIP64, VERSION_ZIP64), |entry| {
                    (
                        entry.version_made_by.max(VERSION_ZIP64),
                        entry.version_needed.max(VERSION_ZIP64),
                    )
                });

            let record = self.zip64_end_record.get_or_insert_with(Zip64EOCD::default);
            record.version_made_by = version_made_by;
            record.version_needed = version_needed;
            record.disk_number = this_disk;
            record.disk_with_cd = this_disk;
            record.disk_entries = disk_entries;
            record.total_entries = total_entries;
            record.cd_size = cd_size;
            record.cd_offset = cd_offset;
            buf.extend_from_slice(&record.to_bytes()?);

            let split = self.is_split_archive();
            let locator = self.zip64_locator.get_or_insert_with(Zip64EOCDLocator::default);
            locator.eocd64_offset = cd_offset + cd_size;
            if split {
                locator.disk_with_eocd64 = this_disk;
                locator.total_disks = this_disk + 1;
            } else {
                locator.disk_with_eocd64 = 0;
                locator.total_disks = 1;
            }
            buf.extend_from_slice(&locator.to_bytes()?);
        }

        let eocd = self
            .end_of_central_directory
            .to_bytes(self.options.zip64_limit)?;
        buf.extend_from_slice(&eocd);
        Ok(buf)
    }

    /// Every entry must start on a disk at or before the one holding the trailer.
    fn check_disk_numbers(&self, this_disk: u32) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|entry| entry.disk_number_start > this_disk)
        {
            Some(entry) => Err(ZipWriteError::format(format!(
                "entry {} starts on disk {} but the central directory is on disk {this_disk}",
                entry.file_name, entry.disk_number_start
            ))),
            None => Ok(()),
        }
    }
}
