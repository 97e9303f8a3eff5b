//! Local header, central directory record and data descriptor encoding.
//!
//! When an entry carries a Zip64 extra field it is always the first extra
//! record, ahead of the AES record. The patcher relies on that position to
//! find the 64-bit size slots.

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::trace;

use crate::error::Result;
use crate::options::WriterOptions;

use super::model::{ArchiveModel, EntryHeader, SizeState, SizeWidth};
use super::structures::*;

/// Total size of the extra fields a local header will carry
fn local_extra_len(entry: &EntryHeader, width: SizeWidth) -> usize {
    let mut len = 0;
    if width == SizeWidth::Zip64 {
        len += Zip64ExtraField::LOCAL_SIZE;
    }
    if entry.aes.is_some() {
        len += AesExtraDataRecord::SIZE;
    }
    len
}

/// Entries carrying a Zip64 extra field need at least version 4.5
fn escalated_version(version: u16, zip64: bool) -> u16 {
    if zip64 {
        version.max(VERSION_ZIP64)
    } else {
        version
    }
}

/// Encoded size of the entry's local header
pub fn local_header_len(entry: &EntryHeader, options: &WriterOptions) -> usize {
    let width = entry.required_local_width(options);
    LFH_SIZE + entry.file_name.len() + local_extra_len(entry, width)
}

/// Encode a local file header with sizes of the given width.
pub fn encode_local_header(entry: &EntryHeader, width: SizeWidth) -> Result<Vec<u8>> {
    let name = entry.file_name.as_bytes();
    let name_len = entry.name_len()?;
    let extra_len = local_extra_len(entry, width);
    let mut buf = Vec::with_capacity(LFH_SIZE + name.len() + extra_len);

    buf.extend_from_slice(LFH_SIGNATURE);
    buf.write_u16::<LittleEndian>(escalated_version(entry.version_needed, width == SizeWidth::Zip64))?;
    buf.write_u16::<LittleEndian>(entry.flags)?;
    buf.write_u16::<LittleEndian>(entry.compression_method.as_u16())?;
    buf.write_u32::<LittleEndian>(entry.last_modified)?;
    buf.write_u32::<LittleEndian>(entry.crc32)?;
    match width {
        SizeWidth::Zip64 => {
            buf.write_u32::<LittleEndian>(SENTINEL_U32)?;
            buf.write_u32::<LittleEndian>(SENTINEL_U32)?;
        }
        SizeWidth::Narrow => {
            buf.write_u32::<LittleEndian>(entry.compressed_size as u32)?;
            buf.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
        }
    }
    buf.write_u16::<LittleEndian>(name_len)?;
    buf.write_u16::<LittleEndian>(extra_len as u16)?;
    buf.extend_from_slice(name);

    if width == SizeWidth::Zip64 {
        buf.write_u16::<LittleEndian>(Zip64ExtraField::HEADER_ID)?;
        buf.write_u16::<LittleEndian>(Zip64ExtraField::LOCAL_DATA_SIZE)?;
        buf.write_u64::<LittleEndian>(entry.uncompressed_size)?;
        buf.write_u64::<LittleEndian>(entry.compressed_size)?;
    }
    if let Some(aes) = &entry.aes {
        aes.write_to(&mut buf)?;
    }

    Ok(buf)
}

/// Encode a central directory record.
///
/// Returns the bytes and whether the Zip64 extra field was needed.
pub fn encode_central_entry(entry: &EntryHeader, options: &WriterOptions) -> Result<(Vec<u8>, bool)> {
    let name = entry.file_name.as_bytes();
    let name_len = entry.name_len()?;
    let zip64 = entry.central_needs_zip64(options);

    let mut extra_len = 0;
    if zip64 {
        extra_len += Zip64ExtraField::CENTRAL_SIZE;
    }
    if entry.aes.is_some() {
        extra_len += AesExtraDataRecord::SIZE;
    }
    let mut buf = Vec::with_capacity(CDFH_MIN_SIZE + name.len() + extra_len);

    buf.extend_from_slice(CDFH_SIGNATURE);
    buf.write_u16::<LittleEndian>(escalated_version(entry.version_made_by, zip64))?;
    buf.write_u16::<LittleEndian>(escalated_version(entry.version_needed, zip64))?;
    buf.write_u16::<LittleEndian>(entry.flags)?;
    buf.write_u16::<LittleEndian>(entry.compression_method.as_u16())?;
    buf.write_u32::<LittleEndian>(entry.last_modified)?;
    buf.write_u32::<LittleEndian>(entry.crc32)?;
    if zip64 {
        buf.write_u32::<LittleEndian>(SENTINEL_U32)?;
        buf.write_u32::<LittleEndian>(SENTINEL_U32)?;
    } else {
        buf.write_u32::<LittleEndian>(entry.compressed_size as u32)?;
        buf.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
    }
    buf.write_u16::<LittleEndian>(name_len)?;
    buf.write_u16::<LittleEndian>(extra_len as u16)?;
    // Entry comments are not supported
    buf.write_u16::<LittleEndian>(0)?;
    buf.write_u16::<LittleEndian>(entry.disk_number_start.min(SENTINEL_U16 as u32) as u16)?;
    // Internal attributes
    buf.write_u16::<LittleEndian>(0)?;
    buf.write_u32::<LittleEndian>(entry.external_attributes)?;
    if zip64 {
        buf.write_u32::<LittleEndian>(SENTINEL_U32)?;
    } else {
        buf.write_u32::<LittleEndian>(entry.local_header_offset as u32)?;
    }
    buf.extend_from_slice(name);

    if zip64 {
        buf.write_u16::<LittleEndian>(Zip64ExtraField::HEADER_ID)?;
        buf.write_u16::<LittleEndian>(Zip64ExtraField::CENTRAL_DATA_SIZE)?;
        buf.write_u64::<LittleEndian>(entry.uncompressed_size)?;
        buf.write_u64::<LittleEndian>(entry.compressed_size)?;
        buf.write_u64::<LittleEndian>(entry.local_header_offset)?;
        buf.write_u32::<LittleEndian>(entry.disk_number_start)?;
    }
    if let Some(aes) = &entry.aes {
        aes.write_to(&mut buf)?;
    }

    Ok((buf, zip64))
}

/// Encode the data descriptor written after streamed entry data.
pub fn encode_trailing_descriptor(entry: &EntryHeader, width: SizeWidth) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(24);
    buf.extend_from_slice(DATA_DESCRIPTOR_SIGNATURE);
    buf.write_u32::<LittleEndian>(entry.crc32)?;
    match width {
        SizeWidth::Zip64 => {
            buf.write_u64::<LittleEndian>(entry.compressed_size)?;
            buf.write_u64::<LittleEndian>(entry.uncompressed_size)?;
        }
        SizeWidth::Narrow => {
            buf.write_u32::<LittleEndian>(entry.compressed_size as u32)?;
            buf.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
        }
    }
    Ok(buf)
}

impl ArchiveModel {
    /// Encode the local header of entry `index` and record the width it used.
    ///
    /// A Zip64 width marks the whole archive as Zip64.
    pub fn encode_local_header(&mut self, index: usize) -> Result<Vec<u8>> {
        let options = &self.options;
        let entry = self.entry(index)?;
        let width = entry.required_local_width(options);
        let bytes = encode_local_header(entry, width)?;

        let entry = self.entry_mut(index)?;
        entry.local_width = Some(width);
        entry.sizes = if entry.streaming {
            SizeState::Pending(width)
        } else {
            SizeState::Known
        };
        trace!(name = %entry.file_name, len = bytes.len(), ?width, "encoded local header");

        if width == SizeWidth::Zip64 {
            self.mark_zip64();
        }
        Ok(bytes)
    }

    /// Encode the central directory record of entry `index`.
    pub fn encode_central_entry(&mut self, index: usize) -> Result<Vec<u8>> {
        let (bytes, zip64) = encode_central_entry(self.entry(index)?, &self.options)?;
        if zip64 {
            self.mark_zip64();
        }
        Ok(bytes)
    }

    /// Encode the data descriptor for a pending entry and mark its sizes patched.
    pub fn encode_trailing_descriptor(&mut self, index: usize) -> Result<Vec<u8>> {
        let width = self.pending_width(index)?;
        let bytes = encode_trailing_descriptor(self.entry(index)?, width)?;
        self.mark_patched(index)?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(name: &str, size: u64) -> EntryHeader {
        EntryHeader::new(name, CompressionMethod::Stored)
            .with_sizes(size, size)
            .with_crc32(0x1234_5678)
    }

    fn model() -> ArchiveModel {
        ArchiveModel::new(WriterOptions::default()).unwrap()
    }

    #[test]
    fn test_small_local_header_layout() {
        let mut model = model();
        let index = model.push_entry(stored("a.txt", 10)).unwrap();
        let bytes = model.encode_local_header(index).unwrap();

        assert_eq!(bytes.len(), 35);
        assert_eq!(&bytes[0..4], b"PK\x03\x04");
        assert_eq!(&bytes[4..6], &[20, 0]);
        assert_eq!(&bytes[8..10], &[0, 0]);
        assert_eq!(&bytes[14..18], &0x1234_5678u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &10u32.to_le_bytes());
        assert_eq!(&bytes[22..26], &10u32.to_le_bytes());
        assert_eq!(&bytes[26..28], &[5, 0]);
        assert_eq!(&bytes[28..30], &[0, 0]);
        assert_eq!(&bytes[30..], b"a.txt");
        assert!(!model.is_zip64());
        assert!(!model.entry(index).unwrap().zip64_extra_in_local());
    }

    #[test]
    fn test_local_header_escalates_at_threshold() {
        let mut model = model();
        let limit = model.options().zip64_limit;
        let index = model
            .push_entry(stored("big.bin", 0).with_sizes(limit - 7, limit))
            .unwrap();
        let bytes = model.encode_local_header(index).unwrap();

        assert_eq!(&bytes[4..6], &VERSION_ZIP64.to_le_bytes());
        assert_eq!(&bytes[18..22], &[0xFF; 4]);
        assert_eq!(&bytes[22..26], &[0xFF; 4]);
        assert_eq!(&bytes[28..30], &[20, 0]);
        assert_eq!(bytes.len(), 30 + 7 + 20);
        let extra = &bytes[37..];
        assert_eq!(&extra[0..2], &[1, 0]);
        assert_eq!(&extra[2..4], &[16, 0]);
        assert_eq!(&extra[4..12], &limit.to_le_bytes());
        assert_eq!(&extra[12..20], &(limit - 7).to_le_bytes());
        assert!(model.is_zip64());
        assert!(model.entry(index).unwrap().zip64_extra_in_local());
    }

    #[test]
    fn test_margin_triggers_escalation_early() {
        let mut model = model();
        let limit = model.options().zip64_limit;
        let index = model.push_entry(stored("edge", limit - 50)).unwrap();
        let bytes = model.encode_local_header(index).unwrap();
        assert_eq!(&bytes[18..22], &[0xFF; 4]);

        let mut model = self::model();
        let index = model.push_entry(stored("edge", limit - 51)).unwrap();
        let bytes = model.encode_local_header(index).unwrap();
        assert_eq!(&bytes[22..26], &((limit - 51) as u32).to_le_bytes());
        assert!(!model.is_zip64());
    }

    #[test]
    fn test_aes_record_follows_zip64_record() {
        let options = WriterOptions::default().with_zip64_limit(1000);
        let mut model = ArchiveModel::new(options).unwrap();
        let entry = stored("enc", 2000).with_aes(AesKeyStrength::Aes256);
        let index = model.push_entry(entry).unwrap();
        let bytes = model.encode_local_header(index).unwrap();

        assert_eq!(&bytes[8..10], &99u16.to_le_bytes());
        assert_eq!(&bytes[28..30], &31u16.to_le_bytes());
        let extra = &bytes[33..];
        assert_eq!(&extra[0..2], &[0x01, 0x00]);
        assert_eq!(&extra[20..22], &[0x01, 0x99]);
        assert_eq!(&extra[24..28], &[2, 0, b'A', b'E']);
        assert_eq!(extra[28], 3);
        assert_eq!(&extra[29..31], &[0, 0]);
    }

    #[test]
    fn test_central_entry_layout() {
        let mut model = model();
        let mut entry = stored("a.txt", 10).with_external_attributes(0x81A4_0000);
        entry.local_header_offset = 0x200;
        let index = model.push_entry(entry).unwrap();
        let bytes = model.encode_central_entry(index).unwrap();

        assert_eq!(bytes.len(), 46 + 5);
        assert_eq!(&bytes[0..4], b"PK\x01\x02");
        assert_eq!(&bytes[4..8], &[20, 0, 20, 0]);
        assert_eq!(&bytes[20..24], &10u32.to_le_bytes());
        assert_eq!(&bytes[24..28], &10u32.to_le_bytes());
        assert_eq!(&bytes[28..30], &[5, 0]);
        assert_eq!(&bytes[30..32], &[0, 0]);
        assert_eq!(&bytes[32..34], &[0, 0]);
        assert_eq!(&bytes[34..36], &[0, 0]);
        assert_eq!(&bytes[38..42], &0x81A4_0000u32.to_le_bytes());
        assert_eq!(&bytes[42..46], &0x200u32.to_le_bytes());
        assert!(!model.is_zip64());
    }

    #[test]
    fn test_central_entry_escalates_on_offset_alone() {
        let options = WriterOptions::default().with_zip64_limit(0x1000);
        let mut model = ArchiveModel::new(options).unwrap();
        let mut entry = stored("late.txt", 10);
        entry.local_header_offset = 0x2000;
        let index = model.push_entry(entry).unwrap();

        let local = model.encode_local_header(index).unwrap();
        assert_eq!(local.len(), 30 + 8);
        assert_eq!(&local[4..6], &[20, 0]);
        assert!(!model.is_zip64());

        let central = model.encode_central_entry(index).unwrap();
        assert!(model.is_zip64());
        assert_eq!(&central[4..6], &VERSION_ZIP64.to_le_bytes());
        assert_eq!(&central[6..8], &VERSION_ZIP64.to_le_bytes());
        assert_eq!(&central[20..28], &[0xFF; 8]);
        assert_eq!(&central[30..32], &32u16.to_le_bytes());
        assert_eq!(&central[42..46], &[0xFF; 4]);
        let extra = &central[54..];
        assert_eq!(extra.len(), 32);
        assert_eq!(&extra[2..4], &28u16.to_le_bytes());
        assert_eq!(&extra[4..12], &10u64.to_le_bytes());
        assert_eq!(&extra[12..20], &10u64.to_le_bytes());
        assert_eq!(&extra[20..28], &0x2000u64.to_le_bytes());
        assert_eq!(&extra[28..32], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_zip64_flag_survives_small_entries() {
        let options = WriterOptions::default().with_zip64_limit(1000);
        let mut model = ArchiveModel::new(options).unwrap();
        let big = model.push_entry(stored("big", 5000)).unwrap();
        model.encode_local_header(big).unwrap();
        let mut small = stored("small", 1);
        small.local_header_offset = 6000;
        let small = model.push_entry(small).unwrap();
        model.encode_local_header(small).unwrap();
        assert!(model.is_zip64());
    }

    #[test]
    fn test_descriptor_width_follows_local_header() {
        let options = WriterOptions::default().with_zip64_limit(1000);
        let mut model = ArchiveModel::new(options).unwrap();

        let narrow = model
            .push_entry(EntryHeader::new("n", CompressionMethod::Deflate).streaming(10))
            .unwrap();
        model.encode_local_header(narrow).unwrap();
        model.record_sizes(narrow, 0xDEAD_BEEF, 7, 9).unwrap();
        let bytes = model.encode_trailing_descriptor(narrow).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(&bytes[0..4], b"PK\x07\x08");
        assert_eq!(&bytes[4..8], &0xDEAD_BEEFu32.to_le_bytes());
        assert_eq!(&bytes[8..12], &7u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &9u32.to_le_bytes());
        assert_eq!(
            model.entry(narrow).unwrap().size_state(),
            SizeState::Patched(SizeWidth::Narrow)
        );

        let mut wide = EntryHeader::new("w", CompressionMethod::Deflate).streaming(4000);
        wide.local_header_offset = 100;
        let wide = model.push_entry(wide).unwrap();
        model.encode_local_header(wide).unwrap();
        model.record_sizes(wide, 1, 3000, 4000).unwrap();
        let bytes = model.encode_trailing_descriptor(wide).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[8..16], &3000u64.to_le_bytes());
        assert_eq!(&bytes[16..24], &4000u64.to_le_bytes());

        // pending -> patched is one-way
        assert!(model.encode_trailing_descriptor(wide).is_err());
    }

    #[test]
    fn test_descriptor_rejects_outgrown_narrow_width() {
        let options = WriterOptions::default().with_zip64_limit(1000);
        let mut model = ArchiveModel::new(options).unwrap();
        let index = model
            .push_entry(EntryHeader::new("n", CompressionMethod::Stored).streaming(0))
            .unwrap();
        model.encode_local_header(index).unwrap();
        model.record_sizes(index, 0, 5000, 5000).unwrap();
        assert!(matches!(
            model.encode_trailing_descriptor(index),
            Err(crate::error::ZipWriteError::Format(_))
        ));
    }

    #[test]
    fn test_local_header_len_matches_encoding() {
        let options = WriterOptions::default().with_zip64_limit(1000);
        let entry = stored("len.txt", 4000).with_aes(AesKeyStrength::Aes192);
        let width = entry.required_local_width(&options);
        let bytes = encode_local_header(&entry, width).unwrap();
        assert_eq!(local_header_len(&entry, &options), bytes.len());
    }
}
