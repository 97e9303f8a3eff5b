//! Backfilling CRC and sizes into local headers that are already written.
//!
//! A patch plan is a list of `(offset, bytes)` pairs relative to the start of
//! the local header. It can be applied to an in-memory copy of the header
//! through a [`ByteWindow`] or to the sink that received it.

use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::error::{Result, ZipWriteError};
use crate::io::ZipSink;

use super::model::{ArchiveModel, EntryHeader, SizeWidth};
use super::raw::ByteWindow;
use super::structures::*;

/// Bytes to overwrite at an offset relative to the local header start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// Compute the writes that turn placeholders into the entry's real CRC and sizes.
///
/// With a narrow width CRC and both sizes are contiguous. With Zip64 the
/// header keeps its sentinels and the sizes go into the Zip64 extra field,
/// which sits right after the file name.
pub fn local_header_patches(entry: &EntryHeader, width: SizeWidth) -> Result<Vec<Patch>> {
    let mut crc = Vec::with_capacity(12);
    crc.write_u32::<LittleEndian>(entry.crc32)?;

    match width {
        SizeWidth::Narrow => {
            crc.write_u32::<LittleEndian>(entry.compressed_size as u32)?;
            crc.write_u32::<LittleEndian>(entry.uncompressed_size as u32)?;
            Ok(vec![Patch {
                offset: LFH_CRC_OFFSET,
                bytes: crc,
            }])
        }
        SizeWidth::Zip64 => {
            // fixed header, name, then the extra field's id and length
            let sizes_offset = LFH_SIZE as u64 + entry.name_len()? as u64 + 4;
            let mut sizes = Vec::with_capacity(16);
            sizes.write_u64::<LittleEndian>(entry.uncompressed_size)?;
            sizes.write_u64::<LittleEndian>(entry.compressed_size)?;
            Ok(vec![
                Patch {
                    offset: LFH_CRC_OFFSET,
                    bytes: crc,
                },
                Patch {
                    offset: sizes_offset,
                    bytes: sizes,
                },
            ])
        }
    }
}

/// Apply a patch plan to a buffer holding the local header.
///
/// Bounds are checked for the whole plan first, so either every patch lands
/// or the buffer is left untouched.
pub fn apply_patches(header: &mut [u8], patches: &[Patch]) -> Result<()> {
    for patch in patches {
        let end = patch.offset as usize + patch.bytes.len();
        if end > header.len() {
            return Err(ZipWriteError::format(format!(
                "patch ending at {end} overruns a {}-byte header",
                header.len()
            )));
        }
    }
    for patch in patches {
        ByteWindow::new(header, patch.offset as usize)?.put_bytes(&patch.bytes)?;
    }
    Ok(())
}

async fn write_patches<S: ZipSink + ?Sized>(sink: &mut S, base: u64, patches: &[Patch]) -> Result<()> {
    for patch in patches {
        sink.seek(base + patch.offset).await?;
        sink.write_all(&patch.bytes).await?;
    }
    Ok(())
}

impl ArchiveModel {
    /// Patch entry `index`'s local header in place with its recorded CRC and sizes.
    ///
    /// If the header lives on a volume that is already closed, that volume is
    /// reopened, patched and closed again. Otherwise the current volume is
    /// patched and its write position restored. Either way the current
    /// volume's position is unchanged when this returns, error or not.
    #[tracing::instrument(skip(self, sink))]
    pub async fn patch_local_header<S: ZipSink + ?Sized>(&mut self, index: usize, sink: &mut S) -> Result<()> {
        self.ensure_open()?;
        let width = self.pending_width(index)?;
        let entry = self.entry(index)?;
        let patches = local_header_patches(entry, width)?;
        let base = entry.local_header_offset;
        let disk = entry.disk_number_start;

        if !sink.supports_seek() {
            return Err(ZipWriteError::precondition(
                "sink cannot seek, a data descriptor is needed instead",
            ));
        }

        let current = sink.current_volume_index();
        if disk > current {
            return Err(ZipWriteError::format(format!(
                "entry {} claims disk {disk} while volume {current} is open",
                entry.file_name
            )));
        }

        if disk != current {
            debug!(disk, current, "patching local header on a closed volume");
            let mut volume = sink.open_volume(disk).await?;
            let written = write_patches(volume.as_mut(), base, &patches).await;
            let flushed = volume.flush().await;
            drop(volume);
            written?;
            flushed?;
        } else {
            let resume_at = sink.current_offset();
            let written = write_patches(&mut *sink, base, &patches).await;
            let restored = sink.seek(resume_at).await;
            written?;
            restored?;
        }

        self.mark_patched(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemorySink;
    use crate::options::WriterOptions;
    use crate::zip::model::SizeState;

    fn streamed(model: &mut ArchiveModel, name: &str, estimate: u64) -> usize {
        let entry = EntryHeader::new(name, CompressionMethod::Deflate).streaming(estimate);
        model.push_entry(entry).unwrap()
    }

    #[test]
    fn test_narrow_patch_matches_upfront_encoding() {
        let mut model = ArchiveModel::new(WriterOptions::default()).unwrap();
        let index = streamed(&mut model, "notes.txt", 100);
        let mut header = model.encode_local_header(index).unwrap();

        model.record_sizes(index, 0xCAFE_F00D, 60, 100).unwrap();
        let entry = model.entry(index).unwrap();
        let patches = local_header_patches(entry, SizeWidth::Narrow).unwrap();
        apply_patches(&mut header, &patches).unwrap();

        let upfront = EntryHeader::new("notes.txt", CompressionMethod::Deflate)
            .with_sizes(60, 100)
            .with_crc32(0xCAFE_F00D);
        let expected = crate::zip::encoder::encode_local_header(&upfront, SizeWidth::Narrow).unwrap();
        assert_eq!(header, expected);
    }

    #[test]
    fn test_zip64_patch_matches_upfront_encoding() {
        let options = WriterOptions::default().with_zip64_limit(1000);
        let mut model = ArchiveModel::new(options).unwrap();
        let index = streamed(&mut model, "huge.bin", 5000);
        let mut header = model.encode_local_header(index).unwrap();
        assert_eq!(header.len(), 30 + 8 + 20);

        model.record_sizes(index, 0x0BAD_CAFE, 4200, 5000).unwrap();
        let entry = model.entry(index).unwrap();
        let patches = local_header_patches(entry, SizeWidth::Zip64).unwrap();
        assert_eq!(patches[1].offset, 30 + 8 + 4);
        apply_patches(&mut header, &patches).unwrap();

        let upfront = EntryHeader::new("huge.bin", CompressionMethod::Deflate)
            .with_sizes(4200, 5000)
            .with_crc32(0x0BAD_CAFE);
        let expected = crate::zip::encoder::encode_local_header(&upfront, SizeWidth::Zip64).unwrap();
        assert_eq!(header, expected);
    }

    #[test]
    fn test_apply_is_all_or_nothing() {
        let mut header = vec![0u8; 20];
        let patches = vec![
            Patch {
                offset: 0,
                bytes: vec![1, 2, 3],
            },
            Patch {
                offset: 18,
                bytes: vec![4, 5, 6],
            },
        ];
        assert!(apply_patches(&mut header, &patches).is_err());
        assert_eq!(header, vec![0u8; 20]);
    }

    #[tokio::test]
    async fn test_patch_restores_write_position() {
        let mut model = ArchiveModel::new(WriterOptions::default()).unwrap();
        let mut sink = MemorySink::new();
        let index = streamed(&mut model, "a.txt", 0);
        let header = model.encode_local_header(index).unwrap();
        sink.write_all(&header).await.unwrap();
        sink.write_all(b"0123456789").await.unwrap();

        model.record_sizes(index, 7, 10, 10).unwrap();
        model.patch_local_header(index, &mut sink).await.unwrap();

        assert_eq!(sink.current_offset(), 45);
        let bytes = sink.as_bytes();
        assert_eq!(&bytes[14..18], &7u32.to_le_bytes());
        assert_eq!(&bytes[18..22], &10u32.to_le_bytes());
        assert_eq!(&bytes[22..26], &10u32.to_le_bytes());
        assert_eq!(&bytes[35..], b"0123456789");
        assert_eq!(
            model.entry(index).unwrap().size_state(),
            SizeState::Patched(SizeWidth::Narrow)
        );

        // second patch is refused
        assert!(model.patch_local_header(index, &mut sink).await.is_err());
    }

    #[tokio::test]
    async fn test_patch_refused_on_streaming_sink() {
        let mut model = ArchiveModel::new(WriterOptions::default()).unwrap();
        let mut sink = MemorySink::streaming();
        let index = streamed(&mut model, "a.txt", 0);
        let header = model.encode_local_header(index).unwrap();
        sink.write_all(&header).await.unwrap();
        model.record_sizes(index, 1, 1, 1).unwrap();

        let err = model.patch_local_header(index, &mut sink).await.unwrap_err();
        assert!(matches!(err, ZipWriteError::Precondition(_)));
        assert_eq!(sink.current_offset(), 35);
        assert!(matches!(
            model.entry(index).unwrap().size_state(),
            SizeState::Pending(_)
        ));
    }
}
