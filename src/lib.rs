//! # zipwrite
//!
//! The header codec of a ZIP archive writer.
//!
//! This library serializes per-entry and archive-level metadata into the
//! exact byte layout of the ZIP and Zip64 formats, and patches already written
//! local headers once a streamed entry's CRC and sizes are known. Compression,
//! encryption and the storage itself are left to the caller: it only decides
//! what bytes go where.
//!
//! ## Features
//!
//! - Local file headers, central directory records and data descriptors
//! - Automatic ZIP64 escalation for sizes and offsets beyond 4GB
//! - In-place patching of local headers, including on closed split volumes
//! - Split (spanned) archives with `.z01`, `.z02`, ... volumes
//! - AES extra data records for WinZip AES encrypted entries
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use zipwrite::{CompressionMethod, EntryHeader, LocalFileSink, WriterOptions, ZipHeaderWriter};
//!
//! #[tokio::main]
//! async fn main() -> zipwrite::Result<()> {
//!     let sink = LocalFileSink::create(Path::new("out.zip")).await?;
//!     let mut writer = ZipHeaderWriter::new(sink, WriterOptions::default()).await?;
//!
//!     // Size not known yet: the header is patched after the data is written
//!     let entry = EntryHeader::new("hello.txt", CompressionMethod::Stored).streaming(0);
//!     let index = writer.start_entry(entry).await?;
//!     writer.write_data(b"Hello World").await?;
//!     writer.finish_entry(index, 0x4A17_B156, 11, 11).await?;
//!
//!     writer.finalize().await?;
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod io;
pub mod options;
pub mod zip;

pub use error::{Result, ZipWriteError};
pub use io::{LocalFileSink, MemorySink, SplitFileSink, ZipSink, volume_path};
pub use options::WriterOptions;
pub use crate::zip::{
    ArchiveModel, CompressionMethod, EntryHeader, SizeState, SizeWidth, ZipHeaderWriter,
};
