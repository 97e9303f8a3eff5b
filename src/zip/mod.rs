//! ZIP header encoding and patching.
//!
//! This module turns per-entry and archive-level metadata into the exact
//! byte layout of the ZIP and Zip64 formats, including split archives.
//!
//! ## Architecture
//!
//! - [`structures`]: Signatures, constants and the fixed end records (EOCD, Zip64 EOCD, locator)
//! - [`model`]: The archive aggregate and its entries
//! - [`raw`]: Little-endian writes into already encoded bytes
//! - [`encoder`]: Local headers, central directory records and data descriptors
//! - [`trailer`]: Central directory plus end records, written as one block
//! - [`patcher`]: Backfilling CRC and sizes into written local headers
//! - [`writer`]: A session driving all of the above against a [`ZipSink`](crate::io::ZipSink)
//!
//! ## Write Order
//!
//! A ZIP file is written front to back:
//! 1. For each entry, a local file header followed by its data
//! 2. Optionally a data descriptor, when sizes were unknown and the sink cannot seek
//! 3. The Central Directory, one record per entry in the same order
//! 4. For Zip64 archives, the Zip64 EOCD record and its locator
//! 5. The End of Central Directory (EOCD) record and archive comment
//!
//! ## Zip64 Escalation
//!
//! Any size or offset at or above the configured limit is written as
//! `0xFFFFFFFF` and its real value moved into a Zip64 extra field. The first
//! escalation marks the archive as Zip64 for the rest of the session.
//!
//! ## Limitations
//!
//! - No per-entry comments
//! - No reading of existing archives

pub mod encoder;
pub mod model;
pub mod patcher;
pub mod raw;
pub mod structures;
mod trailer;
mod writer;

pub use model::{ArchiveModel, EntryHeader, SizeState, SizeWidth};
pub use patcher::{Patch, apply_patches, local_header_patches};
pub use structures::*;
pub use writer::ZipHeaderWriter;
