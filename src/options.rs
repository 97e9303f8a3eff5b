//! Writer configuration.

use crate::error::{Result, ZipWriteError};

/// Largest value a 32-bit size or offset field can carry before Zip64 takes over.
pub const ZIP64_LIMIT: u64 = 0xFFFF_FFFF;

/// Headroom added to the uncompressed size before comparing it to the limit.
///
/// Compressed output can outgrow its input by a few bytes (stored blocks,
/// encryption headers), so the local header escalates a little early.
pub const ZIP64_SIZE_MARGIN: u64 = 50;

/// Smallest volume a split archive may use.
pub const MIN_SPLIT_SIZE: u64 = 65_536;

/// Options controlling how headers are encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    /// Threshold at or above which sizes and offsets escalate to Zip64
    pub zip64_limit: u64,
    /// Margin added to uncompressed sizes before the threshold check
    pub size_margin: u64,
    /// Capacity of each volume when writing a split archive
    pub split_size: Option<u64>,
    /// Archive comment written after the end of central directory record
    pub comment: Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            zip64_limit: ZIP64_LIMIT,
            size_margin: ZIP64_SIZE_MARGIN,
            split_size: None,
            comment: None,
        }
    }
}

impl WriterOptions {
    /// Override the Zip64 threshold
    pub fn with_zip64_limit(mut self, limit: u64) -> Self {
        self.zip64_limit = limit;
        self
    }

    /// Override the uncompressed size margin
    pub fn with_size_margin(mut self, margin: u64) -> Self {
        self.size_margin = margin;
        self
    }

    /// Write a split archive with volumes of `size` bytes
    pub fn with_split_size(mut self, size: u64) -> Self {
        self.split_size = Some(size);
        self
    }

    /// Set the archive comment
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Check the options for values the format cannot represent.
    pub fn validate(&self) -> Result<()> {
        if self.zip64_limit == 0 || self.zip64_limit > ZIP64_LIMIT {
            return Err(ZipWriteError::precondition(format!(
                "zip64 limit must be within 1..={ZIP64_LIMIT:#x}, got {:#x}",
                self.zip64_limit
            )));
        }
        if let Some(size) = self.split_size {
            if size < MIN_SPLIT_SIZE {
                return Err(ZipWriteError::precondition(format!(
                    "split size {size} is below the minimum of {MIN_SPLIT_SIZE} bytes"
                )));
            }
        }
        if let Some(comment) = &self.comment {
            if comment.len() > u16::MAX as usize {
                return Err(ZipWriteError::precondition(format!(
                    "archive comment is {} bytes, at most 65535 allowed",
                    comment.len()
                )));
            }
        }
        Ok(())
    }

    /// True when `uncompressed` needs the Zip64 representation.
    pub(crate) fn uncompressed_needs_zip64(&self, uncompressed: u64) -> bool {
        uncompressed.saturating_add(self.size_margin) >= self.zip64_limit
    }

    /// True when a compressed size or offset needs the Zip64 representation.
    pub(crate) fn value_needs_zip64(&self, value: u64) -> bool {
        value >= self.zip64_limit
    }
}
