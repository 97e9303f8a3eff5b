use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{Result, ZipWriteError};

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Deflate,
    /// WinZip AES; the real method lives in the AES extra field
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflate,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header (LFH) - 30 bytes
pub const LFH_SIGNATURE: &[u8] = b"PK\x03\x04";
pub const LFH_SIZE: usize = 30;

/// Distance from the start of a local header to its CRC-32 field
pub const LFH_CRC_OFFSET: u64 = 14;

/// Central Directory File Header (CDFH) - 46 bytes minimum
pub const CDFH_SIGNATURE: &[u8] = b"PK\x01\x02";
pub const CDFH_MIN_SIZE: usize = 46;

/// Data descriptor following streamed entry data
pub const DATA_DESCRIPTOR_SIGNATURE: &[u8] = b"PK\x07\x08";

/// Marker opening the first volume of a split archive
pub const SPLIT_ARCHIVE_SIGNATURE: &[u8] = b"PK\x07\x08";

/// Value written into a 32-bit field whose real value lives in a Zip64 record
pub const SENTINEL_U32: u32 = 0xFFFF_FFFF;

/// Value written into a 16-bit count or disk field that overflowed
pub const SENTINEL_U16: u16 = 0xFFFF;

/// General purpose flag bits
pub const FLAG_ENCRYPTED: u16 = 0x0001;
pub const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
pub const FLAG_UTF8: u16 = 0x0800;

/// Version needed to extract
pub const VERSION_DEFAULT: u16 = 20;
pub const VERSION_ZIP64: u16 = 45;
pub const VERSION_AES: u16 = 51;

/// Zip64 extended information extra field
pub struct Zip64ExtraField;

impl Zip64ExtraField {
    pub const HEADER_ID: u16 = 0x0001;
    /// Local variant: uncompressed and compressed size
    pub const LOCAL_DATA_SIZE: u16 = 16;
    pub const LOCAL_SIZE: usize = 20;
    /// Central variant: sizes, local header offset and disk number
    pub const CENTRAL_DATA_SIZE: u16 = 28;
    pub const CENTRAL_SIZE: usize = 32;
}

/// AES key strength codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesKeyStrength {
    Aes128,
    Aes192,
    Aes256,
}

impl AesKeyStrength {
    pub fn raw_code(&self) -> u8 {
        match self {
            AesKeyStrength::Aes128 => 1,
            AesKeyStrength::Aes192 => 2,
            AesKeyStrength::Aes256 => 3,
        }
    }
}

/// AE-x vendor version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AesVersion {
    /// AE-1, CRC is stored
    One,
    /// AE-2, CRC is zeroed
    Two,
}

impl AesVersion {
    pub fn as_u16(&self) -> u16 {
        match self {
            AesVersion::One => 1,
            AesVersion::Two => 2,
        }
    }
}

/// AES extra data record - 11 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AesExtraDataRecord {
    pub version: AesVersion,
    pub vendor_id: [u8; 2],
    pub key_strength: AesKeyStrength,
    /// Method applied before encryption
    pub compression_method: CompressionMethod,
}

impl AesExtraDataRecord {
    pub const HEADER_ID: u16 = 0x9901;
    pub const DATA_SIZE: u16 = 7;
    pub const SIZE: usize = 11;

    pub fn new(key_strength: AesKeyStrength, compression_method: CompressionMethod) -> Self {
        Self {
            version: AesVersion::Two,
            vendor_id: *b"AE",
            key_strength,
            compression_method,
        }
    }

    pub fn write_to(&self, buf: &mut Vec<u8>) -> Result<()> {
        buf.write_u16::<LittleEndian>(Self::HEADER_ID)?;
        buf.write_u16::<LittleEndian>(Self::DATA_SIZE)?;
        buf.write_u16::<LittleEndian>(self.version.as_u16())?;
        buf.extend_from_slice(&self.vendor_id);
        buf.write_u8(self.key_strength.raw_code())?;
        buf.write_u16::<LittleEndian>(self.compression_method.as_u16())?;
        Ok(())
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
///
/// Fields hold the true values; narrowing to the 16/32-bit layout happens
/// in [`to_bytes`](EndOfCentralDirectory::to_bytes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
    pub comment: Option<String>,
}

impl EndOfCentralDirectory {
    pub const SIGNATURE: &'static [u8] = b"PK\x05\x06";
    pub const SIZE: usize = 22;

    /// Encode the record, clamping values at or above `zip64_limit` to sentinels.
    pub fn to_bytes(&self, zip64_limit: u64) -> Result<Vec<u8>> {
        let comment = self.comment.as_deref().unwrap_or_default().as_bytes();
        if comment.len() > u16::MAX as usize {
            return Err(ZipWriteError::precondition(format!(
                "archive comment of {} bytes exceeds {}",
                comment.len(),
                u16::MAX
            )));
        }
        let mut buf = Vec::with_capacity(Self::SIZE + comment.len());

        buf.extend_from_slice(Self::SIGNATURE);
        buf.write_u16::<LittleEndian>(narrow_u16(self.disk_number as u64))?;
        buf.write_u16::<LittleEndian>(narrow_u16(self.disk_with_cd as u64))?;
        buf.write_u16::<LittleEndian>(narrow_u16(self.disk_entries))?;
        buf.write_u16::<LittleEndian>(narrow_u16(self.total_entries))?;
        buf.write_u32::<LittleEndian>(narrow_u32(self.cd_size, zip64_limit))?;
        buf.write_u32::<LittleEndian>(narrow_u32(self.cd_offset, zip64_limit))?;
        buf.write_u16::<LittleEndian>(comment.len() as u16)?;
        buf.extend_from_slice(comment);

        Ok(buf)
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x07";
    pub const SIZE: usize = 20;

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        buf.write_u32::<LittleEndian>(self.disk_with_eocd64)?;
        buf.write_u64::<LittleEndian>(self.eocd64_offset)?;
        buf.write_u32::<LittleEndian>(self.total_disks)?;
        Ok(buf)
    }
}

/// ZIP64 End of Central Directory - 56 bytes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Zip64EOCD {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIGNATURE: &'static [u8] = b"PK\x06\x06";
    /// Size of the record after the size field itself
    pub const RECORD_SIZE: u64 = 44;
    pub const SIZE: usize = 56;

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(Self::SIGNATURE);
        buf.write_u64::<LittleEndian>(Self::RECORD_SIZE)?;
        buf.write_u16::<LittleEndian>(self.version_made_by)?;
        buf.write_u16::<LittleEndian>(self.version_needed)?;
        buf.write_u32::<LittleEndian>(self.disk_number)?;
        buf.write_u32::<LittleEndian>(self.disk_with_cd)?;
        buf.write_u64::<LittleEndian>(self.disk_entries)?;
        buf.write_u64::<LittleEndian>(self.total_entries)?;
        buf.write_u64::<LittleEndian>(self.cd_size)?;
        buf.write_u64::<LittleEndian>(self.cd_offset)?;
        Ok(buf)
    }
}

fn narrow_u16(value: u64) -> u16 {
    if value >= SENTINEL_U16 as u64 {
        SENTINEL_U16
    } else {
        value as u16
    }
}

fn narrow_u32(value: u64, zip64_limit: u64) -> u32 {
    if value >= zip64_limit {
        SENTINEL_U32
    } else {
        value as u32
    }
}

/// Pack a calendar timestamp into the MS-DOS date (high word) and time (low word).
///
/// Years are clamped to the representable 1980..=2107 range; seconds lose
/// their lowest bit.
pub fn dos_datetime(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> u32 {
    let year = year.clamp(1980, 2107) - 1980;
    let date = (year << 9) | ((month as u16 & 0x0F) << 5) | (day as u16 & 0x1F);
    let time = ((hour as u16 & 0x1F) << 11) | ((minute as u16 & 0x3F) << 5) | ((second as u16 / 2) & 0x1F);
    ((date as u32) << 16) | time as u32
}

/// 1980-01-01 00:00:00, the earliest MS-DOS timestamp
pub const DOS_EPOCH: u32 = 0x0021_0000;
