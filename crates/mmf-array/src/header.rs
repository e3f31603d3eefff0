//! Fixed 16-byte file header.
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Version (i32, little-endian) |
//! | 0x04   | 4    | Data type tag (i32) |
//! | 0x08   | 8    | Count (i64) |
//!
//! Capacity is not stored: it is however many whole records fit in the file
//! after the header (and after the layout's extra fields, for bit arrays).

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::data_type::DataType;
use crate::{ArrayError, Result};

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Byte offset of the count field.
pub const COUNT_OFFSET: usize = 8;

/// Version written by this crate.
pub const CURRENT_VERSION: i32 = 0;

/// Highest version this crate can read.
pub const MAX_VERSION: i32 = 0;

/// Parsed file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Format version.
    pub version: i32,
    /// Record type stored in the file.
    pub data_type: DataType,
    /// Number of valid records.
    pub count: i64,
}

impl FileHeader {
    /// Header for a new, empty file.
    pub const fn new(data_type: DataType) -> Self {
        Self {
            version: CURRENT_VERSION,
            data_type,
            count: 0,
        }
    }

    /// Serialize the header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.version.to_le_bytes());
        buf[4..8].copy_from_slice(&self.data_type.tag().to_le_bytes());
        buf[8..16].copy_from_slice(&self.count.to_le_bytes());
        buf
    }

    /// Parse a header from the first [`HEADER_SIZE`] bytes of `data`.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ArrayError::InvalidFormat(format!(
                "header needs {HEADER_SIZE} bytes, got {}",
                data.len()
            )));
        }

        let version = i32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if !(0..=MAX_VERSION).contains(&version) {
            return Err(ArrayError::InvalidFormat(format!(
                "unsupported version {version}"
            )));
        }

        let tag = i32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        let data_type = DataType::from_tag(tag)?;

        let count = read_count(data);
        if count < 0 {
            return Err(ArrayError::InvalidFormat(format!("negative count {count}")));
        }

        Ok(Self {
            version,
            data_type,
            count,
        })
    }

    /// Read just the header of a file without mapping it.
    pub fn read_from_path(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let mut buf = [0u8; HEADER_SIZE];
        file.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ArrayError::InvalidFormat(format!(
                    "{} is shorter than the {HEADER_SIZE}-byte header",
                    path.display()
                ))
            } else {
                ArrayError::Io(e)
            }
        })?;
        Self::from_bytes(&buf)
    }
}

/// Read the count field from a header region.
#[inline]
pub(crate) fn read_count(header: &[u8]) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&header[COUNT_OFFSET..COUNT_OFFSET + 8]);
    i64::from_le_bytes(buf)
}

/// Write the count field into a header region.
#[inline]
pub(crate) fn write_count(header: &mut [u8], count: i64) {
    header[COUNT_OFFSET..COUNT_OFFSET + 8].copy_from_slice(&count.to_le_bytes());
}
