//! On-disk data type tags.
//!
//! The tag is stored as a little-endian `i32` at offset 4 of every file.
//! Tag values are fixed by existing files and must never be renumbered.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ArrayError, Result};

/// Record type stored in a file.
///
/// The packed integer tags carry an `AsInt64` suffix because their values
/// are handled as `i64` once read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(i32)]
pub enum DataType {
    /// Caller-defined struct; width is not recorded in the file.
    AnyStruct = 0,
    /// Bit array layout.
    Bit = 1,
    /// `i8`.
    SByte = 2,
    /// `u8`.
    Byte = 3,
    /// `i16`.
    Int16 = 4,
    /// `u16`.
    UInt16 = 5,
    /// `i32`.
    Int32 = 6,
    /// `u32`.
    UInt32 = 7,
    /// `i64`.
    Int64 = 8,
    /// `u64`.
    UInt64 = 9,
    /// `f32`.
    Single = 10,
    /// `f64`.
    Double = 11,
    /// `i64` ticks of 100ns since 0001-01-01.
    DateTime = 12,
    /// `i32` seconds since the Unix epoch.
    UnixSeconds = 13,
    /// Signed 24-bit integer in 3 bytes.
    Int24AsInt64 = 14,
    /// Signed 40-bit integer in 5 bytes.
    Int40AsInt64 = 15,
    /// Signed 48-bit integer in 6 bytes.
    Int48AsInt64 = 16,
    /// Signed 56-bit integer in 7 bytes.
    Int56AsInt64 = 17,
    /// Unsigned 24-bit integer in 3 bytes.
    UInt24AsInt64 = 18,
    /// Unsigned 40-bit integer in 5 bytes.
    UInt40AsInt64 = 19,
    /// Unsigned 48-bit integer in 6 bytes.
    UInt48AsInt64 = 20,
    /// Unsigned 56-bit integer in 7 bytes.
    UInt56AsInt64 = 21,
}

impl DataType {
    /// Every known tag, in tag order.
    pub const ALL: [Self; 22] = [
        Self::AnyStruct,
        Self::Bit,
        Self::SByte,
        Self::Byte,
        Self::Int16,
        Self::UInt16,
        Self::Int32,
        Self::UInt32,
        Self::Int64,
        Self::UInt64,
        Self::Single,
        Self::Double,
        Self::DateTime,
        Self::UnixSeconds,
        Self::Int24AsInt64,
        Self::Int40AsInt64,
        Self::Int48AsInt64,
        Self::Int56AsInt64,
        Self::UInt24AsInt64,
        Self::UInt40AsInt64,
        Self::UInt48AsInt64,
        Self::UInt56AsInt64,
    ];

    /// Odd-width tags, in tag order.
    pub const ODD_WIDTH: [Self; 8] = [
        Self::Int24AsInt64,
        Self::Int40AsInt64,
        Self::Int48AsInt64,
        Self::Int56AsInt64,
        Self::UInt24AsInt64,
        Self::UInt40AsInt64,
        Self::UInt48AsInt64,
        Self::UInt56AsInt64,
    ];

    /// Parse an on-disk tag.
    pub fn from_tag(tag: i32) -> Result<Self> {
        usize::try_from(tag)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or_else(|| ArrayError::InvalidFormat(format!("unknown data type tag {tag}")))
    }

    /// On-disk tag value.
    pub const fn tag(self) -> i32 {
        self as i32
    }

    /// Element width in bytes, `None` for layouts without a fixed byte width.
    pub const fn element_width(self) -> Option<usize> {
        match self {
            Self::AnyStruct | Self::Bit => None,
            Self::SByte | Self::Byte => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int24AsInt64 | Self::UInt24AsInt64 => Some(3),
            Self::Int32 | Self::UInt32 | Self::Single | Self::UnixSeconds => Some(4),
            Self::Int40AsInt64 | Self::UInt40AsInt64 => Some(5),
            Self::Int48AsInt64 | Self::UInt48AsInt64 => Some(6),
            Self::Int56AsInt64 | Self::UInt56AsInt64 => Some(7),
            Self::Int64 | Self::UInt64 | Self::Double | Self::DateTime => Some(8),
        }
    }

    /// Whether the tag is one of the packed 24/40/48/56-bit widths.
    pub const fn is_odd_width(self) -> bool {
        matches!(
            self,
            Self::Int24AsInt64
                | Self::Int40AsInt64
                | Self::Int48AsInt64
                | Self::Int56AsInt64
                | Self::UInt24AsInt64
                | Self::UInt40AsInt64
                | Self::UInt48AsInt64
                | Self::UInt56AsInt64
        )
    }

    /// Standard width an odd-width tag migrates to.
    ///
    /// 24-bit values go to 32-bit, everything wider goes to 64-bit, keeping
    /// signedness.
    pub const fn migration_target(self) -> Option<Self> {
        match self {
            Self::Int24AsInt64 => Some(Self::Int32),
            Self::UInt24AsInt64 => Some(Self::UInt32),
            Self::Int40AsInt64 | Self::Int48AsInt64 | Self::Int56AsInt64 => Some(Self::Int64),
            Self::UInt40AsInt64 | Self::UInt48AsInt64 | Self::UInt56AsInt64 => {
                Some(Self::UInt64)
            }
            _ => None,
        }
    }

    /// Name used in listings and reports.
    pub const fn name(self) -> &'static str {
        match self {
            Self::AnyStruct => "AnyStruct",
            Self::Bit => "Bit",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Single => "Single",
            Self::Double => "Double",
            Self::DateTime => "DateTime",
            Self::UnixSeconds => "UnixSeconds",
            Self::Int24AsInt64 => "Int24AsInt64",
            Self::Int40AsInt64 => "Int40AsInt64",
            Self::Int48AsInt64 => "Int48AsInt64",
            Self::Int56AsInt64 => "Int56AsInt64",
            Self::UInt24AsInt64 => "UInt24AsInt64",
            Self::UInt40AsInt64 => "UInt40AsInt64",
            Self::UInt48AsInt64 => "UInt48AsInt64",
            Self::UInt56AsInt64 => "UInt56AsInt64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<i32> for DataType {
    type Error = ArrayError;

    fn try_from(tag: i32) -> Result<Self> {
        Self::from_tag(tag)
    }
}
