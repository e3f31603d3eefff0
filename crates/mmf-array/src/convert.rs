//! Width conversion engine.
//!
//! Converts between every supported storage width and the canonical `i64`.
//! The conversion kind of a record type is an associated constant, so bulk
//! calls dispatch once and then run a tight loop over the whole range:
//!
//! - `Int64` storage is copied straight into the destination.
//! - Native narrower widths are viewed in place through `zerocopy` and
//!   widened with `From`.
//! - Packed widths are sign- or zero-extended from their raw bytes.
//!
//! Narrowing never truncates: a value outside the target range fails with
//! [`ArrayError::OutOfRange`].

use serde::{Deserialize, Serialize};
use zerocopy::{FromBytes, IntoBytes};

use crate::data_type::DataType;
use crate::record::Record;
use crate::record::packed::{load_le, sign_extend};
use crate::{ArrayError, Result};

/// How a storage type converts to and from `i64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConversionKind {
    /// `i64`, copied as-is.
    Int64,
    /// `i32`.
    Int32,
    /// `u32`.
    UInt32,
    /// `i16`.
    Int16,
    /// `u16`.
    UInt16,
    /// `i8`.
    Int8,
    /// `u8`.
    UInt8,
    /// Packed signed 24-bit.
    Int24,
    /// Packed unsigned 24-bit.
    UInt24,
    /// Packed signed 40-bit.
    Int40,
    /// Packed unsigned 40-bit.
    UInt40,
    /// Packed signed 48-bit.
    Int48,
    /// Packed unsigned 48-bit.
    UInt48,
    /// Packed signed 56-bit.
    Int56,
    /// Packed unsigned 56-bit.
    UInt56,
    /// No lossless `i64` mapping (floats, `u64`, structs).
    Unsupported,
}

impl ConversionKind {
    /// Conversion kind for a header tag.
    ///
    /// `DateTime` ticks and `UnixSeconds` are plain integers on disk and
    /// convert like `Int64` and `Int32`.
    pub const fn for_data_type(data_type: DataType) -> Self {
        match data_type {
            DataType::SByte => Self::Int8,
            DataType::Byte => Self::UInt8,
            DataType::Int16 => Self::Int16,
            DataType::UInt16 => Self::UInt16,
            DataType::Int32 | DataType::UnixSeconds => Self::Int32,
            DataType::UInt32 => Self::UInt32,
            DataType::Int64 | DataType::DateTime => Self::Int64,
            DataType::Int24AsInt64 => Self::Int24,
            DataType::UInt24AsInt64 => Self::UInt24,
            DataType::Int40AsInt64 => Self::Int40,
            DataType::UInt40AsInt64 => Self::UInt40,
            DataType::Int48AsInt64 => Self::Int48,
            DataType::UInt48AsInt64 => Self::UInt48,
            DataType::Int56AsInt64 => Self::Int56,
            DataType::UInt56AsInt64 => Self::UInt56,
            DataType::AnyStruct
            | DataType::Bit
            | DataType::UInt64
            | DataType::Single
            | DataType::Double => Self::Unsupported,
        }
    }

    /// Stored width in bytes.
    pub const fn width(self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int24 | Self::UInt24 => Some(3),
            Self::Int32 | Self::UInt32 => Some(4),
            Self::Int40 | Self::UInt40 => Some(5),
            Self::Int48 | Self::UInt48 => Some(6),
            Self::Int56 | Self::UInt56 => Some(7),
            Self::Int64 => Some(8),
            Self::Unsupported => None,
        }
    }

    /// Whether the stored value is signed.
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int24
                | Self::Int32
                | Self::Int40
                | Self::Int48
                | Self::Int56
                | Self::Int64
        )
    }

    /// Whether the width is one of the packed odd widths.
    pub const fn is_packed(self) -> bool {
        matches!(
            self,
            Self::Int24
                | Self::UInt24
                | Self::Int40
                | Self::UInt40
                | Self::Int48
                | Self::UInt48
                | Self::Int56
                | Self::UInt56
        )
    }

    /// Inclusive `(min, max)` range representable by the storage width.
    pub const fn bounds(self) -> Option<(i64, i64)> {
        let Some(width) = self.width() else {
            return None;
        };
        if matches!(self, Self::Int64) {
            return Some((i64::MIN, i64::MAX));
        }
        let bits = (width * 8) as u32;
        if self.is_signed() {
            Some((-(1i64 << (bits - 1)), (1i64 << (bits - 1)) - 1))
        } else {
            Some((0, (1i64 << bits) - 1))
        }
    }

    /// Check that `value` fits the storage width.
    pub fn check(self, value: i64) -> Result<()> {
        let (min, max) = self.require_bounds()?;
        if value < min || value > max {
            return Err(ArrayError::OutOfRange(format!(
                "{value} outside {self:?} range {min}..={max}"
            )));
        }
        Ok(())
    }

    fn require_bounds(self) -> Result<(i64, i64)> {
        self.bounds().ok_or_else(|| {
            ArrayError::Unsupported("record type has no i64 conversion".to_string())
        })
    }
}

/// Registry lookup used by header-driven code that has no record type.
pub const fn kind_for(data_type: DataType) -> ConversionKind {
    ConversionKind::for_data_type(data_type)
}

/// Widen a single record to `i64`.
pub fn to_i64<T: Record>(value: T) -> Result<i64> {
    let mut out = [0i64; 1];
    copy_range_to_i64(std::slice::from_ref(&value), &mut out)?;
    Ok(out[0])
}

/// Narrow an `i64` into a record, failing if it does not fit.
pub fn from_i64<T: Record>(value: i64) -> Result<T> {
    let kind = T::KIND;
    kind.check(value)?;
    Ok(T::decode(&value.to_le_bytes()))
}

/// Widen every record of `source` into the front of `destination`.
///
/// `destination` must hold at least `source.len()` values.
pub fn copy_range_to_i64<T: Record>(source: &[T], destination: &mut [i64]) -> Result<()> {
    if destination.len() < source.len() {
        return Err(ArrayError::OutOfRange(format!(
            "destination holds {} values, source has {}",
            destination.len(),
            source.len()
        )));
    }
    let destination = &mut destination[..source.len()];

    if T::ZERO_COPY {
        return widen_le_bytes(T::KIND, source.as_bytes(), destination);
    }

    // In-memory layout differs from storage; encode each value first.
    let kind = T::KIND;
    kind.require_bounds()?;
    let mut buf = [0u8; 8];
    for (dst, value) in destination.iter_mut().zip(source) {
        value.encode(&mut buf);
        widen_le_bytes(kind, &buf[..T::WIDTH], std::slice::from_mut(dst))?;
    }
    Ok(())
}

/// Narrow every value of `source` into the front of `destination`.
///
/// Stops at the first value that does not fit; earlier slots are already
/// written at that point.
pub fn copy_range_from_i64<T: Record>(source: &[i64], destination: &mut [T]) -> Result<()> {
    if destination.len() < source.len() {
        return Err(ArrayError::OutOfRange(format!(
            "destination holds {} records, source has {}",
            destination.len(),
            source.len()
        )));
    }
    let (min, max) = T::KIND.require_bounds()?;
    for (index, (dst, &value)) in destination.iter_mut().zip(source).enumerate() {
        if value < min || value > max {
            return Err(ArrayError::OutOfRange(format!(
                "value {value} at {index} outside {:?} range {min}..={max}",
                T::KIND
            )));
        }
        *dst = T::decode(&value.to_le_bytes());
    }
    Ok(())
}

/// Widen raw little-endian storage bytes of the given kind.
///
/// `bytes` must be a whole number of records; `destination` receives one
/// value per record and must be large enough.
pub fn widen_le_bytes(kind: ConversionKind, bytes: &[u8], destination: &mut [i64]) -> Result<()> {
    let (width, widen): (usize, WidenFn) = match kind {
        ConversionKind::Int64 => (8, widen_int64),
        ConversionKind::Int32 => (4, widen_native::<i32>),
        ConversionKind::UInt32 => (4, widen_native::<u32>),
        ConversionKind::Int16 => (2, widen_native::<i16>),
        ConversionKind::UInt16 => (2, widen_native::<u16>),
        ConversionKind::Int8 => (1, widen_native::<i8>),
        ConversionKind::UInt8 => (1, widen_native::<u8>),
        ConversionKind::Int24 => (3, widen_signed::<3>),
        ConversionKind::UInt24 => (3, widen_unsigned::<3>),
        ConversionKind::Int40 => (5, widen_signed::<5>),
        ConversionKind::UInt40 => (5, widen_unsigned::<5>),
        ConversionKind::Int48 => (6, widen_signed::<6>),
        ConversionKind::UInt48 => (6, widen_unsigned::<6>),
        ConversionKind::Int56 => (7, widen_signed::<7>),
        ConversionKind::UInt56 => (7, widen_unsigned::<7>),
        ConversionKind::Unsupported => {
            return Err(ArrayError::Unsupported(format!(
                "{kind:?} storage has no i64 conversion"
            )));
        }
    };
    if bytes.len() % width != 0 {
        return Err(ArrayError::OutOfRange(format!(
            "{} bytes is not a whole number of {width}-byte records",
            bytes.len()
        )));
    }
    let count = bytes.len() / width;
    if destination.len() < count {
        return Err(ArrayError::OutOfRange(format!(
            "destination holds {} values, source has {count}",
            destination.len()
        )));
    }
    widen(bytes, &mut destination[..count]);
    Ok(())
}

/// Widens whole records of `bytes` into `destination`, one value each.
type WidenFn = fn(&[u8], &mut [i64]);

fn widen_int64(bytes: &[u8], destination: &mut [i64]) {
    if cfg!(target_endian = "little")
        && let Ok(values) = <[i64]>::ref_from_bytes(bytes)
    {
        destination.copy_from_slice(values);
        return;
    }
    widen_decoded::<i64>(bytes, destination);
}

fn widen_signed<const N: usize>(bytes: &[u8], destination: &mut [i64]) {
    let bits = (N * 8) as u32;
    for (dst, chunk) in destination.iter_mut().zip(bytes.chunks_exact(N)) {
        *dst = sign_extend(load_le(chunk), bits);
    }
}

fn widen_unsigned<const N: usize>(bytes: &[u8], destination: &mut [i64]) {
    for (dst, chunk) in destination.iter_mut().zip(bytes.chunks_exact(N)) {
        *dst = load_le(chunk) as i64;
    }
}

fn widen_native<N>(bytes: &[u8], destination: &mut [i64])
where
    N: Record + Into<i64>,
{
    if N::ZERO_COPY
        && let Ok(values) = <[N]>::ref_from_bytes(bytes)
    {
        for (dst, value) in destination.iter_mut().zip(values) {
            *dst = (*value).into();
        }
        return;
    }
    widen_decoded::<N>(bytes, destination);
}

// Unaligned input or a big-endian target.
fn widen_decoded<N>(bytes: &[u8], destination: &mut [i64])
where
    N: Record + Into<i64>,
{
    for (dst, chunk) in destination.iter_mut().zip(bytes.chunks_exact(N::WIDTH)) {
        *dst = N::decode(chunk).into();
    }
}
