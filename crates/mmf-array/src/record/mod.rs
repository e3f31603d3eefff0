//! Record types that can be stored in a mapped array.
//!
//! A record is any plain-old-data value whose bytes can be read straight out
//! of a mapping. The [`Record`] trait ties each type to its on-disk
//! [`DataType`] tag and to the [`ConversionKind`] the conversion engine uses
//! for it. Native integers and floats implement it here, the packed 24/40/48/56
//! bit integers in [`packed`] and the timestamps in [`time`]. Callers can
//! implement it for their own `#[repr(C)]` structs with
//! [`DataType::AnyStruct`].

pub mod packed;
pub mod time;

pub use packed::{Int24, Int40, Int48, Int56, UInt24, UInt40, UInt48, UInt56};
pub use time::{DateTimeTicks, UnixTime};

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes};

use crate::convert::ConversionKind;
use crate::data_type::DataType;

/// A fixed-width value stored densely in a mapped file.
///
/// Records are stored little-endian. `decode` and `encode` perform the
/// per-element transform; when [`Record::ZERO_COPY`] holds, the stored bytes
/// already equal the in-memory layout and a mapped region can be viewed as
/// `&[Self]` directly.
pub trait Record: FromBytes + IntoBytes + Immutable + Copy + fmt::Debug + Send + Sync + 'static {
    /// Tag written to (and expected in) the file header.
    const DATA_TYPE: DataType;

    /// How the conversion engine widens this record to `i64`.
    const KIND: ConversionKind = ConversionKind::Unsupported;

    /// Stored width in bytes.
    const WIDTH: usize = size_of::<Self>();

    /// Whether stored bytes can be reinterpreted without a transform.
    const ZERO_COPY: bool = cfg!(target_endian = "little");

    /// Read one record from the first `WIDTH` bytes of `bytes`.
    fn decode(bytes: &[u8]) -> Self {
        let mut value = Self::new_zeroed();
        value.as_mut_bytes().copy_from_slice(&bytes[..Self::WIDTH]);
        value
    }

    /// Write this record into the first `WIDTH` bytes of `out`.
    fn encode(self, out: &mut [u8]) {
        out[..Self::WIDTH].copy_from_slice(self.as_bytes());
    }
}

macro_rules! native_record {
    ($ty:ty, $data_type:ident, $kind:ident, $zero_copy:expr) => {
        impl Record for $ty {
            const DATA_TYPE: DataType = DataType::$data_type;
            const KIND: ConversionKind = ConversionKind::$kind;
            const ZERO_COPY: bool = $zero_copy;

            #[inline]
            fn decode(bytes: &[u8]) -> Self {
                let mut buf = [0u8; size_of::<$ty>()];
                buf.copy_from_slice(&bytes[..size_of::<$ty>()]);
                <$ty>::from_le_bytes(buf)
            }

            #[inline]
            fn encode(self, out: &mut [u8]) {
                out[..size_of::<$ty>()].copy_from_slice(&self.to_le_bytes());
            }
        }
    };
}

native_record!(i8, SByte, Int8, true);
native_record!(u8, Byte, UInt8, true);
native_record!(i16, Int16, Int16, cfg!(target_endian = "little"));
native_record!(u16, UInt16, UInt16, cfg!(target_endian = "little"));
native_record!(i32, Int32, Int32, cfg!(target_endian = "little"));
native_record!(u32, UInt32, UInt32, cfg!(target_endian = "little"));
native_record!(i64, Int64, Int64, cfg!(target_endian = "little"));
// u64 cannot widen into i64 without loss, so it has no conversion kind.
native_record!(u64, UInt64, Unsupported, cfg!(target_endian = "little"));
native_record!(f32, Single, Unsupported, cfg!(target_endian = "little"));
native_record!(f64, Double, Unsupported, cfg!(target_endian = "little"));
