//! Packed odd-width integers.
//!
//! Each type wraps a little-endian byte array of exactly `BITS / 8` bytes
//! and has alignment 1, so packed records sit back to back in a file with no
//! padding. Values widen to `i64` on read: signed variants replicate the top
//! stored bit, unsigned variants zero-fill.
//!
//! | Type | Bytes | Range |
//! |------|-------|-------|
//! | [`Int24`]  | 3 | `-8_388_608 ..= 8_388_607` |
//! | [`UInt24`] | 3 | `0 ..= 16_777_215` |
//! | [`Int40`]  | 5 | `-549_755_813_888 ..= 549_755_813_887` |
//! | [`UInt40`] | 5 | `0 ..= 1_099_511_627_775` |
//! | [`Int48`]  | 6 | `-2^47 ..= 2^47 - 1` |
//! | [`UInt48`] | 6 | `0 ..= 2^48 - 1` |
//! | [`Int56`]  | 7 | `-2^55 ..= 2^55 - 1` |
//! | [`UInt56`] | 7 | `0 ..= 2^56 - 1` |

use std::cmp::Ordering;
use std::fmt;

use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use super::Record;
use crate::convert::ConversionKind;
use crate::data_type::DataType;
use crate::{ArrayError, Result};

/// Sign-extend the low `bits` of `raw`.
#[inline]
pub(crate) const fn sign_extend(raw: u64, bits: u32) -> i64 {
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

/// Assemble up to 8 little-endian bytes into a `u64`.
#[inline]
pub(crate) fn load_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf[..bytes.len()].copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

macro_rules! packed_int {
    (
        @common
        $(#[$meta:meta])*
        $name:ident, $bytes:literal, $data_type:ident, $kind:ident,
        $min:expr, $max:expr, $widen:expr
    ) => {
        $(#[$meta])*
        #[derive(
            Clone, Copy, PartialEq, Eq, Hash, Default,
            FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
        )]
        #[repr(transparent)]
        pub struct $name([u8; $bytes]);

        impl $name {
            /// Stored width in bits.
            pub const BITS: u32 = $bytes * 8;
            /// Smallest representable value.
            pub const MIN: i64 = $min;
            /// Largest representable value.
            pub const MAX: i64 = $max;
            /// Zero.
            pub const ZERO: Self = Self([0; $bytes]);

            /// Narrow `value`, failing if it does not fit.
            pub fn new(value: i64) -> Result<Self> {
                if !(Self::MIN..=Self::MAX).contains(&value) {
                    return Err(ArrayError::OutOfRange(format!(
                        "{value} does not fit in {} ({}..={})",
                        stringify!($name),
                        Self::MIN,
                        Self::MAX
                    )));
                }
                let mut bytes = [0u8; $bytes];
                bytes.copy_from_slice(&value.to_le_bytes()[..$bytes]);
                Ok(Self(bytes))
            }

            /// Widen to `i64`.
            #[inline]
            pub fn get(self) -> i64 {
                let widen: fn(u64) -> i64 = $widen;
                widen(load_le(&self.0))
            }

            /// Build from raw little-endian bytes. Every bit pattern is valid.
            pub const fn from_le_bytes(bytes: [u8; $bytes]) -> Self {
                Self(bytes)
            }

            /// Raw little-endian bytes.
            pub const fn to_le_bytes(self) -> [u8; $bytes] {
                self.0
            }
        }

        impl Record for $name {
            const DATA_TYPE: DataType = DataType::$data_type;
            const KIND: ConversionKind = ConversionKind::$kind;
            const ZERO_COPY: bool = true;
        }

        impl TryFrom<i64> for $name {
            type Error = ArrayError;

            fn try_from(value: i64) -> Result<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                value.get()
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> Ordering {
                self.get().cmp(&other.get())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.get()).finish()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.get(), f)
            }
        }
    };
    (
        $(#[$meta:meta])*
        $name:ident, $bytes:literal, signed, $data_type:ident, $kind:ident
    ) => {
        packed_int!(@common $(#[$meta])* $name, $bytes, $data_type, $kind,
            -(1i64 << ($bytes * 8 - 1)),
            (1i64 << ($bytes * 8 - 1)) - 1,
            |raw| sign_extend(raw, $bytes * 8));
    };
    (
        $(#[$meta:meta])*
        $name:ident, $bytes:literal, unsigned, $data_type:ident, $kind:ident
    ) => {
        packed_int!(@common $(#[$meta])* $name, $bytes, $data_type, $kind,
            0,
            (1i64 << ($bytes * 8)) - 1,
            |raw| raw as i64);
    };
}

packed_int!(
    /// Signed 24-bit integer stored in 3 bytes.
    Int24, 3, signed, Int24AsInt64, Int24
);
packed_int!(
    /// Unsigned 24-bit integer stored in 3 bytes.
    UInt24, 3, unsigned, UInt24AsInt64, UInt24
);
packed_int!(
    /// Signed 40-bit integer stored in 5 bytes.
    Int40, 5, signed, Int40AsInt64, Int40
);
packed_int!(
    /// Unsigned 40-bit integer stored in 5 bytes.
    UInt40, 5, unsigned, UInt40AsInt64, UInt40
);
packed_int!(
    /// Signed 48-bit integer stored in 6 bytes.
    Int48, 6, signed, Int48AsInt64, Int48
);
packed_int!(
    /// Unsigned 48-bit integer stored in 6 bytes.
    UInt48, 6, unsigned, UInt48AsInt64, UInt48
);
packed_int!(
    /// Signed 56-bit integer stored in 7 bytes.
    Int56, 7, signed, Int56AsInt64, Int56
);
packed_int!(
    /// Unsigned 56-bit integer stored in 7 bytes.
    UInt56, 7, unsigned, UInt56AsInt64, UInt56
);
