//! Timestamp records.
//!
//! Both are plain little-endian integers on disk and widen to `i64` like the
//! integer they wrap. [`DateTimeTicks`] counts 100 ns ticks since
//! 0001-01-01T00:00:00; [`UnixTime`] counts seconds since the Unix epoch.

use zerocopy_derive::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::convert::ConversionKind;
use crate::data_type::DataType;
use crate::record::Record;

macro_rules! timestamp_record {
    ($(#[$meta:meta])* $name:ident, $inner:ty, $data_type:ident, $kind:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
            FromBytes, IntoBytes, Immutable, KnownLayout,
        )]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl Record for $name {
            const DATA_TYPE: DataType = DataType::$data_type;
            const KIND: ConversionKind = ConversionKind::$kind;
            const ZERO_COPY: bool = cfg!(target_endian = "little");

            #[inline]
            fn decode(bytes: &[u8]) -> Self {
                Self(<$inner as Record>::decode(bytes))
            }

            #[inline]
            fn encode(self, out: &mut [u8]) {
                self.0.encode(out);
            }
        }

        impl From<$inner> for $name {
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for i64 {
            fn from(value: $name) -> Self {
                Self::from(value.0)
            }
        }
    };
}

timestamp_record!(
    /// `DateTime` ticks, stored as `i64`.
    DateTimeTicks, i64, DateTime, Int64
);

timestamp_record!(
    /// `UnixSeconds`, stored as `i32`.
    UnixTime, i32, UnixSeconds, Int32
);

impl DateTimeTicks {
    /// Ticks per second.
    pub const PER_SECOND: i64 = 10_000_000;
    /// Ticks at 1970-01-01T00:00:00.
    pub const UNIX_EPOCH: i64 = 621_355_968_000_000_000;

    /// Whole seconds since the Unix epoch, rounded toward negative infinity.
    pub const fn unix_seconds(self) -> i64 {
        (self.0 - Self::UNIX_EPOCH).div_euclid(Self::PER_SECOND)
    }
}

impl UnixTime {
    /// The same instant as `DateTime` ticks.
    pub const fn to_ticks(self) -> DateTimeTicks {
        DateTimeTicks(DateTimeTicks::UNIX_EPOCH + self.0 as i64 * DateTimeTicks::PER_SECOND)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::convert;

    #[test]
    fn test_widths_and_tags() {
        assert_eq!(DateTimeTicks::WIDTH, 8);
        assert_eq!(UnixTime::WIDTH, 4);
        assert_eq!(DateTimeTicks::KIND, convert::kind_for(DataType::DateTime));
        assert_eq!(UnixTime::KIND, convert::kind_for(DataType::UnixSeconds));
    }

    #[test]
    fn test_epoch_conversions() {
        let launch = UnixTime(1_700_000_000);
        assert_eq!(launch.to_ticks().unix_seconds(), 1_700_000_000);
        assert_eq!(DateTimeTicks(DateTimeTicks::UNIX_EPOCH - 1).unix_seconds(), -1);
        assert_eq!(convert::to_i64(UnixTime(-5)).unwrap(), -5);
        assert!(convert::from_i64::<UnixTime>(i64::from(i32::MAX) + 1).is_err());
    }
}
