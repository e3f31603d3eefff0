//! `i64` face over integer arrays, with utilization monitoring.
//!
//! [`Int64Adapter`] lets callers read and write any integer array as `i64`.
//! It also tracks how much of the storage type's range the data spans, so a
//! producer writing 24-bit prices can be warned before a value overflows
//! and schedule a [`migrate`](crate::migrate) to a wider type.
//!
//! The observed extremes are computed by a full scan on first request and
//! remember how many records they cover. Later requests widen them over the
//! records appended since, whether written through this adapter or by
//! another process; a count below the covered length forces a rescan.
//! Truncation through the adapter clears them.

use std::borrow::Cow;
use std::fmt;
use std::path::Path;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::array::MappedArray;
use crate::config::ArrayConfig;
use crate::convert::{self, ConversionKind};
use crate::data_type::DataType;
use crate::header::FileHeader;
use crate::progress::Progress;
use crate::record::{
    DateTimeTicks, Int24, Int40, Int48, Int56, Record, UInt24, UInt40, UInt48, UInt56, UnixTime,
};
use crate::view::ReadOnlyList;
use crate::{ArrayError, Result};

/// Records widened per step of a full scan.
const SCAN_CHUNK: usize = 64 * 1024;

/// Callback invoked when utilization crosses the configured threshold.
pub type UtilizationCallback = Box<dyn FnMut(&UtilizationStatus) + Send>;

/// How much of a storage type's range the data occupies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UtilizationStatus {
    /// Smallest value seen, 0 when empty.
    pub observed_min: i64,
    /// Largest value seen, 0 when empty.
    pub observed_max: i64,
    /// Smallest value the storage type can hold.
    pub allowed_min: i64,
    /// Largest value the storage type can hold.
    pub allowed_max: i64,
    /// `(observed_max - observed_min) / (allowed_max - allowed_min)`.
    pub utilization_ratio: f64,
}

impl UtilizationStatus {
    fn new(observed: Option<(i64, i64)>, (allowed_min, allowed_max): (i64, i64)) -> Self {
        let Some((observed_min, observed_max)) = observed else {
            return Self {
                observed_min: 0,
                observed_max: 0,
                allowed_min,
                allowed_max,
                utilization_ratio: 0.0,
            };
        };
        let used = i128::from(observed_max) - i128::from(observed_min);
        let allowed = i128::from(allowed_max) - i128::from(allowed_min);
        Self {
            observed_min,
            observed_max,
            allowed_min,
            allowed_max,
            utilization_ratio: used as f64 / allowed as f64,
        }
    }
}

impl fmt::Display for UtilizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "observed [{}, {}] of [{}, {}], utilization {:.6}",
            self.observed_min,
            self.observed_max,
            self.allowed_min,
            self.allowed_max,
            self.utilization_ratio
        )
    }
}

/// Observed extremes over the first `covered` records, once scanned.
#[derive(Debug, Clone, Copy, Default)]
enum Extremes {
    #[default]
    Unknown,
    Known {
        covered: usize,
        range: Option<(i64, i64)>,
    },
}

fn merge(a: Option<(i64, i64)>, b: Option<(i64, i64)>) -> Option<(i64, i64)> {
    match (a, b) {
        (Some((lo, hi)), Some((lo2, hi2))) => Some((lo.min(lo2), hi.max(hi2))),
        (a, None) => a,
        (None, b) => b,
    }
}

struct Warning {
    threshold: f64,
    callback: UtilizationCallback,
    fired: bool,
}

/// Integer array presented as `i64` values.
pub struct Int64Adapter<T: Record> {
    array: MappedArray<T>,
    bounds: (i64, i64),
    extremes: Mutex<Extremes>,
    warning: Option<Warning>,
}

impl<T: Record> Int64Adapter<T> {
    /// Wrap an array. Fails with `Unsupported` for types without a lossless
    /// `i64` conversion.
    pub fn new(array: MappedArray<T>) -> Result<Self> {
        let Some(bounds) = T::KIND.bounds() else {
            return Err(ArrayError::Unsupported(format!(
                "{} has no i64 conversion",
                T::DATA_TYPE
            )));
        };
        Ok(Self {
            array,
            bounds,
            extremes: Mutex::new(Extremes::Unknown),
            warning: None,
        })
    }

    /// Open a file and wrap it.
    pub fn open_with_config(path: impl AsRef<Path>, config: &ArrayConfig) -> Result<Self> {
        Self::new(MappedArray::open_with_config(path, config)?)
    }

    /// The wrapped array.
    pub const fn array(&self) -> &MappedArray<T> {
        &self.array
    }

    /// Unwrap the array.
    pub fn into_inner(self) -> MappedArray<T> {
        self.array
    }

    /// Number of values.
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Check if the array holds no values.
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Append a value; fails with `OutOfRange` if it does not fit `T`.
    pub fn push(&mut self, value: i64) -> Result<()> {
        let record = convert::from_i64::<T>(value)?;
        self.array.push(record)?;
        self.check_warning();
        Ok(())
    }

    /// Append values. Nothing is written if any value does not fit `T`.
    pub fn extend_from_slice(&mut self, values: &[i64]) -> Result<()> {
        let mut records = vec![T::new_zeroed(); values.len()];
        convert::copy_range_from_i64(values, &mut records)?;
        self.array.extend_from_slice(&records)?;
        self.check_warning();
        Ok(())
    }

    /// Value at `index`.
    pub fn get(&self, index: usize) -> Result<i64> {
        convert::to_i64(self.array.get(index)?)
    }

    /// `len` values from `start`, widened into a new buffer.
    pub fn as_span(&self, start: usize, len: usize) -> Result<Vec<i64>> {
        let span = self.array.as_span(start, len)?;
        let mut values = vec![0i64; span.len()];
        convert::copy_range_to_i64(&*span, &mut values)?;
        Ok(values)
    }

    /// Overwrite the last value.
    pub fn set_last(&mut self, index: usize, value: i64) -> Result<()> {
        let record = convert::from_i64::<T>(value)?;
        self.array.set_last(index, record)?;
        // The replaced value may have been an extreme; the window stays wide.
        if let Extremes::Known { covered, range } = &mut *self.extremes.lock()
            && *covered > index
        {
            *range = merge(*range, Some((value, value)));
        }
        self.check_warning();
        Ok(())
    }

    /// Drop values from the end. Clears the observed range and re-arms the
    /// utilization warning.
    pub fn truncate(&mut self, new_count: usize) -> Result<()> {
        self.array.truncate(new_count)?;
        self.invalidate();
        Ok(())
    }

    /// Keep the last `new_count` values. Clears the observed range and
    /// re-arms the utilization warning.
    pub fn truncate_beginning(
        &mut self,
        new_count: usize,
        progress: Option<&mut dyn Progress>,
    ) -> Result<()> {
        self.array.truncate_beginning(new_count, progress)?;
        self.invalidate();
        Ok(())
    }

    /// Pick up growth made by the writer. Returns `true` when it remapped.
    pub fn refresh(&mut self) -> Result<bool> {
        self.array.refresh()
    }

    /// Current utilization of the storage type's range.
    pub fn data_type_utilization(&self) -> Result<UtilizationStatus> {
        let len = self.array.len();
        let mut extremes = self.extremes.lock();
        let range = match *extremes {
            Extremes::Known { covered, range } if covered == len => range,
            Extremes::Known { covered, range } if covered < len => {
                merge(range, self.scan(covered, len)?)
            }
            // Unknown, or the count dropped under us.
            _ => self.scan(0, len)?,
        };
        *extremes = Extremes::Known {
            covered: len,
            range,
        };
        Ok(UtilizationStatus::new(range, self.bounds))
    }

    /// Call `callback` once when a write brings the utilization ratio to
    /// `threshold` or above.
    ///
    /// Replaces any earlier configuration. The warning re-arms after
    /// [`Self::truncate_beginning`].
    pub fn configure_utilization_warning(
        &mut self,
        threshold: f64,
        callback: Option<UtilizationCallback>,
    ) -> Result<()> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ArrayError::OutOfRange(format!(
                "utilization threshold {threshold} outside [0, 1]"
            )));
        }
        let Some(callback) = callback else {
            return Err(ArrayError::MissingCallback(
                "utilization warning needs a callback".to_string(),
            ));
        };
        self.warning = Some(Warning {
            threshold,
            callback,
            fired: false,
        });
        Ok(())
    }

    fn invalidate(&mut self) {
        *self.extremes.lock() = Extremes::Unknown;
        if let Some(warning) = self.warning.as_mut() {
            warning.fired = false;
        }
    }

    fn check_warning(&mut self) {
        let armed = self
            .warning
            .as_ref()
            .is_some_and(|warning| !warning.fired);
        if !armed {
            return;
        }
        let status = match self.data_type_utilization() {
            Ok(status) => status,
            Err(e) => {
                warn!("{}: utilization scan failed: {e}", self.array.path().display());
                return;
            }
        };
        if let Some(warning) = self.warning.as_mut()
            && status.utilization_ratio >= warning.threshold
        {
            warning.fired = true;
            warn!(
                "{}: {} range {status}",
                self.array.path().display(),
                T::DATA_TYPE
            );
            (warning.callback)(&status);
        }
    }

    /// Extremes of records `[start, end)`.
    fn scan(&self, start: usize, end: usize) -> Result<Option<(i64, i64)>> {
        if start >= end {
            return Ok(None);
        }
        let mut min = i64::MAX;
        let mut max = i64::MIN;
        let mut buffer = vec![0i64; SCAN_CHUNK.min(end - start)];
        let mut at = start;
        while at < end {
            let step = SCAN_CHUNK.min(end - at);
            let span = self.array.as_span(at, step)?;
            convert::copy_range_to_i64(&*span, &mut buffer)?;
            for &value in &buffer[..step] {
                min = min.min(value);
                max = max.max(value);
            }
            at += step;
        }
        Ok(Some((min, max)))
    }
}

impl<T: Record> fmt::Debug for Int64Adapter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Int64Adapter")
            .field("array", &self.array)
            .field("bounds", &self.bounds)
            .field("warning_armed", &self.warning.as_ref().map(|w| !w.fired))
            .finish_non_exhaustive()
    }
}

impl<T: Record> ReadOnlyList<i64> for Int64Adapter<T> {
    fn len(&self) -> usize {
        self.array.len()
    }

    fn get(&self, index: usize) -> Result<i64> {
        Self::get(self, index)
    }

    /// Panics past the mapped capacity, like the array it wraps.
    fn read_unchecked(&self, index: usize) -> i64 {
        // `new` rejected kinds without a conversion, so this cannot fail.
        convert::to_i64(self.array.read_unchecked(index)).unwrap_or_default()
    }

    fn range(&self, start: usize, len: usize) -> Result<Cow<'_, [i64]>> {
        self.as_span(start, len).map(Cow::Owned)
    }
}

/// Header-dispatched read access to any integer file.
pub trait Int64Source: ReadOnlyList<i64> {
    /// Tag stored in the file header.
    fn data_type(&self) -> DataType;

    /// Conversion kind of the stored records.
    fn kind(&self) -> ConversionKind;

    /// Current utilization of the storage type's range.
    fn utilization(&self) -> Result<UtilizationStatus>;

    /// Pick up growth made by the writer.
    fn refresh(&mut self) -> Result<bool>;
}

impl<T: Record> Int64Source for Int64Adapter<T> {
    fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    fn kind(&self) -> ConversionKind {
        T::KIND
    }

    fn utilization(&self) -> Result<UtilizationStatus> {
        self.data_type_utilization()
    }

    fn refresh(&mut self) -> Result<bool> {
        Self::refresh(self)
    }
}

/// Open an integer file of whatever type its header names, read-only.
///
/// Fails with `Unsupported` for floats, `UInt64`, bits and structs.
pub fn open_int64_reader(path: &Path) -> Result<Box<dyn Int64Source>> {
    fn open<T: Record>(path: &Path) -> Result<Box<dyn Int64Source>> {
        let array = MappedArray::<T>::open_with_config(path, &ArrayConfig::reader())?;
        Ok(Box::new(Int64Adapter::new(array)?))
    }

    let header = FileHeader::read_from_path(path)?;
    match header.data_type {
        DataType::SByte => open::<i8>(path),
        DataType::Byte => open::<u8>(path),
        DataType::Int16 => open::<i16>(path),
        DataType::UInt16 => open::<u16>(path),
        DataType::Int32 => open::<i32>(path),
        DataType::UInt32 => open::<u32>(path),
        DataType::Int64 => open::<i64>(path),
        DataType::DateTime => open::<DateTimeTicks>(path),
        DataType::UnixSeconds => open::<UnixTime>(path),
        DataType::Int24AsInt64 => open::<Int24>(path),
        DataType::UInt24AsInt64 => open::<UInt24>(path),
        DataType::Int40AsInt64 => open::<Int40>(path),
        DataType::UInt40AsInt64 => open::<UInt40>(path),
        DataType::Int48AsInt64 => open::<Int48>(path),
        DataType::UInt48AsInt64 => open::<UInt48>(path),
        DataType::Int56AsInt64 => open::<Int56>(path),
        DataType::UInt56AsInt64 => open::<UInt56>(path),
        other => Err(ArrayError::Unsupported(format!(
            "{} holds {other}, which has no i64 reader",
            path.display()
        ))),
    }
}

/// Utilization of an integer file, opened read-only.
pub fn file_utilization(path: &Path) -> Result<UtilizationStatus> {
    open_int64_reader(path)?.utilization()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn adapter<T: Record>(dir: &tempfile::TempDir) -> Int64Adapter<T> {
        let config = ArrayConfig::default().with_capacity_hint(16);
        Int64Adapter::open_with_config(dir.path().join("a.bt"), &config).unwrap()
    }

    fn counting_callback() -> (Arc<AtomicUsize>, UtilizationCallback) {
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let callback: UtilizationCallback = Box::new(move |_status| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (fired, callback)
    }

    #[test]
    fn test_utilization_from_observed_span() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut prices = adapter::<UInt24>(&dir);
        assert_eq!(prices.data_type_utilization().unwrap().utilization_ratio, 0.0);

        prices.extend_from_slice(&[15, 10, 20]).unwrap();
        let status = prices.data_type_utilization().unwrap();
        assert_eq!(status.observed_min, 10);
        assert_eq!(status.observed_max, 20);
        assert_eq!(status.allowed_min, 0);
        assert_eq!(status.allowed_max, 16_777_215);
        assert!((status.utilization_ratio - 10.0 / 16_777_215.0).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_values_outside_storage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut values = adapter::<Int24>(&dir);
        assert!(matches!(values.push(1 << 23), Err(ArrayError::OutOfRange(_))));
        assert!(values.extend_from_slice(&[1, 2, -(1 << 24)]).is_err());
        assert!(values.is_empty());
        values.push(-(1 << 23)).unwrap();
        assert_eq!(values.get(0).unwrap(), -8_388_608);
    }

    #[test]
    fn test_warning_fires_once_and_rearms() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut values = adapter::<i8>(&dir);
        let (fired, callback) = counting_callback();
        values.configure_utilization_warning(0.9, Some(callback)).unwrap();

        values.push(0).unwrap();
        values.push(100).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        values.push(-128).unwrap();
        values.push(127).unwrap();
        values.push(-100).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        values.truncate_beginning(1, None).unwrap();
        assert_eq!(values.as_span(0, 1).unwrap(), [-100]);
        values.push(5).unwrap();
        values.push(127).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        values.push(-128).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_warning_configuration_errors() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut values = adapter::<u16>(&dir);
        let (_, callback) = counting_callback();
        assert!(matches!(
            values.configure_utilization_warning(1.5, Some(callback)),
            Err(ArrayError::OutOfRange(_))
        ));
        let (_, callback) = counting_callback();
        assert!(matches!(
            values.configure_utilization_warning(f64::NAN, Some(callback)),
            Err(ArrayError::OutOfRange(_))
        ));
        assert!(matches!(
            values.configure_utilization_warning(0.5, None),
            Err(ArrayError::MissingCallback(_))
        ));
    }

    #[test]
    fn test_as_span_and_set_last() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut values = adapter::<Int40>(&dir);
        values
            .extend_from_slice(&[0, -1, 549_755_813_887, -549_755_813_888])
            .unwrap();
        assert_eq!(
            values.as_span(0, 4).unwrap(),
            [0, -1, 549_755_813_887, -549_755_813_888]
        );
        values.set_last(3, 42).unwrap();
        assert_eq!(values.get(3).unwrap(), 42);
        assert!(values.set_last(2, 0).is_err());
    }

    #[test]
    fn test_header_dispatched_reader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let mut values = adapter::<UInt48>(&dir);
        values.extend_from_slice(&[3, 9, 6]).unwrap();
        drop(values);

        let reader = open_int64_reader(&path).unwrap();
        assert_eq!(reader.data_type(), DataType::UInt48AsInt64);
        assert_eq!(reader.range(0, 3).unwrap().to_vec(), [3, 9, 6]);
        assert_eq!(reader.utilization().unwrap().observed_max, 9);
        assert_eq!(file_utilization(&path).unwrap().observed_min, 3);

        let floats = dir.path().join("f.bt");
        drop(MappedArray::<f32>::open_with_config(&floats, &ArrayConfig::default()).unwrap());
        assert!(matches!(
            open_int64_reader(&floats),
            Err(ArrayError::Unsupported(_))
        ));
    }

    #[test]
    fn test_unsupported_record_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let array =
            MappedArray::<u64>::open_with_config(dir.path().join("u.bt"), &ArrayConfig::default())
                .unwrap();
        assert!(matches!(
            Int64Adapter::new(array),
            Err(ArrayError::Unsupported(_))
        ));
    }

    #[test]
    fn test_truncate_resets_observed_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut values = adapter::<UInt24>(&dir);
        values.extend_from_slice(&[10, 16_000_000]).unwrap();
        assert_eq!(values.data_type_utilization().unwrap().observed_max, 16_000_000);

        values.truncate(0).unwrap();
        let status = values.data_type_utilization().unwrap();
        assert_eq!(status.utilization_ratio, 0.0);
        assert_eq!((status.observed_min, status.observed_max), (0, 0));

        values.extend_from_slice(&[7, 9]).unwrap();
        values.truncate(1).unwrap();
        let status = values.data_type_utilization().unwrap();
        assert_eq!((status.observed_min, status.observed_max), (7, 7));
    }

    #[test]
    fn test_reader_tracks_writer_appends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let mut writer = adapter::<UInt24>(&dir);
        writer.extend_from_slice(&[10, 20]).unwrap();

        let mut reader =
            Int64Adapter::<UInt24>::open_with_config(&path, &ArrayConfig::reader()).unwrap();
        assert_eq!(reader.data_type_utilization().unwrap().observed_max, 20);

        writer.push(16_000_000).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.data_type_utilization().unwrap().observed_max, 16_000_000);

        // Grow past the reader's mapping.
        writer.extend_from_slice(&[5; 40]).unwrap();
        assert_eq!(reader.len(), 16);
        assert!(reader.refresh().unwrap());
        assert_eq!(reader.len(), 43);
        let status = reader.data_type_utilization().unwrap();
        assert_eq!((status.observed_min, status.observed_max), (5, 16_000_000));
    }

    #[test]
    fn test_timestamp_files_have_readers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ticks_path = dir.path().join("a.bt");
        let mut ticks = adapter::<DateTimeTicks>(&dir);
        let stamps = [
            DateTimeTicks::UNIX_EPOCH,
            638_000_000_000_000_000,
            638_000_000_010_000_000,
        ];
        ticks.extend_from_slice(&stamps).unwrap();
        drop(ticks);

        let reader = open_int64_reader(&ticks_path).unwrap();
        assert_eq!(reader.data_type(), DataType::DateTime);
        assert_eq!(reader.range(0, 3).unwrap().to_vec(), stamps);

        let seconds_path = dir.path().join("unix.bt");
        let config = ArrayConfig::default().with_capacity_hint(4);
        let mut seconds = MappedArray::<UnixTime>::open_with_config(&seconds_path, &config).unwrap();
        seconds
            .extend_from_slice(&[UnixTime(0), UnixTime(1_700_000_000)])
            .unwrap();
        seconds.close().unwrap();

        let reader = open_int64_reader(&seconds_path).unwrap();
        assert_eq!(reader.kind(), ConversionKind::Int32);
        assert_eq!(reader.get(1).unwrap(), 1_700_000_000);
    }
}
