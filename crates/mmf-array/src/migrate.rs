//! Width migration for packed-integer files.
//!
//! Rewrites a file of 24, 40, 48 or 56-bit records into the next standard
//! width, keeping order, values and signedness:
//!
//! | Source | Target |
//! |--------|--------|
//! | `Int24AsInt64` | `Int32` |
//! | `UInt24AsInt64` | `UInt32` |
//! | `Int40/48/56AsInt64` | `Int64` |
//! | `UInt40/48/56AsInt64` | `UInt64` |
//!
//! Records are copied in fixed-size chunks so peak memory stays bounded by
//! the chunk size. There is no atomic replace: a failed migration leaves its
//! partial output behind. [`migrate_in_place`] migrates into a sibling file
//! and renames it over the source only after success.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::array::MappedArray;
use crate::config::{Access, ArrayConfig, OpenMode};
use crate::convert;
use crate::data_type::DataType;
use crate::header::FileHeader;
use crate::progress::Progress;
use crate::record::{Int24, Int40, Int48, Int56, Record, UInt24, UInt40, UInt48, UInt56};
use crate::{ArrayError, Result};

/// Default number of records copied per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Suffix of the temporary file used by [`migrate_in_place`].
const IN_PLACE_SUFFIX: &str = "migrating";

/// Migration settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MigrationOptions {
    /// Records per chunk.
    pub chunk_size: usize,
}

impl Default for MigrationOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl MigrationOptions {
    /// Set the chunk size.
    #[must_use]
    pub const fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

/// Outcome of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    /// File that was read.
    pub source: PathBuf,
    /// File that was written.
    pub destination: PathBuf,
    /// Type of the source records.
    pub source_type: DataType,
    /// Type of the written records.
    pub target_type: DataType,
    /// Records copied.
    pub count: u64,
    /// Size of the source file.
    pub bytes_before: u64,
    /// Size of the destination file.
    pub bytes_after: u64,
}

/// Migrate the odd-width file at `source` into a new file at `destination`.
///
/// `destination` must not exist. Fails with `Unsupported` when the source
/// is not one of the packed widths.
pub fn migrate_odd_width(
    source: &Path,
    destination: &Path,
    options: &MigrationOptions,
    progress: Option<&mut dyn Progress>,
) -> Result<MigrationReport> {
    let header = FileHeader::read_from_path(source)?;
    let Some(target_type) = header.data_type.migration_target() else {
        return Err(ArrayError::Unsupported(format!(
            "{} holds {}, which has no wider target",
            source.display(),
            header.data_type
        )));
    };
    info!(
        "migrating {} ({} records) from {} to {target_type}",
        source.display(),
        header.count,
        header.data_type
    );

    let job = Job {
        source,
        destination,
        header,
        chunk_size: options.chunk_size.max(1),
    };
    let count = match header.data_type {
        DataType::Int24AsInt64 => job.run::<Int24, i32>(convert::from_i64, progress)?,
        DataType::UInt24AsInt64 => job.run::<UInt24, u32>(convert::from_i64, progress)?,
        DataType::Int40AsInt64 => job.run::<Int40, i64>(convert::from_i64, progress)?,
        DataType::Int48AsInt64 => job.run::<Int48, i64>(convert::from_i64, progress)?,
        DataType::Int56AsInt64 => job.run::<Int56, i64>(convert::from_i64, progress)?,
        DataType::UInt40AsInt64 => job.run::<UInt40, u64>(to_u64, progress)?,
        DataType::UInt48AsInt64 => job.run::<UInt48, u64>(to_u64, progress)?,
        DataType::UInt56AsInt64 => job.run::<UInt56, u64>(to_u64, progress)?,
        other => {
            return Err(ArrayError::Unsupported(format!(
                "no migration defined for {other}"
            )));
        }
    };

    let report = MigrationReport {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        source_type: header.data_type,
        target_type,
        count,
        bytes_before: fs::metadata(source)?.len(),
        bytes_after: fs::metadata(destination)?.len(),
    };
    info!(
        "migrated {} records to {}: {} -> {} bytes",
        report.count,
        destination.display(),
        report.bytes_before,
        report.bytes_after
    );
    Ok(report)
}

/// Migrate `path` and replace it with the result.
///
/// The new file is written next to the source and renamed over it once
/// complete. On failure the source is untouched and the temporary file is
/// removed.
pub fn migrate_in_place(
    path: &Path,
    options: &MigrationOptions,
    progress: Option<&mut dyn Progress>,
) -> Result<MigrationReport> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".");
    temp.push(IN_PLACE_SUFFIX);
    let temp = PathBuf::from(temp);
    if temp.exists() {
        debug!("removing stale {}", temp.display());
        fs::remove_file(&temp)?;
    }

    match migrate_odd_width(path, &temp, options, progress) {
        Ok(mut report) => {
            fs::rename(&temp, path)?;
            report.destination = path.to_path_buf();
            Ok(report)
        }
        Err(e) => {
            if temp.exists()
                && let Err(cleanup) = fs::remove_file(&temp)
            {
                warn!("failed to remove {}: {cleanup}", temp.display());
            }
            Err(e)
        }
    }
}

fn to_u64(value: i64) -> Result<u64> {
    u64::try_from(value)
        .map_err(|_| ArrayError::OutOfRange(format!("{value} is negative, target is unsigned")))
}

struct Job<'a> {
    source: &'a Path,
    destination: &'a Path,
    header: FileHeader,
    chunk_size: usize,
}

impl Job<'_> {
    fn run<S, D>(
        &self,
        narrow: fn(i64) -> Result<D>,
        mut progress: Option<&mut dyn Progress>,
    ) -> Result<u64>
    where
        S: Record,
        D: Record,
    {
        if self.header.count == 0 {
            self.create_target::<D>(0)?.close()?;
            return Ok(0);
        }

        // Lock the source before creating anything, so a live writer leaves
        // no output behind. Read-write keeps producers out while copying.
        let source =
            MappedArray::<S>::open(self.source, OpenMode::OpenExisting, 0, Access::ReadWrite)?;
        let total = source.len();
        let mut target = self.create_target::<D>(total as u64)?;

        if let Some(progress) = progress.as_deref_mut() {
            progress.begin(total as u64, Some("migrate"), None);
        }
        let done = match self.copy_chunks(&source, &mut target, narrow, progress.as_deref_mut().map(|p| p as &mut dyn Progress)) {
            Ok(done) => done,
            Err((done, e)) => {
                if let Some(progress) = progress.as_deref_mut() {
                    progress.end(done as u64, Some(&e.to_string()));
                }
                return Err(e);
            }
        };
        if let Some(progress) = progress.as_deref_mut() {
            progress.end(done as u64, None);
        }

        source.close()?;
        target.close()?;
        Ok(done as u64)
    }

    fn create_target<D: Record>(&self, capacity: u64) -> Result<MappedArray<D>> {
        let create = ArrayConfig::new(OpenMode::CreateNew, Access::ReadWrite)
            .with_capacity_hint(capacity)
            .with_min_capacity(0);
        MappedArray::open_with_config(self.destination, &create)
    }

    /// Copy every source record into `target`. On failure, returns the
    /// number of records already copied with the error.
    fn copy_chunks<S, D>(
        &self,
        source: &MappedArray<S>,
        target: &mut MappedArray<D>,
        narrow: fn(i64) -> Result<D>,
        mut progress: Option<&mut dyn Progress>,
    ) -> std::result::Result<usize, (usize, ArrayError)>
    where
        S: Record,
        D: Record,
    {
        let total = source.len();
        let mut wide = vec![0i64; self.chunk_size.min(total)];
        let mut narrowed: Vec<D> = Vec::with_capacity(wide.len());
        let mut done = 0;
        while done < total {
            let step = self.chunk_size.min(total - done);
            let copied = source
                .as_span(done, step)
                .and_then(|span| convert::copy_range_to_i64(&*span, &mut wide));
            copied.map_err(|e| (done, e))?;

            narrowed.clear();
            for (offset, &value) in wide[..step].iter().enumerate() {
                let record = narrow(value).map_err(|e| {
                    (
                        done,
                        ArrayError::OutOfRange(format!("record {}: {e}", done + offset)),
                    )
                })?;
                narrowed.push(record);
            }
            target.extend_from_slice(&narrowed).map_err(|e| (done, e))?;
            done += step;
            debug!("migrated {done}/{total} records");

            if done < total
                && let Some(progress) = progress.as_deref_mut()
                && progress.update(done as u64)
            {
                return Err((
                    done,
                    ArrayError::Cancelled(format!(
                        "migration stopped after {done} of {total} records"
                    )),
                ));
            }
        }
        Ok(done)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::progress::LoggingProgress;

    fn write_packed<T: Record>(path: &Path, values: &[T]) {
        let config = ArrayConfig::new(OpenMode::CreateNew, Access::ReadWrite)
            .with_capacity_hint(values.len() as u64);
        let mut array = MappedArray::<T>::open_with_config(path, &config).unwrap();
        array.extend_from_slice(values).unwrap();
        array.close().unwrap();
    }

    #[test]
    fn test_uint24_to_uint32() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("volume.bt");
        let destination = dir.path().join("volume32.bt");
        write_packed(&source, &[UInt24::new(0).unwrap(), UInt24::new(16_777_215).unwrap()]);

        let report =
            migrate_odd_width(&source, &destination, &MigrationOptions::default(), None).unwrap();
        assert_eq!(report.count, 2);
        assert_eq!(report.target_type, DataType::UInt32);
        assert_eq!(report.bytes_before, 16 + 6);
        assert_eq!(report.bytes_after, 16 + 8);

        let header = FileHeader::read_from_path(&destination).unwrap();
        assert_eq!(header.data_type, DataType::UInt32);
        let migrated = MappedArray::<u32>::open(&destination, OpenMode::OpenExisting, 0, Access::ReadOnly).unwrap();
        assert_eq!(migrated.as_slice().unwrap().to_vec(), [0, 16_777_215]);
    }

    #[test]
    fn test_signed_chunks_preserve_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("price.bt");
        let destination = dir.path().join("price64.bt");
        let raw: Vec<i64> = (0..25).map(|i| (i - 12) * 1_000_000_007).collect();
        let values: Vec<Int40> = raw.iter().map(|&v| Int40::new(v).unwrap()).collect();
        write_packed(&source, &values);

        let options = MigrationOptions::default().with_chunk_size(4);
        let mut progress = LoggingProgress::new();
        migrate_odd_width(&source, &destination, &options, Some(&mut progress)).unwrap();

        let migrated = MappedArray::<i64>::open(&destination, OpenMode::OpenExisting, 0, Access::ReadOnly).unwrap();
        assert_eq!(migrated.as_slice().unwrap().to_vec(), raw);
    }

    #[test]
    fn test_empty_source_creates_empty_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("empty.bt");
        let destination = dir.path().join("empty64.bt");
        write_packed::<UInt56>(&source, &[]);

        let report =
            migrate_odd_width(&source, &destination, &MigrationOptions::default(), None).unwrap();
        assert_eq!(report.count, 0);
        let header = FileHeader::read_from_path(&destination).unwrap();
        assert_eq!(header.data_type, DataType::UInt64);
        assert_eq!(header.count, 0);
    }

    #[test]
    fn test_standard_width_is_unsupported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("plain.bt");
        write_packed(&source, &[1i32, 2, 3]);
        let err = migrate_odd_width(
            &source,
            &dir.path().join("out.bt"),
            &MigrationOptions::default(),
            None,
        );
        assert!(matches!(err, Err(ArrayError::Unsupported(_))));
    }

    #[test]
    fn test_in_place_replaces_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ticks.bt");
        let values: Vec<Int24> = (-5..5).map(|v| Int24::new(v).unwrap()).collect();
        write_packed(&path, &values);

        let report = migrate_in_place(&path, &MigrationOptions::default(), None).unwrap();
        assert_eq!(report.destination, path);
        assert!(!dir.path().join("ticks.bt.migrating").exists());

        let migrated = MappedArray::<i32>::open(&path, OpenMode::OpenExisting, 0, Access::ReadOnly).unwrap();
        assert_eq!(migrated.as_slice().unwrap().to_vec(), (-5..5).collect::<Vec<i32>>());
    }

    #[test]
    fn test_locked_source_fails_in_place_cleanly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("live.bt");
        write_packed(&path, &[UInt40::new(7).unwrap()]);
        let _writer = MappedArray::<UInt40>::open(&path, OpenMode::OpenExisting, 0, Access::ReadWrite).unwrap();

        let err = migrate_in_place(&path, &MigrationOptions::default(), None);
        assert!(matches!(err, Err(ArrayError::Locked(_))));
        assert!(!dir.path().join("live.bt.migrating").exists());
        assert_eq!(
            FileHeader::read_from_path(&path).unwrap().data_type,
            DataType::UInt40AsInt64
        );
    }

    #[test]
    fn test_locked_source_leaves_no_target_and_retry_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = dir.path().join("live.bt");
        let destination = dir.path().join("live64.bt");
        write_packed(&source, &[Int48::new(-3).unwrap(), Int48::new(9).unwrap()]);

        let writer =
            MappedArray::<Int48>::open(&source, OpenMode::OpenExisting, 0, Access::ReadWrite)
                .unwrap();
        let err = migrate_odd_width(&source, &destination, &MigrationOptions::default(), None);
        assert!(matches!(err, Err(ArrayError::Locked(_))));
        assert!(!destination.exists());

        writer.close().unwrap();
        let report =
            migrate_odd_width(&source, &destination, &MigrationOptions::default(), None).unwrap();
        assert_eq!(report.count, 2);
        let migrated =
            MappedArray::<i64>::open(&destination, OpenMode::OpenExisting, 0, Access::ReadOnly)
                .unwrap();
        assert_eq!(migrated.as_slice().unwrap().to_vec(), [-3, 9]);
    }
}
