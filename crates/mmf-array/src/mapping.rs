//! File mapping shared by the array layouts.
//!
//! [`MappedFile`] owns the file handle, the writer lock and the current
//! mapping of a header-prefixed file. It knows nothing about record types:
//! it maps `data_offset` bytes of prefix followed by `capacity * width`
//! bytes of records, keeps the count field of the header, and performs the
//! unmap/extend/remap cycle when capacity changes.
//!
//! Every mapping instance has a generation number. Remapping bumps it, so a
//! [`PinnedRange`] taken before a remap is detected as stale instead of
//! pointing into memory that no longer backs the file.

use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::atomic::{Ordering, fence};

use memmap2::{Mmap, MmapMut, MmapOptions};
use tracing::{debug, warn};

use crate::config::{ArrayConfig, OpenMode};
use crate::data_type::DataType;
use crate::header::{self, FileHeader, HEADER_SIZE};
use crate::{ArrayError, Result};

/// A record range captured together with the mapping generation it was
/// taken under.
///
/// Resolve it through the array that issued it; once the array has remapped
/// the range fails with [`ArrayError::StaleMapping`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PinnedRange {
    /// First record index.
    pub start: usize,
    /// Number of records.
    pub len: usize,
    generation: u64,
}

impl PinnedRange {
    /// Generation of the mapping the range was pinned under.
    pub const fn generation(&self) -> u64 {
        self.generation
    }
}

enum Mapping {
    ReadOnly(Mmap),
    ReadWrite(MmapMut),
}

impl Mapping {
    fn as_slice(&self) -> &[u8] {
        match self {
            Self::ReadOnly(map) => &map[..],
            Self::ReadWrite(map) => &map[..],
        }
    }

    fn flush(&self) -> std::io::Result<()> {
        match self {
            Self::ReadOnly(_) => Ok(()),
            Self::ReadWrite(map) => map.flush(),
        }
    }
}

/// Memory-mapped, header-prefixed file of fixed-width slots.
pub struct MappedFile {
    /// Open file handle, `None` once closed.
    file: Option<File>,
    /// Path the file was opened from.
    path: PathBuf,
    /// Current mapping, `None` once closed or after a failed remap.
    map: Option<Mapping>,
    /// Bytes before the first record.
    data_offset: usize,
    /// Record width in bytes.
    width: usize,
    /// Whether this handle holds the writer lock.
    writable: bool,
    /// Mapping generation, bumped on every remap.
    generation: u64,
    /// Cleared by `disallow_pointer_reset`; never set again.
    reset_allowed: bool,
    /// Shrink the file to the used size on close.
    trim_on_close: bool,
}

impl MappedFile {
    /// Open or create a file and map it.
    ///
    /// New files get a header tagged with `data_type` and room for
    /// `config.capacity_hint` records. Existing files must carry the same
    /// tag and a count that fits their size.
    pub fn open(
        path: &Path,
        config: &ArrayConfig,
        data_type: DataType,
        width: usize,
        data_offset: usize,
    ) -> Result<Self> {
        if width == 0 {
            return Err(ArrayError::InvalidFormat(
                "zero-sized records cannot be mapped".to_string(),
            ));
        }
        let writable = config.access.can_write();
        if !writable && config.mode == OpenMode::CreateNew {
            return Err(ArrayError::ReadOnly(format!(
                "cannot create {} without write access",
                path.display()
            )));
        }

        let mut options = OpenOptions::new();
        options.read(true).write(writable);
        if writable {
            match config.mode {
                OpenMode::CreateNew => {
                    options.create_new(true);
                }
                OpenMode::OpenOrCreate => {
                    options.create(true);
                }
                OpenMode::OpenExisting => {}
            }
        }
        let file = options.open(path)?;

        if writable {
            match file.try_lock() {
                Ok(()) => {}
                Err(TryLockError::WouldBlock) => {
                    return Err(ArrayError::Locked(format!(
                        "{} is open for writing elsewhere",
                        path.display()
                    )));
                }
                Err(TryLockError::Error(e)) => return Err(ArrayError::Io(e)),
            }
        }

        let len = file.metadata()?.len();
        let fresh = len == 0;
        if fresh {
            if !writable {
                return Err(ArrayError::InvalidFormat(format!(
                    "{} is empty",
                    path.display()
                )));
            }
            file.set_len(byte_len(data_offset, width, config.capacity_hint)?)?;
        } else if len < data_offset as u64 {
            return Err(ArrayError::InvalidFormat(format!(
                "{} is {len} bytes, shorter than its {data_offset}-byte header",
                path.display()
            )));
        }

        let map = map_file(&file, writable)?;
        let mut mapped = Self {
            file: Some(file),
            path: path.to_path_buf(),
            map: Some(map),
            data_offset,
            width,
            writable,
            generation: 0,
            reset_allowed: true,
            trim_on_close: config.trim_on_close,
        };

        if fresh {
            let header = FileHeader::new(data_type).to_bytes();
            mapped.bytes_mut()?[..HEADER_SIZE].copy_from_slice(&header);
            debug!(
                "created {} ({data_type}, capacity {})",
                path.display(),
                mapped.capacity()
            );
        } else {
            mapped.validate(data_type)?;
            if writable && (config.capacity_hint as usize) > mapped.capacity() {
                mapped.resize(config.capacity_hint as usize)?;
            }
        }

        Ok(mapped)
    }

    fn validate(&self, expected: DataType) -> Result<()> {
        let header = FileHeader::from_bytes(self.bytes())?;
        if header.data_type != expected {
            return Err(ArrayError::InvalidFormat(format!(
                "{} holds {}, expected {expected}",
                self.path.display(),
                header.data_type
            )));
        }
        if header.count as u64 > self.capacity() as u64 {
            return Err(ArrayError::InvalidFormat(format!(
                "{} claims {} records but has room for {}",
                self.path.display(),
                header.count,
                self.capacity()
            )));
        }
        Ok(())
    }

    /// Path of the mapped file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether this handle may write.
    pub const fn is_writable(&self) -> bool {
        self.writable
    }

    /// Current mapping generation.
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether capacity changes may still remap.
    pub const fn reset_allowed(&self) -> bool {
        self.reset_allowed
    }

    /// Freeze capacity. One-way.
    pub fn disallow_reset(&mut self) {
        if self.reset_allowed {
            debug!(
                "{}: pointer reset disallowed at generation {}",
                self.path.display(),
                self.generation
            );
        }
        self.reset_allowed = false;
    }

    /// Whole mapping, header included.
    pub fn bytes(&self) -> &[u8] {
        match &self.map {
            Some(map) => map.as_slice(),
            None => &[],
        }
    }

    /// Whole mapping, writable.
    pub fn bytes_mut(&mut self) -> Result<&mut [u8]> {
        match self.map.as_mut() {
            Some(Mapping::ReadWrite(map)) => Ok(&mut map[..]),
            Some(Mapping::ReadOnly(_)) => Err(ArrayError::ReadOnly(format!(
                "{} is mapped read-only",
                self.path.display()
            ))),
            None => Err(ArrayError::Io(std::io::Error::other(format!(
                "{} is not mapped",
                self.path.display()
            )))),
        }
    }

    /// Record region, `capacity * width` bytes.
    pub fn data(&self) -> &[u8] {
        let bytes = self.bytes();
        let end = self.data_offset + self.capacity() * self.width;
        bytes.get(self.data_offset..end).unwrap_or(&[])
    }

    /// Record region, writable.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let start = self.data_offset;
        let end = start + self.capacity() * self.width;
        Ok(&mut self.bytes_mut()?[start..end])
    }

    /// Number of records that fit in the current mapping.
    pub fn capacity(&self) -> usize {
        self.bytes().len().saturating_sub(self.data_offset) / self.width
    }

    /// Count recorded in the header.
    pub fn count(&self) -> usize {
        let bytes = self.bytes();
        if bytes.len() < HEADER_SIZE {
            return 0;
        }
        let count = header::read_count(bytes);
        fence(Ordering::Acquire);
        usize::try_from(count).unwrap_or(0)
    }

    /// Publish a new count. Record bytes written before this call are
    /// visible to readers that observe the new count.
    pub fn set_count(&mut self, count: usize) -> Result<()> {
        let count = i64::try_from(count)
            .map_err(|_| ArrayError::Capacity(format!("count {count} exceeds i64")))?;
        fence(Ordering::Release);
        header::write_count(self.bytes_mut()?, count);
        Ok(())
    }

    /// Grow or shrink the file to hold exactly `capacity` records.
    ///
    /// Unmaps, resizes the file and maps it again, bumping the generation.
    /// Fails with [`ArrayError::Capacity`] once pointer reset is disallowed.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if !self.writable {
            return Err(ArrayError::ReadOnly(format!(
                "cannot resize read-only {}",
                self.path.display()
            )));
        }
        if !self.reset_allowed {
            return Err(ArrayError::Capacity(format!(
                "{}: capacity {} is frozen, {capacity} requested",
                self.path.display(),
                self.capacity()
            )));
        }
        if capacity < self.count() {
            return Err(ArrayError::Capacity(format!(
                "capacity {capacity} below count {}",
                self.count()
            )));
        }
        let new_len = byte_len(self.data_offset, self.width, capacity as u64)?;
        let Some(file) = self.file.as_ref() else {
            return Err(ArrayError::Io(std::io::Error::other("file is closed")));
        };

        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        let resized = file.set_len(new_len);
        // Map again even if the resize failed so the handle stays usable.
        self.map = Some(map_file(file, true)?);
        self.generation += 1;
        resized?;

        debug!(
            "{}: remapped to {} records ({new_len} bytes), generation {}",
            self.path.display(),
            capacity,
            self.generation
        );
        Ok(())
    }

    /// Remap if another process changed the file size.
    ///
    /// Returns `true` when a new mapping was installed.
    pub fn refresh(&mut self) -> Result<bool> {
        let Some(file) = self.file.as_ref() else {
            return Ok(false);
        };
        let len = file.metadata()?.len();
        if len == self.bytes().len() as u64 {
            return Ok(false);
        }
        if !self.reset_allowed {
            return Err(ArrayError::Capacity(format!(
                "{} changed size but its mapping is frozen",
                self.path.display()
            )));
        }
        self.map = None;
        self.map = Some(map_file(file, self.writable)?);
        self.generation += 1;
        debug!(
            "{}: refreshed mapping to {len} bytes, generation {}",
            self.path.display(),
            self.generation
        );
        Ok(true)
    }

    /// Pin `len` records from `start` under the current generation.
    pub const fn pin(&self, start: usize, len: usize) -> PinnedRange {
        PinnedRange {
            start,
            len,
            generation: self.generation,
        }
    }

    /// Fail if `range` was pinned under an older mapping.
    pub fn check_pinned(&self, range: &PinnedRange) -> Result<()> {
        if range.generation == self.generation {
            Ok(())
        } else {
            Err(ArrayError::StaleMapping {
                pinned: range.generation,
                current: self.generation,
            })
        }
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        if let Some(map) = &self.map {
            map.flush()?;
        }
        Ok(())
    }

    /// Unmap, optionally trim to the used size, and release the lock.
    ///
    /// Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        let Some(file) = self.file.take() else {
            return Ok(());
        };
        let count = self.count();
        if let Some(map) = self.map.take() {
            map.flush()?;
        }
        if self.writable {
            if self.trim_on_close {
                file.set_len(byte_len(self.data_offset, self.width, count as u64)?)?;
                debug!("{}: trimmed to {count} records", self.path.display());
            }
            file.unlock()?;
        }
        Ok(())
    }

    /// Whether the file is still open.
    pub const fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("failed to close {}: {e}", self.path.display());
        }
    }
}

/// File length for `capacity` records after `data_offset` bytes of prefix.
fn byte_len(data_offset: usize, width: usize, capacity: u64) -> Result<u64> {
    capacity
        .checked_mul(width as u64)
        .and_then(|n| n.checked_add(data_offset as u64))
        .filter(|&n| usize::try_from(n).is_ok())
        .ok_or_else(|| {
            ArrayError::Capacity(format!(
                "{capacity} records of {width} bytes is not addressable"
            ))
        })
}

fn map_file(file: &File, writable: bool) -> Result<Mapping> {
    // SAFETY: the mapping is only reached through the owning MappedFile,
    // which drops it before any resize. Writers hold the exclusive lock;
    // readers accept that the writer appends concurrently.
    #[allow(unsafe_code)]
    let map = unsafe {
        if writable {
            Mapping::ReadWrite(MmapOptions::new().map_mut(file)?)
        } else {
            Mapping::ReadOnly(MmapOptions::new().map(file)?)
        }
    };
    Ok(map)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::config::Access;

    fn open_i32(path: &Path, config: &ArrayConfig) -> Result<MappedFile> {
        MappedFile::open(path, config, DataType::Int32, 4, HEADER_SIZE)
    }

    #[test]
    fn test_create_writes_header() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let config = ArrayConfig::default().with_capacity_hint(10);
        let mapped = open_i32(&path, &config).expect("open");
        assert_eq!(mapped.capacity(), 10);
        assert_eq!(mapped.count(), 0);
        drop(mapped);

        let header = FileHeader::read_from_path(&path).expect("header");
        assert_eq!(header.data_type, DataType::Int32);
        assert_eq!(std::fs::metadata(&path).expect("meta").len(), 16 + 40);
    }

    #[test]
    fn test_resize_bumps_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let mut mapped = open_i32(&path, &ArrayConfig::default().with_capacity_hint(2)).unwrap();
        let pinned = mapped.pin(0, 1);
        assert!(mapped.check_pinned(&pinned).is_ok());

        mapped.resize(8).unwrap();
        assert_eq!(mapped.capacity(), 8);
        assert_eq!(mapped.generation(), 1);
        assert!(matches!(
            mapped.check_pinned(&pinned),
            Err(ArrayError::StaleMapping {
                pinned: 0,
                current: 1
            })
        ));
    }

    #[test]
    fn test_frozen_mapping_refuses_resize() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let mut mapped = open_i32(&path, &ArrayConfig::default().with_capacity_hint(2)).unwrap();
        mapped.disallow_reset();
        assert!(matches!(mapped.resize(4), Err(ArrayError::Capacity(_))));
        assert_eq!(mapped.capacity(), 2);
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let _writer = open_i32(&path, &ArrayConfig::default()).unwrap();
        assert!(matches!(
            open_i32(&path, &ArrayConfig::default()),
            Err(ArrayError::Locked(_))
        ));
        // Readers do not take the lock.
        assert!(open_i32(&path, &ArrayConfig::reader()).is_ok());
    }

    #[test]
    fn test_type_mismatch_is_format_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        drop(open_i32(&path, &ArrayConfig::default()).unwrap());
        let err = MappedFile::open(&path, &ArrayConfig::default(), DataType::Int64, 8, HEADER_SIZE);
        assert!(matches!(err, Err(ArrayError::InvalidFormat(_))));
    }

    #[test]
    fn test_read_only_cannot_create() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.bt");
        let config = ArrayConfig::new(OpenMode::CreateNew, Access::ReadOnly);
        assert!(matches!(
            open_i32(&path, &config),
            Err(ArrayError::ReadOnly(_))
        ));
        assert!(matches!(
            open_i32(&path, &ArrayConfig::reader()),
            Err(ArrayError::Io(_))
        ));
    }

    #[test]
    fn test_close_trims_and_is_idempotent() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("a.bt");
        let config = ArrayConfig::default()
            .with_capacity_hint(100)
            .with_trim_on_close(true);
        let mut mapped = open_i32(&path, &config).unwrap();
        mapped.set_count(3).unwrap();
        mapped.close().unwrap();
        mapped.close().unwrap();
        assert!(!mapped.is_open());
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16 + 12);
    }

    #[test]
    fn test_unaddressable_capacity() {
        assert!(matches!(
            byte_len(16, 8, u64::MAX / 4),
            Err(ArrayError::Capacity(_))
        ));
    }
}
