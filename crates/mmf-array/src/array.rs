//! Growable typed array over a mapped file.
//!
//! [`MappedArray`] stores `T` records densely after the 16-byte header. The
//! writer appends with [`MappedArray::push`] and
//! [`MappedArray::extend_from_slice`]; when the mapping is full the file is
//! extended and remapped. Existing records are immutable except for the last
//! one, and the array only shrinks by truncation from either end.

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::path::Path;

use tracing::debug;
use zerocopy::{FromBytes, IntoBytes};

use crate::config::{Access, ArrayConfig, OpenMode};
use crate::data_type::DataType;
use crate::header::HEADER_SIZE;
use crate::mapping::{MappedFile, PinnedRange};
use crate::progress::Progress;
use crate::record::Record;
use crate::{ArrayError, Result};

/// Memory-mapped, growable array of `T`.
pub struct MappedArray<T: Record> {
    file: MappedFile,
    config: ArrayConfig,
    /// Bumped by every front truncation.
    front_truncations: u64,
    _marker: PhantomData<T>,
}

impl<T: Record> MappedArray<T> {
    /// Open an array file.
    ///
    /// `capacity_hint` is the initial capacity of a new file; an existing
    /// writable file smaller than the hint is grown to it.
    pub fn open(
        path: impl AsRef<Path>,
        mode: OpenMode,
        capacity_hint: u64,
        access: Access,
    ) -> Result<Self> {
        let config = ArrayConfig::new(mode, access).with_capacity_hint(capacity_hint);
        Self::open_with_config(path, &config)
    }

    /// Open an array file with full configuration.
    pub fn open_with_config(path: impl AsRef<Path>, config: &ArrayConfig) -> Result<Self> {
        let file = MappedFile::open(
            path.as_ref(),
            config,
            T::DATA_TYPE,
            T::WIDTH,
            HEADER_SIZE,
        )?;
        Ok(Self {
            file,
            config: config.clone(),
            front_truncations: 0,
            _marker: PhantomData,
        })
    }

    /// Number of valid records.
    ///
    /// A reader whose mapping predates the writer's last growth sees at most
    /// its mapped capacity until it calls [`Self::refresh`].
    pub fn len(&self) -> usize {
        self.file.count().min(self.file.capacity())
    }

    /// Check if the array holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records that fit without growing.
    pub fn capacity(&self) -> usize {
        self.file.capacity()
    }

    /// Tag stored in the header.
    pub const fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Whether this handle is the writer.
    pub const fn is_writable(&self) -> bool {
        self.file.is_writable()
    }

    /// Generation of the current mapping.
    pub const fn generation(&self) -> u64 {
        self.file.generation()
    }

    /// Number of front truncations performed through this handle.
    ///
    /// Dependents caching index ranges compare it to detect that records
    /// moved.
    pub const fn front_truncations(&self) -> u64 {
        self.front_truncations
    }

    /// Configuration the array was opened with.
    pub const fn config(&self) -> &ArrayConfig {
        &self.config
    }

    /// Append one record, growing the file if it is full.
    pub fn push(&mut self, value: T) -> Result<()> {
        let len = self.len();
        let required = len
            .checked_add(1)
            .ok_or_else(|| ArrayError::Capacity("count overflows usize".to_string()))?;
        self.ensure_capacity(required)?;
        self.write_at(len, value)?;
        self.file.set_count(required)
    }

    /// Append all of `values`, growing at most once.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        let len = self.len();
        let required = len
            .checked_add(values.len())
            .ok_or_else(|| ArrayError::Capacity("count overflows usize".to_string()))?;
        self.ensure_capacity(required)?;

        let data = self.file.data_mut()?;
        let region = &mut data[len * T::WIDTH..required * T::WIDTH];
        if T::ZERO_COPY {
            region.copy_from_slice(values.as_bytes());
        } else {
            for (chunk, value) in region.chunks_exact_mut(T::WIDTH).zip(values) {
                value.encode(chunk);
            }
        }
        self.file.set_count(required)
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> Result<T> {
        let len = self.len();
        if index >= len {
            return Err(ArrayError::OutOfRange(format!(
                "index {index} out of bounds for length {len}"
            )));
        }
        Ok(self.read_unchecked(index))
    }

    /// Record at `index` without checking the count.
    ///
    /// Slots past the count hold whatever the file contains. Indices past
    /// the mapped capacity panic.
    pub fn read_unchecked(&self, index: usize) -> T {
        let start = index * T::WIDTH;
        T::decode(&self.file.data()[start..start + T::WIDTH])
    }

    /// Overwrite the last record. Any other index is rejected.
    pub fn set_last(&mut self, index: usize, value: T) -> Result<()> {
        let len = self.len();
        if len == 0 || index != len - 1 {
            return Err(ArrayError::OutOfRange(format!(
                "only the last record may be replaced (index {index}, length {len})"
            )));
        }
        self.write_at(index, value)
    }

    /// `len` records starting at `start`.
    ///
    /// Borrows the mapping when the stored layout equals `T`'s in-memory
    /// layout, otherwise decodes into an owned buffer.
    pub fn as_span(&self, start: usize, len: usize) -> Result<Cow<'_, [T]>> {
        self.check_range(start, len)?;
        let bytes = &self.file.data()[start * T::WIDTH..(start + len) * T::WIDTH];
        if T::ZERO_COPY
            && let Ok(records) = <[T]>::ref_from_bytes(bytes)
        {
            return Ok(Cow::Borrowed(records));
        }
        Ok(Cow::Owned(
            bytes.chunks_exact(T::WIDTH).map(T::decode).collect(),
        ))
    }

    /// All valid records.
    pub fn as_slice(&self) -> Result<Cow<'_, [T]>> {
        self.as_span(0, self.len())
    }

    /// Pin a range under the current mapping generation.
    pub fn pin(&self, start: usize, len: usize) -> Result<PinnedRange> {
        self.check_range(start, len)?;
        Ok(self.file.pin(start, len))
    }

    /// Records of a pinned range, or `StaleMapping` if the array remapped
    /// since it was pinned.
    pub fn resolve(&self, range: &PinnedRange) -> Result<Cow<'_, [T]>> {
        self.file.check_pinned(range)?;
        self.as_span(range.start, range.len)
    }

    /// Drop records from the end. Capacity and file size are unchanged.
    pub fn truncate(&mut self, new_count: usize) -> Result<()> {
        let len = self.len();
        if new_count > len {
            return Err(ArrayError::OutOfRange(format!(
                "cannot truncate {len} records to {new_count}"
            )));
        }
        self.file.set_count(new_count)
    }

    /// Keep only the last `new_count` records, moving them to the front.
    ///
    /// Records move in chunks of `shift_chunk_records`. The progress sink is
    /// polled between chunks; cancelling returns [`ArrayError::Cancelled`]
    /// with the count unchanged, although some records may already have
    /// moved.
    pub fn truncate_beginning(
        &mut self,
        new_count: usize,
        mut progress: Option<&mut dyn Progress>,
    ) -> Result<()> {
        let old_count = self.len();
        if new_count > old_count {
            return Err(ArrayError::OutOfRange(format!(
                "cannot keep {new_count} of {old_count} records"
            )));
        }
        if new_count == old_count {
            return Ok(());
        }

        let offset = old_count - new_count;
        if let Some(progress) = progress.as_deref_mut() {
            progress.begin(
                new_count as u64,
                Some("truncate_beginning"),
                Some(offset as u64),
            );
        }
        let shifted = self
            .shift_to_front(offset, new_count, progress.as_deref_mut().map(|p| p as &mut dyn Progress))
            .and_then(|()| self.file.set_count(new_count));
        if let Err(e) = shifted {
            if let Some(progress) = progress.as_deref_mut() {
                progress.end(old_count as u64, Some(&e.to_string()));
            }
            return Err(e);
        }

        self.front_truncations += 1;
        debug!(
            "{}: dropped {offset} leading records, {new_count} remain",
            self.path().display()
        );
        if let Some(progress) = progress.as_deref_mut() {
            progress.end(new_count as u64, None);
        }
        Ok(())
    }

    /// Forbid any further remap. One-way.
    ///
    /// Appends that fit the current capacity keep working; appends that
    /// would need growth fail with [`ArrayError::Capacity`].
    pub fn disallow_pointer_reset(&mut self) {
        self.file.disallow_reset();
    }

    /// Whether growth may still remap.
    pub const fn pointer_reset_allowed(&self) -> bool {
        self.file.reset_allowed()
    }

    /// Grow or shrink to exactly `new_capacity` records.
    pub fn set_capacity(&mut self, new_capacity: usize) -> Result<()> {
        if new_capacity == self.capacity() {
            return Ok(());
        }
        self.file.resize(new_capacity)
    }

    /// Flush dirty pages to disk.
    pub fn flush(&self) -> Result<()> {
        self.file.flush()
    }

    /// Pick up growth made by the writer. Returns `true` when it remapped.
    pub fn refresh(&mut self) -> Result<bool> {
        self.file.refresh()
    }

    /// Unmap and release the file. Dropping the array does the same but
    /// can only log failures.
    pub fn close(mut self) -> Result<()> {
        self.file.close()
    }

    /// Move `len` records starting at `offset` to the front, chunk by chunk.
    fn shift_to_front(
        &mut self,
        offset: usize,
        len: usize,
        mut progress: Option<&mut dyn Progress>,
    ) -> Result<()> {
        let chunk = self.config.shift_chunk_records.max(1);
        let data = self.file.data_mut()?;
        let mut moved = 0;
        while moved < len {
            let step = chunk.min(len - moved);
            let source = (offset + moved) * T::WIDTH;
            data.copy_within(source..source + step * T::WIDTH, moved * T::WIDTH);
            moved += step;

            if moved < len
                && let Some(progress) = progress.as_deref_mut()
                && progress.update(moved as u64)
            {
                return Err(ArrayError::Cancelled(format!(
                    "front truncation stopped after {moved} of {len} records"
                )));
            }
        }
        Ok(())
    }

    fn ensure_capacity(&mut self, required: usize) -> Result<()> {
        let capacity = self.capacity();
        if required <= capacity {
            return Ok(());
        }
        if !self.file.reset_allowed() {
            return Err(ArrayError::Capacity(format!(
                "{}: {required} records needed, capacity {capacity} is frozen",
                self.path().display()
            )));
        }
        let grown = self
            .config
            .grown_capacity(capacity as u64, required as u64, T::WIDTH);
        let grown = usize::try_from(grown)
            .map_err(|_| ArrayError::Capacity(format!("capacity {grown} exceeds usize")))?;
        self.file.resize(grown)
    }

    fn write_at(&mut self, index: usize, value: T) -> Result<()> {
        let start = index * T::WIDTH;
        value.encode(&mut self.file.data_mut()?[start..start + T::WIDTH]);
        Ok(())
    }

    fn check_range(&self, start: usize, len: usize) -> Result<()> {
        let count = self.len();
        match start.checked_add(len) {
            Some(end) if end <= count => Ok(()),
            _ => Err(ArrayError::OutOfRange(format!(
                "range {start}+{len} out of bounds for length {count}"
            ))),
        }
    }
}

impl<T: Record> fmt::Debug for MappedArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedArray")
            .field("path", &self.path())
            .field("data_type", &T::DATA_TYPE)
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("generation", &self.generation())
            .finish()
    }
}
