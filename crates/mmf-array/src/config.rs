//! Configuration for opening mapped arrays

use serde::{Deserialize, Serialize};

/// How to treat an existing (or missing) file on open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OpenMode {
    /// Fail if the file exists.
    CreateNew,
    /// Open the file, creating it if missing.
    #[default]
    OpenOrCreate,
    /// Fail if the file is missing.
    OpenExisting,
}

/// Access requested for an open array.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Access {
    /// Map read-only; no lock is taken and any number of readers may attach.
    ReadOnly,
    /// Map read-write; takes the exclusive writer lock.
    #[default]
    ReadWrite,
}

impl Access {
    /// Check if this access allows writes.
    pub const fn can_write(self) -> bool {
        matches!(self, Self::ReadWrite)
    }
}

/// Configuration for a mapped array
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayConfig {
    /// Open behaviour
    pub mode: OpenMode,

    /// Read-only or read-write mapping
    pub access: Access,

    /// Initial capacity in records for new files
    pub capacity_hint: u64,

    /// Smallest capacity a growth step produces
    pub min_capacity: u64,

    /// Largest single growth step in bytes; doubling stops here
    pub max_growth_bytes: u64,

    /// Records moved per chunk by front truncation
    pub shift_chunk_records: usize,

    /// Shrink the file to the used size on close
    pub trim_on_close: bool,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            mode: OpenMode::OpenOrCreate,
            access: Access::ReadWrite,
            capacity_hint: 0,
            min_capacity: 256,
            max_growth_bytes: 1024 * 1024 * 1024, // 1 GiB
            shift_chunk_records: 1_000_000,
            trim_on_close: false,
        }
    }
}

impl ArrayConfig {
    /// Create a configuration with the given mode and access
    pub fn new(mode: OpenMode, access: Access) -> Self {
        Self {
            mode,
            access,
            ..Default::default()
        }
    }

    /// Configuration for a read-only attachment to an existing file
    pub fn reader() -> Self {
        Self::new(OpenMode::OpenExisting, Access::ReadOnly)
    }

    /// Set the initial capacity for new files
    #[must_use]
    pub const fn with_capacity_hint(mut self, records: u64) -> Self {
        self.capacity_hint = records;
        self
    }

    /// Set the smallest capacity a growth step produces
    #[must_use]
    pub const fn with_min_capacity(mut self, records: u64) -> Self {
        self.min_capacity = records;
        self
    }

    /// Set the largest single growth step
    #[must_use]
    pub const fn with_max_growth_bytes(mut self, bytes: u64) -> Self {
        self.max_growth_bytes = bytes;
        self
    }

    /// Set the number of records moved per front-truncation chunk
    #[must_use]
    pub const fn with_shift_chunk_records(mut self, records: usize) -> Self {
        self.shift_chunk_records = records;
        self
    }

    /// Shrink the file to the used size on close
    #[must_use]
    pub const fn with_trim_on_close(mut self, trim: bool) -> Self {
        self.trim_on_close = trim;
        self
    }

    /// Capacity after growing from `current` to hold at least `required`
    /// records of `width` bytes.
    pub fn grown_capacity(&self, current: u64, required: u64, width: usize) -> u64 {
        let max_step = (self.max_growth_bytes / width.max(1) as u64).max(1);
        let doubled = current.saturating_mul(2).min(current.saturating_add(max_step));
        required.max(doubled).max(self.min_capacity)
    }
}
