//! Growable memory-mapped arrays of fixed-width numeric records.
//!
//! A file holds a 16-byte header followed by densely packed records. The
//! writer appends through a [`MappedArray`], which grows the file and remaps
//! it when capacity runs out; any number of readers map the same file and
//! observe new appends without coordination.
//!
//! Besides the native integer and float widths, the crate stores 24, 40, 48
//! and 56-bit integers in exactly 3, 5, 6 and 7 bytes. Those packed records
//! widen to `i64` through the [`convert`] engine, and the [`monitor`] module
//! watches how much of a narrow width is actually in use so that a
//! [`migrate`] to a standard width can be scheduled before values overflow.
//!
//! # File layout
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0x00   | 4    | Version (i32) |
//! | 0x04   | 4    | Data type tag (i32) |
//! | 0x08   | 8    | Count (i64) |
//! | 0x10   | ...  | Records, `capacity x width` bytes allocated |
//!
//! # Example
//!
//! ```rust,no_run
//! use mmf_array::{Access, MappedArray, OpenMode, record::Int40};
//!
//! # fn example() -> mmf_array::Result<()> {
//! let mut prices = MappedArray::<Int40>::open("prices.bt", OpenMode::OpenOrCreate, 1024, Access::ReadWrite)?;
//! prices.push(Int40::new(-549_755_813_888)?)?;
//!
//! let last = prices.get(prices.len() - 1)?;
//! assert_eq!(i64::from(last), -549_755_813_888);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::must_use_candidate)]

use thiserror::Error;

// Record types and the on-disk tag registry
pub mod data_type;
pub mod record;

// Width conversion engine
pub mod convert;

// File header
pub mod header;

// Configuration
pub mod config;

// Mapping layer shared by the array layouts
pub mod mapping;

// Typed arrays
pub mod array;
pub mod bit_array;

// Progress and cancellation collaborator
pub mod progress;

// Read-only views
pub mod view;

// Maintenance
pub mod migrate;
pub mod monitor;
pub mod scan;

pub use array::MappedArray;
pub use bit_array::MappedBitArray;
pub use config::{Access, ArrayConfig, OpenMode};
pub use convert::ConversionKind;
pub use data_type::DataType;
pub use header::FileHeader;
pub use mapping::PinnedRange;
pub use migrate::{MigrationOptions, MigrationReport, migrate_in_place, migrate_odd_width};
pub use monitor::{Int64Adapter, UtilizationStatus};
pub use progress::{LoggingProgress, Progress};
pub use record::Record;
pub use scan::{ScanReport, scan_directory};
pub use view::ReadOnlyList;

/// Result type for array operations.
pub type Result<T> = std::result::Result<T, ArrayError>;

/// Errors that can occur while opening, growing or converting arrays.
#[derive(Debug, Error)]
pub enum ArrayError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An index or value fell outside the permitted range.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// The file header does not match what the caller expects.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Growth was required but is disallowed or unrepresentable.
    #[error("Capacity error: {0}")]
    Capacity(String),

    /// A required collaborator was not supplied.
    #[error("Missing callback: {0}")]
    MissingCallback(String),

    /// A pinned range was issued against an older mapping.
    #[error("Stale mapping: range pinned at generation {pinned}, mapping is at {current}")]
    StaleMapping {
        /// Generation the range was pinned under.
        pinned: u64,
        /// Generation of the live mapping.
        current: u64,
    },

    /// The progress collaborator asked to stop.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// A write was attempted through a read-only handle.
    #[error("Read-only: {0}")]
    ReadOnly(String),

    /// Another writer holds the file.
    #[error("File locked: {0}")]
    Locked(String),

    /// The operation is not defined for this record type.
    #[error("Unsupported: {0}")]
    Unsupported(String),
}

/// Version information for the library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// File extension used by time-series producers.
pub const SERIES_EXTENSION: &str = "bt";

/// Generic file extension.
pub const ARRAY_EXTENSION: &str = "mmf";
