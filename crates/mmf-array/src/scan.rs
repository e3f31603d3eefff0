//! Directory scanner for array files.
//!
//! Reads only the 16-byte headers, so scanning a large data tree is cheap.
//! The report shows how data is spread over record types and how much
//! disk the packed widths save over the standard widths they would
//! otherwise need.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::data_type::DataType;
use crate::header::FileHeader;
use crate::{ARRAY_EXTENSION, Result, SERIES_EXTENSION};

/// Extensions scanned when the caller does not choose.
pub const DEFAULT_EXTENSIONS: [&str; 2] = [SERIES_EXTENSION, ARRAY_EXTENSION];

/// Totals for one record type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TypeSummary {
    /// Files holding this type.
    pub files: u64,
    /// Records across those files.
    pub items: u64,
    /// Bytes on disk across those files.
    pub bytes: u64,
    /// Bytes saved over the standard-width target, odd widths only.
    pub saved_bytes: u64,
}

/// Result of [`scan_directory`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Directory that was scanned.
    pub root: PathBuf,
    /// Files with a readable header.
    pub total_files: u64,
    /// Bytes on disk of those files.
    pub total_bytes: u64,
    /// Matching files whose header could not be read.
    pub skipped_files: u64,
    /// Totals per record type.
    pub by_type: BTreeMap<DataType, TypeSummary>,
    /// Files stored in a packed odd width.
    pub odd_width_files: u64,
    /// Bytes the odd-width files save over their standard-width targets.
    pub bytes_saved: u64,
}

impl ScanReport {
    fn record(&mut self, header: &FileHeader, file_len: u64) {
        let items = header.count.unsigned_abs();
        self.total_files += 1;
        self.total_bytes += file_len;

        let summary = self.by_type.entry(header.data_type).or_default();
        summary.files += 1;
        summary.items += items;
        summary.bytes += file_len;

        if let (Some(width), Some(target)) = (
            header.data_type.element_width(),
            header
                .data_type
                .migration_target()
                .and_then(DataType::element_width),
        ) {
            let saved = items * (target - width) as u64;
            summary.saved_bytes += saved;
            self.odd_width_files += 1;
            self.bytes_saved += saved;
        }
    }
}

/// Walk `root` and summarize every file whose extension is in `extensions`.
///
/// Extensions are compared without the leading dot and case-insensitively.
/// Files with unreadable or invalid headers are logged and skipped.
pub fn scan_directory(root: &Path, extensions: &[&str]) -> Result<ScanReport> {
    // Surface a missing root as an error instead of an empty report.
    std::fs::metadata(root)?;

    let mut report = ScanReport {
        root: root.to_path_buf(),
        ..ScanReport::default()
    };

    for entry in walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("skipping unreadable entry: {e}");
                None
            }
        })
    {
        if !entry.file_type().is_file() || !has_extension(entry.path(), extensions) {
            continue;
        }
        let path = entry.path();
        let header = match FileHeader::read_from_path(path) {
            Ok(header) => header,
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                report.skipped_files += 1;
                continue;
            }
        };
        let file_len = match entry.metadata() {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("skipping {}: {e}", path.display());
                report.skipped_files += 1;
                continue;
            }
        };
        debug!("{}: {} x {}", path.display(), header.count, header.data_type);
        report.record(&header, file_len);
    }

    info!(
        "scanned {}: {} files, {} bytes, {} odd-width",
        root.display(),
        report.total_files,
        report.total_bytes,
        report.odd_width_files
    );
    Ok(report)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::array::MappedArray;
    use crate::config::ArrayConfig;
    use crate::record::{Int40, UInt24};

    fn write<T: crate::record::Record>(path: &Path, values: &[T]) {
        let config = ArrayConfig::default().with_capacity_hint(values.len() as u64);
        let mut array = MappedArray::<T>::open_with_config(path, &config).unwrap();
        array.extend_from_slice(values).unwrap();
        array.close().unwrap();
    }

    #[test]
    fn test_scan_summarizes_types() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("eurusd");
        std::fs::create_dir(&nested).unwrap();

        write(&dir.path().join("volume.bt"), &[UInt24::new(1).unwrap(); 10]);
        write(&nested.join("price.BT"), &[Int40::new(-1).unwrap(); 4]);
        write(&nested.join("time.mmf"), &[1i64, 2, 3]);
        std::fs::write(nested.join("notes.txt"), b"ignored").unwrap();
        std::fs::write(nested.join("broken.bt"), b"short").unwrap();

        let report = scan_directory(dir.path(), &DEFAULT_EXTENSIONS).unwrap();
        assert_eq!(report.total_files, 3);
        assert_eq!(report.skipped_files, 1);
        assert_eq!(report.total_bytes, (16 + 30) + (16 + 20) + (16 + 24));
        assert_eq!(report.odd_width_files, 2);
        // 10 x (4 - 3) + 4 x (8 - 5)
        assert_eq!(report.bytes_saved, 22);
        assert_eq!(
            report.by_type[&DataType::UInt24AsInt64],
            TypeSummary {
                files: 1,
                items: 10,
                bytes: 46,
                saved_bytes: 10,
            }
        );
        assert_eq!(report.by_type[&DataType::Int64].items, 3);
    }

    #[test]
    fn test_extension_filter() {
        assert!(has_extension(Path::new("a/b.bt"), &["bt"]));
        assert!(has_extension(Path::new("a/b.MMF"), &[".mmf"]));
        assert!(!has_extension(Path::new("a/b"), &["bt"]));
        assert!(!has_extension(Path::new("a/b.bt.migrating"), &["bt"]));
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(scan_directory(&dir.path().join("nope"), &DEFAULT_EXTENSIONS).is_err());
    }
}
