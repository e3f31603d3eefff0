//! Subcommand implementations.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use mmf_array::monitor::{file_utilization, open_int64_reader};
use mmf_array::{
    Access, DataType, FileHeader, LoggingProgress, MappedArray, MigrationOptions, OpenMode,
    ReadOnlyList, ScanReport, migrate_in_place, migrate_odd_width, scan_directory,
};
use serde::Serialize;
use tracing::info;

/// Everything `mmf info` reports about a file.
#[derive(Debug, Serialize)]
pub struct FileInfo {
    /// Inspected file.
    pub path: PathBuf,
    /// Format version.
    pub version: i32,
    /// Record type.
    pub data_type: DataType,
    /// Valid records.
    pub count: i64,
    /// Size on disk.
    pub file_bytes: u64,
    /// Records that fit in the file, when the type has a fixed width.
    pub capacity: Option<u64>,
    /// Leading values, integer and float types only.
    pub head: Vec<String>,
    /// Trailing values, integer and float types only.
    pub tail: Vec<String>,
}

/// Read the header and a few values of `path`.
pub fn file_info(path: &Path, values: usize) -> Result<FileInfo> {
    let header = FileHeader::read_from_path(path)
        .with_context(|| format!("Failed to read header of {}", path.display()))?;
    let file_bytes = std::fs::metadata(path)?.len();
    let capacity = header
        .data_type
        .element_width()
        .map(|width| file_bytes.saturating_sub(16) / width as u64);

    let (head, tail) = match header.data_type {
        DataType::Single => sample_floats::<f32>(path, values)?,
        DataType::Double => sample_floats::<f64>(path, values)?,
        data_type if data_type.element_width().is_some() => match open_int64_reader(path) {
            Ok(reader) => sample::<i64, _>(&*reader, values)?,
            Err(e) => {
                info!("not showing values of {}: {e}", path.display());
                (Vec::new(), Vec::new())
            }
        },
        _ => (Vec::new(), Vec::new()),
    };

    Ok(FileInfo {
        path: path.to_path_buf(),
        version: header.version,
        data_type: header.data_type,
        count: header.count,
        file_bytes,
        capacity,
        head,
        tail,
    })
}

type Sample = (Vec<String>, Vec<String>);

fn sample<T, L>(list: &L, values: usize) -> Result<Sample>
where
    T: Clone + ToString,
    L: ReadOnlyList<T> + ?Sized,
{
    let len = list.len();
    let head_len = values.min(len);
    let tail_start = len.saturating_sub(values).max(head_len);
    let head = list.range(0, head_len)?.iter().map(ToString::to_string).collect();
    let tail = list
        .range(tail_start, len - tail_start)?
        .iter()
        .map(ToString::to_string)
        .collect();
    Ok((head, tail))
}

fn sample_floats<T>(path: &Path, values: usize) -> Result<Sample>
where
    T: mmf_array::Record + ToString,
{
    let array = MappedArray::<T>::open(path, OpenMode::OpenExisting, 0, Access::ReadOnly)?;
    sample::<T, _>(&array, values)
}

/// Render `mmf info` output.
pub fn format_info(info: &FileInfo) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "File: {}", info.path.display());
    let _ = writeln!(out, "Version: {}", info.version);
    let _ = writeln!(
        out,
        "Data type: {} ({})",
        info.data_type,
        info.data_type.tag()
    );
    let _ = writeln!(out, "Count: {}", info.count);
    let _ = writeln!(out, "File size: {}", format_bytes(info.file_bytes));
    if let Some(capacity) = info.capacity {
        let _ = writeln!(out, "Capacity: {capacity}");
    }
    if !info.head.is_empty() {
        let _ = writeln!(out, "First values: {}", info.head.join(", "));
    }
    if !info.tail.is_empty() {
        let _ = writeln!(out, "Last values: {}", info.tail.join(", "));
    }
    out
}

/// Scan `dir` for files with the given extensions.
pub fn scan(dir: &Path, extensions: &[String]) -> Result<ScanReport> {
    let extensions: Vec<&str> = extensions.iter().map(String::as_str).collect();
    scan_directory(dir, &extensions).with_context(|| format!("Failed to scan {}", dir.display()))
}

/// Render a scan report as text.
pub fn format_scan(report: &ScanReport, decimal: bool) -> String {
    let (divisor, unit) = if decimal {
        (1_000_000_000.0, "GB")
    } else {
        (1024.0 * 1024.0 * 1024.0, "GiB")
    };
    let size = |bytes: u64| bytes as f64 / divisor;

    let mut out = String::new();
    let _ = writeln!(out, "Base directory: {}", report.root.display());
    let _ = writeln!(out, "Files: {}", report.total_files);
    if report.skipped_files > 0 {
        let _ = writeln!(out, "Skipped: {}", report.skipped_files);
    }
    let _ = writeln!(
        out,
        "Total size: {} ({:.2} {unit})",
        format_bytes(report.total_bytes),
        size(report.total_bytes)
    );
    let _ = writeln!(out);
    let _ = writeln!(out, "By data type:");
    for (data_type, summary) in &report.by_type {
        let _ = writeln!(
            out,
            "  {:2} {:16} files={:>8} items={:>14} size={:>10.2} {unit}",
            data_type.tag(),
            data_type.name(),
            summary.files,
            summary.items,
            size(summary.bytes)
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Odd-width files: {}", report.odd_width_files);
    let _ = writeln!(
        out,
        "Saved by odd widths: {} ({:.2} {unit})",
        format_bytes(report.bytes_saved),
        size(report.bytes_saved)
    );
    for data_type in DataType::ODD_WIDTH {
        let saved = report
            .by_type
            .get(&data_type)
            .map_or(0, |summary| summary.saved_bytes);
        let width = data_type.element_width().unwrap_or(0);
        let fallback = data_type
            .migration_target()
            .and_then(DataType::element_width)
            .unwrap_or(0);
        let _ = writeln!(
            out,
            "  {:2} {:16} elem={width}B fallback={fallback}B saved={}",
            data_type.tag(),
            data_type.name(),
            format_bytes(saved)
        );
    }
    out
}

/// Migrate `source`, either into `destination` or in place.
pub fn migrate(
    source: &Path,
    destination: Option<&Path>,
    chunk_size: usize,
    in_place: bool,
) -> Result<mmf_array::MigrationReport> {
    let options = MigrationOptions::default().with_chunk_size(chunk_size);
    let mut progress = LoggingProgress::new();
    let report = match (destination, in_place) {
        (Some(destination), false) => {
            migrate_odd_width(source, destination, &options, Some(&mut progress))
        }
        (None, true) => migrate_in_place(source, &options, Some(&mut progress)),
        (None, false) => bail!("a destination is required unless --in-place is given"),
        (Some(_), true) => bail!("--in-place does not take a destination"),
    }
    .with_context(|| format!("Failed to migrate {}", source.display()))?;
    Ok(report)
}

/// Render a migration report as text.
pub fn format_migration(report: &mmf_array::MigrationReport) -> String {
    format!(
        "Migrated {} records of {} to {} in {}\nSize: {} -> {}\n",
        report.count,
        report.source_type,
        report.target_type,
        report.destination.display(),
        format_bytes(report.bytes_before),
        format_bytes(report.bytes_after)
    )
}

/// Utilization status of an integer file.
pub fn utilization(path: &Path) -> Result<mmf_array::UtilizationStatus> {
    file_utilization(path)
        .with_context(|| format!("Failed to compute utilization of {}", path.display()))
}

/// Byte count with thousands separators.
pub fn format_bytes(bytes: u64) -> String {
    let digits = bytes.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 2);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out.push_str(" B");
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use mmf_array::ArrayConfig;
    use mmf_array::record::UInt24;
    use pretty_assertions::assert_eq;

    fn write_uint24(path: &Path, values: &[i64]) {
        let config = ArrayConfig::default().with_capacity_hint(values.len() as u64);
        let mut array = MappedArray::<UInt24>::open_with_config(path, &config).unwrap();
        for &v in values {
            array.push(UInt24::new(v).unwrap()).unwrap();
        }
        array.close().unwrap();
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(999), "999 B");
        assert_eq!(format_bytes(1000), "1,000 B");
        assert_eq!(format_bytes(1_234_567), "1,234,567 B");
    }

    #[test]
    fn test_info_samples_both_ends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("v.bt");
        write_uint24(&path, &(0..25).collect::<Vec<_>>());

        let info = file_info(&path, 3).unwrap();
        assert_eq!(info.data_type, DataType::UInt24AsInt64);
        assert_eq!(info.count, 25);
        assert_eq!(info.capacity, Some(25));
        assert_eq!(info.head, ["0", "1", "2"]);
        assert_eq!(info.tail, ["22", "23", "24"]);

        let text = format_info(&info);
        assert!(text.contains("Data type: UInt24AsInt64 (18)"));
        assert!(text.contains("Last values: 22, 23, 24"));
    }

    #[test]
    fn test_info_short_file_does_not_repeat_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("v.bt");
        write_uint24(&path, &[7, 8]);
        let info = file_info(&path, 10).unwrap();
        assert_eq!(info.head, ["7", "8"]);
        assert!(info.tail.is_empty());
    }

    #[test]
    fn test_migrate_requires_target() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("v.bt");
        write_uint24(&path, &[1, 2, 3]);
        assert!(migrate(&path, None, 10, false).is_err());

        let report = migrate(&path, None, 2, true).unwrap();
        assert_eq!(report.target_type, DataType::UInt32);
        assert!(format_migration(&report).contains("Migrated 3 records"));
        assert_eq!(utilization(&path).unwrap().observed_max, 3);
    }

    #[test]
    fn test_scan_text_lists_all_odd_widths() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_uint24(&dir.path().join("v.bt"), &[1, 2]);
        let report = scan(dir.path(), &["bt".to_string()]).unwrap();
        let text = format_scan(&report, true);
        assert!(text.contains("Files: 1"));
        assert!(text.contains("GB"));
        for data_type in DataType::ODD_WIDTH {
            assert!(text.contains(data_type.name()));
        }
    }
}
