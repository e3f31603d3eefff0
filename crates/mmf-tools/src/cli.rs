//! Command-line interface definition.

use clap::{Parser, Subcommand};
use mmf_array::migrate::DEFAULT_CHUNK_SIZE;
use std::path::PathBuf;

/// Inspect, scan and migrate memory-mapped array files.
#[derive(Debug, Parser)]
#[command(name = "mmf", about = "Tools for memory-mapped array files", version)]
pub struct Cli {
    /// Log filter, e.g. `debug` or `mmf_array=trace`
    #[arg(long, global = true, env = "MMF_LOG", default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the header, capacity and first and last values of a file
    Info {
        /// File to inspect
        file: PathBuf,

        /// Number of values to show from each end
        #[arg(long, default_value_t = 10)]
        values: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Summarize every array file under a directory
    Scan {
        /// Directory to scan
        dir: PathBuf,

        /// File extensions to include
        #[arg(long = "ext", default_values_t = ["bt".to_string(), "mmf".to_string()])]
        extensions: Vec<String>,

        /// Report sizes in decimal GB instead of GiB
        #[arg(long)]
        decimal: bool,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Rewrite a packed odd-width file at the next standard width
    Migrate {
        /// File to migrate
        source: PathBuf,

        /// Output file; omit together with --in-place to replace the source
        destination: Option<PathBuf>,

        /// Records copied per chunk
        #[arg(long, env = "MMF_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Replace the source with the migrated file
        #[arg(long, conflicts_with = "destination")]
        in_place: bool,
    },

    /// Report how much of its type's range an integer file uses
    Utilization {
        /// File to inspect
        file: PathBuf,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_migrate_arguments() {
        let cli = Cli::try_parse_from(["mmf", "migrate", "a.bt", "--in-place", "--chunk-size", "64"])
            .unwrap();
        match cli.command {
            Command::Migrate {
                source,
                destination,
                chunk_size,
                in_place,
            } => {
                assert_eq!(source, PathBuf::from("a.bt"));
                assert!(destination.is_none());
                assert_eq!(chunk_size, 64);
                assert!(in_place);
            }
            other => panic!("unexpected command {other:?}"),
        }

        assert!(Cli::try_parse_from(["mmf", "migrate", "a.bt", "b.bt", "--in-place"]).is_err());
    }

    #[test]
    fn test_scan_defaults() {
        let cli = Cli::try_parse_from(["mmf", "scan", "/data"]).unwrap();
        match cli.command {
            Command::Scan {
                extensions,
                decimal,
                json,
                ..
            } => {
                assert_eq!(extensions, ["bt", "mmf"]);
                assert!(!decimal);
                assert!(!json);
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert_eq!(cli.log, "info");
    }
}
