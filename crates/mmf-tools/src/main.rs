//! `mmf` command-line entry point.
//!
//! Thin wrapper over the mmf-array library:
//! 1. Parses command-line arguments
//! 2. Initializes logging
//! 3. Runs the requested subcommand

mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

use crate::cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --log when set.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Info { file, values, json } => {
            let info = commands::file_info(&file, values)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&info)?);
            } else {
                print!("{}", commands::format_info(&info));
            }
        }
        Command::Scan {
            dir,
            extensions,
            decimal,
            json,
        } => {
            let report = commands::scan(&dir, &extensions)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", commands::format_scan(&report, decimal));
            }
        }
        Command::Migrate {
            source,
            destination,
            chunk_size,
            in_place,
        } => {
            let report =
                commands::migrate(&source, destination.as_deref(), chunk_size, in_place)?;
            print!("{}", commands::format_migration(&report));
        }
        Command::Utilization { file, json } => {
            let status = commands::utilization(&file)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else {
                println!("{}: {status}", file.display());
            }
        }
    }

    Ok(())
}
