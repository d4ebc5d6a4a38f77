//! pkgmirror CLI - Command-line interface
//!
//! This binary drives the pkgmirror library: it loads the config file, sets
//! up logging and dispatches to one subcommand.

mod commands;
mod error;
mod output;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use pkgmirror::config::ConfigFile;
use pkgmirror::logging::init_logging;

use commands::{PathArgs, SyncArgs};
use error::CliError;

#[derive(Debug, Parser)]
#[command(name = "pkgmirror", version, about = "Resumable mirror for package index archives")]
struct Cli {
    /// Configuration file (default: ~/.config/pkgmirror/config.ini)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Mirror every listed package, then organize the store
    Sync(SyncArgs),

    /// Strip digest suffixes and move staged files into package directories
    Organize(PathArgs),

    /// Re-hash recorded files and report mismatches
    Verify(PathArgs),

    /// Show progress store totals
    Status(PathArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => ConfigFile::load_from(path)?,
        None => ConfigFile::load()?,
    };

    let mut log_config = config.logging.clone();
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Some(path) = cli.log_file {
        log_config = log_config.with_file(path);
    }
    let _log_guard = init_logging(&log_config);

    match cli.command {
        Commands::Sync(args) => commands::sync::run(args, &config),
        Commands::Organize(args) => commands::organize::run(args, &config),
        Commands::Verify(args) => commands::verify::run(args, &config),
        Commands::Status(args) => commands::status::run(args, &config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_sync_with_overrides() {
        let cli = Cli::try_parse_from([
            "pkgmirror",
            "-v",
            "sync",
            "--root",
            "/srv/mirror",
            "--workers",
            "4",
            "numpy",
            "requests",
        ])
        .unwrap();

        assert!(cli.verbose);
        match cli.command {
            Commands::Sync(args) => {
                assert_eq!(args.paths.root, Some(PathBuf::from("/srv/mirror")));
                assert_eq!(args.workers, Some(4));
                assert_eq!(args.packages, vec!["numpy", "requests"]);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_status_with_global_config() {
        let cli = Cli::try_parse_from(["pkgmirror", "status", "--config", "/etc/pkgmirror.ini"])
            .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/pkgmirror.ini")));
        assert!(matches!(cli.command, Commands::Status(_)));
    }
}
