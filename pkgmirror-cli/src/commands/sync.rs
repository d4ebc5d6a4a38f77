//! Sync command - mirror packages and organize the store.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use pkgmirror::config::ConfigFile;
use pkgmirror::sync::{normalize_base_url, read_packages, read_source, SyncConfig, SyncDriver};
use tracing::info;

use super::args::PathArgs;
use crate::error::CliError;
use crate::output;

/// Arguments for the sync command.
#[derive(Debug, Clone, Default, Args)]
pub struct SyncArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Packages to mirror instead of the package list file
    pub packages: Vec<String>,

    /// Base index URL instead of the source file
    #[arg(long)]
    pub index_url: Option<String>,

    /// File holding the base index URL
    #[arg(long)]
    pub source_file: Option<PathBuf>,

    /// File listing one package per line
    #[arg(long)]
    pub packages_file: Option<PathBuf>,

    /// Concurrent downloads per package
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip checking downloads against `#sha256=` URL fragments
    #[arg(long)]
    pub no_verify_digests: bool,
}

impl SyncArgs {
    pub fn resolve(&self, file: &ConfigFile) -> SyncConfig {
        let mut config = self.paths.resolve(file);

        if let Some(path) = &self.source_file {
            config.source_file = path.clone();
        }
        if let Some(path) = &self.packages_file {
            config.packages_file = path.clone();
        }
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = self.timeout {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if self.no_verify_digests {
            config = config.with_verify_digests(false);
        }
        config
    }
}

/// Run the sync command.
pub fn run(args: SyncArgs, file: &ConfigFile) -> Result<(), CliError> {
    let config = args.resolve(file);

    let base_url = match &args.index_url {
        Some(url) => normalize_base_url(url.trim()),
        None => read_source(&config.source_file)?,
    };
    let packages = if args.packages.is_empty() {
        read_packages(&config.packages_file)?
    } else {
        args.packages.clone()
    };

    if packages.is_empty() {
        return Err(CliError::Config(format!(
            "No packages to mirror. Add names to {} or pass them as arguments.",
            config.packages_file.display()
        )));
    }

    info!(
        store = %config.store_dir.display(),
        workers = config.workers,
        "Mirroring {} package(s)",
        packages.len()
    );

    let driver = SyncDriver::new(config)?;
    let report = driver.sync(&base_url, &packages);

    println!();
    output::print_sync_report(&report);
    Ok(())
}
