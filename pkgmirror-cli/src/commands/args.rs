//! Arguments shared by every subcommand.

use std::path::PathBuf;

use clap::Args;
use pkgmirror::config::ConfigFile;
use pkgmirror::sync::SyncConfig;

/// Mirror layout overrides. Each flag beats the matching config file key.
#[derive(Debug, Clone, Default, Args)]
pub struct PathArgs {
    /// Mirror root; `sync/` and `pypi/` live beneath it
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Staging directory for in-flight and fresh downloads
    #[arg(long)]
    pub staging_dir: Option<PathBuf>,

    /// Canonical store directory (one subdirectory per package)
    #[arg(long)]
    pub store_dir: Option<PathBuf>,

    /// Progress file recording completed transfers
    #[arg(long)]
    pub progress_file: Option<PathBuf>,
}

impl PathArgs {
    /// Resolve the engine configuration: CLI > config file > defaults.
    pub fn resolve(&self, file: &ConfigFile) -> SyncConfig {
        let mut file = file.clone();
        let section = &mut file.sync;

        if self.root.is_some() {
            section.root = self.root.clone();
        }
        if self.staging_dir.is_some() {
            section.staging_dir = self.staging_dir.clone();
        }
        if self.store_dir.is_some() {
            section.store_dir = self.store_dir.clone();
        }
        if self.progress_file.is_some() {
            section.progress_file = self.progress_file.clone();
        }

        file.to_sync_config()
    }
}
