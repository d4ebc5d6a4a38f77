//! CLI error type.

use pkgmirror::config::ConfigError;
use pkgmirror::sync::SyncError;
use thiserror::Error;

/// Errors surfaced to the user by a CLI command.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    ConfigFile(#[from] ConfigError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("{0} file(s) failed verification")]
    Verification(usize),
}
