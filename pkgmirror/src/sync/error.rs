//! Error types for the sync engine.
//!
//! Nothing here is fatal to a run: the driver logs each error against the URL
//! or package it belongs to and moves on to the next unit of work.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while mirroring package files.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection-level failure talking to the index.
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The request did not complete within the client timeout.
    #[error("request to {url} timed out after {timeout_secs}s")]
    Timeout { url: String, timeout_secs: u64 },

    /// The index answered with a non-success status.
    #[error("request to {url} returned status {status}")]
    Status { url: String, status: u16 },

    /// A listing page contained no archive links.
    #[error("no archive links found for package {package}")]
    NoLinks { package: String },

    /// The progress file could not be read or written.
    #[error("progress file {}: {reason}", path.display())]
    Persistence { path: PathBuf, reason: String },

    /// A recomputed digest disagrees with the expected one.
    #[error("checksum mismatch for {filename}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        filename: String,
        expected: String,
        actual: String,
    },

    /// Failed to read a file or directory.
    #[error("failed to read {}: {source}", path.display())]
    ReadFailed { path: PathBuf, source: io::Error },

    /// Failed to write, rename or remove a file.
    #[error("failed to write {}: {source}", path.display())]
    WriteFailed { path: PathBuf, source: io::Error },

    /// Failed to create a directory.
    #[error("failed to create directory {}: {source}", path.display())]
    CreateDirFailed { path: PathBuf, source: io::Error },

    /// Invalid configuration or input file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SyncError {
    /// Build a transport error from a reqwest failure, separating timeouts.
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                url: url.to_string(),
                timeout_secs,
            }
        } else if let Some(status) = err.status() {
            Self::Status {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            Self::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }

    /// Whether the error came from the network rather than local state.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::Status { .. }
        )
    }
}
