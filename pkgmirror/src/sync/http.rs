//! Blocking HTTP transfer into a staging file, with resume.
//!
//! A transfer writes into `{staging}/{clean}.part`. If that file already
//! exists from an interrupted run, its length is the resume offset and the
//! request carries `Range: bytes={offset}-`. A partial that is as long as or
//! longer than the advertised size (or whose target size is unknown) is
//! stale and the transfer restarts from zero.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::StatusCode;
use tracing::{debug, info};

use super::config::DEFAULT_TIMEOUT_SECS;
use super::error::{SyncError, SyncResult};

/// Buffer size for reading/writing during downloads (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Build the shared blocking client.
pub fn build_client(timeout: Duration) -> SyncResult<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("pkgmirror/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SyncError::InvalidConfig(format!("failed to create HTTP client: {}", e)))
}

/// Byte counts for one completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    /// Offset the transfer resumed from (0 for a fresh fetch).
    pub resumed_from: u64,
    /// Bytes received in this attempt.
    pub received: u64,
    /// Final length of the staging file.
    pub total: u64,
}

/// HTTP transport for single files.
#[derive(Debug, Clone)]
pub struct HttpDownloader {
    client: Client,
    pub(crate) timeout: Duration,
}

impl HttpDownloader {
    /// Create a downloader around an existing client.
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Create a downloader with its own client and the default timeout.
    pub fn with_default_timeout() -> SyncResult<Self> {
        let timeout = Duration::from_secs(DEFAULT_TIMEOUT_SECS);
        Ok(Self::new(build_client(timeout)?, timeout))
    }

    /// Get the file size from a URL via HEAD request.
    ///
    /// Returns 0 if the size cannot be determined.
    pub fn remote_size(&self, url: &str) -> u64 {
        self.client
            .head(url)
            .send()
            .ok()
            .filter(|r| r.status().is_success())
            .and_then(|r| {
                r.headers()
                    .get(CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
            })
            .unwrap_or(0)
    }

    /// Fetch `url` into `partial`, resuming when a usable partial exists.
    ///
    /// `total_size` is the size reported by HEAD, 0 when unknown. On error the
    /// partial file is left as is; the caller decides whether to keep it.
    pub fn fetch(&self, url: &str, partial: &Path, total_size: u64) -> SyncResult<TransferStats> {
        let existing = partial.metadata().map(|m| m.len()).unwrap_or(0);
        let offset = resume_offset(existing, total_size);

        if existing > 0 && offset == 0 {
            debug!(
                file = %partial.display(),
                existing,
                total_size,
                "Discarding stale partial download"
            );
            fs::remove_file(partial).map_err(|e| SyncError::WriteFailed {
                path: partial.to_path_buf(),
                source: e,
            })?;
        }

        let mut request = self.client.get(url);
        if offset > 0 {
            info!(url = %url, offset, total_size, "Resuming download");
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().map_err(|e| self.transport_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // A server that ignores Range answers 200 with the whole body
        let start = if offset > 0 && status == StatusCode::PARTIAL_CONTENT {
            offset
        } else {
            if offset > 0 {
                debug!(url = %url, "Range not honoured, restarting from zero");
            }
            0
        };

        let file = open_partial(partial, start)?;
        let received = self.stream_to_file(url, response, file, partial)?;

        Ok(TransferStats {
            resumed_from: start,
            received,
            total: start + received,
        })
    }

    /// Stream the response body to the staging file.
    fn stream_to_file(
        &self,
        url: &str,
        mut response: reqwest::blocking::Response,
        file: File,
        dest: &Path,
    ) -> SyncResult<u64> {
        let mut writer = BufWriter::new(file);
        let mut buffer = vec![0u8; BUFFER_SIZE];
        let mut received = 0u64;

        loop {
            let bytes_read = response
                .read(&mut buffer)
                .map_err(|e| SyncError::Transport {
                    url: url.to_string(),
                    reason: format!("read error: {}", e),
                })?;

            if bytes_read == 0 {
                break;
            }

            writer
                .write_all(&buffer[..bytes_read])
                .map_err(|e| SyncError::WriteFailed {
                    path: dest.to_path_buf(),
                    source: e,
                })?;

            received += bytes_read as u64;
        }

        writer.flush().map_err(|e| SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;

        Ok(received)
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> SyncError {
        SyncError::from_reqwest(url, err, self.timeout.as_secs())
    }
}

/// Offset to resume from, given the partial length and the size reported by HEAD.
///
/// Resuming needs a known size strictly larger than what is on disk.
pub fn resume_offset(existing: u64, total_size: u64) -> u64 {
    if existing > 0 && total_size > 0 && existing < total_size {
        existing
    } else {
        0
    }
}

/// Open the partial for appending at `start`, or truncate it when `start` is 0.
fn open_partial(partial: &Path, start: u64) -> SyncResult<File> {
    if let Some(parent) = partial.parent() {
        fs::create_dir_all(parent).map_err(|e| SyncError::CreateDirFailed {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    let result = if start > 0 {
        OpenOptions::new().append(true).open(partial)
    } else {
        File::create(partial)
    };

    result.map_err(|e| SyncError::WriteFailed {
        path: partial.to_path_buf(),
        source: e,
    })
}
