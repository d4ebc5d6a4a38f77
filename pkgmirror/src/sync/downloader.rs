//! Dedup-aware download of one source URL into the staging directory.
//!
//! ```text
//! clean filename ──► FilenameIndex hit?
//!      │                 ├── Remote(origin) ─► verify on-disk copy once per run
//!      │                 │                      ├── ok ─► AlreadyPresent / Aliased
//!      │                 │                      └── mismatch or missing ─► fetch
//!      │                 └── Local(path) ─► check against #sha256 fragment if any
//!      │                                        ├── ok ─► Verified (record written)
//!      │                                        ├── no fragment ─► AlreadyPresent
//!      │                                        └── mismatch ─► fetch
//!      └── miss ─► HEAD size ─► GET (Range when resuming) ─► hash ─► rename
//!                   ─► record + index update
//! ```
//!
//! A failed fetch deletes the `.part` file, so the next run starts that URL
//! from zero. Only an interrupted process leaves a partial behind to resume.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::checksum::{calculate_file_checksum, verify_checksum, verify_record};
use super::error::{SyncError, SyncResult};
use super::filename::{clean_filename, digest_fragment, partial_name};
use super::http::{HttpDownloader, TransferStats};
use super::index::{FilenameIndex, Location};
use super::progress::{ProgressStore, TransferRecord};

/// What a single download call ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Bytes were transferred and a record written.
    Downloaded { bytes: u64, resumed_from: u64 },
    /// The artifact was already present; nothing changed.
    AlreadyPresent,
    /// Another URL already fetched this artifact; its record was copied.
    Aliased { origin: String },
    /// A directory-discovered file matched the URL's digest and was recorded.
    Verified,
}

impl DownloadOutcome {
    /// Whether this outcome moved bytes over the network.
    pub fn transferred(&self) -> bool {
        matches!(self, DownloadOutcome::Downloaded { .. })
    }
}

/// Downloads URLs into staging, consulting and updating the shared state.
#[derive(Debug)]
pub struct Downloader {
    http: HttpDownloader,
    store: Arc<ProgressStore>,
    index: Arc<FilenameIndex>,
    staging_dir: PathBuf,
    canonical_dir: PathBuf,
    verify_digests: bool,
    /// Clean filenames whose on-disk copy is known good for this run.
    verified: Mutex<HashSet<String>>,
}

impl Downloader {
    pub fn new(
        http: HttpDownloader,
        store: Arc<ProgressStore>,
        index: Arc<FilenameIndex>,
        staging_dir: PathBuf,
        canonical_dir: PathBuf,
    ) -> Self {
        Self {
            http,
            store,
            index,
            staging_dir,
            canonical_dir,
            verify_digests: true,
            verified: Mutex::new(HashSet::new()),
        }
    }

    /// Enable or disable checking downloads against `#sha256=` fragments.
    pub fn with_verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Ensure the artifact behind `url` is present, fetching it if needed.
    pub fn download(&self, url: &str) -> SyncResult<DownloadOutcome> {
        let clean = clean_filename(url);

        if let Some(outcome) = self.check_existing(url, &clean) {
            return Ok(outcome);
        }

        self.transfer(url, &clean)
    }

    /// Dedup check. `None` means the URL must be fetched.
    fn check_existing(&self, url: &str, clean: &str) -> Option<DownloadOutcome> {
        match self.index.resolve(clean)? {
            Location::Remote(origin) => {
                let record = self.store.get(&origin).filter(TransferRecord::is_completed)?;
                if !self.ensure_on_disk(clean, &record) {
                    return None;
                }

                if origin == url {
                    debug!(file = %clean, "Already downloaded, skipping");
                    return Some(DownloadOutcome::AlreadyPresent);
                }

                if !self.store.is_completed(url) {
                    self.store.record(url, record);
                }
                info!(file = %clean, origin = %origin, "Already downloaded under another URL, recorded alias");
                Some(DownloadOutcome::Aliased { origin })
            }
            Location::Local(path) => self.adopt_local(url, clean, &path),
        }
    }

    /// Verify a recorded file's on-disk copy, once per clean filename per run.
    fn ensure_on_disk(&self, clean: &str, record: &TransferRecord) -> bool {
        if self.verified.lock().contains(clean) {
            return true;
        }

        match verify_record(record, &self.staging_dir, &self.canonical_dir) {
            Ok(Some(path)) => {
                debug!(file = %path.display(), "Verified existing download");
                self.verified.lock().insert(clean.to_string());
                true
            }
            Ok(None) => {
                warn!(file = %clean, "Recorded file missing from disk, downloading again");
                false
            }
            Err(e) => {
                warn!(file = %clean, error = %e, "Existing file failed verification, downloading again");
                false
            }
        }
    }

    /// Handle a file found on disk with no transfer record.
    ///
    /// A digest is only ever recorded after checking the file against the
    /// URL's own `#sha256=` fragment; without one the file is accepted as is
    /// and left unrecorded.
    fn adopt_local(&self, url: &str, clean: &str, path: &Path) -> Option<DownloadOutcome> {
        let expected = digest_fragment(url).filter(|d| d.is_sha256() && self.verify_digests);
        let Some(expected) = expected else {
            debug!(file = %clean, path = %path.display(), "Found on disk, skipping");
            return Some(DownloadOutcome::AlreadyPresent);
        };

        match verify_checksum(path, &expected.hex) {
            Ok(hash) => {
                let size = path.metadata().map(|m| m.len()).unwrap_or(0);
                self.store
                    .record(url, TransferRecord::completed(hash, size, clean));
                self.index
                    .insert(clean, Location::Remote(url.to_string()));
                self.verified.lock().insert(clean.to_string());
                info!(file = %clean, "Found on disk and verified, recorded");
                Some(DownloadOutcome::Verified)
            }
            Err(e) => {
                warn!(file = %clean, error = %e, "On-disk copy does not match URL digest, downloading again");
                None
            }
        }
    }

    /// Fetch into `{clean}.part`, verify, and promote to `{clean}`.
    fn transfer(&self, url: &str, clean: &str) -> SyncResult<DownloadOutcome> {
        let partial = self.staging_dir.join(partial_name(clean));
        let dest = self.staging_dir.join(clean);

        let result = self
            .fetch_and_hash(url, clean, &partial)
            .and_then(|(stats, hash)| {
                promote(&partial, &dest)?;
                Ok((stats, hash))
            });

        let (stats, hash) = match result {
            Ok(done) => done,
            Err(e) => {
                if partial.exists() {
                    if let Err(rm) = fs::remove_file(&partial) {
                        warn!(file = %partial.display(), error = %rm, "Failed to remove partial download");
                    }
                }
                return Err(e);
            }
        };

        self.store.record(
            url,
            TransferRecord::completed(hash, stats.total, clean),
        );
        self.index.insert(clean, Location::Remote(url.to_string()));
        self.verified.lock().insert(clean.to_string());

        info!(
            file = %clean,
            bytes = stats.total,
            resumed_from = stats.resumed_from,
            "Downloaded"
        );
        Ok(DownloadOutcome::Downloaded {
            bytes: stats.received,
            resumed_from: stats.resumed_from,
        })
    }

    fn fetch_and_hash(
        &self,
        url: &str,
        clean: &str,
        partial: &Path,
    ) -> SyncResult<(TransferStats, String)> {
        fs::create_dir_all(&self.staging_dir).map_err(|e| SyncError::CreateDirFailed {
            path: self.staging_dir.clone(),
            source: e,
        })?;

        let total_size = self.http.remote_size(url);
        let stats = self.http.fetch(url, partial, total_size)?;
        let hash = calculate_file_checksum(partial)?;

        if self.verify_digests {
            if let Some(expected) = digest_fragment(url).filter(|d| d.is_sha256()) {
                if expected.hex != hash {
                    return Err(SyncError::IntegrityMismatch {
                        filename: clean.to_string(),
                        expected: expected.hex,
                        actual: hash,
                    });
                }
            }
        }

        Ok((stats, hash))
    }
}

/// Replace `dest` with `partial`: delete then rename.
fn promote(partial: &Path, dest: &Path) -> SyncResult<()> {
    if dest.exists() {
        fs::remove_file(dest).map_err(|e| SyncError::WriteFailed {
            path: dest.to_path_buf(),
            source: e,
        })?;
    }
    fs::rename(partial, dest).map_err(|e| SyncError::WriteFailed {
        path: dest.to_path_buf(),
        source: e,
    })
}
