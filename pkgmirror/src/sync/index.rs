//! In-memory dedup index from clean filename to where that artifact lives.
//!
//! The index is rebuilt at every startup from three sources, first writer
//! wins:
//!
//! 1. completed records in the [`ProgressStore`] (remote origin)
//! 2. archive files already present in the staging directory
//! 3. archive files anywhere under the canonical store
//!
//! After a transfer completes, the downloader updates the index in the same
//! call that persists the record, so later dedup checks in the same run see it.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use tracing::{debug, warn};

use super::filename::{clean_filename, has_archive_extension, is_partial};
use super::progress::ProgressStore;

/// Where an already-known artifact was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A URL with a completed transfer record.
    Remote(String),
    /// A file found on disk with no record of its own.
    Local(PathBuf),
}

impl Location {
    pub fn as_remote(&self) -> Option<&str> {
        match self {
            Location::Remote(url) => Some(url),
            Location::Local(_) => None,
        }
    }
}

/// Clean filename → [`Location`] map shared by all workers.
#[derive(Debug, Default)]
pub struct FilenameIndex {
    entries: RwLock<HashMap<String, Location>>,
}

impl FilenameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the index from the progress store and the two directory trees.
    pub fn build(
        store: &ProgressStore,
        staging_dir: &Path,
        canonical_dir: &Path,
        extensions: &[String],
    ) -> Self {
        let mut entries = HashMap::new();

        for (url, record) in store.snapshot() {
            if record.is_completed() {
                entries
                    .entry(clean_filename(&url))
                    .or_insert(Location::Remote(url));
            }
        }
        let from_store = entries.len();

        for path in scan_staging(staging_dir, extensions) {
            if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
                entries
                    .entry(clean_filename(&name))
                    .or_insert(Location::Local(path));
            }
        }

        for path in scan_canonical(canonical_dir, extensions) {
            if let Some(name) = path.file_name().map(|n| n.to_string_lossy().into_owned()) {
                debug!(file = %name, "Found organized file");
                entries
                    .entry(name)
                    .or_insert(Location::Local(path));
            }
        }

        debug!(
            entries = entries.len(),
            from_store,
            from_disk = entries.len() - from_store,
            "Filename index built"
        );

        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Look up a clean filename.
    pub fn resolve(&self, clean_filename: &str) -> Option<Location> {
        self.entries.read().get(clean_filename).cloned()
    }

    /// Set the location for a clean filename, replacing any previous entry.
    pub fn insert(&self, clean_filename: impl Into<String>, location: Location) {
        self.entries.write().insert(clean_filename.into(), location);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

/// Archive files directly inside the staging directory, partials excluded.
fn scan_staging(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return Vec::new(),
    };

    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| {
                    !is_partial(&n) && has_archive_extension(&clean_filename(&n), extensions)
                })
        })
        .collect()
}

/// Archive files at any depth under the canonical store.
fn scan_canonical(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let pattern = format!("{}/**/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            warn!(dir = %dir.display(), error = %e, "Invalid store scan pattern");
            return Vec::new();
        }
    };

    paths
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy())
                .is_some_and(|n| has_archive_extension(&n, extensions))
        })
        .collect()
}
