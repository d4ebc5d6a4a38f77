//! Configuration for a sync run.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::{SyncError, SyncResult};
use super::filename::default_extensions;

/// Default number of concurrent downloads per package.
pub const DEFAULT_WORKERS: usize = 16;

/// Default timeout for HTTP requests in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// File holding the base index URL.
    pub source_file: PathBuf,

    /// File listing one package name per line.
    pub packages_file: PathBuf,

    /// JSON file of completed transfers.
    pub progress_file: PathBuf,

    /// Directory for in-flight and freshly completed files.
    pub staging_dir: PathBuf,

    /// Canonical store, one subdirectory per package.
    pub store_dir: PathBuf,

    /// Maximum concurrent downloads.
    pub workers: usize,

    /// HTTP request timeout.
    pub timeout: Duration,

    /// Whether to check downloads against `#sha256=` URL fragments.
    pub verify_digests: bool,

    /// Archive extensions to mirror.
    pub extensions: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            source_file: PathBuf::from("sync/source.txt"),
            packages_file: PathBuf::from("sync/packages.txt"),
            progress_file: PathBuf::from("sync/sync_metadata.json"),
            staging_dir: PathBuf::from("sync/data"),
            store_dir: PathBuf::from("pypi"),
            workers: DEFAULT_WORKERS,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            verify_digests: true,
            extensions: default_extensions(),
        }
    }
}

impl SyncConfig {
    /// Lay out every path under a single root directory.
    ///
    /// `root/sync/{source.txt,packages.txt,sync_metadata.json,data}` and `root/pypi`.
    pub fn with_root(root: &Path) -> Self {
        let sync = root.join("sync");
        Self {
            source_file: sync.join("source.txt"),
            packages_file: sync.join("packages.txt"),
            progress_file: sync.join("sync_metadata.json"),
            staging_dir: sync.join("data"),
            store_dir: root.join("pypi"),
            ..Default::default()
        }
    }

    /// Set the staging directory.
    pub fn with_staging_dir(mut self, path: PathBuf) -> Self {
        self.staging_dir = path;
        self
    }

    /// Set the canonical store directory.
    pub fn with_store_dir(mut self, path: PathBuf) -> Self {
        self.store_dir = path;
        self
    }

    /// Set the progress file.
    pub fn with_progress_file(mut self, path: PathBuf) -> Self {
        self.progress_file = path;
        self
    }

    /// Set the maximum concurrent downloads (minimum 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Set the HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable digest fragment verification.
    pub fn with_verify_digests(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }
}

/// Read the base index URL, guaranteeing a trailing `/`.
pub fn read_source(path: &Path) -> SyncResult<String> {
    let content = fs::read_to_string(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let url = content.trim();
    if url.is_empty() {
        return Err(SyncError::InvalidConfig(format!(
            "source file {} is empty",
            path.display()
        )));
    }

    Ok(normalize_base_url(url))
}

/// Read the package list: trimmed, non-empty lines that are not `#` comments.
pub fn read_packages(path: &Path) -> SyncResult<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(String::from)
        .collect())
}

/// Append a trailing `/` so relative joins stay under the base path.
pub fn normalize_base_url(url: &str) -> String {
    if url.ends_with('/') {
        url.to_string()
    } else {
        format!("{}/", url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.workers, 16);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(config.verify_digests);
        assert_eq!(config.staging_dir, PathBuf::from("sync/data"));
        assert_eq!(config.store_dir, PathBuf::from("pypi"));
        assert!(config.extensions.iter().any(|e| e == ".whl"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = SyncConfig::with_root(Path::new("/mirror"))
            .with_workers(0)
            .with_timeout(Duration::from_secs(5))
            .with_verify_digests(false)
            .with_store_dir(PathBuf::from("/srv/pypi"));

        assert_eq!(config.workers, 1);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert!(!config.verify_digests);
        assert_eq!(config.store_dir, PathBuf::from("/srv/pypi"));
        assert_eq!(config.staging_dir, PathBuf::from("/mirror/sync/data"));
        assert_eq!(
            config.progress_file,
            PathBuf::from("/mirror/sync/sync_metadata.json")
        );
    }

    #[test]
    fn test_read_source_adds_slash() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("source.txt");
        fs::write(&path, "  https://mirrors.example.org/pypi/simple \n").unwrap();

        assert_eq!(
            read_source(&path).unwrap(),
            "https://mirrors.example.org/pypi/simple/"
        );
    }

    #[test]
    fn test_read_source_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("source.txt");
        fs::write(&path, "\n").unwrap();

        assert!(matches!(read_source(&path), Err(SyncError::InvalidConfig(_))));
    }

    #[test]
    fn test_read_packages() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("packages.txt");
        fs::write(&path, "requests\n\n  numpy  \n# pinned later\nfoo-bar\n").unwrap();

        assert_eq!(
            read_packages(&path).unwrap(),
            vec!["requests", "numpy", "foo-bar"]
        );
    }

    #[test]
    fn test_read_packages_missing_file() {
        let result = read_packages(Path::new("/nonexistent/packages.txt"));
        assert!(matches!(result, Err(SyncError::ReadFailed { .. })));
    }
}
