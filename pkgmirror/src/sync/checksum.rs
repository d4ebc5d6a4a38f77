//! SHA-256 verification of staged and organized files.
//!
//! Digests are lowercase hex strings, the same form stored in
//! [`TransferRecord::content_hash`] and carried in `#sha256=` URL fragments.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::error::{SyncError, SyncResult};
use super::filename::package_name;
use super::progress::{ProgressStore, TransferRecord};

/// Buffer size for reading files during checksum calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Calculate the SHA-256 checksum of a file as lowercase hex.
///
/// # Errors
///
/// Returns an error if the file cannot be read.
pub fn calculate_file_checksum(path: &Path) -> SyncResult<String> {
    let mut file = File::open(path).map_err(|e| SyncError::ReadFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file
            .read(&mut buffer)
            .map_err(|e| SyncError::ReadFailed {
                path: path.to_path_buf(),
                source: e,
            })?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Verify that a file matches an expected checksum (case-insensitive hex).
///
/// Returns the actual digest on success.
pub fn verify_checksum(path: &Path, expected: &str) -> SyncResult<String> {
    let actual = calculate_file_checksum(path)?;
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(SyncError::IntegrityMismatch {
            filename: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(actual)
}

/// Where a recorded file is expected to be found on disk.
///
/// Staging first, then `{canonical}/{package}/{filename}`.
pub fn candidate_paths(clean_filename: &str, staging_dir: &Path, canonical_dir: &Path) -> Vec<PathBuf> {
    let mut paths = vec![staging_dir.join(clean_filename)];
    if let Some(package) = package_name(clean_filename) {
        paths.push(canonical_dir.join(package).join(clean_filename));
    }
    paths
}

/// Check a recorded transfer against the first on-disk copy found.
///
/// Returns `Ok(Some(path))` when a copy exists and its digest matches the
/// record, `Ok(None)` when no copy exists, and `IntegrityMismatch` when the
/// copy disagrees with the record.
pub fn verify_record(
    record: &TransferRecord,
    staging_dir: &Path,
    canonical_dir: &Path,
) -> SyncResult<Option<PathBuf>> {
    let found = candidate_paths(&record.clean_filename, staging_dir, canonical_dir)
        .into_iter()
        .find(|p| p.is_file());

    match found {
        Some(path) => {
            verify_checksum(&path, &record.content_hash)?;
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

/// Outcome counts of a full store verification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifyReport {
    /// Records whose file is present and matches.
    pub ok: usize,
    /// Records whose file is present but does not match.
    pub mismatched: Vec<String>,
    /// Records with no file in staging or the canonical store.
    pub missing: usize,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.mismatched.is_empty()
    }
}

/// Re-hash every distinct recorded file that is present on disk.
///
/// Aliased URLs share a clean filename, so each file is hashed once.
pub fn verify_store(store: &ProgressStore, staging_dir: &Path, canonical_dir: &Path) -> VerifyReport {
    let mut report = VerifyReport::default();

    let mut records: Vec<TransferRecord> = store
        .snapshot()
        .into_values()
        .filter(TransferRecord::is_completed)
        .collect();
    records.sort_by(|a, b| a.clean_filename.cmp(&b.clean_filename));
    records.dedup_by(|a, b| a.clean_filename == b.clean_filename);

    for record in records {
        match verify_record(&record, staging_dir, canonical_dir) {
            Ok(Some(path)) => {
                debug!(file = %path.display(), "Verified");
                report.ok += 1;
            }
            Ok(None) => report.missing += 1,
            Err(e) => {
                warn!(file = %record.clean_filename, error = %e, "Verification failed");
                report.mismatched.push(record.clean_filename);
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::TempDir;

    const HELLO_WORLD_SHA256: &str =
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9";

    #[test]
    fn test_calculate_file_checksum() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");

        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"hello world").unwrap();

        let checksum = calculate_file_checksum(&file_path).unwrap();
        assert_eq!(checksum, HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_calculate_empty_file() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("empty.txt");
        File::create(&file_path).unwrap();

        let checksum = calculate_file_checksum(&file_path).unwrap();
        assert_eq!(
            checksum,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_calculate_nonexistent_file() {
        let result = calculate_file_checksum(Path::new("/nonexistent/file.txt"));
        assert!(matches!(result, Err(SyncError::ReadFailed { .. })));
    }

    #[test]
    fn test_verify_checksum_case_insensitive() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();

        let actual = verify_checksum(&file_path, &HELLO_WORLD_SHA256.to_uppercase()).unwrap();
        assert_eq!(actual, HELLO_WORLD_SHA256);
    }

    #[test]
    fn test_verify_checksum_mismatch() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("test.txt");
        fs::write(&file_path, b"hello world").unwrap();

        match verify_checksum(&file_path, "wrong_checksum") {
            Err(SyncError::IntegrityMismatch { filename, .. }) => {
                assert_eq!(filename, "test.txt");
            }
            other => panic!("Expected IntegrityMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_large_file_checksum_is_stable() {
        let temp = TempDir::new().unwrap();
        let file_path = temp.path().join("large.bin");
        fs::write(&file_path, vec![0xABu8; 100_000]).unwrap();

        let checksum = calculate_file_checksum(&file_path).unwrap();
        assert_eq!(checksum, calculate_file_checksum(&file_path).unwrap());
    }

    #[test]
    fn test_candidate_paths() {
        let paths = candidate_paths(
            "Foo-1.0-py3-none-any.whl",
            Path::new("/s"),
            Path::new("/c"),
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/s/Foo-1.0-py3-none-any.whl"),
                PathBuf::from("/c/foo/Foo-1.0-py3-none-any.whl"),
            ]
        );
        assert_eq!(candidate_paths("README", Path::new("/s"), Path::new("/c")).len(), 1);
    }

    #[test]
    fn test_verify_record_finds_canonical_copy() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("data");
        let canonical = temp.path().join("pypi");
        fs::create_dir_all(canonical.join("foo")).unwrap();
        let path = canonical.join("foo").join("foo-1.0.whl");
        fs::write(&path, b"hello world").unwrap();

        let record = TransferRecord::completed(HELLO_WORLD_SHA256, 11, "foo-1.0.whl");
        assert_eq!(verify_record(&record, &staging, &canonical).unwrap(), Some(path));

        let missing = TransferRecord::completed(HELLO_WORLD_SHA256, 11, "bar-1.0.whl");
        assert_eq!(verify_record(&missing, &staging, &canonical).unwrap(), None);
    }

    #[test]
    fn test_verify_store_counts() {
        let temp = TempDir::new().unwrap();
        let staging = temp.path().join("data");
        let canonical = temp.path().join("pypi");
        fs::create_dir_all(&staging).unwrap();
        fs::write(staging.join("good-1.0.whl"), b"hello world").unwrap();
        fs::write(staging.join("bad-1.0.whl"), b"tampered").unwrap();

        let store = ProgressStore::empty(temp.path().join("p.json"));
        store.record(
            "https://x/good-1.0.whl",
            TransferRecord::completed(HELLO_WORLD_SHA256, 11, "good-1.0.whl"),
        );
        store.record(
            "https://mirror/good-1.0.whl",
            TransferRecord::completed(HELLO_WORLD_SHA256, 11, "good-1.0.whl"),
        );
        store.record(
            "https://x/bad-1.0.whl",
            TransferRecord::completed(HELLO_WORLD_SHA256, 11, "bad-1.0.whl"),
        );
        store.record(
            "https://x/gone-1.0.whl",
            TransferRecord::completed(HELLO_WORLD_SHA256, 11, "gone-1.0.whl"),
        );

        let report = verify_store(&store, &staging, &canonical);
        assert_eq!(report.ok, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.mismatched, vec!["bad-1.0.whl".to_string()]);
        assert!(!report.is_clean());
    }
}
