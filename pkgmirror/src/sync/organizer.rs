//! Post-download organization of the staging directory.
//!
//! Two passes, run after all downloads have drained:
//!
//! 1. **Strip suffix**: `foo-1.0.whl#sha256=ab..` → `foo-1.0.whl`
//! 2. **Organize**: `staging/foo-1.0.whl` → `store/foo/foo-1.0.whl`
//!
//! Both passes only touch files that still need work, so running them against
//! an already organized tree changes nothing.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use super::checksum::calculate_file_checksum;
use super::error::{SyncError, SyncResult};
use super::filename::{has_archive_extension, is_partial, package_name, strip_digest_suffix};
use super::progress::ProgressStore;

/// Counts from one organize run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeReport {
    /// Files renamed to drop a digest suffix.
    pub renamed: usize,
    /// Suffixed files deleted because the clean name already holds the
    /// recorded content.
    pub superseded: usize,
    /// Files moved into a package directory.
    pub organized: usize,
    /// Archive files left in staging because no package name could be derived.
    pub unresolved: Vec<String>,
    /// Files that could not be renamed or moved.
    pub failed: usize,
}

/// Moves completed files from staging into the canonical store.
#[derive(Debug, Clone)]
pub struct Organizer {
    staging_dir: PathBuf,
    store_dir: PathBuf,
    extensions: Vec<String>,
}

impl Organizer {
    pub fn new(staging_dir: PathBuf, store_dir: PathBuf, extensions: Vec<String>) -> Self {
        Self {
            staging_dir,
            store_dir,
            extensions,
        }
    }

    /// Run the strip-suffix pass, then the organize pass.
    pub fn run(&self, store: &ProgressStore) -> OrganizeReport {
        let mut report = OrganizeReport::default();
        self.strip_suffixes(store, &mut report);
        self.organize(&mut report);
        report
    }

    /// Rename digest-suffixed files to their clean names.
    ///
    /// When the clean name already holds a file matching a completed record,
    /// that file wins and the suffixed copy is deleted. Records that
    /// referenced the old name are updated and saved once.
    pub fn strip_suffixes(&self, store: &ProgressStore, report: &mut OrganizeReport) {
        let mut renames = Vec::new();

        for path in staging_files(&self.staging_dir) {
            let Some(name) = file_name(&path) else {
                continue;
            };
            let Some(clean) = strip_digest_suffix(&name) else {
                continue;
            };
            if !has_archive_extension(clean, &self.extensions) {
                continue;
            }

            let target = self.staging_dir.join(clean);
            if holds_recorded_copy(store, clean, &target) {
                match fs::remove_file(&path) {
                    Ok(()) => {
                        info!(file = %name, kept = %clean, "Dropped stale suffixed copy");
                        renames.push((name.clone(), clean.to_string()));
                        report.superseded += 1;
                    }
                    Err(e) => {
                        error!(file = %name, error = %e, "Failed to remove stale copy");
                        report.failed += 1;
                    }
                }
                continue;
            }

            match replace_file(&path, &target) {
                Ok(()) => {
                    info!(from = %name, to = %clean, "Renamed file");
                    renames.push((name.clone(), clean.to_string()));
                    report.renamed += 1;
                }
                Err(e) => {
                    error!(file = %name, error = %e, "Failed to rename file");
                    report.failed += 1;
                }
            }
        }

        if renames.is_empty() {
            return;
        }

        store.update(|records| {
            let mut changed = false;
            for record in records.values_mut().filter(|r| r.is_completed()) {
                if let Some((_, new)) = renames.iter().find(|(old, _)| *old == record.clean_filename) {
                    record.clean_filename = new.clone();
                    changed = true;
                }
            }
            (changed, ())
        });
        info!(
            renamed = report.renamed,
            superseded = report.superseded,
            "Stripped digest suffixes"
        );
    }

    /// Move every archive in staging into `{store}/{package}/`.
    pub fn organize(&self, report: &mut OrganizeReport) {
        let mut files = staging_files(&self.staging_dir);
        files.sort();

        for path in files {
            let Some(name) = file_name(&path) else {
                continue;
            };
            if !has_archive_extension(&name, &self.extensions) {
                continue;
            }

            let Some(package) = package_name(&name) else {
                warn!(file = %name, "Cannot derive package name, leaving in staging");
                report.unresolved.push(name);
                continue;
            };

            match self.move_into_package(&path, &name, &package) {
                Ok(target) => {
                    debug!(file = %name, target = %target.display(), "Organized file");
                    report.organized += 1;
                }
                Err(e) => {
                    error!(file = %name, error = %e, "Failed to move file");
                    report.failed += 1;
                }
            }
        }

        info!(
            organized = report.organized,
            unresolved = report.unresolved.len(),
            "Organized files into package directories"
        );
    }

    fn move_into_package(&self, path: &Path, name: &str, package: &str) -> SyncResult<PathBuf> {
        let package_dir = self.store_dir.join(package);
        fs::create_dir_all(&package_dir).map_err(|e| SyncError::CreateDirFailed {
            path: package_dir.clone(),
            source: e,
        })?;

        let target = package_dir.join(name);
        replace_file(path, &target)?;
        Ok(target)
    }
}

/// Whether `target` exists and hashes to a completed record for `clean`.
fn holds_recorded_copy(store: &ProgressStore, clean: &str, target: &Path) -> bool {
    if !target.is_file() {
        return false;
    }

    let expected: Vec<String> = store
        .snapshot()
        .into_values()
        .filter(|r| r.is_completed() && r.clean_filename == clean)
        .map(|r| r.content_hash)
        .collect();
    if expected.is_empty() {
        return false;
    }

    match calculate_file_checksum(target) {
        Ok(actual) => expected.iter().any(|h| h.eq_ignore_ascii_case(&actual)),
        Err(e) => {
            debug!(file = %target.display(), error = %e, "Cannot hash staged file");
            false
        }
    }
}

/// Regular files directly inside `dir`, skipping in-flight partials.
fn staging_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "Staging directory not readable");
            return Vec::new();
        }
    };

    entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .filter(|p| file_name(p).is_some_and(|n| !is_partial(&n)))
        .collect()
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

/// Move `from` to `to`, deleting whatever is at `to` first.
///
/// Falls back to copy-and-delete when a rename crosses filesystems.
fn replace_file(from: &Path, to: &Path) -> SyncResult<()> {
    if from == to {
        return Ok(());
    }

    let write_failed = |e| SyncError::WriteFailed {
        path: to.to_path_buf(),
        source: e,
    };

    if to.exists() {
        fs::remove_file(to).map_err(write_failed)?;
    }

    if fs::rename(from, to).is_err() {
        fs::copy(from, to).map_err(write_failed)?;
        fs::remove_file(from).map_err(|e| SyncError::WriteFailed {
            path: from.to_path_buf(),
            source: e,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::filename::default_extensions;
    use crate::sync::progress::TransferRecord;
    use tempfile::TempDir;

    struct Fixture {
        temp: TempDir,
        store: ProgressStore,
    }

    impl Fixture {
        fn new() -> Self {
            let temp = TempDir::new().unwrap();
            fs::create_dir_all(temp.path().join("data")).unwrap();
            let store = ProgressStore::empty(temp.path().join("p.json"));
            Self { temp, store }
        }

        fn staging(&self) -> PathBuf {
            self.temp.path().join("data")
        }

        fn canonical(&self) -> PathBuf {
            self.temp.path().join("pypi")
        }

        fn organizer(&self) -> Organizer {
            Organizer::new(self.staging(), self.canonical(), default_extensions())
        }

        /// Sorted relative paths of every file under the temp root.
        fn tree(&self) -> Vec<String> {
            let pattern = format!("{}/**/*", self.temp.path().display());
            let mut files: Vec<String> = glob::glob(&pattern)
                .unwrap()
                .filter_map(Result::ok)
                .filter(|p| p.is_file())
                .map(|p| {
                    p.strip_prefix(self.temp.path())
                        .unwrap()
                        .display()
                        .to_string()
                })
                .collect();
            files.sort();
            files
        }
    }

    #[test]
    fn test_strip_suffix_renames_and_updates_records() {
        let f = Fixture::new();
        fs::write(f.staging().join("foo-1.0.whl#sha256=abcd"), b"new").unwrap();
        fs::write(f.staging().join("foo-1.0.whl"), b"old").unwrap();
        f.store.record(
            "https://x/foo-1.0.whl",
            TransferRecord::completed("abcd", 3, "foo-1.0.whl#sha256=abcd"),
        );

        let mut report = OrganizeReport::default();
        f.organizer().strip_suffixes(&f.store, &mut report);

        assert_eq!(report.renamed, 1);
        assert_eq!(fs::read(f.staging().join("foo-1.0.whl")).unwrap(), b"new");
        assert!(!f.staging().join("foo-1.0.whl#sha256=abcd").exists());
        assert_eq!(
            ProgressStore::open(f.store.path())
                .get("https://x/foo-1.0.whl")
                .unwrap()
                .clean_filename,
            "foo-1.0.whl"
        );
    }

    #[test]
    fn test_strip_suffix_keeps_recorded_clean_copy() {
        let f = Fixture::new();
        let good = b"fresh download";
        let hash = sha256_hex(good);
        fs::write(f.staging().join("foo-1.0.whl#sha256=0bad"), b"corrupt").unwrap();
        fs::write(f.staging().join("foo-1.0.whl"), good).unwrap();
        f.store.record(
            "https://x/foo-1.0.whl#sha256=feed",
            TransferRecord::completed(hash, good.len() as u64, "foo-1.0.whl"),
        );

        let report = f.organizer().run(&f.store);

        assert_eq!(report.renamed, 0);
        assert_eq!(report.superseded, 1);
        assert!(!f.staging().join("foo-1.0.whl#sha256=0bad").exists());
        assert_eq!(
            fs::read(f.canonical().join("foo").join("foo-1.0.whl")).unwrap(),
            good
        );
    }

    #[test]
    fn test_strip_suffix_replaces_unrecorded_clean_copy() {
        let f = Fixture::new();
        fs::write(f.staging().join("foo-1.0.whl#sha256=00ff"), b"suffixed").unwrap();
        fs::write(f.staging().join("foo-1.0.whl"), b"other").unwrap();
        f.store.record(
            "https://x/foo-1.0.whl",
            TransferRecord::completed("abcd", 5, "foo-1.0.whl"),
        );

        let mut report = OrganizeReport::default();
        f.organizer().strip_suffixes(&f.store, &mut report);

        assert_eq!(report.renamed, 1);
        assert_eq!(report.superseded, 0);
        assert_eq!(fs::read(f.staging().join("foo-1.0.whl")).unwrap(), b"suffixed");
    }

    fn sha256_hex(data: &[u8]) -> String {
        use sha2::{Digest, Sha256};
        format!("{:x}", Sha256::digest(data))
    }

    #[test]
    fn test_organize_moves_into_package_dirs() {
        let f = Fixture::new();
        fs::write(f.staging().join("Foo_Bar-1.0-py3-none-any.whl"), b"a").unwrap();
        fs::write(f.staging().join("baz-2.0.tar.gz"), b"b").unwrap();
        fs::create_dir_all(f.canonical().join("baz")).unwrap();
        fs::write(f.canonical().join("baz").join("baz-2.0.tar.gz"), b"stale").unwrap();

        let report = f.organizer().run(&f.store);

        assert_eq!(report.organized, 2);
        assert!(f
            .canonical()
            .join("foo_bar")
            .join("Foo_Bar-1.0-py3-none-any.whl")
            .is_file());
        assert_eq!(
            fs::read(f.canonical().join("baz").join("baz-2.0.tar.gz")).unwrap(),
            b"b"
        );
        assert!(!f.staging().join("baz-2.0.tar.gz").exists());
    }

    #[test]
    fn test_unresolved_and_partial_files_stay() {
        let f = Fixture::new();
        fs::write(f.staging().join("weird.whl"), b"a").unwrap();
        fs::write(f.staging().join("foo-1.0.whl.part"), b"partial").unwrap();
        fs::write(f.staging().join("notes.txt"), b"n").unwrap();

        let report = f.organizer().run(&f.store);

        assert_eq!(report.organized, 0);
        assert_eq!(report.unresolved, vec!["weird.whl".to_string()]);
        assert!(f.staging().join("weird.whl").exists());
        assert!(f.staging().join("foo-1.0.whl.part").exists());
        assert!(f.staging().join("notes.txt").exists());
    }

    #[test]
    fn test_passes_are_idempotent() {
        let f = Fixture::new();
        fs::write(f.staging().join("foo-1.0-py3-none-any.whl#sha256=00ff"), b"a").unwrap();
        fs::write(f.staging().join("bar-2.0.zip"), b"b").unwrap();

        let first = f.organizer().run(&f.store);
        assert_eq!(first.renamed, 1);
        assert_eq!(first.organized, 2);
        let after_first = f.tree();

        let second = f.organizer().run(&f.store);
        assert_eq!(second, OrganizeReport::default());
        assert_eq!(f.tree(), after_first);
        assert_eq!(
            after_first,
            vec![
                "pypi/bar/bar-2.0.zip".to_string(),
                "pypi/foo/foo-1.0-py3-none-any.whl".to_string(),
            ]
        );
    }

    #[test]
    fn test_missing_staging_is_noop() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::empty(temp.path().join("p.json"));
        let organizer = Organizer::new(
            temp.path().join("nope"),
            temp.path().join("pypi"),
            default_extensions(),
        );
        assert_eq!(organizer.run(&store), OrganizeReport::default());
    }

    #[test]
    fn test_replace_file_same_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("a.whl");
        fs::write(&path, b"x").unwrap();
        replace_file(&path, &path).unwrap();
        assert!(path.exists());
    }
}
