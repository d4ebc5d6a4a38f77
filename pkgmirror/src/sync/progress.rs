//! Durable record of completed transfers.
//!
//! The progress file is a JSON object mapping source URL to a
//! [`TransferRecord`]. A record is only ever written after the file has been
//! fully received and hashed, so the store is the single answer to "is this
//! URL already fetched". In-flight transfers live only as `.part` files in the
//! staging directory.
//!
//! Every mutation holds one lock across read-modify-write-save, so records
//! written by concurrent workers are never lost. Persistence is best-effort:
//! an unreadable file loads as an empty store and a failed save is logged and
//! otherwise ignored.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, warn};

use super::error::{SyncError, SyncResult};

/// Outcome status of a transfer. Only completed transfers are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Completed,
}

/// Persisted outcome of one completed download.
///
/// Field names on disk are `status`, `hash`, `size` and `filename`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub status: TransferStatus,
    /// Lowercase hex SHA-256 of the file contents.
    #[serde(rename = "hash")]
    pub content_hash: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "filename")]
    pub clean_filename: String,
}

impl TransferRecord {
    /// Create a completed record.
    pub fn completed(
        content_hash: impl Into<String>,
        size_bytes: u64,
        clean_filename: impl Into<String>,
    ) -> Self {
        Self {
            status: TransferStatus::Completed,
            content_hash: content_hash.into(),
            size_bytes,
            clean_filename: clean_filename.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TransferStatus::Completed
    }
}

/// URL-keyed store of completed transfers backed by a JSON file.
#[derive(Debug)]
pub struct ProgressStore {
    path: PathBuf,
    records: Mutex<HashMap<String, TransferRecord>>,
}

impl ProgressStore {
    /// Open the store at `path`, loading whatever can be read.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = match load_records(&path) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Could not load progress file, starting empty");
                HashMap::new()
            }
        };
        debug!(path = %path.display(), records = records.len(), "Progress store opened");
        Self {
            path,
            records: Mutex::new(records),
        }
    }

    /// An empty store that will persist to `path` on first mutation.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the record for a source URL.
    pub fn get(&self, url: &str) -> Option<TransferRecord> {
        self.records.lock().get(url).cloned()
    }

    /// Whether `url` has a completed record.
    pub fn is_completed(&self, url: &str) -> bool {
        self.records
            .lock()
            .get(url)
            .is_some_and(TransferRecord::is_completed)
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Copy of all records, for index building and reporting.
    pub fn snapshot(&self) -> HashMap<String, TransferRecord> {
        self.records.lock().clone()
    }

    /// Insert or replace the record for `url` and persist.
    pub fn record(&self, url: &str, record: TransferRecord) {
        let mut records = self.records.lock();
        records.insert(url.to_string(), record);
        self.persist_locked(&records);
    }

    /// Apply `f` to the full map under the lock, persisting if it reports a change.
    ///
    /// Returns whatever `f` returns alongside the change flag.
    pub fn update<F, T>(&self, f: F) -> T
    where
        F: FnOnce(&mut HashMap<String, TransferRecord>) -> (bool, T),
    {
        let mut records = self.records.lock();
        let (changed, value) = f(&mut records);
        if changed {
            self.persist_locked(&records);
        }
        value
    }

    /// Persist the current state.
    pub fn save(&self) -> SyncResult<()> {
        let records = self.records.lock();
        save_records(&self.path, &records)
    }

    fn persist_locked(&self, records: &HashMap<String, TransferRecord>) {
        if let Err(e) = save_records(&self.path, records) {
            error!(error = %e, "Failed to save progress");
        }
    }
}

/// Read the progress file, skipping entries that are not completed records.
fn load_records(path: &Path) -> SyncResult<HashMap<String, TransferRecord>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }

    let content = fs::read_to_string(path).map_err(|e| SyncError::Persistence {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let raw: HashMap<String, Value> =
        serde_json::from_str(&content).map_err(|e| SyncError::Persistence {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

    let mut records = HashMap::with_capacity(raw.len());
    for (url, value) in raw {
        match serde_json::from_value::<TransferRecord>(value) {
            Ok(record) => {
                records.insert(url, record);
            }
            Err(e) => debug!(url = %url, error = %e, "Ignoring non-completed progress entry"),
        }
    }
    Ok(records)
}

/// Write the map to a sibling temp file, then rename it over `path`.
fn save_records(path: &Path, records: &HashMap<String, TransferRecord>) -> SyncResult<()> {
    let persistence = |reason: String| SyncError::Persistence {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persistence(e.to_string()))?;
    }

    let json = serde_json::to_string(records).map_err(|e| persistence(e.to_string()))?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, json).map_err(|e| persistence(e.to_string()))?;
    fs::rename(&tmp, path).map_err(|e| persistence(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn record(name: &str) -> TransferRecord {
        TransferRecord::completed("abc123", 42, name)
    }

    #[test]
    fn test_missing_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let store = ProgressStore::open(temp.path().join("missing.json"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        fs::write(&path, "{ this is not json").unwrap();

        let store = ProgressStore::open(&path);
        assert!(store.is_empty());
    }

    #[test]
    fn test_record_persists_across_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("progress.json");

        let store = ProgressStore::open(&path);
        store.record("https://x/foo-1.0.whl", record("foo-1.0.whl"));
        assert!(path.exists());

        let reopened = ProgressStore::open(&path);
        assert_eq!(reopened.len(), 1);
        assert!(reopened.is_completed("https://x/foo-1.0.whl"));
        assert_eq!(
            reopened.get("https://x/foo-1.0.whl").unwrap(),
            record("foo-1.0.whl")
        );
    }

    #[test]
    fn test_on_disk_field_names() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        fs::write(
            &path,
            r#"{"https://x/a-1.0.whl": {"status": "completed", "hash": "ff", "size": 7, "filename": "a-1.0.whl"}}"#,
        )
        .unwrap();

        let store = ProgressStore::open(&path);
        let rec = store.get("https://x/a-1.0.whl").unwrap();
        assert_eq!(rec.content_hash, "ff");
        assert_eq!(rec.size_bytes, 7);
        assert_eq!(rec.clean_filename, "a-1.0.whl");

        store.save().unwrap();
        let json: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json["https://x/a-1.0.whl"]["status"], "completed");
        assert_eq!(json["https://x/a-1.0.whl"]["size"], 7);
    }

    #[test]
    fn test_non_completed_entries_are_absent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        fs::write(
            &path,
            r#"{
                "https://x/a-1.0.whl": {"status": "completed", "hash": "ff", "size": 1, "filename": "a-1.0.whl"},
                "https://x/b-1.0.whl": {"status": "downloading"},
                "https://x/c-1.0.whl": 3
            }"#,
        )
        .unwrap();

        let store = ProgressStore::open(&path);
        assert_eq!(store.len(), 1);
        assert!(store.is_completed("https://x/a-1.0.whl"));
        assert!(!store.is_completed("https://x/b-1.0.whl"));
    }

    #[test]
    fn test_update_persists_only_on_change() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        let store = ProgressStore::empty(&path);

        let n = store.update(|_| (false, 0));
        assert_eq!(n, 0);
        assert!(!path.exists());

        store.update(|records| {
            records.insert("https://x/a-1.0.whl".to_string(), record("a-1.0.whl"));
            (true, ())
        });
        assert!(path.exists());
        assert_eq!(ProgressStore::open(&path).len(), 1);
    }

    #[test]
    fn test_save_failure_is_not_fatal() {
        let temp = TempDir::new().unwrap();
        // A directory where the file should be makes every save fail
        let path = temp.path().join("progress.json");
        fs::create_dir(&path).unwrap();

        let store = ProgressStore::empty(&path);
        store.record("https://x/a-1.0.whl", record("a-1.0.whl"));
        assert!(store.is_completed("https://x/a-1.0.whl"));
        assert!(store.save().is_err());
    }

    #[test]
    fn test_concurrent_records_are_all_kept() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("progress.json");
        let store = Arc::new(ProgressStore::empty(&path));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let name = format!("pkg{}-1.0.whl", i);
                    store.record(&format!("https://x/{}", name), record(&name));
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ProgressStore::open(&path).len(), 8);
    }
}
