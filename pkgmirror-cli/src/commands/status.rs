//! Status command - summarize the progress store and staging area.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use pkgmirror::config::ConfigFile;
use pkgmirror::sync::{is_partial, ProgressStore};

use super::args::PathArgs;
use crate::error::CliError;
use crate::output::{format_size, header};

/// Counts derived from the progress store.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub records: usize,
    pub files: usize,
    pub total_bytes: u64,
}

impl StoreSummary {
    /// Aliased URLs share a file, so bytes are summed per clean filename.
    pub fn from_store(store: &ProgressStore) -> Self {
        let records = store.snapshot();
        let files: HashMap<String, u64> = records
            .values()
            .filter(|r| r.is_completed())
            .map(|r| (r.clean_filename.clone(), r.size_bytes))
            .collect();

        Self {
            records: records.len(),
            files: files.len(),
            total_bytes: files.values().sum(),
        }
    }
}

fn count_partials(staging_dir: &Path) -> usize {
    fs::read_dir(staging_dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| is_partial(&e.file_name().to_string_lossy()))
                .count()
        })
        .unwrap_or(0)
}

/// Run the status command.
pub fn run(args: PathArgs, file: &ConfigFile) -> Result<(), CliError> {
    let config = args.resolve(file);
    let store = ProgressStore::open(&config.progress_file);
    let summary = StoreSummary::from_store(&store);

    header("Mirror Status");
    println!("  Progress file:  {}", config.progress_file.display());
    println!("  Store:          {}", config.store_dir.display());
    println!("  Records:        {}", summary.records);
    println!("  Files:          {}", summary.files);
    println!("  Total size:     {}", format_size(summary.total_bytes));
    println!("  Partials:       {}", count_partials(&config.staging_dir));
    Ok(())
}
