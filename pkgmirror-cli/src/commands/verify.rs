//! Verify command - re-hash recorded files against the progress store.

use pkgmirror::config::ConfigFile;
use pkgmirror::sync::{verify_store, ProgressStore};

use super::args::PathArgs;
use crate::error::CliError;
use crate::output;

/// Run the verify command. Fails if any file disagrees with its record.
pub fn run(args: PathArgs, file: &ConfigFile) -> Result<(), CliError> {
    let config = args.resolve(file);
    let store = ProgressStore::open(&config.progress_file);

    let report = verify_store(&store, &config.staging_dir, &config.store_dir);
    output::print_verify_report(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::Verification(report.mismatched.len()))
    }
}
