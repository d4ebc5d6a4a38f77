//! Organize command - run the post-download passes on their own.

use pkgmirror::config::ConfigFile;
use pkgmirror::sync::{Organizer, ProgressStore};

use super::args::PathArgs;
use crate::error::CliError;
use crate::output;

/// Run the organize command.
pub fn run(args: PathArgs, file: &ConfigFile) -> Result<(), CliError> {
    let config = args.resolve(file);
    let store = ProgressStore::open(&config.progress_file);

    let organizer = Organizer::new(config.staging_dir, config.store_dir, config.extensions);
    let report = organizer.run(&store);

    output::print_organize_report(&report);
    Ok(())
}
