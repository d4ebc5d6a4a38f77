//! Package mirror synchronization engine.
//!
//! Mirrors archive files from a simple-index package repository into a local
//! two-level store (`{store}/{package}/{file}`). The work is split across:
//!
//! - `progress`: durable record of completed transfers
//! - `index`: clean filename → where the bytes already live
//! - `page`: package listing fetch and link extraction
//! - `downloader`: per-URL skip / alias / resume / fetch decision
//! - `pool`: bounded parallel fan-out per package
//! - `organizer`: suffix stripping and package-directory layout
//! - `driver`: ties the above together for one run
//!
//! Runs are resumable: killing the process at any point and starting again
//! never re-fetches a completed file and picks up partial transfers from where
//! they stopped.

mod checksum;
mod config;
mod downloader;
mod driver;
mod error;
mod filename;
mod http;
mod index;
mod organizer;
mod page;
mod pool;
mod progress;

pub use checksum::{
    calculate_file_checksum, candidate_paths, verify_checksum, verify_record, verify_store,
    VerifyReport,
};
pub use config::{
    normalize_base_url, read_packages, read_source, SyncConfig, DEFAULT_TIMEOUT_SECS,
    DEFAULT_WORKERS,
};
pub use downloader::{DownloadOutcome, Downloader};
pub use driver::{partition_by_clean_filename, SyncDriver, SyncReport};
pub use error::{SyncError, SyncResult};
pub use filename::{
    clean_filename, default_extensions, digest_fragment, has_archive_extension, is_partial,
    normalize_package_name, package_name, partial_name, strip_digest_suffix, DigestFragment,
    DEFAULT_ARCHIVE_EXTENSIONS, PARTIAL_SUFFIX,
};
pub use http::{build_client, resume_offset, HttpDownloader, TransferStats};
pub use index::{FilenameIndex, Location};
pub use organizer::{OrganizeReport, Organizer};
pub use page::{extract_file_urls, page_url, ListingPage, PageParser};
pub use pool::WorkerPool;
pub use progress::{ProgressStore, TransferRecord, TransferStatus};
