//! Top-level sync orchestration.
//!
//! ```text
//! read source + package list
//!   for each package (one at a time):
//!     PageParser::fetch ─► extract_file_urls
//!       ─► first URL per clean filename ─► WorkerPool(Downloader)   (drains)
//!       ─► remaining duplicates, one by one ─► Downloader            (aliases)
//! Organizer: strip suffixes ─► organize into package dirs
//! ```
//!
//! A failure for one URL or one package is logged and counted; the run always
//! continues to the next unit of work and to the organize passes.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{error, info, warn};

use super::config::{read_packages, read_source, SyncConfig};
use super::downloader::{DownloadOutcome, Downloader};
use super::error::{SyncError, SyncResult};
use super::filename::clean_filename;
use super::http::{build_client, HttpDownloader};
use super::index::FilenameIndex;
use super::organizer::{OrganizeReport, Organizer};
use super::page::PageParser;
use super::pool::WorkerPool;
use super::progress::ProgressStore;

/// Counters for one sync run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Packages whose page was fetched and had archive links.
    pub packages: usize,
    /// Packages skipped because the page failed or had no links.
    pub packages_skipped: usize,
    /// Files transferred over the network.
    pub downloaded: usize,
    /// Bytes received across all transfers.
    pub bytes_downloaded: u64,
    /// URLs whose artifact was already present.
    pub already_present: usize,
    /// URLs recorded as aliases of an earlier transfer.
    pub aliased: usize,
    /// Directory-discovered files verified and recorded.
    pub verified: usize,
    /// URLs that failed.
    pub failed: usize,
    /// Results of the organize passes.
    pub organize: OrganizeReport,
}

impl SyncReport {
    fn tally(&mut self, url: &str, result: Option<SyncResult<DownloadOutcome>>) {
        match result {
            Some(Ok(DownloadOutcome::Downloaded { bytes, .. })) => {
                self.downloaded += 1;
                self.bytes_downloaded += bytes;
            }
            Some(Ok(DownloadOutcome::AlreadyPresent)) => self.already_present += 1,
            Some(Ok(DownloadOutcome::Aliased { .. })) => self.aliased += 1,
            Some(Ok(DownloadOutcome::Verified)) => self.verified += 1,
            Some(Err(e)) if e.is_transport() => {
                warn!(url = %url, error = %e, "Download failed, will retry next run");
                self.failed += 1;
            }
            Some(Err(e)) => {
                error!(url = %url, error = %e, "Download failed");
                self.failed += 1;
            }
            None => {
                error!(url = %url, "Download worker panicked");
                self.failed += 1;
            }
        }
    }
}

/// Owns the shared state for one run and drives it end to end.
#[derive(Debug)]
pub struct SyncDriver {
    config: SyncConfig,
    store: Arc<ProgressStore>,
    index: Arc<FilenameIndex>,
    pages: PageParser,
    downloader: Downloader,
    pool: WorkerPool,
    organizer: Organizer,
}

impl SyncDriver {
    /// Load the progress store, build the filename index and start the pool.
    pub fn new(config: SyncConfig) -> SyncResult<Self> {
        let store = Arc::new(ProgressStore::open(&config.progress_file));
        let index = Arc::new(FilenameIndex::build(
            &store,
            &config.staging_dir,
            &config.store_dir,
            &config.extensions,
        ));

        let client = build_client(config.timeout)?;
        let pages = PageParser::new(
            client.clone(),
            config.timeout.as_secs(),
            config.extensions.clone(),
        );
        let downloader = Downloader::new(
            HttpDownloader::new(client, config.timeout),
            Arc::clone(&store),
            Arc::clone(&index),
            config.staging_dir.clone(),
            config.store_dir.clone(),
        )
        .with_verify_digests(config.verify_digests);
        let pool = WorkerPool::new(config.workers)?;
        let organizer = Organizer::new(
            config.staging_dir.clone(),
            config.store_dir.clone(),
            config.extensions.clone(),
        );

        info!(
            records = store.len(),
            known_files = index.len(),
            workers = pool.capacity(),
            "Sync driver ready"
        );

        Ok(Self {
            config,
            store,
            index,
            pages,
            downloader,
            pool,
            organizer,
        })
    }

    pub fn store(&self) -> &ProgressStore {
        &self.store
    }

    pub fn index(&self) -> &FilenameIndex {
        &self.index
    }

    /// Full run using the configured source and package list files.
    pub fn run(&self) -> SyncResult<SyncReport> {
        let base_url = read_source(&self.config.source_file)?;
        let packages = read_packages(&self.config.packages_file)?;
        Ok(self.sync(&base_url, &packages))
    }

    /// Mirror `packages` from `base_url`, then organize the staging area.
    pub fn sync(&self, base_url: &str, packages: &[String]) -> SyncReport {
        info!(source = %base_url, packages = packages.len(), "Starting sync");

        let mut report = SyncReport::default();
        for package in packages {
            self.sync_package(base_url, package, &mut report);
        }

        report.organize = self.organize();

        info!(
            downloaded = report.downloaded,
            already_present = report.already_present,
            aliased = report.aliased,
            failed = report.failed,
            "Sync finished"
        );
        report
    }

    /// Fetch one package's page and download every archive it lists.
    pub fn sync_package(&self, base_url: &str, package: &str, report: &mut SyncReport) {
        info!(package = %package, "Processing package");

        let page = match self.pages.fetch(base_url, package) {
            Ok(page) => page,
            Err(e) => {
                error!(package = %package, error = %e, "Failed to fetch package page");
                report.packages_skipped += 1;
                return;
            }
        };

        let urls = self.pages.extract_file_urls(&page);
        if urls.is_empty() {
            let e = SyncError::NoLinks {
                package: package.to_string(),
            };
            warn!(error = %e, "Skipping package");
            report.packages_skipped += 1;
            return;
        }
        report.packages += 1;

        let (primary, deferred) = partition_by_clean_filename(urls);

        let results = self
            .pool
            .run(&primary, |url: &String| self.downloader.download(url));
        for (url, result) in primary.iter().zip(results) {
            report.tally(url, result);
        }

        // Duplicates resolve against the index the pool just filled.
        for url in deferred {
            let result = self.downloader.download(&url);
            report.tally(&url, Some(result));
        }
    }

    /// Run the strip-suffix and organize passes.
    pub fn organize(&self) -> OrganizeReport {
        self.organizer.run(&self.store)
    }
}

/// Split URLs into the first per clean filename and the later duplicates.
///
/// Keeps two workers from ever writing the same staging file.
pub fn partition_by_clean_filename(urls: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut primary = Vec::new();
    let mut deferred = Vec::new();

    for url in urls {
        if seen.insert(clean_filename(&url)) {
            primary.push(url);
        } else {
            deferred.push(url);
        }
    }

    (primary, deferred)
}
