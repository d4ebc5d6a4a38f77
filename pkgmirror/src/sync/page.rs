//! Package listing pages.
//!
//! A listing page is the simple-index HTML at `{base}{package}/`: a flat list
//! of anchors, one per distribution file. Links are resolved against the page
//! URL after redirects, so relative (`../../packages/...`) and absolute hrefs
//! both work.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::blocking::Client;
use reqwest::Url;
use tracing::{debug, info};

use super::error::{SyncError, SyncResult};
use super::filename::{clean_filename, has_archive_extension};

/// A fetched listing page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    pub html: String,
    /// Final URL of the page, used as the base for relative links.
    pub url: Url,
}

/// `<a ... href="...">` with double, single or no quotes.
fn anchor_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?is)<a(?:\s[^>]*?)?\shref\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
            .expect("anchor pattern is valid")
    })
}

/// Fetches listing pages and extracts archive URLs from them.
#[derive(Debug, Clone)]
pub struct PageParser {
    client: Client,
    timeout_secs: u64,
    extensions: Vec<String>,
}

impl PageParser {
    pub fn new(client: Client, timeout_secs: u64, extensions: Vec<String>) -> Self {
        Self {
            client,
            timeout_secs,
            extensions,
        }
    }

    /// GET `{base}{package}/`. One attempt, no retry.
    pub fn fetch(&self, base_url: &str, package: &str) -> SyncResult<ListingPage> {
        let url = page_url(base_url, package)?;
        info!(url = %url, "Fetching package page");

        let response = self
            .client
            .get(url.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| SyncError::from_reqwest(url.as_str(), e, self.timeout_secs))?;

        let resolved = response.url().clone();
        let html = response
            .text()
            .map_err(|e| SyncError::from_reqwest(url.as_str(), e, self.timeout_secs))?;

        Ok(ListingPage {
            html,
            url: resolved,
        })
    }

    /// Archive URLs on a page, in document order, duplicates kept.
    pub fn extract_file_urls(&self, page: &ListingPage) -> Vec<String> {
        extract_file_urls(&page.html, &page.url, &self.extensions)
    }
}

/// Listing page URL for a package.
pub fn page_url(base_url: &str, package: &str) -> SyncResult<Url> {
    let base = Url::parse(base_url)
        .map_err(|e| SyncError::InvalidConfig(format!("invalid index URL {}: {}", base_url, e)))?;
    base.join(&format!("{}/", package.trim_matches('/')))
        .map_err(|e| SyncError::InvalidConfig(format!("invalid package name {}: {}", package, e)))
}

/// Resolve every anchor on the page and keep the ones naming an archive.
pub fn extract_file_urls(html: &str, page_url: &Url, extensions: &[String]) -> Vec<String> {
    let mut links = 0usize;
    let mut urls = Vec::new();

    for caps in anchor_pattern().captures_iter(html) {
        let Some(href) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) else {
            continue;
        };
        links += 1;

        let href = href.as_str().trim().replace("&amp;", "&");
        let resolved = match page_url.join(&href) {
            Ok(url) => url,
            Err(e) => {
                debug!(href = %href, error = %e, "Skipping unresolvable link");
                continue;
            }
        };

        if has_archive_extension(&clean_filename(resolved.as_str()), extensions) {
            urls.push(resolved.to_string());
        }
    }

    debug!(page = %page_url, links, archives = urls.len(), "Parsed listing page");
    urls
}
