//! pkgmirror - Resumable mirror for simple-index package repositories
//!
//! This library provides the sync engine behind the `pkgmirror` binary:
//! fetching per-package listing pages, downloading archives with a bounded
//! worker pool, and laying the result out as `{store}/{package}/{file}`.

pub mod config;
pub mod logging;
pub mod sync;
