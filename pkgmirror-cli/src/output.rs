//! Summary formatting for command results.

use console::style;
use pkgmirror::sync::{OrganizeReport, SyncReport, VerifyReport};

/// Human-readable byte count (`1.5 MB`).
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}

pub fn header(title: &str) {
    println!("{}", style(title).bold());
    println!("{}", "=".repeat(title.len()));
}

fn row(label: &str, value: impl std::fmt::Display) {
    println!("  {:<18}{}", label, value);
}

fn failures(count: usize) -> String {
    if count == 0 {
        style(count).green().to_string()
    } else {
        style(count).red().bold().to_string()
    }
}

pub fn print_sync_report(report: &SyncReport) {
    header("Sync Summary");
    row("Packages:", report.packages);
    if report.packages_skipped > 0 {
        row("Packages skipped:", style(report.packages_skipped).yellow());
    }
    row(
        "Downloaded:",
        format!(
            "{} ({})",
            report.downloaded,
            format_size(report.bytes_downloaded)
        ),
    );
    row("Already present:", report.already_present);
    row("Aliased:", report.aliased);
    row("Verified on disk:", report.verified);
    row("Failed:", failures(report.failed));
    println!();
    print_organize_report(&report.organize);
}

pub fn print_organize_report(report: &OrganizeReport) {
    header("Organize");
    row("Renamed:", report.renamed);
    if report.superseded > 0 {
        row("Stale removed:", report.superseded);
    }
    row("Organized:", report.organized);
    row("Failed:", failures(report.failed));
    if !report.unresolved.is_empty() {
        row("Unresolved:", style(report.unresolved.len()).yellow());
        for name in &report.unresolved {
            println!("    {}", name);
        }
    }
}

pub fn print_verify_report(report: &VerifyReport) {
    header("Verification");
    row("Ok:", style(report.ok).green());
    row("Missing:", report.missing);
    row("Mismatched:", failures(report.mismatched.len()));
    for name in &report.mismatched {
        println!("    {}", style(name).red());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
        assert_eq!(format_size(1536), "1.5 KB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MB");
        assert_eq!(format_size(3 * 1024 * 1024 * 1024), "3.0 GB");
    }
}
