//! Filename grammar for index archives.
//!
//! Index pages link archives as
//! `{base}/{name}-{version}-{tags}.whl#sha256={hex}`. The trailing
//! `#sha256=...` fragment is a content digest, not part of the filename, so
//! every dedup and layout decision keys on the *clean filename*: the
//! percent-decoded last path segment with query and digest fragment removed.
//!
//! Package names are taken from the leading token of a clean filename:
//!
//! - the token is the shortest prefix made of `[A-Za-z0-9_.-]`
//! - it ends right before the first `-<digit>` or `_<digit>` boundary
//! - `-` is normalized to `_` and the result is lower-cased
//!
//! `Foo-Bar-1.0.0-py3-none-any.whl` → `foo_bar`

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

/// Archive extensions mirrored by default.
pub const DEFAULT_ARCHIVE_EXTENSIONS: &[&str] =
    &[".whl", ".tar.gz", ".tgz", ".tar.bz2", ".zip", ".egg"];

/// Suffix appended to a clean filename while a transfer is in flight.
pub const PARTIAL_SUFFIX: &str = ".part";

/// A content digest carried in a URL fragment (`#sha256=abc...`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestFragment {
    /// Hash algorithm name as written in the fragment, lower-cased.
    pub algorithm: String,
    /// Lower-cased hex digest.
    pub hex: String,
}

impl DigestFragment {
    /// Whether this digest can be checked with the local SHA-256 verifier.
    pub fn is_sha256(&self) -> bool {
        self.algorithm == "sha256"
    }
}

/// `<name>#<algorithm>=<hex>`
fn digest_suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>.+?)#(?P<algo>[A-Za-z0-9_]+)=(?P<hex>[0-9A-Fa-f]+)$")
            .expect("digest suffix pattern is valid")
    })
}

/// Leading package token, terminated by `-<digit>` or `_<digit>`.
fn package_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_.-]+?)(?:-\d|[-_]\d)").expect("package pattern is valid")
    })
}

/// Split a digest suffix off a bare filename.
///
/// Returns the clean part when `name` ends in `#<algorithm>=<hex>`, or `None`
/// if it carries no digest suffix.
pub fn strip_digest_suffix(name: &str) -> Option<&str> {
    digest_suffix_pattern()
        .captures(name)
        .and_then(|c| c.name("name"))
        .map(|m| m.as_str())
}

/// Compute the clean filename for a URL or a bare (possibly suffixed) filename.
///
/// # Examples
///
/// ```
/// use pkgmirror::sync::clean_filename;
///
/// assert_eq!(
///     clean_filename("https://files.example/p/foo-1.0-py3-none-any.whl#sha256=ab12"),
///     "foo-1.0-py3-none-any.whl"
/// );
/// assert_eq!(clean_filename("foo-1.0.tar.gz"), "foo-1.0.tar.gz");
/// ```
pub fn clean_filename(raw: &str) -> String {
    let without_fragment = raw.split_once('#').map_or(raw, |(head, _)| head);
    let without_query = without_fragment
        .split_once('?')
        .map_or(without_fragment, |(head, _)| head);
    let base = without_query
        .rsplit_once('/')
        .map_or(without_query, |(_, tail)| tail);

    let decoded = percent_decode_str(base).decode_utf8_lossy();
    // An encoded `%23` decodes into a literal digest suffix.
    match strip_digest_suffix(&decoded) {
        Some(clean) => clean.to_string(),
        None => decoded.into_owned(),
    }
}

/// Extract the digest fragment from a file URL, if it carries one.
pub fn digest_fragment(url: &str) -> Option<DigestFragment> {
    let (_, fragment) = url.split_once('#')?;
    let (algorithm, hex) = fragment.split_once('=')?;
    if algorithm.is_empty() || hex.is_empty() || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(DigestFragment {
        algorithm: algorithm.to_ascii_lowercase(),
        hex: hex.to_ascii_lowercase(),
    })
}

/// Derive the normalized package name from a clean filename.
///
/// Returns `None` when the name has no version boundary.
///
/// ```
/// use pkgmirror::sync::package_name;
///
/// assert_eq!(package_name("Foo-Bar-1.0.0-py3-none-any.whl").as_deref(), Some("foo_bar"));
/// assert_eq!(package_name("README.txt"), None);
/// ```
pub fn package_name(clean_filename: &str) -> Option<String> {
    package_pattern()
        .captures(clean_filename)
        .and_then(|c| c.get(1))
        .map(|m| normalize_package_name(m.as_str()))
}

/// Normalize a package token: hyphens become underscores, then lower-case.
pub fn normalize_package_name(name: &str) -> String {
    name.replace('-', "_").to_lowercase()
}

/// Whether `name` ends with one of `extensions` (case-insensitive).
pub fn has_archive_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_ascii_lowercase()))
}

/// Whether a staging entry is an in-flight partial transfer.
pub fn is_partial(name: &str) -> bool {
    name.ends_with(PARTIAL_SUFFIX)
}

/// Name of the staging file used while `clean_filename` is being fetched.
pub fn partial_name(clean_filename: &str) -> String {
    format!("{}{}", clean_filename, PARTIAL_SUFFIX)
}

/// Default extension list as owned strings.
pub fn default_extensions() -> Vec<String> {
    DEFAULT_ARCHIVE_EXTENSIONS
        .iter()
        .map(|e| e.to_string())
        .collect()
}
