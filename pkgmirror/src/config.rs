//! INI configuration file.
//!
//! ```ini
//! [sync]
//! root = /srv/mirror
//! staging_dir = /srv/mirror/sync/data
//! workers = 16
//! timeout = 300
//! verify_digests = true
//! extensions = .whl, .tar.gz, .zip
//!
//! [logging]
//! level = info
//! file = /var/log/pkgmirror.log
//! ```
//!
//! Every key is optional. A missing file yields the defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use crate::logging::LogConfig;
use crate::sync::SyncConfig;

/// Errors from reading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// `[sync]` section. Unset keys fall back to `SyncConfig` defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncSection {
    pub root: Option<PathBuf>,
    pub source_file: Option<PathBuf>,
    pub packages_file: Option<PathBuf>,
    pub progress_file: Option<PathBuf>,
    pub staging_dir: Option<PathBuf>,
    pub store_dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub verify_digests: Option<bool>,
    pub extensions: Option<Vec<String>>,
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub sync: SyncSection,
    pub logging: LogConfig,
}

/// Default configuration file location.
///
/// `~/.config/pkgmirror/config.ini` on Linux; the current directory if the
/// platform has no config directory.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pkgmirror")
        .join("config.ini")
}

impl ConfigFile {
    /// Load from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from `path`, returning defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let ini = Ini::load_from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(section) = ini.section(Some("sync")) {
            let get = |key: &str| section.get(key).map(str::trim).filter(|v| !v.is_empty());
            let sync = &mut config.sync;

            sync.root = get("root").map(PathBuf::from);
            sync.source_file = get("source_file").map(PathBuf::from);
            sync.packages_file = get("packages_file").map(PathBuf::from);
            sync.progress_file = get("progress_file").map(PathBuf::from);
            sync.staging_dir = get("staging_dir").map(PathBuf::from);
            sync.store_dir = get("store_dir").map(PathBuf::from);
            sync.workers = get("workers").map(|v| parse("sync", "workers", v)).transpose()?;
            sync.timeout_secs = get("timeout").map(|v| parse("sync", "timeout", v)).transpose()?;
            sync.verify_digests = get("verify_digests")
                .map(|v| parse_bool("sync", "verify_digests", v))
                .transpose()?;
            sync.extensions = get("extensions").map(parse_extensions);
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(level) = section.get("level").map(str::trim).filter(|v| !v.is_empty()) {
                config.logging.level = level.to_string();
            }
            config.logging.file = section
                .get("file")
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from);
        }

        Ok(config)
    }

    /// Build the engine configuration, applying every key that is set.
    pub fn to_sync_config(&self) -> SyncConfig {
        let s = &self.sync;
        let mut config = match &s.root {
            Some(root) => SyncConfig::with_root(root),
            None => SyncConfig::default(),
        };

        if let Some(path) = &s.source_file {
            config.source_file = path.clone();
        }
        if let Some(path) = &s.packages_file {
            config.packages_file = path.clone();
        }
        if let Some(path) = &s.progress_file {
            config = config.with_progress_file(path.clone());
        }
        if let Some(path) = &s.staging_dir {
            config = config.with_staging_dir(path.clone());
        }
        if let Some(path) = &s.store_dir {
            config = config.with_store_dir(path.clone());
        }
        if let Some(workers) = s.workers {
            config = config.with_workers(workers);
        }
        if let Some(secs) = s.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }
        if let Some(verify) = s.verify_digests {
            config = config.with_verify_digests(verify);
        }
        if let Some(extensions) = &s.extensions {
            config.extensions = extensions.clone();
        }
        config
    }
}

fn parse<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| invalid(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value)),
    }
}

/// Comma or whitespace separated; a missing leading dot is added.
fn parse_extensions(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|e| !e.is_empty())
        .map(|e| {
            if e.starts_with('.') {
                e.to_lowercase()
            } else {
                format!(".{}", e.to_lowercase())
            }
        })
        .collect()
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_config(content: &str) -> (TempDir, PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.ini");
        fs::write(&path, content).unwrap();
        (temp, path)
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = ConfigFile::load_from(&temp.path().join("nope.ini")).unwrap();
        assert_eq!(config, ConfigFile::default());

        let sync = config.to_sync_config();
        assert_eq!(sync.workers, 16);
        assert_eq!(sync.store_dir, PathBuf::from("pypi"));
    }

    #[test]
    fn test_full_config() {
        let (_temp, path) = write_config(
            "[sync]\n\
             root = /srv/mirror\n\
             store_dir = /data/pypi\n\
             workers = 4\n\
             timeout = 60\n\
             verify_digests = no\n\
             extensions = whl, .tar.gz\n\
             \n\
             [logging]\n\
             level = debug\n\
             file = /tmp/pkgmirror.log\n",
        );

        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.file, Some(PathBuf::from("/tmp/pkgmirror.log")));

        let sync = config.to_sync_config();
        assert_eq!(sync.source_file, PathBuf::from("/srv/mirror/sync/source.txt"));
        assert_eq!(sync.staging_dir, PathBuf::from("/srv/mirror/sync/data"));
        assert_eq!(sync.store_dir, PathBuf::from("/data/pypi"));
        assert_eq!(sync.workers, 4);
        assert_eq!(sync.timeout, Duration::from_secs(60));
        assert!(!sync.verify_digests);
        assert_eq!(sync.extensions, vec![".whl".to_string(), ".tar.gz".to_string()]);
    }

    #[test]
    fn test_invalid_number() {
        let (_temp, path) = write_config("[sync]\nworkers = lots\n");
        let err = ConfigFile::load_from(&path).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "workers"
        ));
        assert!(err.to_string().contains("sync.workers"));
    }

    #[test]
    fn test_empty_values_are_unset() {
        let (_temp, path) = write_config("[sync]\nworkers =\n[logging]\nlevel =\n");
        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.sync.workers, None);
        assert_eq!(config.logging.level, LogConfig::default().level);
    }

    #[test]
    fn test_config_file_path_name() {
        let path = config_file_path();
        assert!(path.ends_with("pkgmirror/config.ini"));
    }
}
