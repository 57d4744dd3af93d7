//! INI configuration file (`~/.photonic/config.ini`).
//!
//! ```ini
//! [portal]
//! base_url = https://toprad.aikenist.com
//!
//! [download]
//! directory = /home/me/Downloads/photonic
//! max_retries = 3
//! workers = 4
//! ```
//!
//! Every key is optional; missing keys keep their defaults. CLI arguments
//! override whatever is set here.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use super::paths::config_file_path;
use super::{default_download_dir, DEFAULT_BASE_URL};

const SECTION_PORTAL: &str = "portal";
const SECTION_DOWNLOAD: &str = "download";

/// Default number of retries after the first download attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default worker count for concurrent bulk downloads.
pub const DEFAULT_WORKERS: usize = 4;

/// Errors from loading, saving or editing the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but is not valid INI.
    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    /// The file could not be read or written.
    #[error("failed to access {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    /// A key name that is not part of the configuration.
    #[error("unknown configuration key '{0}'")]
    UnknownKey(String),

    /// A value that does not fit the key's type.
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// `[portal]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct PortalSettings {
    pub base_url: String,
}

/// `[download]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadSettings {
    pub directory: PathBuf,
    pub max_retries: u32,
    pub workers: usize,
}

/// Parsed configuration file.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub portal: PortalSettings,
    pub download: DownloadSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            portal: PortalSettings {
                base_url: DEFAULT_BASE_URL.to_string(),
            },
            download: DownloadSettings {
                directory: default_download_dir(),
                max_retries: DEFAULT_MAX_RETRIES,
                workers: DEFAULT_WORKERS,
            },
        }
    }
}

impl ConfigFile {
    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Load from an explicit path. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let ini = Ini::load_from_file(path).map_err(|e| match e {
            ini::Error::Io(source) => ConfigError::Io {
                path: path.to_path_buf(),
                source,
            },
            ini::Error::Parse(e) => ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            },
        })?;

        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                let value = value.trim();
                if !value.is_empty() {
                    key.set(&mut config, value)?;
                }
            }
        }

        Ok(config)
    }

    /// Save to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    /// Save to an explicit path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            ini.with_section(Some(key.section()))
                .set(key.key_name(), key.get(self));
        }

        ini.write_to_file(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Addressable configuration keys, in `section.key` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigKey {
    PortalBaseUrl,
    DownloadDirectory,
    DownloadMaxRetries,
    DownloadWorkers,
}

impl ConfigKey {
    /// All keys in file order.
    pub fn all() -> &'static [ConfigKey] {
        &[
            ConfigKey::PortalBaseUrl,
            ConfigKey::DownloadDirectory,
            ConfigKey::DownloadMaxRetries,
            ConfigKey::DownloadWorkers,
        ]
    }

    pub fn section(&self) -> &'static str {
        match self {
            ConfigKey::PortalBaseUrl => SECTION_PORTAL,
            ConfigKey::DownloadDirectory
            | ConfigKey::DownloadMaxRetries
            | ConfigKey::DownloadWorkers => SECTION_DOWNLOAD,
        }
    }

    pub fn key_name(&self) -> &'static str {
        match self {
            ConfigKey::PortalBaseUrl => "base_url",
            ConfigKey::DownloadDirectory => "directory",
            ConfigKey::DownloadMaxRetries => "max_retries",
            ConfigKey::DownloadWorkers => "workers",
        }
    }

    /// Full `section.key` name.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Render the current value as a string.
    pub fn get(&self, config: &ConfigFile) -> String {
        match self {
            ConfigKey::PortalBaseUrl => config.portal.base_url.clone(),
            ConfigKey::DownloadDirectory => config.download.directory.display().to_string(),
            ConfigKey::DownloadMaxRetries => config.download.max_retries.to_string(),
            ConfigKey::DownloadWorkers => config.download.workers.to_string(),
        }
    }

    /// Parse and store `value`.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        let invalid = |reason: &str| ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.to_string(),
        };

        match self {
            ConfigKey::PortalBaseUrl => {
                if !(value.starts_with("https://") || value.starts_with("http://")) {
                    return Err(invalid("expected an http(s) URL"));
                }
                config.portal.base_url = value.trim_end_matches('/').to_string();
            }
            ConfigKey::DownloadDirectory => {
                config.download.directory = expand_tilde(value);
            }
            ConfigKey::DownloadMaxRetries => {
                config.download.max_retries = value
                    .parse()
                    .map_err(|_| invalid("expected a non-negative integer"))?;
            }
            ConfigKey::DownloadWorkers => {
                let workers: usize = value
                    .parse()
                    .map_err(|_| invalid("expected a positive integer"))?;
                if workers == 0 {
                    return Err(invalid("expected a positive integer"));
                }
                config.download.workers = workers;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section(), self.key_name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == s)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
