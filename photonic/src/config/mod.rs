//! Configuration for the portal client and downloads.
//!
//! [`PortalConfig`] is the runtime configuration handed to every component at
//! construction time. [`ConfigFile`] is the user-editable INI file it is
//! usually built from.

mod file;
mod paths;

use std::path::PathBuf;
use std::time::Duration;

pub use file::{
    expand_tilde, ConfigError, ConfigFile, ConfigKey, DownloadSettings, PortalSettings,
    DEFAULT_MAX_RETRIES, DEFAULT_WORKERS,
};
pub use paths::{
    config_file_path, credentials_file_path, default_download_dir, log_dir, state_dir,
    token_file_path,
};

/// Default QuickRad portal.
pub const DEFAULT_BASE_URL: &str = "https://toprad.aikenist.com";

/// Timeout applied to the login round-trip.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect timeout for all other requests. Archive streams have no overall
/// timeout since studies can be several gigabytes.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runtime configuration for one portal session.
#[derive(Debug, Clone)]
pub struct PortalConfig {
    /// Base URL of the portal, without trailing slash.
    pub base_url: String,

    /// Directory study archives are written to.
    pub download_dir: PathBuf,

    /// Location of the persisted credentials.
    pub credentials_path: PathBuf,

    /// Location of the persisted bearer token.
    pub token_path: PathBuf,

    /// Timeout for the login request.
    pub login_timeout: Duration,

    /// Connect timeout for every request.
    pub connect_timeout: Duration,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            download_dir: default_download_dir(),
            credentials_path: credentials_file_path(),
            token_path: token_file_path(),
            login_timeout: DEFAULT_LOGIN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl PortalConfig {
    /// Build a runtime configuration from the on-disk config file.
    pub fn from_config_file(file: &ConfigFile) -> Self {
        Self {
            base_url: normalize_base_url(&file.portal.base_url),
            download_dir: file.download.directory.clone(),
            ..Default::default()
        }
    }

    /// Set the portal base URL.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.base_url = normalize_base_url(base_url.as_ref());
        self
    }

    /// Set the download directory.
    pub fn with_download_dir(mut self, dir: PathBuf) -> Self {
        self.download_dir = dir;
        self
    }

    /// Keep credentials and token under `dir` instead of the user state directory.
    pub fn with_state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        self.credentials_path = dir.join(paths::CREDENTIALS_FILE);
        self.token_path = dir.join(paths::TOKEN_FILE);
        self
    }

    /// Set the login timeout.
    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    /// Endpoint URLs derived from the base URL.
    pub fn endpoints(&self) -> Endpoints {
        Endpoints::new(&self.base_url)
    }
}

fn normalize_base_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// The four portal endpoints used by Photonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    base_url: String,
}

impl Endpoints {
    /// Create endpoints rooted at `base_url`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: normalize_base_url(base_url),
        }
    }

    pub fn login(&self) -> String {
        format!("{}/api/quickrad/telerad/login-validation", self.base_url)
    }

    pub fn worklist(&self) -> String {
        format!("{}/api/quickrad/telerad/fetch-admin-list", self.base_url)
    }

    pub fn study_data(&self) -> String {
        format!("{}/api/quickrad/general/get-misc-study-data", self.base_url)
    }

    /// Archive URL for a study's internal identifier.
    pub fn archive(&self, internal_id: &str) -> String {
        format!("{}/dicom-web/studies/{}/archive", self.base_url, internal_id)
    }
}
