//! Well-known file locations.

use std::path::PathBuf;

pub(crate) const STATE_DIR: &str = ".photonic";
pub(crate) const CREDENTIALS_FILE: &str = "credentials.json";
pub(crate) const TOKEN_FILE: &str = "token.json";
pub(crate) const CONFIG_FILE: &str = "config.ini";
const LOG_DIR: &str = "logs";

/// Per-user state directory (`~/.photonic`).
///
/// Falls back to the current directory when no home directory is known.
pub fn state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(STATE_DIR)
}

pub fn credentials_file_path() -> PathBuf {
    state_dir().join(CREDENTIALS_FILE)
}

pub fn token_file_path() -> PathBuf {
    state_dir().join(TOKEN_FILE)
}

pub fn config_file_path() -> PathBuf {
    state_dir().join(CONFIG_FILE)
}

pub fn log_dir() -> PathBuf {
    state_dir().join(LOG_DIR)
}

/// Default archive destination: `<Downloads>/photonic`.
pub fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("photonic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_files_live_in_state_dir() {
        let state = state_dir();
        assert!(credentials_file_path().starts_with(&state));
        assert!(token_file_path().starts_with(&state));
        assert!(config_file_path().starts_with(&state));
        assert!(log_dir().starts_with(&state));
    }

    #[test]
    fn test_default_download_dir_name() {
        assert!(default_download_dir().ends_with("photonic"));
    }
}
