//! `--reset-credentials`: replace stored credentials and verify them.

use std::path::Path;
use std::sync::Arc;

use photonic::auth::{CredentialStore, PortalClient};
use photonic::config::{ConfigFile, PortalConfig};

use crate::error::CliError;
use crate::prompt::TerminalPrompt;

/// Clear stored credentials and token, prompt for new ones and log in.
pub async fn run() -> Result<(), CliError> {
    let config = ConfigFile::load()?;
    let portal = PortalConfig::from_config_file(&config);

    // Missing or unreadable credentials make client construction prompt.
    let had_credentials = has_stored_credentials(&portal.credentials_path);
    let prompt = Arc::new(TerminalPrompt::new(portal.credentials_path.clone()));
    let client = PortalClient::new(&portal, prompt)?;

    if had_credentials {
        client.reset_credentials().await?;
    } else {
        client.authenticate().await?;
    }

    println!();
    println!("Credentials updated and verified.");
    Ok(())
}

/// Whether `path` holds credentials that load.
fn has_stored_credentials(path: &Path) -> bool {
    matches!(CredentialStore::new(path).load(), Ok(Some(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use photonic::auth::Credentials;
    use tempfile::TempDir;

    #[test]
    fn test_has_stored_credentials() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("credentials.json");
        assert!(!has_stored_credentials(&path));

        std::fs::write(&path, "{not json").unwrap();
        assert!(!has_stored_credentials(&path));

        CredentialStore::new(&path)
            .save(&Credentials::new("dr@example.com", "pw"))
            .unwrap();
        assert!(has_stored_credentials(&path));
    }
}
