//! CLI error type and exit-code mapping.

use std::fmt;
use std::io;
use std::path::PathBuf;

use photonic::api::ApiError;
use photonic::auth::{AuthError, ClientError};
use photonic::config::ConfigError;

/// Exit status for authentication failures.
pub const EXIT_AUTH: u8 = 2;

/// Exit status for every other failure, including partially failed batches.
pub const EXIT_FAILURE: u8 = 1;

/// Errors that end a CLI run.
#[derive(Debug)]
pub enum CliError {
    /// Login failed or the session is poisoned.
    Auth(AuthError),
    /// A portal API call failed before any study work started.
    Api(ApiError),
    /// Configuration or setup problem.
    Config(String),
    /// Filesystem error outside the per-study pipeline.
    Io { path: PathBuf, source: io::Error },
    /// The portal returned no studies.
    EmptyWorklist,
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Auth(_) => EXIT_AUTH,
            _ => EXIT_FAILURE,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Auth(e) => write!(f, "{}", e),
            CliError::Api(e) => write!(f, "{}", e),
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::Io { path, source } => write!(f, "{}: {}", path.display(), source),
            CliError::EmptyWorklist => write!(f, "No studies found in the worklist"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Auth(e) => Some(e),
            CliError::Api(e) => Some(e),
            CliError::Io { source, .. } => Some(source),
            CliError::Config(_) | CliError::EmptyWorklist => None,
        }
    }
}

impl From<AuthError> for CliError {
    fn from(e: AuthError) -> Self {
        CliError::Auth(e)
    }
}

impl From<ApiError> for CliError {
    fn from(e: ApiError) -> Self {
        match e.as_auth() {
            Some(auth) => CliError::Auth(auth.clone()),
            None => CliError::Api(e),
        }
    }
}

impl From<ClientError> for CliError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Auth(auth) => CliError::Auth(auth),
            other => CliError::Config(other.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let auth = CliError::Auth(AuthError::CredentialsInvalid("bad password".to_string()));
        assert_eq!(auth.exit_code(), 2);
        assert_eq!(CliError::EmptyWorklist.exit_code(), 1);
        assert_eq!(CliError::Config("x".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_client_auth_error_maps_to_auth() {
        let err: CliError =
            ClientError::Auth(AuthError::Authentication("timeout".to_string())).into();
        assert_eq!(err.exit_code(), 2);

        let err: CliError = ClientError::Prompt(io::Error::other("no tty")).into();
        assert_eq!(err.exit_code(), 1);
    }
}
