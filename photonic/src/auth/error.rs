//! Authentication error types.

use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// Failures of the login flow.
///
/// `Clone` so that callers coalesced behind one refresh can all receive the
/// same outcome.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Terminal for the session until credentials are reset: bad login,
    /// rate limiting, or a login response without a token.
    #[error("invalid credentials: {0}")]
    CredentialsInvalid(String),

    /// Transient or ambiguous login failure (network, HTTP status, malformed
    /// body, undecodable token). Not retried within one login.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// No token was available after authenticating.
    #[error("no bearer token available")]
    NoToken,
}

impl AuthError {
    /// Whether this error poisons the session.
    pub fn is_credentials_invalid(&self) -> bool {
        matches!(self, AuthError::CredentialsInvalid(_))
    }
}

/// Failure of an authenticated GET or POST.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The request could not be authorized.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// The request was authorized but the HTTP exchange failed.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl RequestError {
    /// Returns the authentication error, if that is what this is.
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            RequestError::Auth(e) => Some(e),
            RequestError::Http(_) => None,
        }
    }
}

/// Failure to set up or reset a [`PortalClient`](super::PortalClient).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to obtain credentials: {0}")]
    Prompt(#[source] io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_server_message() {
        let err = AuthError::CredentialsInvalid("bad password".to_string());
        assert_eq!(err.to_string(), "invalid credentials: bad password");
        assert!(err.is_credentials_invalid());
        assert!(!AuthError::NoToken.is_credentials_invalid());
    }

    #[test]
    fn test_request_error_wraps_auth() {
        let err: RequestError = AuthError::Authentication("timeout".to_string()).into();
        assert_eq!(err.to_string(), "authentication failed: timeout");
        assert!(matches!(err.as_auth(), Some(AuthError::Authentication(_))));
    }
}
