//! In-memory session state shared by all users of one client.

use super::credentials::Credentials;
use super::error::AuthError;
use super::token::CachedToken;

/// Whether automatic (re-)authentication is still allowed.
///
/// Once poisoned, the session stays poisoned until credentials are reset.
/// This keeps a doomed login from being retried into an account lockout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Ready,
    Poisoned { reason: String },
}

impl AuthState {
    pub fn is_poisoned(&self) -> bool {
        matches!(self, AuthState::Poisoned { .. })
    }
}

/// Credentials, current token and latch, guarded by the client's lock.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) credentials: Credentials,
    pub(crate) token: Option<CachedToken>,
    pub(crate) state: AuthState,
    /// Bumped by every completed login attempt.
    pub(crate) generation: u64,
    /// Outcome of the most recent failed login, handed to coalesced waiters.
    pub(crate) last_failure: Option<AuthError>,
}

impl Session {
    pub(crate) fn new(credentials: Credentials, token: Option<CachedToken>) -> Self {
        Self {
            credentials,
            token,
            state: AuthState::Ready,
            generation: 0,
            last_failure: None,
        }
    }

    /// The current token if it may still be sent.
    pub(crate) fn usable_token(&self) -> Option<&CachedToken> {
        self.token.as_ref().filter(|token| token.is_usable())
    }

    /// Fails with `CredentialsInvalid` when the latch is set.
    pub(crate) fn check_latch(&self) -> Result<(), AuthError> {
        match &self.state {
            AuthState::Ready => Ok(()),
            AuthState::Poisoned { reason } => Err(AuthError::CredentialsInvalid(reason.clone())),
        }
    }

    /// Record the outcome of a login round-trip.
    pub(crate) fn record_login(&mut self, outcome: &Result<CachedToken, AuthError>) {
        self.generation += 1;
        match outcome {
            Ok(token) => {
                self.token = Some(token.clone());
                self.last_failure = None;
            }
            Err(err) => {
                if let AuthError::CredentialsInvalid(reason) = err {
                    self.token = None;
                    self.state = AuthState::Poisoned {
                        reason: reason.clone(),
                    };
                }
                self.last_failure = Some(err.clone());
            }
        }
    }

    /// Drop the token if it is still the one identified by `access_token`.
    ///
    /// Returns whether anything was cleared.
    pub(crate) fn invalidate(&mut self, access_token: &str) -> bool {
        match &self.token {
            Some(current) if current.access_token == access_token => {
                self.token = None;
                true
            }
            _ => false,
        }
    }

    /// Start over with new credentials and a cleared latch.
    pub(crate) fn reset(&mut self, credentials: Credentials) {
        self.credentials = credentials;
        self.token = None;
        self.state = AuthState::Ready;
        self.last_failure = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token(value: &str, exp_epoch: i64) -> CachedToken {
        CachedToken {
            access_token: value.to_string(),
            exp_epoch,
        }
    }

    fn session() -> Session {
        Session::new(Credentials::new("u", "p"), None)
    }

    #[test]
    fn test_expired_token_is_not_usable() {
        let mut s = session();
        s.token = Some(token("old", 1));
        assert!(s.usable_token().is_none());

        s.token = Some(token("new", i64::MAX));
        assert_eq!(s.usable_token().map(|t| t.access_token.as_str()), Some("new"));
    }

    #[test]
    fn test_hard_failure_poisons() {
        let mut s = session();
        s.token = Some(token("t", i64::MAX));

        s.record_login(&Err(AuthError::CredentialsInvalid("bad password".to_string())));

        assert!(s.state.is_poisoned());
        assert!(s.token.is_none());
        assert_eq!(s.generation, 1);
        assert!(matches!(
            s.check_latch(),
            Err(AuthError::CredentialsInvalid(reason)) if reason == "bad password"
        ));
    }

    #[test]
    fn test_transient_failure_does_not_poison() {
        let mut s = session();
        s.record_login(&Err(AuthError::Authentication("timeout".to_string())));

        assert_eq!(s.state, AuthState::Ready);
        assert!(s.check_latch().is_ok());
        assert!(matches!(s.last_failure, Some(AuthError::Authentication(_))));
    }

    #[test]
    fn test_success_clears_last_failure() {
        let mut s = session();
        s.record_login(&Err(AuthError::Authentication("timeout".to_string())));
        s.record_login(&Ok(token("fresh", i64::MAX)));

        assert_eq!(s.generation, 2);
        assert!(s.last_failure.is_none());
        assert!(s.usable_token().is_some());
    }

    #[test]
    fn test_invalidate_is_compare_and_clear() {
        let mut s = session();
        s.token = Some(token("current", i64::MAX));

        assert!(!s.invalidate("stale"));
        assert!(s.token.is_some());

        assert!(s.invalidate("current"));
        assert!(s.token.is_none());
    }

    #[test]
    fn test_reset_clears_latch() {
        let mut s = session();
        s.record_login(&Err(AuthError::CredentialsInvalid("locked".to_string())));

        s.reset(Credentials::new("new", "secret"));

        assert_eq!(s.state, AuthState::Ready);
        assert_eq!(s.credentials.username, "new");
        assert!(s.last_failure.is_none());
    }
}
