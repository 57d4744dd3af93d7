//! Portal credentials and how to obtain them.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};

use crate::store::JsonFileStore;

/// Persistent credential store (`credentials.json`).
pub type CredentialStore = JsonFileStore<Credentials>;

/// Portal login. Replaced wholesale on reset, never edited.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Source of credentials when none are stored, or on reset.
///
/// Implementations may block (e.g. reading from a terminal); the client calls
/// them off the async executor.
pub trait CredentialPrompt: Send + Sync {
    fn prompt(&self) -> io::Result<Credentials>;
}

/// Prompt that never yields credentials, for non-interactive use.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

impl CredentialPrompt for NoPrompt {
    fn prompt(&self) -> io::Result<Credentials> {
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            "no stored credentials and prompting is disabled",
        ))
    }
}
