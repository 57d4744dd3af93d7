//! Portal authentication.
//!
//! [`PortalClient`] owns the HTTP connection pool, the credentials and the
//! current bearer token. Every authenticated request first makes sure a
//! usable token is held; refreshing it is a critical section so that
//! concurrent workers never log in more than once for the same need.
//!
//! A login that the portal rejects outright (bad credentials, rate limiting)
//! poisons the session: from then on no automatic login is attempted until
//! [`PortalClient::reset_credentials`] is called.

mod client;
mod credentials;
mod error;
mod session;
mod token;

pub use client::PortalClient;
pub use credentials::{CredentialPrompt, CredentialStore, Credentials, NoPrompt};
pub use error::{AuthError, ClientError, RequestError};
pub use session::AuthState;
pub use token::{decode_jwt_expiry, CachedToken, TokenFormatError, TokenStore, REFRESH_MARGIN_SECS};
