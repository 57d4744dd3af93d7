//! Bearer token cache entry and JWT expiry decoding.
//!
//! The portal issues JWTs. The expiry is always taken from the token's own
//! `exp` claim; the signature is not checked since the token is opaque to us
//! and only ever sent back to the server that issued it.

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::JsonFileStore;

/// A token is only used while at least this many seconds remain before expiry.
pub const REFRESH_MARGIN_SECS: i64 = 30;

/// Persistent token cache (`token.json`).
pub type TokenStore = JsonFileStore<CachedToken>;

/// Why a token's expiry could not be read.
#[derive(Debug, Error)]
pub enum TokenFormatError {
    #[error("token is not a JWT (missing payload segment)")]
    MissingPayload,

    #[error("token payload is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("token payload is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("token payload has no numeric 'exp' claim")]
    MissingExpiry,
}

/// Decode the `exp` claim (unix seconds) from a JWT without verifying it.
pub fn decode_jwt_expiry(token: &str) -> Result<i64, TokenFormatError> {
    let payload = token
        .split('.')
        .nth(1)
        .filter(|segment| !segment.is_empty())
        .ok_or(TokenFormatError::MissingPayload)?;

    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes)?;

    let exp = claims.get("exp").ok_or(TokenFormatError::MissingExpiry)?;
    exp.as_i64()
        .or_else(|| exp.as_f64().map(|secs| secs as i64))
        .ok_or(TokenFormatError::MissingExpiry)
}

/// A bearer token together with its absolute expiry.
///
/// Never mutated in place; a refresh always produces a new value.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedToken {
    /// Opaque JWT sent as `Authorization: JWT <token>`.
    pub access_token: String,
    /// Expiry as unix seconds, decoded from the token body.
    pub exp_epoch: i64,
}

impl CachedToken {
    /// Build a cache entry from a freshly issued JWT.
    pub fn from_jwt(access_token: impl Into<String>) -> Result<Self, TokenFormatError> {
        let access_token = access_token.into();
        let exp_epoch = decode_jwt_expiry(&access_token)?;
        Ok(Self {
            access_token,
            exp_epoch,
        })
    }

    /// Whether the token can still be used right now.
    pub fn is_usable(&self) -> bool {
        self.is_usable_at(Utc::now().timestamp())
    }

    /// Whether the token can be used at `now` (unix seconds).
    ///
    /// True iff `now + 30s < expiry`; at exactly `expiry - 30s` it is false.
    pub fn is_usable_at(&self, now: i64) -> bool {
        now.saturating_add(REFRESH_MARGIN_SECS) < self.exp_epoch
    }

    /// Expiry rendered in local time, for log lines.
    pub fn expires_display(&self) -> String {
        DateTime::from_timestamp(self.exp_epoch, 0)
            .map(|utc| {
                utc.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or_else(|| self.exp_epoch.to_string())
    }
}

impl fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedToken")
            .field("access_token", &"<redacted>")
            .field("exp_epoch", &self.exp_epoch)
            .finish()
    }
}
