use thiserror::Error;

use crate::auth::{AuthError, RequestError};

/// Errors from the portal's JSON endpoints.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Request(#[from] RequestError),

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("unexpected response from {url}: {reason}")]
    Decode { url: String, reason: String },

    /// The portal has no internal identifier for this study.
    #[error("could not resolve internal id for study {study_uid}")]
    Resolution { study_uid: String },
}

impl ApiError {
    /// The underlying authentication failure, if any.
    pub fn as_auth(&self) -> Option<&AuthError> {
        match self {
            ApiError::Request(e) => e.as_auth(),
            _ => None,
        }
    }
}
