use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::auth::AuthError;

/// Non-retryable cause of a failed download.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("file system error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid request header: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),
}

/// Retryable network or HTTP failure.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("connection lost while streaming: {0}")]
    Stream(io::Error),
}

/// Errors returned by [`ArchiveDownloader::download`](super::ArchiveDownloader::download).
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Every attempt failed at the network or HTTP level.
    #[error("download to {} failed after {attempts} attempts: {source}", path.display())]
    Exhausted {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    /// A failure that retrying would not fix.
    #[error("download to {} failed: {source}", path.display())]
    Failed {
        path: PathBuf,
        #[source]
        source: FatalError,
    },

    /// Stopped by the cancellation token; any partial file is kept.
    #[error("download to {} cancelled", path.display())]
    Cancelled { path: PathBuf },
}

impl DownloadError {
    pub fn path(&self) -> &PathBuf {
        match self {
            DownloadError::Exhausted { path, .. }
            | DownloadError::Failed { path, .. }
            | DownloadError::Cancelled { path } => path,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Cancelled { .. })
    }
}
