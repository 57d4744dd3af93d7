//! Streaming archive download with retry and Range resume.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::TryStreamExt;
use reqwest::header::{HeaderMap, HeaderValue, RANGE};
use reqwest::StatusCode;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::error::{DownloadError, FatalError, TransportError};
use super::policy::RetryPolicy;
use super::progress::{format_size, ProgressThrottle};
use crate::auth::{PortalClient, RequestError};

/// Read buffer size for the body stream.
const CHUNK_SIZE: usize = 8 * 1024;

/// Partial files below this size after a failed download are assumed to be
/// error bodies, not archive data, and are deleted.
pub const MIN_PARTIAL_SIZE: u64 = 1024;

/// Outcome of a single attempt that did not complete.
#[derive(Debug)]
enum AttemptError {
    Transport(TransportError),
    Fatal(FatalError),
    Cancelled,
}

impl From<RequestError> for AttemptError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Http(e) => AttemptError::Transport(e.into()),
            RequestError::Auth(e) => AttemptError::Fatal(e.into()),
        }
    }
}

/// Downloads study archives to `<dir>/<base name>.zip`.
#[derive(Debug, Clone)]
pub struct ArchiveDownloader {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl ArchiveDownloader {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    /// Destination path for a base name.
    pub fn archive_path(dest_dir: &Path, base_name: &str) -> PathBuf {
        dest_dir.join(format!("{}.zip", base_name))
    }

    /// Download the archive of `internal_id`.
    ///
    /// Network and HTTP failures are retried up to the policy's budget with
    /// exponential backoff; retries resume from the partial file when the
    /// server honours `Range`. A partial file is kept for a later resume
    /// unless it is smaller than [`MIN_PARTIAL_SIZE`].
    pub async fn download(
        &self,
        client: &PortalClient,
        internal_id: &str,
        base_name: &str,
        dest_dir: &Path,
    ) -> Result<PathBuf, DownloadError> {
        let path = Self::archive_path(dest_dir, base_name);

        if let Err(e) = fs::create_dir_all(dest_dir).await {
            return Err(DownloadError::Failed {
                path,
                source: e.into(),
            });
        }

        let url = client.endpoints().archive(internal_id);
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled { path });
            }

            match self.attempt(client, &url, &path, attempt).await {
                Ok(bytes) => {
                    info!(
                        file = %path.display(),
                        size = %format_size(bytes),
                        "Download complete"
                    );
                    return Ok(path);
                }
                Err(AttemptError::Cancelled) => {
                    info!(file = %path.display(), "Download cancelled; partial file kept");
                    return Err(DownloadError::Cancelled { path });
                }
                Err(AttemptError::Transport(source)) => {
                    attempt += 1;
                    if attempt > self.policy.max_retries {
                        discard_if_small(&path).await;
                        return Err(DownloadError::Exhausted {
                            path,
                            attempts: attempt,
                            source,
                        });
                    }

                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        file = %path.display(),
                        error = %source,
                        "Download interrupted (attempt {}/{}), retrying in {:?}",
                        attempt,
                        self.policy.max_attempts(),
                        delay
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            return Err(DownloadError::Cancelled { path });
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(AttemptError::Fatal(source)) => {
                    discard_if_small(&path).await;
                    return Err(DownloadError::Failed { path, source });
                }
            }
        }
    }

    /// One request/stream cycle. Returns the final file size.
    async fn attempt(
        &self,
        client: &PortalClient,
        url: &str,
        path: &Path,
        attempt: u32,
    ) -> Result<u64, AttemptError> {
        let existing = if attempt > 0 { file_len(path).await } else { 0 };
        let resuming = existing > 0;

        let mut headers = HeaderMap::new();
        if resuming {
            let range = HeaderValue::from_str(&format!("bytes={}-", existing))
                .map_err(|e| AttemptError::Fatal(e.into()))?;
            headers.insert(RANGE, range);
            info!(file = %path.display(), offset = existing, "Resuming download");
        }

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(AttemptError::Cancelled),
            response = client.authenticated_get(url, headers) => response?,
        };
        let status = response.status();
        let response = response
            .error_for_status()
            .map_err(|e| AttemptError::Transport(e.into()))?;

        let append = resuming && status == StatusCode::PARTIAL_CONTENT;
        if resuming && !append {
            info!(%status, "Server ignored range request, restarting from the beginning");
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .await
            .map_err(|e| AttemptError::Fatal(e.into()))?;
        let mut writer = BufWriter::new(file);

        let mut written = if append { existing } else { 0 };
        let total = response.content_length().map(|len| len + written);

        let stream = response.bytes_stream().map_err(io::Error::other);
        let mut reader = Box::pin(StreamReader::new(stream));
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut throttle = ProgressThrottle::default();

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    if let Err(e) = writer.flush().await {
                        warn!(error = %e, "Failed to flush partial file");
                    }
                    return Err(AttemptError::Cancelled);
                }
                read = reader.read(&mut buf) => read,
            };

            let n = match read {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    if let Err(flush_err) = writer.flush().await {
                        warn!(error = %flush_err, "Failed to flush partial file");
                    }
                    return Err(AttemptError::Transport(TransportError::Stream(e)));
                }
            };

            writer
                .write_all(&buf[..n])
                .await
                .map_err(|e| AttemptError::Fatal(e.into()))?;
            written += n as u64;

            if throttle.ready() {
                match total {
                    Some(total) if total > 0 => info!(
                        file = %path.display(),
                        "Downloaded {} of {} ({:.1}%)",
                        format_size(written),
                        format_size(total),
                        written as f64 / total as f64 * 100.0
                    ),
                    _ => info!(file = %path.display(), "Downloaded {}", format_size(written)),
                }
            }
        }

        writer
            .flush()
            .await
            .map_err(|e| AttemptError::Fatal(e.into()))?;
        debug!(file = %path.display(), bytes = written, "Stream finished");
        Ok(written)
    }
}

async fn file_len(path: &Path) -> u64 {
    fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}

/// Delete a leftover file that is too small to be worth resuming.
async fn discard_if_small(path: &Path) {
    let Ok(metadata) = fs::metadata(path).await else {
        return;
    };
    if metadata.len() >= MIN_PARTIAL_SIZE {
        info!(
            file = %path.display(),
            size = %format_size(metadata.len()),
            "Keeping partial file for a later resume"
        );
        return;
    }
    match fs::remove_file(path).await {
        Ok(()) => debug!(file = %path.display(), "Removed truncated partial file"),
        Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove partial file"),
    }
}
