//! Resumable archive downloads.
//!
//! [`ArchiveDownloader`] streams one study archive to disk. Transport
//! failures are retried with exponential backoff; from the second attempt on
//! an existing partial file is resumed with an HTTP `Range` request, and is
//! restarted from scratch if the server answers with the full content.

mod error;
mod policy;
mod progress;
mod resumable;

pub use error::{DownloadError, FatalError, TransportError};
pub use policy::RetryPolicy;
pub use progress::{format_size, ProgressThrottle, PROGRESS_INTERVAL};
pub use resumable::{ArchiveDownloader, MIN_PARTIAL_SIZE};
