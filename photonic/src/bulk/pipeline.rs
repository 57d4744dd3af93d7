//! Resolve-then-download for a single study.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{resolve_internal_id, ApiError, StudyRecord};
use crate::auth::PortalClient;
use crate::download::{ArchiveDownloader, DownloadError};

/// Final state of one study.
#[derive(Debug)]
pub enum StudyStatus {
    Downloaded(PathBuf),
    Failed,
    /// Interrupted before it could finish.
    Skipped,
}

#[derive(Debug, Error)]
enum StudyError {
    #[error("worklist entry has no study instance UID")]
    MissingUid,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("interrupted")]
    Cancelled,
}

impl StudyError {
    fn is_cancelled(&self) -> bool {
        match self {
            StudyError::Cancelled => true,
            StudyError::Download(e) => e.is_cancelled(),
            _ => false,
        }
    }
}

/// Processes one study end to end. Never fails: every error is logged and
/// turned into a [`StudyStatus`].
#[derive(Debug)]
pub struct StudyPipeline {
    client: Arc<PortalClient>,
    downloader: ArchiveDownloader,
    dest_dir: PathBuf,
    cancel: CancellationToken,
}

impl StudyPipeline {
    pub fn new(
        client: Arc<PortalClient>,
        downloader: ArchiveDownloader,
        dest_dir: PathBuf,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            downloader,
            dest_dir,
            cancel,
        }
    }

    /// Resolve (unless the internal id is already known) and download
    /// `study` to `<dest_dir>/<base_name>.zip`.
    pub async fn process_one(&self, study: &StudyRecord, base_name: &str) -> StudyStatus {
        match self.run(study, base_name).await {
            Ok(path) => StudyStatus::Downloaded(path),
            Err(e) if e.is_cancelled() => {
                warn!(study_uid = %study.study_instance_uid, "Study interrupted");
                StudyStatus::Skipped
            }
            Err(e) => {
                error!(
                    study_uid = %study.study_instance_uid,
                    patient = %study.patient_name,
                    error = %e,
                    "Study failed"
                );
                StudyStatus::Failed
            }
        }
    }

    async fn run(&self, study: &StudyRecord, base_name: &str) -> Result<PathBuf, StudyError> {
        let internal_id = match &study.study_instance_uuid {
            Some(id) => id.clone(),
            None if study.study_instance_uid.is_empty() => return Err(StudyError::MissingUid),
            None => tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(StudyError::Cancelled),
                resolved = resolve_internal_id(&self.client, &study.study_instance_uid) => resolved?,
            },
        };

        info!(
            study_uid = %study.study_instance_uid,
            file = %format!("{}.zip", base_name),
            "Downloading study"
        );
        let path = self
            .downloader
            .download(&self.client, &internal_id, base_name, &self.dest_dir)
            .await?;
        Ok(path)
    }
}
