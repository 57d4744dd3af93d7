use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::pipeline::StudyPipeline;
use super::result::BulkResult;
use super::strategy::{ConcurrentStrategy, ExecutionMode, Job, SequentialStrategy};
use crate::api::StudyRecord;
use crate::auth::PortalClient;
use crate::download::{ArchiveDownloader, RetryPolicy};
use crate::naming::unique_base_names;

/// Settings for one bulk run.
#[derive(Debug, Clone)]
pub struct BulkOptions {
    pub download_dir: PathBuf,
    pub retry: RetryPolicy,
    pub mode: ExecutionMode,
}

impl BulkOptions {
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
            retry: RetryPolicy::default(),
            mode: ExecutionMode::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Drives a batch of studies through resolve and download.
///
/// A failing study never aborts the batch; it is recorded in the returned
/// [`BulkResult`]. Retrying is left to the downloader's own budget.
#[derive(Debug)]
pub struct BulkOrchestrator {
    pipeline: Arc<StudyPipeline>,
    mode: ExecutionMode,
    cancel: CancellationToken,
}

impl BulkOrchestrator {
    pub fn new(client: Arc<PortalClient>, options: BulkOptions, cancel: CancellationToken) -> Self {
        let downloader = ArchiveDownloader::new(options.retry, cancel.clone());
        Self {
            pipeline: Arc::new(StudyPipeline::new(
                client,
                downloader,
                options.download_dir,
                cancel.clone(),
            )),
            mode: options.mode,
            cancel,
        }
    }

    /// Process every study and return the aggregate result.
    pub async fn run(&self, studies: Vec<StudyRecord>) -> BulkResult {
        let base_names = unique_base_names(studies.iter().map(|s| s.patient_name.as_str()));
        let jobs: Vec<Job> = studies
            .into_iter()
            .zip(base_names)
            .map(|(study, base_name)| Job { study, base_name })
            .collect();

        let result = match self.mode {
            ExecutionMode::Sequential => {
                SequentialStrategy
                    .execute(&self.pipeline, jobs, &self.cancel)
                    .await
            }
            ExecutionMode::Concurrent { max_workers } => {
                ConcurrentStrategy::new(max_workers)
                    .execute(Arc::clone(&self.pipeline), jobs, &self.cancel)
                    .await
            }
        };

        log_summary(&result);
        result
    }
}

fn log_summary(result: &BulkResult) {
    info!(
        "Downloaded {}/{} studies successfully",
        result.success_count(),
        result.total_count
    );
    if result.has_failures() {
        warn!("{} studies failed:", result.failure_count());
        for outcome in &result.failed {
            warn!("  {} ({})", outcome.patient_name, outcome.study_uid);
        }
    }
    if result.was_interrupted() {
        warn!(
            "Interrupted; {} studies were not downloaded",
            result.skipped.len()
        );
    }
}
