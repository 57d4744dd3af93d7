//! Sequential and concurrent execution of study jobs.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::pipeline::{StudyPipeline, StudyStatus};
use super::result::{BulkResult, DownloadOutcome};
use crate::api::StudyRecord;

/// How a bulk run schedules its studies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionMode {
    /// One study at a time, in input order.
    #[default]
    Sequential,
    /// Up to `max_workers` studies at once; results in completion order.
    Concurrent { max_workers: usize },
}

impl ExecutionMode {
    /// Concurrent mode with at least one worker.
    pub fn concurrent(max_workers: usize) -> Self {
        ExecutionMode::Concurrent {
            max_workers: max_workers.max(1),
        }
    }
}

/// A study paired with its unique archive base name.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub study: StudyRecord,
    pub base_name: String,
}

/// Processes jobs one at a time.
#[derive(Debug, Default)]
pub(crate) struct SequentialStrategy;

impl SequentialStrategy {
    pub async fn execute(
        &self,
        pipeline: &StudyPipeline,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
    ) -> BulkResult {
        let total = jobs.len();
        let mut result = BulkResult::new(total);

        for (index, job) in jobs.into_iter().enumerate() {
            let outcome = DownloadOutcome::from(&job.study);
            if cancel.is_cancelled() {
                result.skipped.push(outcome);
                continue;
            }

            info!(
                "Processing study {}/{} ({:.0}%): {}",
                index + 1,
                total,
                index as f64 / total as f64 * 100.0,
                job.study.patient_name
            );
            let status = pipeline.process_one(&job.study, &job.base_name).await;
            result.record(outcome, &status);
        }

        result
    }
}

/// Processes jobs on a bounded pool of tasks sharing one client.
#[derive(Debug)]
pub(crate) struct ConcurrentStrategy {
    max_workers: usize,
}

impl ConcurrentStrategy {
    pub fn new(max_workers: usize) -> Self {
        Self {
            max_workers: max_workers.max(1),
        }
    }

    pub async fn execute(
        &self,
        pipeline: Arc<StudyPipeline>,
        jobs: Vec<Job>,
        cancel: &CancellationToken,
    ) -> BulkResult {
        let total = jobs.len();
        let mut result = BulkResult::new(total);
        if total == 0 {
            return result;
        }

        let workers = self.max_workers.min(total);
        info!(workers, studies = total, "Starting concurrent downloads");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut outcomes: Vec<Option<DownloadOutcome>> = Vec::with_capacity(total);
        let mut tasks = JoinSet::new();

        for (index, job) in jobs.into_iter().enumerate() {
            outcomes.push(Some(DownloadOutcome::from(&job.study)));

            let pipeline = Arc::clone(&pipeline);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let permit = tokio::select! {
                    _ = cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };
                let status = match permit {
                    Some(_permit) if !cancel.is_cancelled() => {
                        pipeline.process_one(&job.study, &job.base_name).await
                    }
                    _ => StudyStatus::Skipped,
                };
                (index, status)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, status)) => {
                    if let Some(outcome) = outcomes.get_mut(index).and_then(Option::take) {
                        let name = outcome.patient_name.clone();
                        result.record(outcome, &status);
                        if !matches!(status, StudyStatus::Skipped) {
                            info!(
                                "Completed study {}/{} ({:.0}%): {}",
                                result.processed_count(),
                                total,
                                result.progress_percent(),
                                name
                            );
                        }
                    }
                }
                Err(e) => error!(error = %e, "Study worker aborted"),
            }
        }

        // Workers that panicked never reported back.
        for outcome in outcomes.into_iter().flatten() {
            result.failed.push(outcome);
        }

        result
    }
}
