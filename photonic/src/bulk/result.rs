//! Per-run outcome accounting.

use super::pipeline::StudyStatus;
use crate::api::StudyRecord;

/// One study in a bulk result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadOutcome {
    pub study_uid: String,
    pub patient_name: String,
}

impl From<&StudyRecord> for DownloadOutcome {
    fn from(study: &StudyRecord) -> Self {
        Self {
            study_uid: study.study_instance_uid.clone(),
            patient_name: study.patient_name.clone(),
        }
    }
}

/// Aggregate result of one orchestrator run.
///
/// Lists are in processing order: input order for sequential runs,
/// completion order for concurrent ones.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResult {
    /// Number of studies handed to the run.
    pub total_count: usize,
    pub successful: Vec<DownloadOutcome>,
    pub failed: Vec<DownloadOutcome>,
    /// Studies not finished because the run was interrupted.
    pub skipped: Vec<DownloadOutcome>,
}

impl BulkResult {
    pub fn new(total_count: usize) -> Self {
        Self {
            total_count,
            ..Default::default()
        }
    }

    /// File an outcome under the list matching `status`.
    pub(crate) fn record(&mut self, outcome: DownloadOutcome, status: &StudyStatus) {
        match status {
            StudyStatus::Downloaded(_) => self.successful.push(outcome),
            StudyStatus::Failed => self.failed.push(outcome),
            StudyStatus::Skipped => self.skipped.push(outcome),
        }
    }

    pub fn success_count(&self) -> usize {
        self.successful.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }

    pub fn was_interrupted(&self) -> bool {
        !self.skipped.is_empty()
    }

    /// Every study succeeded.
    pub fn is_complete(&self) -> bool {
        self.success_count() == self.total_count
    }

    /// Studies accounted for so far.
    pub fn processed_count(&self) -> usize {
        self.successful.len() + self.failed.len() + self.skipped.len()
    }

    /// Percentage of studies accounted for.
    pub fn progress_percent(&self) -> f64 {
        if self.total_count == 0 {
            100.0
        } else {
            self.processed_count() as f64 / self.total_count as f64 * 100.0
        }
    }
}
