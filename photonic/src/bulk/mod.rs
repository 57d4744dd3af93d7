//! Bulk study retrieval.
//!
//! [`BulkOrchestrator`] takes a list of studies, gives each a unique archive
//! name and runs them through the resolve-then-download pipeline, either
//! one at a time or on a bounded pool of workers sharing one
//! [`PortalClient`](crate::auth::PortalClient).

mod orchestrator;
mod pipeline;
mod result;
mod strategy;

pub use orchestrator::{BulkOptions, BulkOrchestrator};
pub use pipeline::{StudyPipeline, StudyStatus};
pub use result::{BulkResult, DownloadOutcome};
pub use strategy::ExecutionMode;
