//! Portal JSON endpoints: worklist and study id resolution.

mod error;
mod resolver;
mod study;

pub use error::ApiError;
pub use resolver::{fetch_worklist, resolve_internal_id, DEFAULT_PAGE_SIZE};
pub use study::StudyRecord;
