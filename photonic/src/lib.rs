//! Photonic - unattended retrieval of imaging studies from a QuickRad portal.
//!
//! The library is organised around one authenticated, shareable HTTP client
//! and a resumable archive downloader driven by a bulk orchestrator:
//!
//! ```text
//! BulkOrchestrator
//!         │
//!         ├── StudyPipeline (per study: resolve → download)
//!         │       ├── api::resolve_internal_id
//!         │       └── ArchiveDownloader (retry + Range resume)
//!         │
//!         └── PortalClient (shared, token refresh critical section)
//!                 ├── JsonFileStore<Credentials>
//!                 └── JsonFileStore<CachedToken>
//! ```
//!
//! Configuration is passed explicitly through [`config::PortalConfig`]; there
//! is no process-wide state besides the optional `tracing` subscriber.

pub mod api;
pub mod auth;
pub mod bulk;
pub mod config;
pub mod download;
pub mod logging;
pub mod naming;
pub mod store;

#[cfg(test)]
mod testing;

/// Library version, used in CLI banners and the HTTP user agent.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
