//! CLI command implementations.

pub mod config;
pub mod download;
pub mod reset;
