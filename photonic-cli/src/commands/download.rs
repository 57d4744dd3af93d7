//! Default command: fetch studies and download their archives.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use photonic::api::{fetch_worklist, StudyRecord};
use photonic::auth::PortalClient;
use photonic::bulk::{BulkOptions, BulkOrchestrator, BulkResult, ExecutionMode};
use photonic::config::{expand_tilde, ConfigFile, PortalConfig};
use photonic::download::RetryPolicy;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::CliError;
use crate::prompt::TerminalPrompt;

/// Arguments for a download run.
#[derive(Debug, Clone)]
pub struct DownloadArgs {
    pub download_dir: Option<String>,
    pub set_default_dir: bool,
    pub all: bool,
    pub count: usize,
    pub study_uids: Vec<String>,
    pub max_retries: Option<u32>,
    pub concurrent: bool,
    pub workers: Option<usize>,
    pub page_size: u32,
}

/// How a run that did not error ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Success,
    PartialFailure,
    Interrupted,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            RunStatus::Success | RunStatus::Interrupted => 0,
            RunStatus::PartialFailure => crate::error::EXIT_FAILURE,
        }
    }

    fn from_result(result: &BulkResult) -> Self {
        if result.has_failures() {
            RunStatus::PartialFailure
        } else if result.was_interrupted() {
            RunStatus::Interrupted
        } else {
            RunStatus::Success
        }
    }
}

/// Run a download. Ctrl+C is expected to trigger `cancel`.
pub async fn run(args: DownloadArgs, cancel: CancellationToken) -> Result<RunStatus, CliError> {
    let mut config = ConfigFile::load()?;

    let download_dir = match &args.download_dir {
        Some(dir) => expand_tilde(dir),
        None => config.download.directory.clone(),
    };
    if args.set_default_dir {
        config.download.directory = download_dir.clone();
        config.save()?;
        println!("Default download directory set to {}", download_dir.display());
    }

    std::fs::create_dir_all(&download_dir).map_err(|source| CliError::Io {
        path: download_dir.clone(),
        source,
    })?;

    let portal = PortalConfig::from_config_file(&config).with_download_dir(download_dir.clone());
    let mode = if args.concurrent || args.workers.is_some() {
        ExecutionMode::concurrent(args.workers.unwrap_or(config.download.workers))
    } else {
        ExecutionMode::Sequential
    };
    let retry = RetryPolicy::new(args.max_retries.unwrap_or(config.download.max_retries));

    print_banner(&portal, &download_dir, mode, &retry);

    let prompt = Arc::new(TerminalPrompt::new(portal.credentials_path.clone()));
    let client = Arc::new(PortalClient::new(&portal, prompt)?);

    let Some(auth) = until_cancelled(&cancel, client.ensure_authenticated()).await else {
        println!("Interrupted before any study was processed.");
        return Ok(RunStatus::Interrupted);
    };
    auth?;

    let Some(studies) = until_cancelled(&cancel, select_studies(&client, &args)).await else {
        println!("Interrupted before any study was processed.");
        return Ok(RunStatus::Interrupted);
    };
    let studies = studies?;

    println!("Studies to download: {}", studies.len());
    println!();

    let options = BulkOptions::new(download_dir.clone())
        .with_retry(retry)
        .with_mode(mode);
    let result = BulkOrchestrator::new(client, options, cancel)
        .run(studies)
        .await;

    print_summary(&result, &download_dir);
    Ok(RunStatus::from_result(&result))
}

async fn select_studies(
    client: &PortalClient,
    args: &DownloadArgs,
) -> Result<Vec<StudyRecord>, CliError> {
    if !args.study_uids.is_empty() {
        return Ok(StudyRecord::from_uids(args.study_uids.iter().cloned()));
    }

    let page_size = if args.all {
        args.page_size
    } else {
        args.page_size.max(u32::try_from(args.count).unwrap_or(u32::MAX))
    };
    let mut studies = fetch_worklist(client, page_size, 1).await?;
    if studies.is_empty() {
        return Err(CliError::EmptyWorklist);
    }

    if !args.all {
        studies.truncate(args.count);
    }
    info!(count = studies.len(), "Selected studies from worklist");
    Ok(studies)
}

/// `None` if `cancel` fired first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        _ = cancel.cancelled() => None,
        output = fut => Some(output),
    }
}

fn print_banner(portal: &PortalConfig, download_dir: &Path, mode: ExecutionMode, retry: &RetryPolicy) {
    println!("Photonic v{}", photonic::VERSION);
    println!("================");
    println!();
    println!("Portal:      {}", portal.base_url);
    println!("Destination: {}", download_dir.display());
    match mode {
        ExecutionMode::Sequential => println!("Mode:        sequential"),
        ExecutionMode::Concurrent { max_workers } => {
            println!("Mode:        concurrent ({} workers)", max_workers)
        }
    }
    println!("Retries:     {}", retry.max_retries);
    println!();
    println!("Press Ctrl+C to stop after the current step");
    println!();
}

fn print_summary(result: &BulkResult, download_dir: &Path) {
    println!();
    for line in summary_lines(result, download_dir) {
        println!("{}", line);
    }
}

fn summary_lines(result: &BulkResult, download_dir: &Path) -> Vec<String> {
    let mut lines = vec![
        "Summary".to_string(),
        "───────".to_string(),
        format!(
            "  Downloaded: {}/{}",
            result.success_count(),
            result.total_count
        ),
    ];
    if result.has_failures() {
        lines.push(format!("  Failed:     {}", result.failure_count()));
        for outcome in &result.failed {
            lines.push(format!("    - {} ({})", outcome.patient_name, outcome.study_uid));
        }
    }
    if result.was_interrupted() {
        lines.push(format!("  Skipped:    {} (interrupted)", result.skipped.len()));
        for outcome in &result.skipped {
            lines.push(format!("    - {} ({})", outcome.patient_name, outcome.study_uid));
        }
        lines.push(
            "  Partial archives are kept but download again from the start next run.".to_string(),
        );
    }
    lines.push(format!("  Saved to:   {}", download_dir.display()));
    lines
}
