//! Photonic CLI - unattended retrieval of imaging studies from a QuickRad portal.

mod commands;
mod error;
mod prompt;

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use console::style;
use photonic::config::{credentials_file_path, log_dir};
use photonic::logging::{self, LogConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use commands::config::ConfigCommands;
use commands::download::{DownloadArgs, RunStatus};
use error::CliError;

#[derive(Parser)]
#[command(name = "photonic")]
#[command(version, about = "Download imaging studies from a QuickRad portal", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory to save archives to (defaults to download.directory in config.ini)
    #[arg(short = 'd', long)]
    download_dir: Option<String>,

    /// Save --download-dir as the default directory
    #[arg(short = 's', long, requires = "download_dir")]
    set_default_dir: bool,

    /// Prompt for new portal credentials and verify them
    #[arg(short = 'r', long)]
    reset_credentials: bool,

    /// Download every study on the first worklist page
    #[arg(short = 'a', long, conflicts_with = "count")]
    all: bool,

    /// Number of worklist studies to download
    #[arg(short = 'c', long, default_value_t = 1)]
    count: usize,

    /// Download specific studies by StudyInstanceUID instead of the worklist
    #[arg(short = 'u', long = "study-uid", num_args = 1..)]
    study_uids: Vec<String>,

    /// Retries per study after the first attempt
    #[arg(short = 'm', long)]
    max_retries: Option<u32>,

    /// Download several studies at once
    #[arg(short = 'p', long)]
    concurrent: bool,

    /// Number of concurrent downloads (implies --concurrent)
    #[arg(short = 'w', long)]
    workers: Option<usize>,

    /// Verbose logging
    #[arg(short = 'v', long)]
    verbose: bool,

    /// Worklist page size
    #[arg(long, default_value_t = photonic::api::DEFAULT_PAGE_SIZE)]
    page_size: u32,
}

#[derive(Subcommand)]
enum Commands {
    /// View or change settings in config.ini
    #[command(subcommand)]
    Config(ConfigCommands),
}

impl Cli {
    fn download_args(&self) -> DownloadArgs {
        DownloadArgs {
            download_dir: self.download_dir.clone(),
            set_default_dir: self.set_default_dir,
            all: self.all,
            count: self.count,
            study_uids: self.study_uids.clone(),
            max_retries: self.max_retries,
            concurrent: self.concurrent,
            workers: self.workers,
            page_size: self.page_size,
        }
    }
}

fn main() -> ExitCode {
    let mut cli = Cli::parse();

    if let Some(Commands::Config(command)) = cli.command.take() {
        return match commands::config::run(command) {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => report(&e),
        };
    }

    let _log_guard = match logging::init(&LogConfig {
        verbose: cli.verbose,
        log_dir: Some(log_dir()),
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Warning: file logging disabled: {}", e);
            None
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("{} failed to start async runtime: {}", style("Error:").red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(async {
        if cli.reset_credentials {
            return commands::reset::run().await.map(|()| RunStatus::Success);
        }

        let cancel = CancellationToken::new();
        let handler_token = cancel.clone();
        if let Err(e) = ctrlc::set_handler(move || {
            println!();
            println!("Received interrupt, stopping after the current step...");
            handler_token.cancel();
        }) {
            warn!(error = %e, "Failed to install Ctrl+C handler");
        }

        commands::download::run(cli.download_args(), cancel).await
    });

    match outcome {
        Ok(status) => {
            debug!(?status, "Run finished");
            ExitCode::from(status.exit_code())
        }
        Err(e) => report(&e),
    }
}

fn report(error: &CliError) -> ExitCode {
    eprintln!("{} {}", style("Error:").red().bold(), error);

    if let CliError::Auth(auth) = error {
        eprintln!();
        eprintln!("To fix:");
        eprintln!(
            "  1. Check the email and password stored in {}",
            credentials_file_path().display()
        );
        eprintln!("  2. Run 'photonic --reset-credentials' to enter them again");
        if auth.is_credentials_invalid() {
            eprintln!("  3. If the portal reported rate limiting, wait a few minutes before retrying");
        }
    }

    ExitCode::from(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["photonic"]);
        let args = cli.download_args();
        assert_eq!(args.count, 1);
        assert_eq!(args.page_size, 30);
        assert!(!args.all);
        assert!(!args.concurrent);
        assert!(args.study_uids.is_empty());
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_multiple_study_uids() {
        let cli = Cli::parse_from(["photonic", "-u", "1.2.3", "4.5.6", "-m", "5"]);
        assert_eq!(cli.study_uids, vec!["1.2.3", "4.5.6"]);
        assert_eq!(cli.max_retries, Some(5));
    }

    #[test]
    fn test_all_conflicts_with_count() {
        assert!(Cli::try_parse_from(["photonic", "--all", "--count", "3"]).is_err());
    }

    #[test]
    fn test_set_default_dir_requires_download_dir() {
        assert!(Cli::try_parse_from(["photonic", "-s"]).is_err());
        assert!(Cli::try_parse_from(["photonic", "-s", "-d", "/tmp/studies"]).is_ok());
    }

    #[test]
    fn test_config_subcommand() {
        let cli = Cli::parse_from(["photonic", "config", "get", "download.workers"]);
        assert!(matches!(
            cli.command,
            Some(Commands::Config(ConfigCommands::Get { .. }))
        ));
    }
}
