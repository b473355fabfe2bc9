// Lint configuration for this crate
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

//! `MittFortum` CLI - Fortum consumption into a local statistics database.
//!
//! # Examples
//!
//! ```bash
//! # Sign in once (opens the PKCE login flow)
//! mittfortum login
//!
//! # One poll cycle: yesterday's backfill plus today's partial hours
//! mittfortum poll
//!
//! # Keep polling every `poll.interval_minutes`
//! mittfortum watch
//!
//! # What is stored and what is pending
//! mittfortum status --format json --pretty
//!
//! # Last week of hourly consumption
//! mittfortum stats --days 7
//! ```

mod commands;
mod context;
mod output;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mittfortum_core::Locale;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use commands::{auth, config, points, poll, stats, status, watch};

// ============================================================================
// CLI Definition
// ============================================================================

/// `MittFortum` CLI - Fortum energy consumption poller.
#[derive(Parser)]
#[command(name = "mittfortum")]
#[command(about = "Fortum energy consumption poller")]
#[command(long_about = r#"
MittFortum signs in to Fortum with OAuth2 PKCE, polls hourly and 15-minute
consumption and imports it as cumulative statistics.

Markets:
  • Finland (FI)
  • Sweden (SV)
  • Norway (NO)
  • English UI on the Finnish market (EN)

Examples:
  mittfortum login               # Sign in
  mittfortum poll                # One fetch-and-import cycle
  mittfortum watch               # Poll on the configured interval
  mittfortum status              # Token, backfill and stored series
"#)]
#[command(version)]
#[command(author = "MittFortum Contributors")]
pub struct Cli {
    /// Subcommand to run. If none, runs 'status'.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file to use instead of the default.
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Locale override (FI, SV, NO, EN).
    #[arg(long, short, global = true)]
    pub locale: Option<Locale>,

    /// Output format (text or json).
    #[arg(long, short = 'f', default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pub pretty: bool,

    /// Verbose output (show debug info).
    #[arg(long, short, global = true)]
    pub verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Quiet mode (minimal output).
    #[arg(long, short, global = true)]
    pub quiet: bool,
}

/// CLI commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Sign in through the browser.
    Login(auth::LoginArgs),

    /// Forget the stored token.
    Logout,

    /// Run one fetch-and-import cycle.
    #[command(visible_alias = "p")]
    Poll(poll::PollArgs),

    /// Poll on an interval until interrupted.
    #[command(visible_alias = "w")]
    Watch(watch::WatchArgs),

    /// Show token, backfill state and stored series.
    #[command(visible_alias = "s")]
    Status,

    /// Print stored statistics.
    Stats(stats::StatsArgs),

    /// List the account's metering points.
    Points,

    /// Manage configuration.
    Config(config::ConfigArgs),
}

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Default)]
pub enum OutputFormat {
    /// Human-readable text with colors.
    #[default]
    Text,
    /// JSON output for scripting.
    Json,
}

/// CLI exit codes.
#[repr(i32)]
pub enum ExitCode {
    /// Success.
    Success = 0,
    /// General error.
    Error = 1,
    /// No usable token; run `login`.
    AuthRequired = 2,
    /// The provider has not published the data yet.
    NotReady = 3,
}

impl ExitCode {
    /// Maps an error chain to an exit code.
    fn for_error(error: &anyhow::Error) -> Self {
        let api = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<mittfortum_api::ApiError>());
        let sync = error
            .chain()
            .find_map(|cause| cause.downcast_ref::<mittfortum_sync::SyncError>());

        if api.is_some_and(mittfortum_api::ApiError::requires_reauth)
            || sync.is_some_and(mittfortum_sync::SyncError::requires_reauth)
        {
            Self::AuthRequired
        } else if api.is_some_and(mittfortum_api::ApiError::is_not_ready) {
            Self::NotReady
        } else {
            Self::Error
        }
    }
}

// ============================================================================
// Logging Setup
// ============================================================================

fn setup_logging(verbose: bool, quiet: bool) {
    if quiet {
        return;
    }

    let default = if verbose { "mittfortum=debug,info" } else { "mittfortum=warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let result: Result<ExitCode> = match &cli.command {
        Some(Commands::Login(args)) => auth::login(args, &cli).await,
        Some(Commands::Logout) => auth::logout(&cli).await,
        Some(Commands::Poll(args)) => poll::run(args, &cli).await,
        Some(Commands::Watch(args)) => watch::run(args, &cli).await,
        Some(Commands::Stats(args)) => stats::run(args, &cli).await,
        Some(Commands::Points) => points::run(&cli).await,
        Some(Commands::Config(args)) => config::run(args, &cli).await,
        Some(Commands::Status) | None => status::run(&cli).await,
    };

    let code = match result {
        Ok(code) => code,
        Err(e) => {
            if !cli.quiet {
                eprintln!("Error: {e:#}");
            }
            ExitCode::for_error(&e)
        }
    };
    std::process::exit(code as i32);
}
