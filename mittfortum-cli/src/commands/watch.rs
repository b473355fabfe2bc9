//! Watch command - poll until interrupted.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use mittfortum_store::{MAX_INTERVAL_MINUTES, minutes_period};
use mittfortum_sync::Scheduler;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::context::{AppContext, save_poll_state};
use crate::output::{JsonFormatter, TextFormatter};
use crate::{Cli, ExitCode, OutputFormat};

/// Arguments for the watch command.
#[derive(Args)]
pub struct WatchArgs {
    /// Poll interval in minutes; defaults to `poll.interval_minutes`.
    #[arg(long, short)]
    pub interval: Option<u64>,

    /// Minimum interval in minutes.
    #[arg(long, default_value = "1")]
    pub min_interval: u64,
}

/// Runs the poller on a fixed period until Ctrl+C.
pub async fn run(args: &WatchArgs, cli: &Cli) -> Result<ExitCode> {
    let app = AppContext::new(cli)?;
    let (minutes, period) = watch_period(
        args.interval,
        app.config.poll.interval_minutes,
        args.min_interval,
    );

    let poller = Arc::new(Mutex::new(app.poller(false).await?));
    let scheduler = Scheduler::new();

    let cancel = scheduler.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            cancel.cancel();
        }
    });

    info!(interval_minutes = minutes, "Starting watch mode");

    let text = TextFormatter::new(!cli.no_color);
    let json = JsonFormatter::new(cli.pretty);
    let locale = app.locale;
    let ticks = scheduler
        .run_poller(poller.clone(), period, |outcome| {
            persist_state(&poller);
            if cli.quiet {
                return;
            }
            match cli.format {
                OutputFormat::Text => {
                    let now = chrono::Local::now();
                    println!("[{}] {}", now.format("%H:%M:%S"), text.format_tick(outcome, locale));
                }
                OutputFormat::Json => match json.format(outcome) {
                    Ok(line) => println!("{line}"),
                    Err(e) => warn!(error = %e, "Failed to format tick"),
                },
            }
        })
        .await;

    let poller = poller.lock().await;
    save_poll_state(poller.state()).await?;
    info!(ticks, "Watch stopped");
    Ok(ExitCode::Success)
}

/// Effective interval in minutes and the matching tick period.
fn watch_period(interval: Option<u64>, configured: u64, min_interval: u64) -> (u64, Duration) {
    let minutes = interval
        .unwrap_or(configured)
        .max(min_interval)
        .clamp(1, MAX_INTERVAL_MINUTES);
    (minutes, minutes_period(minutes))
}

/// Saves the state in the background once the current tick releases the poller.
fn persist_state(poller: &Arc<Mutex<mittfortum_sync::Poller>>) {
    let poller = Arc::clone(poller);
    tokio::spawn(async move {
        let state = poller.lock().await.state().clone();
        if let Err(e) = save_poll_state(&state).await {
            warn!(error = %e, "Failed to save poll state");
        }
    });
}
