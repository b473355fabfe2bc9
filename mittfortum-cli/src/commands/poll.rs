//! Poll command - one fetch-and-import cycle.

use anyhow::Result;
use clap::Args;
use mittfortum_core::PollPhase;
use tracing::info;

use super::emit;
use crate::context::{AppContext, save_poll_state};
use crate::output::TextFormatter;
use crate::{Cli, ExitCode};

/// Arguments for the poll command.
#[derive(Args, Default)]
pub struct PollArgs {
    /// Fetch and convert, but write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Runs one tick and persists the retry state.
pub async fn run(args: &PollArgs, cli: &Cli) -> Result<ExitCode> {
    let app = AppContext::new(cli)?;
    let mut poller = app.poller(args.dry_run).await?;

    let outcome = poller.tick().await;
    info!(phase = %outcome.phase, "Poll finished");

    if !args.dry_run {
        save_poll_state(poller.state()).await?;
    }

    let formatter = TextFormatter::new(!cli.no_color);
    emit(cli, &outcome, || formatter.format_tick(&outcome, app.locale))?;

    Ok(match outcome.phase {
        PollPhase::Failed => ExitCode::Error,
        _ => ExitCode::Success,
    })
}
