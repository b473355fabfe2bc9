//! Stats command - print a stored series.

use anyhow::{Result, bail};
use chrono::{Duration, Utc};
use clap::Args;
use mittfortum_core::{DateRange, Resolution, StatisticKind};

use super::emit;
use crate::context::AppContext;
use crate::output::TextFormatter;
use crate::{Cli, ExitCode};

/// Arguments for the stats command.
#[derive(Args)]
pub struct StatsArgs {
    /// Statistic id; defaults to the hourly energy series.
    #[arg(long)]
    pub id: Option<String>,

    /// Show cost instead of energy.
    #[arg(long, conflicts_with = "id")]
    pub cost: bool,

    /// Use the 15-minute series.
    #[arg(long, conflicts_with = "id")]
    pub quarter_hour: bool,

    /// Days back from now.
    #[arg(long, short, default_value = "1")]
    pub days: u32,
}

/// Runs the stats command.
pub async fn run(args: &StatsArgs, cli: &Cli) -> Result<ExitCode> {
    if args.days == 0 {
        bail!("--days must be at least 1");
    }
    let app = AppContext::new(cli)?;

    let id = match &args.id {
        Some(id) => id.clone(),
        None => {
            let kind = if args.cost { StatisticKind::Cost } else { StatisticKind::Energy };
            let resolution = if args.quarter_hour { Resolution::QuarterHour } else { Resolution::Hour };
            app.config.statistic_ids().id(kind, resolution)
        }
    };

    let end = Utc::now();
    let range = DateRange::new(end - Duration::days(i64::from(args.days)), end)?;

    let Some(series) = app.database()?.load_series(&id, Some(range)).await? else {
        bail!("no statistics stored for {id}");
    };

    let formatter = TextFormatter::new(!cli.no_color);
    emit(cli, &series, || formatter.format_series(&series, app.locale.timezone()))?;
    Ok(ExitCode::Success)
}
