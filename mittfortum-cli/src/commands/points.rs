//! Points command - list metering points from the session.

use anyhow::Result;
use mittfortum_api::ConsumptionSource;

use super::emit;
use crate::context::AppContext;
use crate::output::TextFormatter;
use crate::{Cli, ExitCode};

/// Runs the points command.
pub async fn run(cli: &Cli) -> Result<ExitCode> {
    let app = AppContext::new(cli)?;
    let points = app.api.discover_metering_points().await?;

    let formatter = TextFormatter::new(!cli.no_color);
    emit(cli, &points, || formatter.format_points(&points, app.locale))?;
    Ok(ExitCode::Success)
}
