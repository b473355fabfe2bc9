//! Status command - token, backfill state and stored series.

use anyhow::Result;
use chrono::Utc;
use tracing::debug;

use super::emit;
use crate::context::{AppContext, poll_state_path};
use crate::output::{StatusReport, TextFormatter, TokenOutput};
use crate::{Cli, ExitCode};

/// Runs the status command.
pub async fn run(cli: &Cli) -> Result<ExitCode> {
    let app = AppContext::new(cli)?;
    let now = Utc::now();

    let token = app.auth.current_token().await?.map(|token| TokenOutput {
        expires_at: token.expires_at,
        expired: token.is_expired_at(now),
        refreshable: !token.refresh_token.is_empty(),
    });

    let poll = mittfortum_store::load_json_opt(&poll_state_path())
        .await?
        .unwrap_or_default();

    let database = app.config.database_path();
    let series = if database.exists() {
        app.database()?.summaries().await?
    } else {
        debug!(path = %database.display(), "No statistics database yet");
        Vec::new()
    };

    let report = StatusReport {
        locale: app.locale,
        token,
        poll,
        metering_points: app.config.account.metering_points.clone(),
        series,
    };

    let formatter = TextFormatter::new(!cli.no_color);
    emit(cli, &report, || formatter.format_status(&report))?;

    Ok(if report.token.is_none() {
        ExitCode::AuthRequired
    } else {
        ExitCode::Success
    })
}
