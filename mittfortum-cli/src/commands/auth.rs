//! Login and logout.

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use mittfortum_core::i18n;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::emit;
use crate::context::AppContext;
use crate::output::TextFormatter;
use crate::{Cli, ExitCode};

/// Arguments for the login command.
#[derive(Args, Default)]
pub struct LoginArgs {
    /// Skip the session lookup after the code exchange.
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Serialize)]
struct LoginOutput {
    logged_in: bool,
    expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

/// Runs the PKCE login: print the URL, read the redirect back.
pub async fn login(args: &LoginArgs, cli: &Cli) -> Result<ExitCode> {
    let app = AppContext::new(cli)?;
    let request = app.auth.begin_authorization()?;

    eprintln!("{}", i18n::translate(app.locale, "cli.login_open_url"));
    eprintln!();
    eprintln!("  {}", request.url);
    eprintln!();
    eprintln!("{}", i18n::translate(app.locale, "cli.login_paste_redirect"));

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("failed to read redirect from stdin")?;
    if line.trim().is_empty() {
        bail!("no redirect URL given");
    }

    let token = app.auth.complete_authorization(&request, &line).await?;

    let username = if args.no_verify {
        None
    } else {
        match app.api.session_username().await {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "Session lookup failed after login");
                None
            }
        }
    };
    info!(username = ?username, "Logged in");

    let output = LoginOutput {
        logged_in: true,
        expires_at: token.expires_at,
        username,
    };
    let formatter = TextFormatter::new(!cli.no_color);
    emit(cli, &output, || {
        let mut text = formatter.success(&i18n::translate(app.locale, "cli.login_success"));
        if let Some(name) = &output.username {
            text.push_str(&format!(" ({name})"));
        }
        text
    })?;
    Ok(ExitCode::Success)
}

/// Clears the stored token.
pub async fn logout(cli: &Cli) -> Result<ExitCode> {
    let app = AppContext::new(cli)?;
    app.auth.logout().await?;

    let formatter = TextFormatter::new(!cli.no_color);
    emit(cli, &serde_json::json!({ "logged_in": false }), || {
        formatter.success(&i18n::translate(app.locale, "cli.logout_success"))
    })?;
    Ok(ExitCode::Success)
}
