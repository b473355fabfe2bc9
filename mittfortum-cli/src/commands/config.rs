//! Config command - manage configuration.

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use mittfortum_store::{Config, default_config_dir, default_data_dir};
use tracing::info;

use super::emit;
use crate::context::{load_config, poll_state_path};
use crate::{Cli, ExitCode};

/// Arguments for the config command.
#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

/// Config subcommands.
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show the effective configuration.
    Show,

    /// Show configuration and data paths.
    Path,

    /// Write a config file with the defaults.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Check the config file for errors.
    Validate,
}

/// Runs the config command.
pub async fn run(args: &ConfigArgs, cli: &Cli) -> Result<ExitCode> {
    match &args.action {
        ConfigAction::Show => show_config(cli)?,
        ConfigAction::Path => show_paths(cli)?,
        ConfigAction::Init { force } => init_config(*force, cli)?,
        ConfigAction::Validate => {
            let (_, path) = load_config(cli)?;
            emit(cli, &serde_json::json!({ "valid": true }), || {
                format!("{} is valid", path.display())
            })?;
        }
    }
    Ok(ExitCode::Success)
}

fn show_config(cli: &Cli) -> Result<()> {
    let (config, _) = load_config(cli)?;
    emit(cli, &config, || {
        toml::to_string_pretty(&config).unwrap_or_else(|e| format!("<unprintable: {e}>"))
    })
}

fn show_paths(cli: &Cli) -> Result<()> {
    let (config, path) = load_config(cli)?;
    let paths = serde_json::json!({
        "config_dir": default_config_dir().display().to_string(),
        "config_file": path.display().to_string(),
        "data_dir": default_data_dir().display().to_string(),
        "database": config.database_path().display().to_string(),
        "token_file": config.token_path().display().to_string(),
        "poll_state": poll_state_path().display().to_string(),
    });

    emit(cli, &paths, || {
        let mut lines = vec!["Configuration Paths".to_string(), "─".repeat(40)];
        if let Some(map) = paths.as_object() {
            for (key, value) in map {
                lines.push(format!("{:<12} {}", key, value.as_str().unwrap_or_default()));
            }
        }
        lines.join("\n")
    })
}

fn init_config(force: bool, cli: &Cli) -> Result<()> {
    let path = cli.config.clone().unwrap_or_else(Config::default_path);
    if path.exists() && !force {
        bail!("{} already exists; use --force to overwrite", path.display());
    }

    let mut config = Config::default();
    if let Some(locale) = cli.locale {
        config.account.locale = locale;
    }
    config.save_to(&path)?;

    info!(path = %path.display(), "Config written");
    emit(cli, &serde_json::json!({ "written": path.display().to_string() }), || {
        format!("Wrote {}", path.display())
    })
}
