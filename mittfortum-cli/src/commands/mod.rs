//! CLI command implementations.

pub mod auth;
pub mod config;
pub mod points;
pub mod poll;
pub mod stats;
pub mod status;
pub mod watch;

use anyhow::Result;
use serde::Serialize;

use crate::output::JsonFormatter;
use crate::{Cli, OutputFormat};

/// Prints `data` as JSON, or the text rendering otherwise.
pub(crate) fn emit<T: Serialize>(cli: &Cli, data: &T, text: impl FnOnce() -> String) -> Result<()> {
    if cli.quiet && cli.format == OutputFormat::Text {
        return Ok(());
    }
    match cli.format {
        OutputFormat::Text => println!("{}", text()),
        OutputFormat::Json => println!("{}", JsonFormatter::new(cli.pretty).format(data)?),
    }
    Ok(())
}
