//! JSON output formatting.

use anyhow::Result;
use chrono::{DateTime, Utc};
use mittfortum_core::{Locale, PollState};
use mittfortum_store::SeriesSummary;
use serde::Serialize;

// ============================================================================
// Output Types
// ============================================================================

/// Everything the status command reports.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub locale: Locale,
    pub token: Option<TokenOutput>,
    pub poll: PollState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub metering_points: Vec<String>,
    pub series: Vec<SeriesSummary>,
}

/// Stored token, without any secret material.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenOutput {
    pub expires_at: DateTime<Utc>,
    pub expired: bool,
    pub refreshable: bool,
}

// ============================================================================
// JSON Formatter
// ============================================================================

/// JSON formatter.
pub struct JsonFormatter {
    pretty: bool,
}

impl JsonFormatter {
    /// Creates a new JSON formatter.
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Formats any serializable value.
    pub fn format<T: Serialize + ?Sized>(&self, data: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(data)?
        } else {
            serde_json::to_string(data)?
        };
        Ok(json)
    }
}
