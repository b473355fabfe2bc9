//! Text output formatting with bars and colors.

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use mittfortum_core::{Locale, MeteringPoint, PollPhase, StatisticSeries, i18n};
use mittfortum_sync::TickOutcome;

use super::json::StatusReport;

// ============================================================================
// ANSI Colors
// ============================================================================

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

const BAR_FULL: char = '█';
const BAR_EMPTY: char = '░';

/// Text formatter with optional colors.
pub struct TextFormatter {
    use_colors: bool,
    bar_width: usize,
}

impl TextFormatter {
    /// Creates a new text formatter.
    pub fn new(use_colors: bool) -> Self {
        Self {
            use_colors,
            bar_width: 20,
        }
    }

    /// Set the bar width.
    #[cfg(test)]
    pub fn with_bar_width(mut self, width: usize) -> Self {
        self.bar_width = width;
        self
    }

    /// One line per poll tick.
    pub fn format_tick(&self, outcome: &TickOutcome, locale: Locale) -> String {
        let label = i18n::translate(locale, outcome.phase.i18n_key());
        let mut parts = vec![self.phase_color(outcome.phase, &label)];

        if let Some(date) = outcome.date {
            parts.push(date.to_string());
        }
        if outcome.retry_count > 0 {
            parts.push(format!(
                "{}: {}",
                i18n::translate(locale, "cli.retry_count"),
                outcome.retry_count
            ));
        }
        if let Some(summary) = outcome.imported {
            parts.push(format!(
                "{}: {} / {}",
                i18n::translate(locale, "cli.imported"),
                summary.points,
                summary.series
            ));
        }
        if let Some(at) = outcome.next_attempt {
            parts.push(self.dim(&format!(
                "{} {}",
                i18n::translate(locale, "cli.next_tick"),
                local_time(at)
            )));
        }
        if let Some(error) = &outcome.error {
            parts.push(self.red(error));
        }

        parts.join("  ")
    }

    /// Token, backfill state and stored series.
    pub fn format_status(&self, report: &StatusReport) -> String {
        let locale = report.locale;
        let mut lines = vec![self.bold(&format!("MittFortum ({})", locale.code())), "─".repeat(40)];

        match &report.token {
            Some(token) => {
                let when = local_time(token.expires_at);
                let state = if token.expired && token.refreshable {
                    self.yellow(&when)
                } else if token.expired {
                    self.red(&when)
                } else {
                    self.green(&when)
                };
                lines.push(format!("{}: {state}", i18n::translate(locale, "cli.token_expires")));
            }
            None => lines.push(self.red(&i18n::translate(locale, "cli.no_token"))),
        }

        let poll = &report.poll;
        if let Some(at) = poll.last_successful_fetch {
            lines.push(format!("{}: {}", i18n::translate(locale, "cli.last_fetch"), local_time(at)));
        }
        if let Some(date) = poll.pending_backfill_date {
            lines.push(format!(
                "{}: {} ({}: {})",
                i18n::translate(locale, "cli.pending_backfill"),
                self.yellow(&date.to_string()),
                i18n::translate(locale, "cli.retry_count"),
                poll.retry_count
            ));
        }
        if !report.metering_points.is_empty() {
            lines.push(format!(
                "{}: {}",
                i18n::translate(locale, "cli.metering_points"),
                report.metering_points.join(", ")
            ));
        }

        if !report.series.is_empty() {
            lines.push(String::new());
            for summary in &report.series {
                let meta = &summary.metadata;
                let total = summary
                    .last_sum
                    .map(|sum| format!("{} {}", format_number(sum), meta.unit))
                    .unwrap_or_default();
                let range = match (summary.first, summary.last) {
                    (Some(first), Some(last)) => {
                        self.dim(&format!("{} → {}", local_time(first), local_time(last)))
                    }
                    _ => String::new(),
                };
                lines.push(format!(
                    "{:<44} {:>6} pts  {:>14}  {range}",
                    self.cyan(&meta.statistic_id),
                    summary.points,
                    total
                ));
            }
        }

        lines.join("\n")
    }

    /// Points of a series with a bar per interval.
    pub fn format_series(&self, series: &StatisticSeries, timezone: Tz) -> String {
        let meta = &series.metadata;
        let mut lines = vec![
            format!("{} ({}, {})", self.bold(&meta.name), meta.unit, meta.resolution.label()),
            "─".repeat(40),
        ];

        let max = series.points.iter().map(|p| p.state).fold(0.0_f64, f64::max);
        for point in &series.points {
            let local = point.start.with_timezone(&timezone);
            lines.push(format!(
                "{}  {} {:>8}  {}",
                local.format("%Y-%m-%d %H:%M"),
                self.bar(point.state, max),
                format_number(point.state),
                self.dim(&format_number(point.sum))
            ));
        }

        if series.points.is_empty() {
            lines.push(self.dim("(no points in range)"));
        }
        lines.join("\n")
    }

    /// Metering points from the session.
    pub fn format_points(&self, points: &[MeteringPoint], locale: Locale) -> String {
        let mut lines = vec![self.bold(&i18n::translate(locale, "cli.metering_points"))];
        for point in points {
            let mut line = format!("  {}", self.cyan(&point.id));
            if let Some(address) = &point.address {
                line.push_str(&format!("  {address}"));
            }
            if let Some(customer) = &point.customer_id {
                line.push_str(&format!("  {}", self.dim(customer)));
            }
            lines.push(line);
        }
        lines.join("\n")
    }

    /// A confirmation line.
    pub fn success(&self, text: &str) -> String {
        format!("{} {text}", self.green("✓"))
    }

    /// Horizontal bar of `value` relative to `max`.
    pub fn bar(&self, value: f64, max: f64) -> String {
        let ratio = if max > 0.0 { (value / max).clamp(0.0, 1.0) } else { 0.0 };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let filled = (ratio * self.bar_width as f64).round() as usize;
        let empty = self.bar_width.saturating_sub(filled);

        let bar = format!(
            "{}{}",
            BAR_FULL.to_string().repeat(filled),
            BAR_EMPTY.to_string().repeat(empty)
        );
        if ratio >= 0.8 {
            self.yellow(&bar)
        } else {
            self.green(&bar)
        }
    }

    fn phase_color(&self, phase: PollPhase, text: &str) -> String {
        match phase {
            PollPhase::Success => self.green(text),
            PollPhase::RetryScheduled => self.yellow(text),
            PollPhase::Failed => self.red(text),
            PollPhase::Idle | PollPhase::Fetching | PollPhase::Importing => self.dim(text),
        }
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.use_colors {
            format!("{color}{text}{RESET}")
        } else {
            text.to_string()
        }
    }

    fn bold(&self, text: &str) -> String {
        self.paint(BOLD, text)
    }

    fn dim(&self, text: &str) -> String {
        self.paint(DIM, text)
    }

    fn green(&self, text: &str) -> String {
        self.paint(GREEN, text)
    }

    fn yellow(&self, text: &str) -> String {
        self.paint(YELLOW, text)
    }

    fn red(&self, text: &str) -> String {
        self.paint(RED, text)
    }

    fn cyan(&self, text: &str) -> String {
        self.paint(CYAN, text)
    }
}

/// Three decimals, trailing zeros dropped.
pub(crate) fn format_number(n: f64) -> String {
    let text = format!("{n:.3}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" { "0".to_string() } else { text.to_string() }
}

fn local_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}
