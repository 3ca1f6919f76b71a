//! Terminal rendering for deployctl.

use crate::client::panel::{PanelLine, PanelOutcome};
use crate::deploy::EventKind;
use crate::models::DeploymentStatus;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

const TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";
const BAR_TEMPLATE: &str = "{spinner:.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}";

/// Percentage bar (0..=100) with a steady spinner.
pub fn deploy_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    let style = ProgressStyle::default_bar()
        .template(BAR_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .tick_chars(TICK_CHARS)
        .progress_chars("=> ");
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Print a log line above the bar and move the bar along.
pub fn render_line(pb: &ProgressBar, line: &PanelLine, percentage: u8) {
    pb.println(format!("{} {}", line_icon(line.kind), line.text));
    pb.set_position(u64::from(percentage));
    if line.kind == Some(EventKind::Progress) {
        pb.set_message(line.text.trim_start_matches("PROGRESS: ").to_string());
    }
}

pub fn finish(pb: &ProgressBar, outcome: PanelOutcome, elapsed: &str) {
    match outcome {
        PanelOutcome::Succeeded => pb.finish_with_message(format!("✓ done in {}", elapsed)),
        PanelOutcome::Failed => pb.abandon_with_message(format!("✗ failed after {}", elapsed)),
    }
}

fn line_icon(kind: Option<EventKind>) -> &'static str {
    match kind {
        Some(EventKind::Progress) => "→",
        Some(EventKind::Success) => "✓",
        Some(EventKind::Error) => "✗",
        Some(EventKind::Warning) => "!",
        Some(EventKind::Log) | None => " ",
    }
}

pub fn status_icon(status: DeploymentStatus) -> &'static str {
    match status {
        DeploymentStatus::Success => "✓",
        DeploymentStatus::Failed => "✗",
        DeploymentStatus::Pending => "◷",
    }
}
