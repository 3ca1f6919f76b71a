//! Client-side view of one run: labelled log lines, progress and elapsed time.

use crate::client::decoder::StreamLine;
use crate::deploy::{EventKind, ProgressEvent};
use crate::models::DeploymentHistoryEntry;
use std::time::{Duration, Instant};

pub const RECENT_HISTORY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOutcome {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PanelLine {
    pub kind: Option<EventKind>,
    pub text: String,
}

#[derive(Debug, Default)]
pub struct DeploymentPanel {
    logs: Vec<PanelLine>,
    percentage: u8,
    in_progress: bool,
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
    outcome: Option<PanelOutcome>,
    last_error: Option<String>,
}

impl DeploymentPanel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear the previous run and start the timer.
    pub fn begin(&mut self) {
        self.reset();
        self.in_progress = true;
        self.started_at = Some(Instant::now());
    }

    /// Apply one decoded line and return its rendered form.
    pub fn apply(&mut self, line: StreamLine) -> &PanelLine {
        let rendered = match line {
            StreamLine::Event(event) => self.apply_event(event),
            StreamLine::Raw(text) => PanelLine { kind: None, text },
        };
        self.logs.push(rendered);
        &self.logs[self.logs.len() - 1]
    }

    fn apply_event(&mut self, event: ProgressEvent) -> PanelLine {
        let text = match event.kind {
            EventKind::Progress => {
                let percentage = event.percentage.unwrap_or(0);
                self.percentage = percentage;
                format!("PROGRESS: {} ({}%)", event.message, percentage)
            }
            EventKind::Log => event.message,
            EventKind::Warning => format!("WARNING: {}", event.message),
            EventKind::Error => {
                self.percentage = 0;
                self.outcome = Some(PanelOutcome::Failed);
                self.last_error = Some(event.message.clone());
                format!("ERROR: {}", event.message)
            }
            EventKind::Success => {
                self.percentage = 100;
                if self.outcome != Some(PanelOutcome::Failed) {
                    self.outcome = Some(PanelOutcome::Succeeded);
                }
                format!("SUCCESS: {}", event.message)
            }
        };
        PanelLine {
            kind: Some(event.kind),
            text,
        }
    }

    /// The stream closed. Without any terminal event the run counts as failed.
    pub fn finish(&mut self) -> PanelOutcome {
        self.in_progress = false;
        self.finished_at = Some(Instant::now());
        let outcome = *self.outcome.get_or_insert(PanelOutcome::Failed);
        if outcome == PanelOutcome::Failed {
            self.percentage = 0;
        }
        outcome
    }

    /// Forget the run locally. The server keeps going unless reset there too.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn elapsed(&self) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => start.elapsed(),
            _ => Duration::ZERO,
        }
    }

    pub fn logs(&self) -> &[PanelLine] {
        &self.logs
    }

    pub fn percentage(&self) -> u8 {
        self.percentage
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    pub fn outcome(&self) -> Option<PanelOutcome> {
        self.outcome
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

/// `m:ss`
pub fn format_duration(seconds: u64) -> String {
    format!("{}:{:02}", seconds / 60, seconds % 60)
}

pub fn recent_history(entries: &[DeploymentHistoryEntry]) -> &[DeploymentHistoryEntry] {
    &entries[..entries.len().min(RECENT_HISTORY)]
}
