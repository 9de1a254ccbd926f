//! Run summaries
//!
//! The ordered step outcomes of one run. Printed as text or canonical JSON and
//! persisted to `<LIBSTACK_HOME>/runs/<plan>/last-run.json` after every run.

use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

use libstack_utils::atomic_write::write_file_atomic;
use libstack_utils::canonicalization::emit_jcs;
use libstack_utils::paths;

use crate::cleanup::CleanupStatus;

/// Sequencer lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencerState {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

/// What happened to one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// Actions executed (and readiness, if any, confirmed)
    Ran,
    /// Goal state already existed; no action ran
    Skipped,
    /// Excluded by the operator's test-data choice
    NotSelected,
    /// Dry run: the guard says the actions would execute
    WouldRun,
    Failed,
}

impl StepOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Ran => "ran",
            Self::Skipped => "skipped",
            Self::NotSelected => "not_selected",
            Self::WouldRun => "would_run",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
    /// Readiness check invocations, when the step has a readiness check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readiness_attempts: Option<u32>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub schema_version: String,
    pub plan: String,
    pub state: SequencerState,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_step: Option<String>,
    /// Redacted error message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub exit_code: i32,
    pub cleanup: CleanupStatus,
}

impl RunSummary {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == SequencerState::Succeeded
    }

    /// Outcome of the named step, if it was reached.
    #[must_use]
    pub fn outcome_of(&self, step: &str) -> Option<StepOutcome> {
        self.steps.iter().find(|s| s.name == step).map(|s| s.outcome)
    }

    /// Canonical JSON (JCS).
    pub fn to_json(&self) -> Result<String> {
        emit_jcs(self)
    }

    /// Human-readable table of outcomes.
    #[must_use]
    pub fn render_human(&self) -> String {
        let mut out = String::new();
        let mode = if self.dry_run { " (dry run)" } else { "" };
        let _ = writeln!(out, "Plan: {}{mode}", self.plan);
        let width = self.steps.iter().map(|s| s.name.len()).max().unwrap_or(0);
        for step in &self.steps {
            let attempts = step
                .readiness_attempts
                .map(|a| format!("  ready after {a} attempt(s)"))
                .unwrap_or_default();
            let _ = writeln!(
                out,
                "  {:<width$}  {:<12}  {:>6} ms{attempts}",
                step.name,
                step.outcome.as_str(),
                step.duration_ms,
            );
        }
        let _ = write!(
            out,
            "Result: {}",
            match self.state {
                SequencerState::Succeeded => "succeeded",
                SequencerState::Failed => "failed",
                SequencerState::Running => "running",
                SequencerState::NotStarted => "not started",
            }
        );
        if let Some(step) = &self.failed_step {
            let _ = write!(out, " at step '{step}'");
        }
        match &self.cleanup {
            CleanupStatus::Ran(report) if report.failures.is_empty() => {
                let _ = write!(out, "\nCleanup: ran {} command(s)", report.commands_run);
            }
            CleanupStatus::Ran(report) => {
                let _ = write!(
                    out,
                    "\nCleanup: ran {} command(s), {} failed",
                    report.commands_run,
                    report.failures.len()
                );
            }
            _ => {}
        }
        out.push('\n');
        out
    }

    /// Write to `<LIBSTACK_HOME>/runs/<plan>/last-run.json`.
    pub fn persist(&self) -> Result<Utf8PathBuf> {
        let path = paths::last_run_path(&self.plan);
        let json = self.to_json()?;
        write_file_atomic(&path, &json)?;
        Ok(path)
    }

    /// The summary persisted by the previous run of `plan`, if any.
    pub fn load_last(plan: &str) -> Result<Option<RunSummary>> {
        let path = paths::last_run_path(plan);
        if !path.exists() {
            return Ok(None);
        }
        let content =
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read {path}"))?;
        let summary =
            serde_json::from_str(&content).with_context(|| format!("Failed to parse {path}"))?;
        Ok(Some(summary))
    }
}
