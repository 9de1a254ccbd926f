//! Cleanup handler
//!
//! One teardown action, registered before the first step. It is armed once
//! the first mutating step succeeds and disarmed right before a successful
//! exit. An armed guard fires on failure, or when it is dropped (early
//! return, panic unwinding). The teardown is an `FnOnce` taken out of the
//! guard, so it can run at most once.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

use libstack_runner::ProcessRunner;

use crate::plan::CleanupAction;

/// What a teardown did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub commands_run: usize,
    /// One line per teardown command that failed; teardown keeps going
    pub failures: Vec<String>,
}

/// Whether and how cleanup ran, for the run summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CleanupStatus {
    /// The plan has no cleanup action
    NotRegistered,
    /// Registered but never armed, or disarmed on success
    NotRun,
    Ran(CleanupReport),
}

type Teardown<'a> = Box<dyn FnOnce() -> CleanupReport + 'a>;

/// Scoped cleanup registration.
pub struct CleanupGuard<'a> {
    teardown: Option<Teardown<'a>>,
    armed: bool,
    report: Option<CleanupReport>,
}

impl fmt::Debug for CleanupGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupGuard")
            .field("registered", &self.teardown.is_some())
            .field("armed", &self.armed)
            .field("report", &self.report)
            .finish()
    }
}

impl<'a> CleanupGuard<'a> {
    /// Register `teardown`. A guard starts disarmed.
    pub fn register<F>(teardown: F) -> Self
    where
        F: FnOnce() -> CleanupReport + 'a,
    {
        Self {
            teardown: Some(Box::new(teardown)),
            armed: false,
            report: None,
        }
    }

    /// A guard with nothing to run.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            teardown: None,
            armed: false,
            report: None,
        }
    }

    /// Register the plan's cleanup commands, run through `runner`.
    pub fn for_plan<R: ProcessRunner + ?Sized>(
        cleanup: Option<&'a CleanupAction>,
        runner: &'a R,
    ) -> Self {
        match cleanup {
            Some(action) if !action.commands.is_empty() => {
                Self::register(move || run_cleanup_commands(action, runner))
            }
            _ => Self::empty(),
        }
    }

    /// The point of no return has been passed.
    pub fn arm(&mut self) {
        if !self.armed && self.teardown.is_some() {
            info!("Cleanup armed");
        }
        self.armed = true;
    }

    pub fn disarm(&mut self) {
        self.armed = false;
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Run the teardown if armed and not run before.
    ///
    /// Returns the report of this call's teardown; `None` if nothing ran.
    pub fn fire(&mut self) -> Option<CleanupReport> {
        if !self.armed {
            return None;
        }
        let teardown = self.teardown.take()?;
        self.armed = false;
        warn!("Running cleanup");
        let report = teardown();
        if report.failures.is_empty() {
            info!(commands = report.commands_run, "Cleanup finished");
        } else {
            warn!(
                commands = report.commands_run,
                failures = report.failures.len(),
                "Cleanup finished with failures"
            );
        }
        self.report = Some(report.clone());
        Some(report)
    }

    #[must_use]
    pub fn status(&self) -> CleanupStatus {
        match (&self.report, &self.teardown) {
            (Some(report), _) => CleanupStatus::Ran(report.clone()),
            (None, Some(_)) => CleanupStatus::NotRun,
            (None, None) => CleanupStatus::NotRegistered,
        }
    }
}

impl Drop for CleanupGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let _ = self.fire();
        }
    }
}

/// Run every cleanup command in order, continuing past failures.
pub fn run_cleanup_commands<R: ProcessRunner + ?Sized>(
    action: &CleanupAction,
    runner: &R,
) -> CleanupReport {
    let mut report = CleanupReport::default();
    for command in &action.commands {
        report.commands_run += 1;
        let spec = command.to_spec(None, &Default::default());
        match runner.run(&spec) {
            Ok(output) if output.success() => {}
            Ok(output) => report.failures.push(format!(
                "`{command}` exited with {}: {}",
                output
                    .exit_code
                    .map_or_else(|| "a signal".to_string(), |c| c.to_string()),
                output.diagnostic_tail(3)
            )),
            Err(e) => report.failures.push(format!("`{command}`: {e}")),
        }
    }
    report
}
