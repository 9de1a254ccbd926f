//! Idempotency guard
//!
//! Read-only check that a step's goal state already exists. "Could not tell"
//! is an error ([`ProvisionError::ProbeUnavailable`]), never a silent "absent".

use std::path::Path;

use tracing::debug;

use libstack_runner::ProcessRunner;
use libstack_utils::error::ProvisionError;

use crate::plan::{GuardProbe, ProbeMode, ProvisioningStep};

/// Lines of probe output kept in a `ProbeUnavailable` reason
const PROBE_TAIL_LINES: usize = 10;

/// Evaluates [`GuardProbe`]s through a [`ProcessRunner`].
pub struct IdempotencyGuard<'r, R: ProcessRunner + ?Sized> {
    runner: &'r R,
}

impl<'r, R: ProcessRunner + ?Sized> IdempotencyGuard<'r, R> {
    pub fn new(runner: &'r R) -> Self {
        Self { runner }
    }

    /// Whether the goal state of `step` already exists.
    ///
    /// `step` must already be rendered against the run context.
    pub fn exists(&self, step: &ProvisioningStep) -> Result<bool, ProvisionError> {
        let unavailable = |reason: String| ProvisionError::ProbeUnavailable {
            step: step.name.clone(),
            probe: step.guard.kind().to_string(),
            reason,
        };

        let exists = match &step.guard {
            GuardProbe::Never => false,
            GuardProbe::Path(path) => match std::fs::metadata(Path::new(path)) {
                Ok(_) => true,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => false,
                Err(e) => return Err(unavailable(format!("cannot inspect {path}: {e}"))),
            },
            GuardProbe::Command { command, mode } => {
                let spec = command.to_spec(step.cwd.as_deref(), &step.env);
                let output = self
                    .runner
                    .run(&spec)
                    .map_err(|e| unavailable(e.to_string()))?;

                match mode {
                    ProbeMode::ExitZero if output.exit_code.is_none() => {
                        return Err(unavailable(format!("`{command}` was killed by a signal")));
                    }
                    ProbeMode::ExitZero => output.success(),
                    _ if !output.success() => {
                        let code = output
                            .exit_code
                            .map_or_else(|| "a signal".to_string(), |c| format!("exit code {c}"));
                        let tail = output.diagnostic_tail(PROBE_TAIL_LINES);
                        return Err(unavailable(if tail.is_empty() {
                            format!("`{command}` failed with {code}")
                        } else {
                            format!("`{command}` failed with {code}: {tail}")
                        }));
                    }
                    ProbeMode::StdoutNonEmpty => !output.stdout_string().trim().is_empty(),
                    ProbeMode::StdoutContains(needle) => {
                        output.stdout_string().contains(needle.as_str())
                    }
                }
            }
        };

        debug!(step = %step.name, probe = step.guard.kind(), exists, "Evaluated idempotency guard");
        Ok(exists)
    }
}
