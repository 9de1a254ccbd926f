//! Provisioning sequencer
//!
//! Runs a rendered plan's steps strictly in order. Per step:
//!
//! 1. skip with `NotSelected` if the step's `when` excludes the test-data choice
//! 2. evaluate the idempotency guard; `Skipped` if the goal state exists
//! 3. run each action; the first non-zero exit fails the step
//! 4. arm cleanup if the step is mutating
//! 5. poll the readiness check, if any (also for skipped steps)
//!
//! The first error stops the run. Cleanup fires once if it was armed, then
//! the error is returned with the partial summary.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use libstack_config::RunContext;
use libstack_runner::ProcessRunner;
use libstack_utils::error::{LibstackError, ProvisionError};
use libstack_utils::logging::{log_step_complete, log_step_error, log_step_start, step_span};
use libstack_utils::redaction::redact_user_string;

use crate::cleanup::CleanupGuard;
use crate::guard::IdempotencyGuard;
use crate::interrupt::InterruptFlag;
use crate::plan::{ProvisioningPlan, ProvisioningStep};
use crate::readiness::{CheckRunner, PollError, PollOutcome, ReadinessPoller, Sleeper};
use crate::summary::{RunSummary, SequencerState, StepOutcome, StepReport};

/// Lines of command output carried by an `ActionFailed` error
pub const ACTION_OUTPUT_TAIL_LINES: usize = 40;

/// A failed run: the error plus everything that happened before it.
#[derive(Debug, Clone)]
pub struct RunFailure {
    pub error: ProvisionError,
    pub summary: RunSummary,
}

impl From<RunFailure> for LibstackError {
    fn from(failure: RunFailure) -> Self {
        LibstackError::Provision(failure.error)
    }
}

/// Executes one plan against one run context.
pub struct Sequencer<'a, R: ProcessRunner + ?Sized, S: Sleeper + ?Sized> {
    plan: &'a ProvisioningPlan,
    context: &'a RunContext,
    runner: &'a R,
    sleeper: &'a S,
    interrupt: InterruptFlag,
    dry_run: bool,
    state: SequencerState,
}

impl<'a, R: ProcessRunner + ?Sized, S: Sleeper + ?Sized> Sequencer<'a, R, S> {
    /// `plan` must already be rendered against `context`.
    pub fn new(
        plan: &'a ProvisioningPlan,
        context: &'a RunContext,
        runner: &'a R,
        sleeper: &'a S,
    ) -> Self {
        Self {
            plan,
            context,
            runner,
            sleeper,
            interrupt: InterruptFlag::new(),
            dry_run: false,
            state: SequencerState::NotStarted,
        }
    }

    #[must_use]
    pub fn with_interrupt(mut self, flag: InterruptFlag) -> Self {
        self.interrupt = flag;
        self
    }

    /// Evaluate guards only; run no actions, readiness checks or cleanup.
    #[must_use]
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    #[must_use]
    pub fn state(&self) -> SequencerState {
        self.state
    }

    fn transition(&mut self, to: SequencerState) {
        debug!(plan = %self.plan.name, from = ?self.state, to = ?to, "Sequencer state change");
        self.state = to;
    }

    /// Run every step. Consumes the sequencer; a plan runs at most once.
    pub fn run(mut self) -> Result<RunSummary, RunFailure> {
        self.transition(SequencerState::Running);
        let started_at = Utc::now();
        let (plan, runner) = (self.plan, self.runner);

        let mut cleanup = if self.dry_run {
            CleanupGuard::empty()
        } else {
            CleanupGuard::for_plan(plan.cleanup.as_ref(), runner)
        };
        let mut checks = CheckRunner::new(runner);
        let mut reports = Vec::with_capacity(plan.steps.len());
        let mut failure: Option<ProvisionError> = None;

        for step in &plan.steps {
            if self.interrupt.is_set() {
                failure = Some(ProvisionError::Interrupted {
                    step: Some(step.name.clone()),
                });
                break;
            }

            let _span = step_span(&plan.name, &step.name).entered();
            log_step_start(&plan.name, &step.name);
            let clock = Instant::now();

            let result = self.run_step(step, &mut cleanup, &mut checks);
            let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok((outcome, readiness_attempts)) => {
                    log_step_complete(
                        &plan.name,
                        &step.name,
                        outcome.as_str(),
                        readiness_attempts.unwrap_or(0),
                        u128::from(duration_ms),
                    );
                    reports.push(StepReport {
                        name: step.name.clone(),
                        outcome,
                        readiness_attempts,
                        duration_ms,
                    });
                }
                Err((error, readiness_attempts)) => {
                    log_step_error(
                        &plan.name,
                        &step.name,
                        &error.to_string(),
                        u128::from(duration_ms),
                    );
                    reports.push(StepReport {
                        name: step.name.clone(),
                        outcome: StepOutcome::Failed,
                        readiness_attempts,
                        duration_ms,
                    });
                    failure = Some(error);
                    break;
                }
            }
        }

        match failure {
            None => {
                cleanup.disarm();
                self.transition(SequencerState::Succeeded);
                info!(plan = %plan.name, steps = reports.len(), dry_run = self.dry_run, "Plan succeeded");
                Ok(self.summary(started_at, reports, None, cleanup.status()))
            }
            Some(error) => {
                self.transition(SequencerState::Failed);
                cleanup.fire();
                let status = cleanup.status();
                Err(RunFailure {
                    summary: self.summary(started_at, reports, Some(&error), status),
                    error,
                })
            }
        }
    }

    /// Outcome and readiness attempts, or the error and attempts so far.
    fn run_step(
        &self,
        step: &ProvisioningStep,
        cleanup: &mut CleanupGuard<'_>,
        checks: &mut CheckRunner<'_, R>,
    ) -> Result<(StepOutcome, Option<u32>), (ProvisionError, Option<u32>)> {
        if !step.selected_for(self.context.test_data) {
            info!(step = %step.name, test_data = %self.context.test_data, "Step not selected");
            return Ok((StepOutcome::NotSelected, None));
        }

        let exists = IdempotencyGuard::new(self.runner).exists(step);
        // A guard cut short by Ctrl-C answers nothing; no action may follow it.
        if self.interrupt.is_set() {
            return Err((interrupted(step), None));
        }
        let exists = exists.map_err(|e| (e, None))?;

        let outcome = if exists {
            info!(step = %step.name, "Goal state already present; skipping actions");
            StepOutcome::Skipped
        } else if self.dry_run {
            for action in &step.actions {
                info!(step = %step.name, command = %redact_user_string(&action.to_string()), "Would run");
            }
            StepOutcome::WouldRun
        } else {
            self.run_actions(step, cleanup).map_err(|e| (e, None))?;
            StepOutcome::Ran
        };

        if self.dry_run {
            return Ok((outcome, None));
        }

        let Some(readiness) = &step.readiness else {
            return Ok((outcome, None));
        };

        let poller = ReadinessPoller::new(self.sleeper).with_interrupt(&self.interrupt);
        let polled = poller.await_ready(
            || checks.check(&readiness.check, step.cwd.as_deref(), &step.env),
            readiness.max_attempts,
            readiness.interval,
        );

        match polled {
            Ok(PollOutcome::Ready { attempts }) => Ok((outcome, Some(attempts))),
            Ok(PollOutcome::Timeout {
                attempts,
                last_detail,
            }) => Err((
                ProvisionError::Timeout {
                    step: step.name.clone(),
                    attempts,
                    last_detail,
                },
                Some(attempts),
            )),
            Err(PollError::Unavailable(reason)) => Err((
                ProvisionError::ProbeUnavailable {
                    step: step.name.clone(),
                    probe: format!("{} readiness", readiness.check.kind()),
                    reason,
                },
                None,
            )),
            Err(PollError::Interrupted { attempts }) => Err((
                ProvisionError::Interrupted {
                    step: Some(step.name.clone()),
                },
                Some(attempts),
            )),
        }
    }

    fn run_actions(
        &self,
        step: &ProvisioningStep,
        cleanup: &mut CleanupGuard<'_>,
    ) -> Result<(), ProvisionError> {
        let count = step.actions.len();
        for (index, action) in step.actions.iter().enumerate() {
            if self.interrupt.is_set() {
                return Err(interrupted(step));
            }
            let spec = action.to_spec(step.cwd.as_deref(), &step.env);
            let command = redact_user_string(&action.to_string());
            info!(step = %step.name, command = %command, "Running action");

            let output = self.runner.run(&spec);
            // The terminal delivers Ctrl-C to the child too; its failure is the interrupt.
            let failed = !output.as_ref().is_ok_and(|o| o.success());
            if failed && self.interrupt.is_set() {
                return Err(interrupted(step));
            }
            let output = output.map_err(|e| ProvisionError::ActionFailed {
                step: step.name.clone(),
                command: command.clone(),
                exit_code: None,
                output: e.to_string(),
            })?;

            if !output.success() {
                return Err(ProvisionError::ActionFailed {
                    step: step.name.clone(),
                    command,
                    exit_code: output.exit_code,
                    output: output.diagnostic_tail(ACTION_OUTPUT_TAIL_LINES),
                });
            }

            if self.interrupt.is_set() {
                if index + 1 == count && step.mutating {
                    cleanup.arm();
                }
                return Err(interrupted(step));
            }
        }

        if step.mutating && count > 0 {
            cleanup.arm();
        }
        Ok(())
    }

    fn summary(
        &self,
        started_at: chrono::DateTime<Utc>,
        steps: Vec<StepReport>,
        error: Option<&ProvisionError>,
        cleanup: crate::cleanup::CleanupStatus,
    ) -> RunSummary {
        let exit_code = error.map_or(0, |e| {
            LibstackError::Provision(e.clone()).to_exit_code().as_i32()
        });
        RunSummary {
            schema_version: "1".to_string(),
            plan: self.plan.name.clone(),
            state: self.state,
            dry_run: self.dry_run,
            started_at,
            finished_at: Utc::now(),
            steps,
            failed_step: error.and_then(|e| e.step().map(str::to_string)),
            error: error.map(|e| redact_user_string(&e.to_string())),
            exit_code,
            cleanup,
        }
    }
}

fn interrupted(step: &ProvisioningStep) -> ProvisionError {
    ProvisionError::Interrupted {
        step: Some(step.name.clone()),
    }
}
