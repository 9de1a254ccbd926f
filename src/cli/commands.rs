//! Command implementations for the libstack CLI
//!
//! Each `execute_*` function prints its own output and returns the exit code
//! for a run that completed. Failures are returned as errors wrapping a
//! [`LibstackError`] so `run()` can report them with context.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::Path;
use tracing::{debug, warn};

use libstack_config::{
    Config, OptionResolver, ResolvedOption, RunContext, Secret, TerminalPrompter,
};
use libstack_engine::plan::Readiness;
use libstack_engine::{
    GuardProbe, InterruptFlag, Preflight, ProbeMode, ProvisioningPlan, ProvisioningStep,
    RunSummary, Sequencer, ThreadSleeper, install_interrupt_handler, load_plan,
};
use libstack_lock::RunLock;
use libstack_runner::NativeRunner;
use libstack_utils::canonicalization::emit_jcs;
use libstack_utils::error::LibstackError;
use libstack_utils::exit_codes::ExitCode;
use libstack_utils::paths;
use libstack_utils::redaction::REDACTED;
use libstack_utils::types::{CheckStatus, DoctorOutput};

// ============================================================================
// Provision Command
// ============================================================================

/// Resolve options, check preconditions, take the run lock and run the plan.
///
/// Dry runs skip the lock, report preflight failures as warnings and leave
/// the persisted last-run summary alone.
pub fn execute_provision_command(
    plan_path: &Path,
    dry_run: bool,
    force_unlock: bool,
    json: bool,
    config: &Config,
) -> Result<ExitCode> {
    let plan = load_plan(plan_path).map_err(LibstackError::from)?;

    let resolution = OptionResolver::new(config)
        .resolve(&TerminalPrompter::new())
        .map_err(LibstackError::from)?;
    let context = resolution.context;

    plan.check_variables(&context).map_err(LibstackError::from)?;
    let rendered = plan.render(&context).map_err(LibstackError::from)?;

    let home = paths::libstack_home();
    let preflight = Preflight::new(Some(&rendered), &home);
    if dry_run {
        for check in preflight
            .run()
            .checks
            .iter()
            .filter(|c| c.status == CheckStatus::Fail)
        {
            warn!(check = %check.name, details = %check.details, "Preflight check would fail");
        }
    } else {
        preflight.ensure()?;
    }

    let _lock = if dry_run {
        None
    } else {
        Some(
            RunLock::acquire(
                &paths::locks_dir(),
                &rendered.name,
                force_unlock,
                Some(config.lock_ttl_seconds),
            )
            .map_err(LibstackError::from)?,
        )
    };

    let interrupt = InterruptFlag::new();
    if let Err(e) = install_interrupt_handler(&interrupt) {
        warn!(error = %e, "Could not install the Ctrl-C handler; an interrupt will not run cleanup");
    }

    let runner = NativeRunner::new();
    let outcome = Sequencer::new(&rendered, &context, &runner, &ThreadSleeper)
        .with_interrupt(interrupt)
        .dry_run(dry_run)
        .run();

    let (summary, error) = match outcome {
        Ok(summary) => (summary, None),
        Err(failure) => (failure.summary, Some(failure.error)),
    };

    if !dry_run {
        match summary.persist() {
            Ok(path) => debug!(path = %path, "Saved run summary"),
            Err(e) => warn!(error = %e, "Could not save the run summary"),
        }
    }

    if json {
        println!("{}", summary.to_json().context("Failed to emit summary JSON")?);
    } else {
        print!("{}", summary.render_human());
    }

    match error {
        Some(error) => Err(LibstackError::from(error).into()),
        None => Ok(ExitCode::SUCCESS),
    }
}

// ============================================================================
// Plan Command
// ============================================================================

#[derive(Debug, Serialize)]
struct PlanReport {
    schema_version: String,
    plan: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    privilege: String,
    requires: Vec<String>,
    options: Vec<ResolvedOption>,
    steps: Vec<StepView>,
    cleanup: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<RunSummary>,
}

#[derive(Debug, Serialize)]
struct StepView {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    guard: String,
    actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    readiness: Option<String>,
    mutating: bool,
    /// Whether the resolved test-data choice selects this step
    selected: bool,
}

impl StepView {
    fn new(step: &ProvisioningStep, context: &RunContext) -> Self {
        Self {
            name: step.name.clone(),
            description: step.description.clone(),
            guard: describe_guard(&step.guard),
            actions: step.actions.iter().map(ToString::to_string).collect(),
            readiness: step.readiness.as_ref().map(describe_readiness),
            mutating: step.mutating,
            selected: step.selected_for(context.test_data),
        }
    }
}

fn describe_guard(guard: &GuardProbe) -> String {
    match guard {
        GuardProbe::Never => "none".to_string(),
        GuardProbe::Path(path) => format!("path exists: {path}"),
        GuardProbe::Command { command, mode } => match mode {
            ProbeMode::ExitZero => format!("`{command}` exits 0"),
            ProbeMode::StdoutNonEmpty => format!("`{command}` prints output"),
            ProbeMode::StdoutContains(needle) => format!("`{command}` prints '{needle}'"),
        },
    }
}

fn describe_readiness(readiness: &Readiness) -> String {
    format!(
        "{} (up to {} attempt(s), every {}s)",
        readiness.check,
        readiness.max_attempts,
        readiness.interval.as_secs()
    )
}

impl PlanReport {
    fn render_human(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Plan: {}", self.plan);
        if let Some(description) = &self.description {
            let _ = writeln!(out, "  {description}");
        }
        let _ = writeln!(out, "Privilege: {}", self.privilege);
        if !self.requires.is_empty() {
            let _ = writeln!(out, "Requires: {}", self.requires.join(", "));
        }

        let _ = writeln!(out, "\nOptions:");
        let width = self.options.iter().map(|o| o.key.len()).max().unwrap_or(0);
        for option in &self.options {
            let _ = writeln!(
                out,
                "  {:<width$}  {}  ({})",
                option.key, option.value, option.source
            );
        }

        let _ = writeln!(out, "\nSteps:");
        for (index, step) in self.steps.iter().enumerate() {
            let marker = if step.selected { "" } else { "  [not selected]" };
            let _ = writeln!(out, "  {}. {}{marker}", index + 1, step.name);
            if let Some(description) = &step.description {
                let _ = writeln!(out, "     {description}");
            }
            let _ = writeln!(out, "     skip if: {}", step.guard);
            for action in &step.actions {
                let _ = writeln!(out, "     run:     {action}");
            }
            if let Some(readiness) = &step.readiness {
                let _ = writeln!(out, "     wait:    {readiness}");
            }
        }

        if !self.cleanup.is_empty() {
            let _ = writeln!(out, "\nCleanup on failure:");
            for command in &self.cleanup {
                let _ = writeln!(out, "  {command}");
            }
        }

        if let Some(last) = &self.last_run {
            let _ = writeln!(
                out,
                "\nLast run: {} at {}",
                if last.succeeded() { "succeeded" } else { "failed" },
                last.finished_at.to_rfc3339()
            );
        }
        out
    }
}

/// Validate a plan and show what a run would execute.
///
/// Never prompts: unset options take their defaults. The password is masked
/// in every rendered command.
pub fn execute_plan_command(plan_path: &Path, json: bool, config: &Config) -> Result<ExitCode> {
    let plan = load_plan(plan_path).map_err(LibstackError::from)?;

    let mut config = config.clone();
    config.non_interactive = true;
    let resolution = OptionResolver::new(&config)
        .resolve(&TerminalPrompter::new())
        .map_err(LibstackError::from)?;

    plan.check_variables(&resolution.context)
        .map_err(LibstackError::from)?;
    let display_context = RunContext {
        admin_password: Secret::new(REDACTED),
        ..resolution.context.clone()
    };
    let rendered = plan.render(&display_context).map_err(LibstackError::from)?;

    let last_run = RunSummary::load_last(&rendered.name).unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring unreadable last-run summary");
        None
    });

    let report = build_plan_report(&rendered, &display_context, resolution.sources, last_run);
    if json {
        println!("{}", emit_jcs(&report).context("Failed to emit plan JSON")?);
    } else {
        print!("{}", report.render_human());
    }
    Ok(ExitCode::SUCCESS)
}

fn build_plan_report(
    plan: &ProvisioningPlan,
    context: &RunContext,
    options: Vec<ResolvedOption>,
    last_run: Option<RunSummary>,
) -> PlanReport {
    PlanReport {
        schema_version: "1".to_string(),
        plan: plan.name.clone(),
        description: plan.description.clone(),
        privilege: plan.privilege.to_string(),
        requires: plan.requires.clone(),
        options,
        steps: plan
            .steps
            .iter()
            .map(|step| StepView::new(step, context))
            .collect(),
        cleanup: plan
            .cleanup
            .iter()
            .flat_map(|c| c.commands.iter().map(ToString::to_string))
            .collect(),
        last_run,
    }
}

// ============================================================================
// Doctor Command
// ============================================================================

/// Run the preflight checks and report them.
///
/// Returns [`ExitCode::PRECONDITION`] when any check fails.
pub fn execute_doctor_command(plan_path: Option<&Path>, json: bool) -> Result<ExitCode> {
    let plan = plan_path
        .map(load_plan)
        .transpose()
        .map_err(LibstackError::from)?;

    let home = paths::libstack_home();
    let output = Preflight::new(plan.as_ref(), &home).run();

    if json {
        println!("{}", emit_jcs(&output).context("Failed to emit doctor JSON")?);
    } else {
        print!("{}", render_doctor_report(&output));
    }

    Ok(if output.ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::PRECONDITION
    })
}

fn render_doctor_report(output: &DoctorOutput) -> String {
    let mut out = String::new();
    match &output.plan {
        Some(plan) => {
            let _ = writeln!(out, "Preflight checks for plan '{plan}':");
        }
        None => {
            let _ = writeln!(out, "Preflight checks:");
        }
    }
    for check in &output.checks {
        let _ = writeln!(out, "  [{}] {}: {}", check.status, check.name, check.details);
        if check.status != CheckStatus::Pass
            && let Some(remediation) = &check.remediation
        {
            let _ = writeln!(out, "         -> {remediation}");
        }
    }
    if output.ok {
        let _ = writeln!(out, "\nAll required checks passed.");
    } else {
        let _ = writeln!(
            out,
            "\nSome checks failed. Please address the issues above before provisioning."
        );
    }
    out
}
