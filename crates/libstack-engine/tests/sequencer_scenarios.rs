//! End-to-end sequencer scenarios against fake hosts.
//!
//! `FakeHost` models a machine whose resources exist or not: `has <name>`
//! succeeds when the resource exists, `make <name>` creates it and
//! `teardown` removes everything. Nothing is spawned.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use libstack_config::{RunContext, Secret, TestDataChoice};
use libstack_engine::{
    CleanupStatus, GuardProbe, InterruptFlag, PlanCommand, ProbeMode, ProvisioningPlan,
    ProvisioningStep, ReadinessCheck, RunFailure, RunSummary, Sequencer, SequencerState, Sleeper,
    StepOutcome,
};
use libstack_runner::{
    CommandSpec, ProcessOutput, ProcessRunner, RunnerError, ScriptedResponse, ScriptedRunner,
};
use libstack_utils::error::ProvisionError;
use libstack_utils::redaction::register_secret;
use proptest::prelude::*;

#[derive(Default)]
struct RecordingSleeper {
    sleeps: RefCell<Vec<Duration>>,
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
    }
}

impl RecordingSleeper {
    fn count(&self) -> usize {
        self.sleeps.borrow().len()
    }
}

#[derive(Default)]
struct FakeHost {
    present: RefCell<BTreeSet<String>>,
    calls: RefCell<Vec<String>>,
    broken: RefCell<BTreeSet<String>>,
    interrupt_on: RefCell<Option<(String, InterruptFlag)>>,
}

impl FakeHost {
    fn with_present(names: &[&str]) -> Self {
        let host = Self::default();
        host.present
            .borrow_mut()
            .extend(names.iter().map(|n| (*n).to_string()));
        host
    }

    fn break_make(&self, name: &str) {
        self.broken.borrow_mut().insert(name.to_string());
    }

    fn interrupt_after(&self, line: &str, flag: &InterruptFlag) {
        *self.interrupt_on.borrow_mut() = Some((line.to_string(), flag.clone()));
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn has(&self, name: &str) -> bool {
        self.present.borrow().contains(name)
    }
}

impl ProcessRunner for FakeHost {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
        let line = cmd.to_string();
        self.calls.borrow_mut().push(line.clone());

        let words: Vec<&str> = line.split_whitespace().collect();
        let output = match words.as_slice() {
            ["has", name] if self.has(name) => ProcessOutput::ok(Vec::new()),
            ["has", _] => ProcessOutput::failed(1, Vec::new()),
            ["make", name] if self.broken.borrow().contains(*name) => {
                ProcessOutput::failed(3, format!("cannot create {name}").into_bytes())
            }
            ["make", name] => {
                self.present.borrow_mut().insert((*name).to_string());
                ProcessOutput::ok(Vec::new())
            }
            ["teardown"] => {
                self.present.borrow_mut().clear();
                ProcessOutput::ok(Vec::new())
            }
            _ => ProcessOutput::ok(Vec::new()),
        };

        if let Some((trigger, flag)) = self.interrupt_on.borrow().as_ref()
            && *trigger == line
        {
            flag.trigger();
        }
        Ok(output)
    }
}

fn context(test_data: TestDataChoice) -> RunContext {
    RunContext {
        admin_email: "admin@example.org".into(),
        admin_password: Secret::new("placeholder-pass"),
        admin_first_name: "Admin".into(),
        admin_last_name: "User".into(),
        server_url: "http://localhost:8080/server".into(),
        ui_url: "http://localhost:4000".into(),
        site_name: "Library Stack".into(),
        install_dir: "/opt/dspace".into(),
        test_data,
        vars: BTreeMap::new(),
    }
}

fn resource_step(name: &str) -> ProvisioningStep {
    ProvisioningStep::new(name)
        .guard(GuardProbe::Command {
            command: PlanCommand::new(["has", name]),
            mode: ProbeMode::ExitZero,
        })
        .action(PlanCommand::new(["make", name]))
}

fn three_step_plan() -> ProvisioningPlan {
    ProvisioningPlan::new("stack")
        .step(resource_step("network"))
        .step(resource_step("database"))
        .step(resource_step("backend"))
        .with_cleanup(vec![PlanCommand::new(["teardown"])])
}

fn run<R: ProcessRunner>(
    plan: &ProvisioningPlan,
    ctx: &RunContext,
    runner: &R,
    sleeper: &RecordingSleeper,
) -> Result<RunSummary, RunFailure> {
    Sequencer::new(plan, ctx, runner, sleeper).run()
}

fn outcomes(summary: &RunSummary) -> Vec<(String, StepOutcome)> {
    summary
        .steps
        .iter()
        .map(|s| (s.name.clone(), s.outcome))
        .collect()
}

#[test]
fn test_second_run_performs_no_actions() {
    let host = FakeHost::default();
    let plan = three_step_plan();
    let ctx = context(TestDataChoice::None);
    let sleeper = RecordingSleeper::default();

    let first = run(&plan, &ctx, &host, &sleeper).unwrap();
    assert!(first.succeeded());
    assert!(
        first
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::Ran)
    );
    assert_eq!(host.count("make"), 3);

    let second = run(&plan, &ctx, &host, &sleeper).unwrap();
    assert!(second.succeeded());
    assert!(
        second
            .steps
            .iter()
            .all(|s| s.outcome == StepOutcome::Skipped)
    );
    assert_eq!(host.count("make"), 3, "no action may run on a provisioned host");
    assert_eq!(host.count("teardown"), 0);
}

#[test]
fn test_existing_goal_state_is_skipped_and_the_rest_runs() {
    let host = FakeHost::with_present(&["network"]);
    let summary = run(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap();

    assert_eq!(
        outcomes(&summary),
        vec![
            ("network".to_string(), StepOutcome::Skipped),
            ("database".to_string(), StepOutcome::Ran),
            ("backend".to_string(), StepOutcome::Ran),
        ]
    );
    assert_eq!(host.count("make network"), 0);
    assert_eq!(host.count("make database"), 1);
    assert_eq!(host.count("make backend"), 1);
}

#[test]
fn test_readiness_passing_on_fifth_check_is_evaluated_exactly_five_times() {
    let runner = ScriptedRunner::new();
    runner.on_sequence(
        "pg_isready",
        vec![
            ScriptedResponse::exit(2, "no response"),
            ScriptedResponse::exit(2, "no response"),
            ScriptedResponse::exit(2, "no response"),
            ScriptedResponse::exit(2, "no response"),
            ScriptedResponse::success(),
        ],
    );
    let plan = ProvisioningPlan::new("postgres").step(
        ProvisioningStep::new("postgres")
            .action(PlanCommand::new(["systemctl", "start", "postgresql"]))
            .readiness(
                ReadinessCheck::Command(PlanCommand::new(["pg_isready", "-q"])),
                10,
                Duration::from_secs(2),
            ),
    );
    let sleeper = RecordingSleeper::default();

    let summary = run(&plan, &context(TestDataChoice::None), &runner, &sleeper).unwrap();

    assert_eq!(summary.state, SequencerState::Succeeded);
    assert_eq!(runner.count_matching("pg_isready"), 5);
    assert_eq!(summary.steps[0].readiness_attempts, Some(5));
    assert_eq!(sleeper.count(), 4);
    assert!(
        sleeper
            .sleeps
            .borrow()
            .iter()
            .all(|d| *d == Duration::from_secs(2))
    );
}

#[test]
fn test_readiness_timeout_reports_attempts_and_exit_code() {
    let runner = ScriptedRunner::new();
    runner.on("curl", ScriptedResponse::exit(7, "connection refused"));
    let plan = ProvisioningPlan::new("solr")
        .step(
            ProvisioningStep::new("solr")
                .action(PlanCommand::new(["systemctl", "start", "solr"]))
                .readiness(
                    ReadinessCheck::Command(PlanCommand::new(["curl", "-fs", "http://localhost:8983"])),
                    3,
                    Duration::from_millis(10),
                ),
        )
        .step(resource_step("backend"));
    let sleeper = RecordingSleeper::default();

    let failure = run(&plan, &context(TestDataChoice::None), &runner, &sleeper).unwrap_err();

    match &failure.error {
        ProvisionError::Timeout { step, attempts, .. } => {
            assert_eq!(step, "solr");
            assert_eq!(*attempts, 3);
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert_eq!(failure.summary.exit_code, 10);
    assert_eq!(failure.summary.failed_step.as_deref(), Some("solr"));
    assert_eq!(runner.count_matching("curl"), 3);
    assert_eq!(sleeper.count(), 2);
    assert_eq!(runner.count_matching("backend"), 0);
}

#[test]
fn test_successful_run_never_runs_cleanup() {
    let host = FakeHost::default();
    let summary = run(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap();
    assert_eq!(host.count("teardown"), 0);
    assert_eq!(summary.cleanup, CleanupStatus::NotRun);
}

#[test]
fn test_failure_after_a_mutation_runs_cleanup_once_and_stops() {
    let host = FakeHost::default();
    host.break_make("database");

    let failure = run(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap_err();

    match &failure.error {
        ProvisionError::ActionFailed {
            step,
            exit_code,
            output,
            ..
        } => {
            assert_eq!(step, "database");
            assert_eq!(*exit_code, Some(3));
            assert!(output.contains("cannot create database"));
        }
        other => panic!("expected action failure, got {other:?}"),
    }
    assert_eq!(host.count("teardown"), 1);
    assert_eq!(host.count("has backend"), 0);
    assert_eq!(host.count("make backend"), 0);
    assert!(!host.has("network"), "teardown removed the first step's work");

    let summary = &failure.summary;
    assert_eq!(summary.state, SequencerState::Failed);
    assert_eq!(summary.exit_code, 12);
    assert_eq!(
        outcomes(summary),
        vec![
            ("network".to_string(), StepOutcome::Ran),
            ("database".to_string(), StepOutcome::Failed),
        ]
    );
    assert!(matches!(&summary.cleanup, CleanupStatus::Ran(r) if r.commands_run == 1));
}

#[test]
fn test_failure_before_any_mutation_skips_cleanup() {
    let host = FakeHost::default();
    host.break_make("network");

    let failure = run(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap_err();

    assert_eq!(failure.error.step(), Some("network"));
    assert_eq!(host.count("teardown"), 0);
    assert_eq!(failure.summary.cleanup, CleanupStatus::NotRun);
}

#[test]
fn test_skipped_steps_do_not_arm_cleanup() {
    let host = FakeHost::with_present(&["network", "database"]);
    host.break_make("backend");

    let failure = run(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap_err();

    assert_eq!(failure.error.step(), Some("backend"));
    assert_eq!(host.count("teardown"), 0);
}

#[test]
fn test_non_mutating_steps_do_not_arm_cleanup() {
    let host = FakeHost::default();
    host.break_make("database");
    let plan = ProvisioningPlan::new("stack")
        .step(resource_step("network").mutating(false))
        .step(resource_step("database"))
        .with_cleanup(vec![PlanCommand::new(["teardown"])]);

    run(
        &plan,
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap_err();

    assert_eq!(host.count("teardown"), 0);
}

#[test]
fn test_interrupt_during_a_mutating_step_cleans_up_once() {
    let host = FakeHost::default();
    let flag = InterruptFlag::new();
    host.interrupt_after("make database", &flag);

    let failure = Sequencer::new(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .with_interrupt(flag)
    .run()
    .unwrap_err();

    assert_eq!(
        failure.error,
        ProvisionError::Interrupted {
            step: Some("database".to_string())
        }
    );
    assert_eq!(failure.summary.exit_code, 130);
    assert_eq!(host.count("teardown"), 1);
    assert_eq!(host.count("has backend"), 0);
}

#[test]
fn test_interrupt_before_the_first_step_runs_nothing() {
    let host = FakeHost::default();
    let flag = InterruptFlag::new();
    flag.trigger();

    let failure = Sequencer::new(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .with_interrupt(flag)
    .run()
    .unwrap_err();

    assert!(matches!(failure.error, ProvisionError::Interrupted { .. }));
    assert!(host.calls.borrow().is_empty());
    assert!(failure.summary.steps.is_empty());
    assert_eq!(failure.summary.cleanup, CleanupStatus::NotRun);
}

#[test]
fn test_interrupt_while_checking_a_guard_skips_the_action() {
    let host = FakeHost::default();
    let flag = InterruptFlag::new();
    host.interrupt_after("has network", &flag);

    let failure = Sequencer::new(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .with_interrupt(flag)
    .run()
    .unwrap_err();

    assert_eq!(
        failure.error,
        ProvisionError::Interrupted {
            step: Some("network".to_string())
        }
    );
    assert_eq!(failure.summary.exit_code, 130);
    assert_eq!(host.count("make network"), 0);
    assert_eq!(host.count("has database"), 0);
    assert_eq!(host.count("teardown"), 0);
}

#[test]
fn test_interrupt_that_fails_the_running_action_reports_interrupted() {
    let host = FakeHost::default();
    host.break_make("backend");
    let flag = InterruptFlag::new();
    host.interrupt_after("make backend", &flag);

    let failure = Sequencer::new(
        &three_step_plan(),
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .with_interrupt(flag)
    .run()
    .unwrap_err();

    assert_eq!(
        failure.error,
        ProvisionError::Interrupted {
            step: Some("backend".to_string())
        }
    );
    assert_eq!(failure.summary.exit_code, 130);
    assert_eq!(host.count("teardown"), 1);
}

#[test]
fn test_interrupt_between_actions_stops_the_step() {
    let host = FakeHost::default();
    let flag = InterruptFlag::new();
    host.interrupt_after("make volume", &flag);
    let plan = ProvisioningPlan::new("stack")
        .step(resource_step("volume").action(PlanCommand::new(["make", "container"])))
        .with_cleanup(vec![PlanCommand::new(["teardown"])]);

    let failure = Sequencer::new(
        &plan,
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .with_interrupt(flag)
    .run()
    .unwrap_err();

    assert_eq!(failure.summary.exit_code, 130);
    assert_eq!(host.count("make volume"), 1);
    assert_eq!(host.count("make container"), 0);
}

#[test]
fn test_interrupt_while_waiting_for_readiness() {
    let runner = ScriptedRunner::new();
    runner.on("curl", ScriptedResponse::exit(7, "connection refused"));
    let flag = InterruptFlag::new();

    struct InterruptingSleeper(InterruptFlag);
    impl Sleeper for InterruptingSleeper {
        fn sleep(&self, _duration: Duration) {
            self.0.trigger();
        }
    }
    let sleeper = InterruptingSleeper(flag.clone());

    let plan = ProvisioningPlan::new("solr").step(
        ProvisioningStep::new("solr")
            .readiness(
                ReadinessCheck::Command(PlanCommand::new(["curl", "-fs", "http://localhost:8983"])),
                30,
                Duration::from_secs(2),
            )
            .mutating(false),
    );
    let ctx = context(TestDataChoice::None);

    let failure = Sequencer::new(&plan, &ctx, &runner, &sleeper)
        .with_interrupt(flag)
        .run()
        .unwrap_err();

    assert_eq!(failure.summary.exit_code, 130);
    assert_eq!(failure.summary.steps[0].readiness_attempts, Some(1));
    assert_eq!(runner.count_matching("curl"), 1);
}

#[test]
fn test_dry_run_evaluates_guards_only() {
    let host = FakeHost::with_present(&["network"]);
    let plan = three_step_plan().step(
        ProvisioningStep::new("api")
            .action(PlanCommand::new(["make", "api"]))
            .readiness(
                ReadinessCheck::Command(PlanCommand::new(["probe-api"])),
                5,
                Duration::from_secs(1),
            ),
    );

    let summary = Sequencer::new(
        &plan,
        &context(TestDataChoice::None),
        &host,
        &RecordingSleeper::default(),
    )
    .dry_run(true)
    .run()
    .unwrap();

    assert!(summary.dry_run);
    assert_eq!(
        outcomes(&summary),
        vec![
            ("network".to_string(), StepOutcome::Skipped),
            ("database".to_string(), StepOutcome::WouldRun),
            ("backend".to_string(), StepOutcome::WouldRun),
            ("api".to_string(), StepOutcome::WouldRun),
        ]
    );
    assert_eq!(host.count("make"), 0);
    assert_eq!(host.count("probe-api"), 0);
    assert_eq!(host.count("has"), 3);
    assert_eq!(summary.cleanup, CleanupStatus::NotRegistered);
}

#[test]
fn test_steps_outside_the_test_data_choice_are_not_selected() {
    let host = FakeHost::default();
    let plan = ProvisioningPlan::new("dspace")
        .step(resource_step("repository"))
        .step(resource_step("sample-aip").when(vec![TestDataChoice::Sample]))
        .step(resource_step("entities").when(vec![TestDataChoice::Entities]));

    let summary = run(
        &plan,
        &context(TestDataChoice::Entities),
        &host,
        &RecordingSleeper::default(),
    )
    .unwrap();

    assert_eq!(summary.outcome_of("sample-aip"), Some(StepOutcome::NotSelected));
    assert_eq!(summary.outcome_of("entities"), Some(StepOutcome::Ran));
    assert_eq!(host.count("has sample-aip"), 0);
    assert_eq!(host.count("make sample-aip"), 0);
}

#[test]
fn test_guard_that_cannot_be_evaluated_stops_the_run() {
    let runner = ScriptedRunner::new();
    runner.on("psql", ScriptedResponse::NotFound);
    let plan = ProvisioningPlan::new("db")
        .step(
            ProvisioningStep::new("database")
                .guard(GuardProbe::Command {
                    command: PlanCommand::new(["psql", "-tAc", "SELECT 1"]),
                    mode: ProbeMode::StdoutContains("1".into()),
                })
                .action(PlanCommand::new(["createdb", "dspace"])),
        )
        .with_cleanup(vec![PlanCommand::new(["dropdb", "dspace"])]);

    let failure = run(
        &plan,
        &context(TestDataChoice::None),
        &runner,
        &RecordingSleeper::default(),
    )
    .unwrap_err();

    assert!(matches!(
        failure.error,
        ProvisionError::ProbeUnavailable { ref step, .. } if step == "database"
    ));
    assert_eq!(failure.summary.exit_code, 11);
    assert_eq!(runner.count_matching("createdb"), 0);
    assert_eq!(runner.count_matching("dropdb"), 0);
}

#[test]
fn test_rendered_templates_reach_commands_and_secrets_stay_out_of_the_summary() {
    let secret = "Wk8!sequencer-scenario-pass";
    register_secret(secret);
    let mut ctx = context(TestDataChoice::None);
    ctx.admin_password = Secret::new(secret);

    let runner = ScriptedRunner::new();
    runner.on("create-administrator", ScriptedResponse::exit(1, "rejected"));
    let plan = ProvisioningPlan::new("dspace")
        .step(
            ProvisioningStep::new("install")
                .action(PlanCommand::new(["mkdir", "-p", "${install_dir}/config"])),
        )
        .step(ProvisioningStep::new("create-admin").action(PlanCommand::new([
            "${install_dir}/bin/dspace",
            "create-administrator",
            "-e",
            "${admin_email}",
            "-p",
            "${admin_password}",
        ])))
        .render(&ctx)
        .unwrap();

    let failure = run(&plan, &ctx, &runner, &RecordingSleeper::default()).unwrap_err();

    assert_eq!(runner.calls()[0], "mkdir -p /opt/dspace/config");
    assert!(runner.calls()[1].contains(secret), "the command itself gets the real value");
    let error = failure.summary.error.clone().unwrap();
    assert!(error.contains("create-admin"));
    assert!(!error.contains(secret));
    assert!(!failure.summary.to_json().unwrap().contains(secret));
}

fn arbitrary_plan() -> impl Strategy<Value = ProvisioningPlan> {
    let step = (
        any::<bool>(),
        prop::option::of(prop::sample::subsequence(TestDataChoice::ALL.to_vec(), 0..=3)),
    );
    prop::collection::vec(step, 1..8).prop_map(|steps| {
        steps
            .into_iter()
            .enumerate()
            .fold(ProvisioningPlan::new("generated"), |plan, (i, (mutating, when))| {
                let mut step = resource_step(&format!("resource-{i}")).mutating(mutating);
                if let Some(choices) = when {
                    step = step.when(choices);
                }
                plan.step(step)
            })
            .with_cleanup(vec![PlanCommand::new(["teardown"])])
    })
}

proptest! {
    #[test]
    fn prop_second_run_changes_nothing(
        plan in arbitrary_plan(),
        choice in prop::sample::select(TestDataChoice::ALL.to_vec()),
    ) {
        let host = FakeHost::default();
        let ctx = context(choice);
        let sleeper = RecordingSleeper::default();

        let first = run(&plan, &ctx, &host, &sleeper).unwrap();
        prop_assert!(first.succeeded());
        let made = host.count("make");

        let second = run(&plan, &ctx, &host, &sleeper).unwrap();
        prop_assert!(second.succeeded());
        prop_assert_eq!(host.count("make"), made);
        prop_assert_eq!(host.count("teardown"), 0);
        prop_assert!(
            second
                .steps
                .iter()
                .all(|s| matches!(s.outcome, StepOutcome::Skipped | StepOutcome::NotSelected))
        );
    }
}
