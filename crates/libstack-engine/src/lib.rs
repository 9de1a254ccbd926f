//! Provisioning engine for libstack
//!
//! Loads plans, checks preconditions and runs steps through the
//! [`Sequencer`]: idempotency guard, actions, readiness polling and
//! exactly-once cleanup on failure.

pub mod cleanup;
pub mod guard;
pub mod interrupt;
pub mod plan;
pub mod preflight;
pub mod readiness;
pub mod sequencer;
pub mod summary;

pub use cleanup::{CleanupGuard, CleanupReport, CleanupStatus};
pub use guard::IdempotencyGuard;
pub use interrupt::{InterruptFlag, install_interrupt_handler};
pub use plan::{
    CleanupAction, GuardProbe, PlanCommand, Privilege, ProbeMode, ProvisioningPlan,
    ProvisioningStep, ReadinessCheck, load_plan, parse_plan,
};
pub use preflight::Preflight;
pub use readiness::{CheckResult, PollError, PollOutcome, ReadinessPoller, Sleeper, ThreadSleeper};
pub use sequencer::{RunFailure, Sequencer};
pub use summary::{RunSummary, SequencerState, StepOutcome, StepReport};
