//! Logging infrastructure for libstack
//!
//! Structured logging through `tracing`. The CLI initializes the subscriber
//! once; library crates only emit events. Every step runs inside a `step`
//! span carrying the plan and step names, so each line of output can be traced
//! back to the step that produced it.

use tracing::{Level, error, info, span};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::redaction::default_redactor;

/// Initialize the tracing subscriber.
///
/// Compact, target-less output by default; `verbose` adds targets, debug-level
/// events from libstack crates and span close timings. `RUST_LOG` overrides
/// the filter in both modes. Logs go to stderr so `--json` output on stdout
/// stays machine-readable.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("libstack=debug,libstack_engine=debug,libstack_runner=debug,libstack_config=debug,info")
            } else {
                EnvFilter::try_new("info")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span for one provisioning step.
#[must_use]
pub fn step_span(plan: &str, step: &str) -> tracing::Span {
    span!(Level::INFO, "step", plan = %plan, step = %step)
}

/// Log that a step is starting.
pub fn log_step_start(plan: &str, step: &str) {
    info!(plan = %plan, step = %step, "starting step");
}

/// Log a step's final outcome (`ran`, `skipped`, `not_selected`).
pub fn log_step_complete(plan: &str, step: &str, outcome: &str, attempts: u32, duration_ms: u128) {
    info!(
        plan = %plan,
        step = %step,
        outcome = %outcome,
        attempts,
        duration_ms = %duration_ms,
        "step complete"
    );
}

/// Log a step failure. The message is redacted before it is emitted.
pub fn log_step_error(plan: &str, step: &str, error: &str, duration_ms: u128) {
    let sanitized = default_redactor().redact_string(error);
    error!(
        plan = %plan,
        step = %step,
        duration_ms = %duration_ms,
        error = %sanitized,
        "step failed"
    );
}
