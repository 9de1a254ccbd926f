//! libstack - idempotent provisioning for DSpace and Koha hosts
//!
//! libstack runs declarative provisioning plans (`plans/*.toml`) step by step:
//! every mutating step is guarded by a check-before-act probe, services are
//! awaited with a bounded readiness budget, and a failed run after the first
//! change to the host triggers the plan's cleanup exactly once.
//!
//! # Quick Start (CLI)
//!
//! ```bash
//! # Check tools and privileges
//! libstack doctor --plan plans/dspace-docker.toml
//!
//! # Inspect the plan and the option values it would use
//! libstack plan --plan plans/dspace-docker.toml
//!
//! # Provision; re-running after a failure skips completed steps
//! libstack provision --plan plans/dspace-docker.toml
//! ```
//!
//! # Quick Start (Library)
//!
//! ```rust,no_run
//! use libstack::config::{OptionResolver, TerminalPrompter};
//! use libstack::engine::{Sequencer, ThreadSleeper, load_plan};
//! use libstack::runner::NativeRunner;
//! use libstack::{CliArgs, Config};
//! use std::path::Path;
//!
//! let config = Config::discover(&CliArgs::default())?;
//! let resolution = OptionResolver::new(&config).resolve(&TerminalPrompter::new())?;
//! let plan = load_plan(Path::new("plans/dspace-docker.toml"))?.render(&resolution.context)?;
//! let summary = Sequencer::new(&plan, &resolution.context, &NativeRunner::new(), &ThreadSleeper)
//!     .run()
//!     .map_err(libstack::LibstackError::from)?;
//! println!("{}", summary.render_human());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # JSON Contracts
//!
//! Run summaries, plan reports and doctor output are emitted in JCS
//! (RFC 8785) canonical form. Use [`emit_jcs`] for your own integrations.

// ============================================================================
// Stable Public API
// ============================================================================

/// Effective configuration: CLI > config file > defaults, with source attribution.
pub use libstack_config::Config;

/// CLI overrides handed to [`Config::discover()`].
pub use libstack_config::CliArgs;

/// Configuration resolved once before the first step.
pub use libstack_config::RunContext;

/// Library-level error type with rich context.
///
/// Provides user-friendly messages via
/// [`display_for_user()`](LibstackError::display_for_user) and exit code
/// mapping via [`to_exit_code()`](LibstackError::to_exit_code).
pub use libstack_utils::error::LibstackError;

/// Exit codes matching the documented exit code table.
pub use libstack_utils::exit_codes::ExitCode;

/// Error categories for grouping similar errors.
pub use libstack_utils::error::ErrorCategory;

/// Trait for providing user-friendly error reporting.
pub use libstack_utils::error::UserFriendlyError;

/// Ordered step outcomes of one run.
pub use libstack_engine::RunSummary;

/// JCS (RFC 8785) canonical JSON emission.
pub use libstack_utils::canonicalization::emit_jcs;

/// Returns the libstack version.
#[must_use]
pub fn libstack_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

// ============================================================================
// Internal modules - accessible but not stable
// ============================================================================

#[doc(hidden)]
pub use libstack_config as config;
#[doc(hidden)]
pub use libstack_engine as engine;
#[doc(hidden)]
pub use libstack_lock as lock;
#[doc(hidden)]
pub use libstack_runner as runner;
#[doc(hidden)]
pub use libstack_utils::{
    atomic_write, canonicalization, error, exit_codes, logging, paths, redaction, types,
};

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub use libstack_utils::test_support;

// Exported with #[doc(hidden)] to allow white-box testing of CLI flag parsing
#[doc(hidden)]
pub mod cli;
#[doc(hidden)]
pub mod error_reporter;
