use std::fmt;
use thiserror::Error;

pub use libstack_lock::LockError;
pub use libstack_runner::RunnerError;

use crate::exit_codes::ExitCode;
use crate::redaction::SecretRedactor;

/// Library-level error type with rich context and user-friendly reporting.
///
/// Every failure that aborts a run surfaces as a `LibstackError`. It carries:
/// - detailed information for programmatic handling (step name, command, output)
/// - user-friendly messages with context and suggestions
/// - a mapping to the documented CLI exit codes
///
/// # Exit Code Mapping
///
/// | Exit Code | Error Type |
/// |-----------|------------|
/// | 2 | Configuration, plan or CLI argument errors |
/// | 9 | Run lock held |
/// | 10 | Readiness timeout |
/// | 11 | Probe unavailable |
/// | 12 | Action failed |
/// | 13 | Precondition unmet |
/// | 130 | Interrupted |
/// | 1 | Other errors |
///
/// # Example
///
/// ```rust
/// use libstack_utils::error::{LibstackError, ProvisionError};
/// use libstack_utils::exit_codes::ExitCode;
///
/// let err = LibstackError::from(ProvisionError::Timeout {
///     step: "solr".to_string(),
///     attempts: 30,
///     last_detail: "connection refused".to_string(),
/// });
/// assert_eq!(err.to_exit_code(), ExitCode::READINESS_TIMEOUT);
/// assert!(err.display_for_user().contains("solr"));
/// ```
///
/// Library code returns `LibstackError` and never calls `std::process::exit()`.
#[derive(Error, Debug)]
pub enum LibstackError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Plan error: {0}")]
    Plan(#[from] PlanError),

    #[error("{0}")]
    Provision(#[from] ProvisionError),

    #[error("Runner error: {0}")]
    Runner(#[from] RunnerError),

    #[error("Run lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Precondition not met: {check}: {details}")]
    Precondition {
        check: String,
        details: String,
        remediation: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Trait for providing user-friendly error reporting with context and suggestions
pub trait UserFriendlyError {
    /// Get a user-friendly error message
    fn user_message(&self) -> String;

    /// Get contextual information about the error
    fn context(&self) -> Option<String>;

    /// Get suggested actions to resolve the error
    fn suggestions(&self) -> Vec<String>;

    /// Get the error category for grouping similar errors
    fn category(&self) -> ErrorCategory;
}

/// Categories of errors for better organization and handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Plan,
    Provisioning,
    ExternalCommand,
    FileSystem,
    Concurrency,
    Environment,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration => write!(f, "Configuration"),
            Self::Plan => write!(f, "Plan"),
            Self::Provisioning => write!(f, "Provisioning"),
            Self::ExternalCommand => write!(f, "External Command"),
            Self::FileSystem => write!(f, "File System"),
            Self::Concurrency => write!(f, "Concurrency"),
            Self::Environment => write!(f, "Environment"),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration and option-resolution errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration file: {0}")]
    InvalidFile(String),

    #[error("Configuration file not found at {path}")]
    NotFound { path: String },

    #[error("Invalid value for {key} ({value}): {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Could not prompt for {key}: {reason}")]
    Prompt { key: String, reason: String },
}

impl UserFriendlyError for ConfigError {
    fn user_message(&self) -> String {
        match self {
            Self::InvalidFile(reason) => format!("The configuration file is invalid: {reason}"),
            Self::NotFound { path } => format!("Configuration file not found: {path}"),
            Self::InvalidValue { key, value, reason } => {
                format!("'{value}' is not a valid value for {key}: {reason}")
            }
            Self::Prompt { key, reason } => {
                format!("Could not ask for {key} interactively: {reason}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::InvalidFile(_) | Self::NotFound { .. } => Some(
                "libstack reads .libstack/config.toml from the current directory or a parent, or the file given with --config."
                    .to_string(),
            ),
            Self::InvalidValue { .. } => Some(
                "Values are taken from CLI flags first, then the [options] table of the config file, then prompts, then defaults."
                    .to_string(),
            ),
            Self::Prompt { .. } => {
                Some("Prompts need an interactive terminal on stdin and stderr.".to_string())
            }
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::InvalidFile(_) => vec![
                "Check the TOML syntax of the configuration file".to_string(),
                "Known sections are [options], [vars] and [run]".to_string(),
            ],
            Self::NotFound { .. } => vec![
                "Check the path given with --config".to_string(),
                "Omit --config to use discovery".to_string(),
            ],
            Self::InvalidValue { key, .. } => vec![
                format!("Pass a valid value with the matching CLI flag or set {key} under [options]"),
                "Run 'libstack plan --plan <file>' to see the resolved values and their sources"
                    .to_string(),
            ],
            Self::Prompt { .. } => vec![
                "Use --non-interactive to take defaults for unset values".to_string(),
                "Provide the value with a CLI flag or in the [options] table".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Configuration
    }
}

// ============================================================================
// Plans
// ============================================================================

/// Errors loading, validating or rendering a provisioning plan
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Plan file not found: {path}")]
    NotFound { path: String },

    #[error("Failed to parse plan {path}: {reason}")]
    Parse { path: String, reason: String },

    #[error("Plan '{plan}' is invalid: {reason}")]
    Invalid { plan: String, reason: String },

    #[error("Duplicate step name '{step}' in plan '{plan}'")]
    DuplicateStep { plan: String, step: String },

    #[error("Step '{step}' references unknown variable '${{{variable}}}'")]
    UnknownVariable { step: String, variable: String },
}

impl UserFriendlyError for PlanError {
    fn user_message(&self) -> String {
        self.to_string()
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NotFound { .. } | Self::Parse { .. } => Some(
                "Plans are TOML files describing ordered provisioning steps; see plans/ for the shipped ones."
                    .to_string(),
            ),
            Self::Invalid { .. } | Self::DuplicateStep { .. } => Some(
                "Plans are validated in full before any step runs.".to_string(),
            ),
            Self::UnknownVariable { .. } => Some(
                "Commands may reference resolved options such as ${admin_email} and entries from the [vars] table."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::NotFound { .. } => vec!["Check the path given with --plan".to_string()],
            Self::Parse { .. } => vec!["Fix the TOML syntax at the reported location".to_string()],
            Self::Invalid { .. } => vec![
                "Every step needs a unique name and at least one action command or a readiness check"
                    .to_string(),
            ],
            Self::DuplicateStep { step, .. } => {
                vec![format!("Rename one of the steps called '{step}'")]
            }
            Self::UnknownVariable { variable, .. } => vec![
                format!("Define {variable} under [vars] in the config file"),
                "Write $$ for a literal dollar sign".to_string(),
            ],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Plan
    }
}

// ============================================================================
// Provisioning
// ============================================================================

/// Failures that stop the provisioning sequencer.
///
/// Every variant except an interrupt before the first step names the step
/// that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProvisionError {
    #[error("Step '{step}': could not evaluate {probe} probe: {reason}")]
    ProbeUnavailable {
        step: String,
        probe: String,
        reason: String,
    },

    #[error("Step '{step}': command `{command}` failed{}", exit_suffix(.exit_code))]
    ActionFailed {
        step: String,
        command: String,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Step '{step}': not ready after {attempts} attempt(s): {last_detail}")]
    Timeout {
        step: String,
        attempts: u32,
        last_detail: String,
    },

    #[error("Interrupted{}", interrupted_suffix(.step))]
    Interrupted { step: Option<String> },
}

fn exit_suffix(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!(" with exit code {code}"),
        None => " to run".to_string(),
    }
}

fn interrupted_suffix(step: &Option<String>) -> String {
    step.as_ref()
        .map(|s| format!(" during step '{s}'"))
        .unwrap_or_default()
}

impl ProvisionError {
    /// Name of the step the failure belongs to.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::ProbeUnavailable { step, .. }
            | Self::ActionFailed { step, .. }
            | Self::Timeout { step, .. } => Some(step),
            Self::Interrupted { step } => step.as_deref(),
        }
    }
}

impl UserFriendlyError for ProvisionError {
    fn user_message(&self) -> String {
        match self {
            Self::ProbeUnavailable { step, probe, reason } => {
                format!("Step '{step}' failed: the {probe} probe could not be evaluated ({reason})")
            }
            Self::ActionFailed {
                step,
                command,
                exit_code,
                ..
            } => format!(
                "Step '{step}' failed: `{command}` failed{}",
                exit_suffix(exit_code)
            ),
            Self::Timeout {
                step,
                attempts,
                last_detail,
            } => format!(
                "Step '{step}' failed: service not ready after {attempts} attempt(s) (last: {last_detail})"
            ),
            Self::Interrupted { step: Some(step) } => {
                format!("Provisioning interrupted during step '{step}'")
            }
            Self::Interrupted { step: None } => "Provisioning interrupted".to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::ProbeUnavailable { .. } => Some(
                "An unreachable probe is not treated as 'resource absent', so the step was not attempted."
                    .to_string(),
            ),
            Self::ActionFailed { output, .. } if !output.is_empty() => {
                Some(format!("Command output (tail):\n{output}"))
            }
            Self::ActionFailed { .. } => Some("The command produced no output.".to_string()),
            Self::Timeout { .. } => Some(
                "Readiness checks are polled at a fixed interval up to the step's attempt budget."
                    .to_string(),
            ),
            Self::Interrupted { .. } => Some(
                "Steps completed before the interrupt are kept; cleanup runs if anything was changed."
                    .to_string(),
            ),
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProbeUnavailable { .. } => vec![
                "Check that the service the probe talks to is running".to_string(),
                "Run 'libstack doctor --plan <file>' to check required tools".to_string(),
            ],
            Self::ActionFailed { .. } => vec![
                "Fix the cause shown in the output and re-run; completed steps are skipped"
                    .to_string(),
                "Re-run with --verbose to see every command".to_string(),
            ],
            Self::Timeout { .. } => vec![
                "Check the service logs (docker compose logs, journalctl)".to_string(),
                "Increase max_attempts or interval_seconds for the step on slow hosts".to_string(),
            ],
            Self::Interrupted { .. } => {
                vec!["Re-run the same command to continue; completed steps are skipped".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Provisioning
    }
}

// ============================================================================
// Runner and lock
// ============================================================================

impl UserFriendlyError for RunnerError {
    fn user_message(&self) -> String {
        match self {
            Self::ProgramNotFound { program } => format!("'{program}' was not found on PATH"),
            Self::SpawnFailed { program, reason } => {
                format!("Failed to start '{program}': {reason}")
            }
            Self::WaitFailed { program, reason } => {
                format!("Lost track of '{program}' while it was running: {reason}")
            }
            Self::InvalidCommand { reason } => format!("Invalid command: {reason}"),
        }
    }

    fn context(&self) -> Option<String> {
        Some("Every external tool is run directly from its argv, never through a shell.".to_string())
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::ProgramNotFound { program } => vec![
                format!("Install {program} or add it to PATH"),
                "Run 'libstack doctor' to list missing tools".to_string(),
            ],
            Self::SpawnFailed { .. } | Self::WaitFailed { .. } => {
                vec!["Check permissions on the program and the working directory".to_string()]
            }
            Self::InvalidCommand { .. } => {
                vec!["Every command in a plan needs a program name".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::ExternalCommand
    }
}

impl UserFriendlyError for LockError {
    fn user_message(&self) -> String {
        match self {
            Self::Held { plan, pid, .. } => {
                format!("Plan '{plan}' is already being provisioned by process {pid}")
            }
            Self::Abandoned { plan, pid, .. } => {
                format!("A previous run of '{plan}' (process {pid}) exited without releasing its lock")
            }
            other => other.to_string(),
        }
    }

    fn context(&self) -> Option<String> {
        Some(
            "Only one run per plan may proceed at a time; lock files live in <LIBSTACK_HOME>/locks."
                .to_string(),
        )
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Held { .. } => vec![
                "Wait for the other run to finish".to_string(),
                "If no other run exists, re-run with --force-unlock".to_string(),
            ],
            Self::Abandoned { .. } | Self::Corrupted { .. } => {
                vec!["Re-run with --force-unlock to reclaim the lock".to_string()]
            }
            _ => vec!["Check that the state directory is writable".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        ErrorCategory::Concurrency
    }
}

// ============================================================================
// LibstackError
// ============================================================================

impl UserFriendlyError for LibstackError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Plan(e) => e.user_message(),
            Self::Provision(e) => e.user_message(),
            Self::Runner(e) => e.user_message(),
            Self::Lock(e) => e.user_message(),
            Self::Precondition { check, details, .. } => {
                format!("Precondition '{check}' not met: {details}")
            }
            Self::Io(e) => format!("File system error: {e}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Plan(e) => e.context(),
            Self::Provision(e) => e.context(),
            Self::Runner(e) => e.context(),
            Self::Lock(e) => e.context(),
            Self::Precondition { .. } => Some(
                "Preconditions are checked once before the first step; libstack never elevates its own privileges."
                    .to_string(),
            ),
            Self::Io(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Plan(e) => e.suggestions(),
            Self::Provision(e) => e.suggestions(),
            Self::Runner(e) => e.suggestions(),
            Self::Lock(e) => e.suggestions(),
            Self::Precondition { remediation, .. } => vec![remediation.clone()],
            Self::Io(_) => vec!["Check permissions on the state directory".to_string()],
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Plan(e) => e.category(),
            Self::Provision(e) => e.category(),
            Self::Runner(e) => e.category(),
            Self::Lock(e) => e.category(),
            Self::Precondition { .. } => ErrorCategory::Environment,
            Self::Io(_) => ErrorCategory::FileSystem,
        }
    }
}

impl LibstackError {
    /// Get a user-friendly error message with context and actionable suggestions.
    ///
    /// ```text
    /// Error: <user message>
    ///
    /// Context: <context if available>
    ///
    /// Suggestions:
    ///   • <suggestion 1>
    ///   • <suggestion 2>
    /// ```
    #[must_use]
    pub fn display_for_user(&self) -> String {
        self.display_for_user_with_redactor(crate::redaction::default_redactor())
    }

    /// Same as [`display_for_user`](Self::display_for_user) with a caller-provided redactor.
    #[must_use]
    pub fn display_for_user_with_redactor(&self, redactor: &SecretRedactor) -> String {
        let mut output = String::new();

        output.push_str(&format!("Error: {}\n", self.user_message()));

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        // Command output can echo credentials back.
        redactor.redact_string(&output)
    }

    /// Map this error to the CLI exit code.
    ///
    /// The same code is recorded in the persisted run summary.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(_) | Self::Plan(_) => ExitCode::CLI_ARGS,
            Self::Lock(_) => ExitCode::LOCK_HELD,
            Self::Provision(e) => match e {
                ProvisionError::ProbeUnavailable { .. } => ExitCode::PROBE_UNAVAILABLE,
                ProvisionError::ActionFailed { .. } => ExitCode::ACTION_FAILED,
                ProvisionError::Timeout { .. } => ExitCode::READINESS_TIMEOUT,
                ProvisionError::Interrupted { .. } => ExitCode::INTERRUPTED,
            },
            Self::Precondition { .. } => ExitCode::PRECONDITION,
            Self::Runner(_) | Self::Io(_) => ExitCode::INTERNAL,
        }
    }

    /// Name of the failing step, when the error belongs to one.
    #[must_use]
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::Provision(e) => e.step(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action_failed() -> ProvisionError {
        ProvisionError::ActionFailed {
            step: "create-admin".to_string(),
            command: "dspace create-administrator -e admin@example.org".to_string(),
            exit_code: Some(1),
            output: "ERROR: password=Sup3rSecret! rejected".to_string(),
        }
    }

    #[test]
    fn test_exit_code_mapping() {
        let cases: Vec<(LibstackError, ExitCode)> = vec![
            (
                ConfigError::InvalidFile("bad".into()).into(),
                ExitCode::CLI_ARGS,
            ),
            (
                PlanError::DuplicateStep {
                    plan: "p".into(),
                    step: "s".into(),
                }
                .into(),
                ExitCode::CLI_ARGS,
            ),
            (
                LockError::Held {
                    plan: "p".into(),
                    pid: 1,
                    created_ago: "1s".into(),
                }
                .into(),
                ExitCode::LOCK_HELD,
            ),
            (
                ProvisionError::Timeout {
                    step: "solr".into(),
                    attempts: 10,
                    last_detail: "refused".into(),
                }
                .into(),
                ExitCode::READINESS_TIMEOUT,
            ),
            (
                ProvisionError::ProbeUnavailable {
                    step: "database".into(),
                    probe: "command".into(),
                    reason: "psql not found".into(),
                }
                .into(),
                ExitCode::PROBE_UNAVAILABLE,
            ),
            (action_failed().into(), ExitCode::ACTION_FAILED),
            (
                ProvisionError::Interrupted { step: None }.into(),
                ExitCode::INTERRUPTED,
            ),
            (
                LibstackError::Precondition {
                    check: "privilege".into(),
                    details: "not root".into(),
                    remediation: "run with sudo".into(),
                },
                ExitCode::PRECONDITION,
            ),
            (
                RunnerError::ProgramNotFound {
                    program: "docker".into(),
                }
                .into(),
                ExitCode::INTERNAL,
            ),
        ];

        for (err, code) in cases {
            assert_eq!(err.to_exit_code(), code, "{err}");
        }
    }

    #[test]
    fn test_display_for_user_layout() {
        let err = LibstackError::from(action_failed());
        let text = err.display_for_user();
        assert!(text.starts_with("Error: Step 'create-admin' failed"));
        assert!(text.contains("\nContext: Command output (tail):\n"));
        assert!(text.contains("\nSuggestions:\n  • "));
    }

    #[test]
    fn test_display_for_user_redacts_command_output() {
        let err = LibstackError::from(action_failed());
        let text = err.display_for_user();
        assert!(!text.contains("Sup3rSecret!"));
        assert!(text.contains("password=***"));
    }

    #[test]
    fn test_custom_redactor_masks_extra_values() {
        let err = LibstackError::from(ProvisionError::ActionFailed {
            step: "db".into(),
            command: "psql -c ALTER ROLE dspace PASSWORD 'hunter2-xyz'".into(),
            exit_code: Some(2),
            output: String::new(),
        });
        let redactor = SecretRedactor::new().with_secret("hunter2-xyz");
        let text = err.display_for_user_with_redactor(&redactor);
        assert!(!text.contains("hunter2-xyz"));
        assert!(text.contains("The command produced no output."));
    }

    #[test]
    fn test_step_name_surfaces() {
        assert_eq!(
            LibstackError::from(action_failed()).step(),
            Some("create-admin")
        );
        assert_eq!(
            ProvisionError::Interrupted {
                step: Some("solr".into())
            }
            .to_string(),
            "Interrupted during step 'solr'"
        );
        assert_eq!(
            ProvisionError::Interrupted { step: None }.to_string(),
            "Interrupted"
        );
    }

    #[test]
    fn test_action_failed_message_for_spawn_failure() {
        let err = ProvisionError::ActionFailed {
            step: "frontend".into(),
            command: "pm2 start".into(),
            exit_code: None,
            output: "'pm2' was not found on PATH".into(),
        };
        assert_eq!(err.to_string(), "Step 'frontend': command `pm2 start` failed to run");
    }

    #[test]
    fn test_categories() {
        assert_eq!(
            LibstackError::from(action_failed()).category(),
            ErrorCategory::Provisioning
        );
        assert_eq!(
            LibstackError::from(ConfigError::NotFound { path: "x".into() }).category(),
            ErrorCategory::Configuration
        );
        assert_eq!(ErrorCategory::ExternalCommand.to_string(), "External Command");
    }
}
