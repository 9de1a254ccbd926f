use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a resolved configuration value came from.
///
/// Precedence, highest first: `Cli`, `Config`, `Prompt`, `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    /// Command-line flag
    Cli,
    /// `[options]` table of the config file
    Config,
    /// Answered interactively by the operator
    Prompt,
    /// Built-in default
    Default,
}

impl ConfigSource {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Config => "config",
            Self::Prompt => "prompt",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Doctor output for environment and preflight checks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DoctorOutput {
    /// Schema version for this doctor format
    pub schema_version: String,
    /// RFC3339 UTC timestamp when the doctor output was emitted
    pub emitted_at: DateTime<Utc>,
    /// Plan the checks were run for, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    /// Overall health status (true if no check failed)
    pub ok: bool,
    /// Checks performed, in the order they ran
    pub checks: Vec<DoctorCheck>,
}

impl DoctorOutput {
    /// Build an output, deriving `ok` from the checks.
    #[must_use]
    pub fn new(plan: Option<String>, checks: Vec<DoctorCheck>) -> Self {
        let ok = checks.iter().all(|c| c.status != CheckStatus::Fail);
        Self {
            schema_version: "1".to_string(),
            emitted_at: Utc::now(),
            plan,
            ok,
            checks,
        }
    }
}

/// Individual health check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoctorCheck {
    /// Name of the check
    pub name: String,
    /// Status of the check
    pub status: CheckStatus,
    /// Details about the check result
    pub details: String,
    /// How to fix a failed or warning check
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl DoctorCheck {
    #[must_use]
    pub fn pass(name: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Pass,
            details: details.into(),
            remediation: None,
        }
    }

    #[must_use]
    pub fn warn(
        name: impl Into<String>,
        details: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            details: details.into(),
            remediation: Some(remediation.into()),
        }
    }

    #[must_use]
    pub fn fail(
        name: impl Into<String>,
        details: impl Into<String>,
        remediation: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Fail,
            details: details.into(),
            remediation: Some(remediation.into()),
        }
    }
}

/// Status of a health check
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Warn => write!(f, "WARN"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}
