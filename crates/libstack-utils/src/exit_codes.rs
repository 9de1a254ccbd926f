//! Exit code constants for libstack.
//!
//! # Exit Code Table
//!
//! | Code | Constant | Description |
//! |------|----------|-------------|
//! | 0 | `SUCCESS` | Every step ran, was skipped, or was not selected |
//! | 1 | `INTERNAL` | General/internal failure |
//! | 2 | `CLI_ARGS` | Invalid CLI arguments, configuration or plan |
//! | 9 | `LOCK_HELD` | Another process is provisioning the same plan |
//! | 10 | `READINESS_TIMEOUT` | A readiness check exhausted its attempts |
//! | 11 | `PROBE_UNAVAILABLE` | An idempotency or readiness probe could not run |
//! | 12 | `ACTION_FAILED` | A step command exited non-zero |
//! | 13 | `PRECONDITION` | Required tools or privilege missing |
//! | 130 | `INTERRUPTED` | Stopped by Ctrl-C |

/// Process exit code.
///
/// The numeric values are part of the public interface; wrapper scripts
/// branch on them.
///
/// # Example
///
/// ```rust
/// use libstack_utils::exit_codes::ExitCode;
///
/// assert_eq!(ExitCode::READINESS_TIMEOUT.as_i32(), 10);
/// assert_eq!(ExitCode::SUCCESS, ExitCode::from_i32(0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(i32);

impl ExitCode {
    /// Success - the plan completed
    pub const SUCCESS: ExitCode = ExitCode(0);

    /// Internal error - general failure
    pub const INTERNAL: ExitCode = ExitCode(1);

    /// CLI arguments error - invalid arguments, configuration or plan file
    pub const CLI_ARGS: ExitCode = ExitCode(2);

    /// Lock held - another process is provisioning the same plan
    pub const LOCK_HELD: ExitCode = ExitCode(9);

    /// Readiness timeout - a service never became ready within its budget
    pub const READINESS_TIMEOUT: ExitCode = ExitCode(10);

    /// Probe unavailable - an existence or readiness probe could not be evaluated
    pub const PROBE_UNAVAILABLE: ExitCode = ExitCode(11);

    /// Action failed - a provisioning command exited non-zero
    pub const ACTION_FAILED: ExitCode = ExitCode(12);

    /// Precondition unmet - missing tools or insufficient privilege
    pub const PRECONDITION: ExitCode = ExitCode(13);

    /// Interrupted - operator pressed Ctrl-C (128 + SIGINT)
    pub const INTERRUPTED: ExitCode = ExitCode(130);

    /// Get the numeric exit code value.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Create an `ExitCode` from a raw value.
    #[must_use]
    pub const fn from_i32(code: i32) -> Self {
        ExitCode(code)
    }

    /// Stable snake_case name, used in JSON summaries.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self.0 {
            0 => "success",
            2 => "cli_args",
            9 => "lock_held",
            10 => "readiness_timeout",
            11 => "probe_unavailable",
            12 => "action_failed",
            13 => "precondition",
            130 => "interrupted",
            _ => "internal",
        }
    }
}

impl From<i32> for ExitCode {
    fn from(code: i32) -> Self {
        ExitCode(code)
    }
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_values() {
        assert_eq!(ExitCode::SUCCESS.as_i32(), 0);
        assert_eq!(ExitCode::INTERNAL.as_i32(), 1);
        assert_eq!(ExitCode::CLI_ARGS.as_i32(), 2);
        assert_eq!(ExitCode::LOCK_HELD.as_i32(), 9);
        assert_eq!(ExitCode::READINESS_TIMEOUT.as_i32(), 10);
        assert_eq!(ExitCode::PROBE_UNAVAILABLE.as_i32(), 11);
        assert_eq!(ExitCode::ACTION_FAILED.as_i32(), 12);
        assert_eq!(ExitCode::PRECONDITION.as_i32(), 13);
        assert_eq!(ExitCode::INTERRUPTED.as_i32(), 130);
    }

    #[test]
    fn test_exit_code_names() {
        assert_eq!(ExitCode::ACTION_FAILED.name(), "action_failed");
        assert_eq!(ExitCode::from_i32(42).name(), "internal");
    }

    #[test]
    fn test_conversions() {
        let code: ExitCode = 12.into();
        assert_eq!(code, ExitCode::ACTION_FAILED);
        let raw: i32 = ExitCode::INTERRUPTED.into();
        assert_eq!(raw, 130);
    }
}
