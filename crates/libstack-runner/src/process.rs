use crate::error::RunnerError;

use super::CommandSpec;

// ============================================================================
// ProcessRunner Trait - the sole I/O primitive
// ============================================================================

/// Output from a process execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Standard output from the process (tail, if capture was bounded)
    pub stdout: Vec<u8>,
    /// Standard error from the process (tail, if capture was bounded)
    pub stderr: Vec<u8>,
    /// Exit code from the process (None if terminated by signal)
    pub exit_code: Option<i32>,
    /// Whether either stream was truncated by the capture bound
    pub truncated: bool,
}

impl ProcessOutput {
    /// Create a new `ProcessOutput` with the given values.
    #[must_use]
    pub fn new(stdout: Vec<u8>, stderr: Vec<u8>, exit_code: Option<i32>) -> Self {
        Self {
            stdout,
            stderr,
            exit_code,
            truncated: false,
        }
    }

    /// Successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<Vec<u8>>) -> Self {
        Self::new(stdout.into(), Vec::new(), Some(0))
    }

    /// Failed output with the given exit code and stderr.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<Vec<u8>>) -> Self {
        Self::new(Vec::new(), stderr.into(), Some(exit_code))
    }

    /// Get stdout as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stdout_string(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a UTF-8 string, lossy conversion.
    #[must_use]
    pub fn stderr_string(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }

    /// Check if the process exited successfully (exit code 0).
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Last `max_lines` lines of stdout followed by stderr, for diagnostics.
    ///
    /// Most tools print the reason for a failure on stderr, but some (`ant`,
    /// `psql -c`) print it on stdout, so both streams are included.
    #[must_use]
    pub fn diagnostic_tail(&self, max_lines: usize) -> String {
        let mut lines: Vec<String> = Vec::new();
        for stream in [self.stdout_string(), self.stderr_string()] {
            lines.extend(
                stream
                    .lines()
                    .map(str::trim_end)
                    .filter(|line| !line.is_empty())
                    .map(str::to_string),
            );
        }
        let skip = lines.len().saturating_sub(max_lines);
        lines.split_off(skip).join("\n")
    }
}

/// Trait for process execution.
///
/// Implementations MUST use argv-style APIs only (no shell string evaluation).
/// The call blocks until the process exits; there is no per-command timeout, so
/// a hung external command stalls the caller.
///
/// A process that ran and exited non-zero is `Ok` with a non-zero
/// [`ProcessOutput::exit_code`]. `Err` means the process could not be run at all.
///
/// # Example
///
/// ```rust
/// use libstack_runner::{CommandSpec, ProcessOutput, ProcessRunner, RunnerError};
///
/// struct EchoRunner;
///
/// impl ProcessRunner for EchoRunner {
///     fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
///         Ok(ProcessOutput::ok(cmd.to_string()))
///     }
/// }
///
/// let output = EchoRunner.run(&CommandSpec::new("pg_isready")).unwrap();
/// assert!(output.success());
/// assert_eq!(output.stdout_string(), "pg_isready");
/// ```
pub trait ProcessRunner {
    /// Execute a command and wait for it to exit.
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError>;
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for &R {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
        (**self).run(cmd)
    }
}

impl<R: ProcessRunner + ?Sized> ProcessRunner for Box<R> {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
        (**self).run(cmd)
    }
}
