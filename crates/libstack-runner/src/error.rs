//! Error types for runner module

use thiserror::Error;

/// Failures to execute a command at all.
///
/// A command that ran and exited non-zero is NOT an error at this layer; it is
/// reported through [`ProcessOutput::exit_code`](crate::ProcessOutput::exit_code)
/// and interpreted by the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Program not found: {program}")]
    ProgramNotFound { program: String },

    #[error("Failed to spawn '{program}': {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to wait for '{program}': {reason}")]
    WaitFailed { program: String, reason: String },

    #[error("Invalid command: {reason}")]
    InvalidCommand { reason: String },
}

impl RunnerError {
    /// Name of the program the error refers to, if any.
    #[must_use]
    pub fn program(&self) -> Option<&str> {
        match self {
            Self::ProgramNotFound { program }
            | Self::SpawnFailed { program, .. }
            | Self::WaitFailed { program, .. } => Some(program),
            Self::InvalidCommand { .. } => None,
        }
    }
}
