use crate::error::RunnerError;
use std::io::{self, Read};
use std::process::Stdio;
use std::thread;

use super::{CommandSpec, ProcessOutput, ProcessRunner, RingBuffer};

/// Default bound for captured stdout (1 MiB)
pub const DEFAULT_STDOUT_CAP_BYTES: usize = 1024 * 1024;
/// Default bound for captured stderr (256 KiB)
pub const DEFAULT_STDERR_CAP_BYTES: usize = 256 * 1024;

// ============================================================================
// NativeRunner - Direct Process Execution
// ============================================================================

/// Native process runner using `std::process::Command`.
///
/// Spawns the program directly (no shell), drains stdout and stderr on reader
/// threads into bounded [`RingBuffer`]s, and blocks until the process exits.
/// stdin is closed so a tool that unexpectedly prompts fails instead of hanging.
///
/// # Example
///
/// ```rust,no_run
/// use libstack_runner::{CommandSpec, NativeRunner, ProcessRunner};
///
/// let runner = NativeRunner::new();
/// let output = runner.run(&CommandSpec::new("pg_isready").args(["-h", "localhost"])).unwrap();
/// println!("ready: {}", output.success());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct NativeRunner {
    stdout_cap_bytes: usize,
    stderr_cap_bytes: usize,
}

impl Default for NativeRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeRunner {
    /// Create a new `NativeRunner` with default capture bounds.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stdout_cap_bytes: DEFAULT_STDOUT_CAP_BYTES,
            stderr_cap_bytes: DEFAULT_STDERR_CAP_BYTES,
        }
    }

    /// Override the capture bounds for stdout and stderr.
    #[must_use]
    pub const fn with_caps(stdout_cap_bytes: usize, stderr_cap_bytes: usize) -> Self {
        Self {
            stdout_cap_bytes,
            stderr_cap_bytes,
        }
    }

    fn drain<R: Read + Send + 'static>(
        mut reader: R,
        cap: usize,
    ) -> thread::JoinHandle<io::Result<RingBuffer>> {
        thread::spawn(move || {
            let mut ring = RingBuffer::new(cap);
            let mut chunk = [0u8; 8192];
            loop {
                let read = reader.read(&mut chunk)?;
                if read == 0 {
                    break;
                }
                ring.write(&chunk[..read]);
            }
            Ok(ring)
        })
    }
}

impl ProcessRunner for NativeRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
        let program = cmd.program_name();
        if program.is_empty() {
            return Err(RunnerError::InvalidCommand {
                reason: "empty program name".to_string(),
            });
        }

        tracing::debug!(command = %cmd, "spawning command");

        let mut command = cmd.to_command();
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                RunnerError::ProgramNotFound {
                    program: program.clone(),
                }
            } else {
                RunnerError::SpawnFailed {
                    program: program.clone(),
                    reason: e.to_string(),
                }
            }
        })?;

        let stdout_handle = child
            .stdout
            .take()
            .map(|out| Self::drain(out, self.stdout_cap_bytes));
        let stderr_handle = child
            .stderr
            .take()
            .map(|err| Self::drain(err, self.stderr_cap_bytes));

        let status = child.wait().map_err(|e| RunnerError::WaitFailed {
            program: program.clone(),
            reason: e.to_string(),
        })?;

        let collect = |handle: Option<thread::JoinHandle<io::Result<RingBuffer>>>| {
            match handle.map(thread::JoinHandle::join) {
                Some(Ok(Ok(ring))) => Ok(ring),
                Some(Ok(Err(e))) => Err(RunnerError::WaitFailed {
                    program: program.clone(),
                    reason: format!("failed to read output: {e}"),
                }),
                Some(Err(_)) => Err(RunnerError::WaitFailed {
                    program: program.clone(),
                    reason: "output reader thread panicked".to_string(),
                }),
                None => Ok(RingBuffer::new(0)),
            }
        };

        let stdout = collect(stdout_handle)?;
        let stderr = collect(stderr_handle)?;
        let truncated = stdout.was_truncated() || stderr.was_truncated();

        let mut output = ProcessOutput::new(stdout.into_bytes(), stderr.into_bytes(), status.code());
        output.truncated = truncated;

        tracing::debug!(
            command = %cmd,
            exit_code = ?output.exit_code,
            truncated,
            "command finished"
        );

        Ok(output)
    }
}
