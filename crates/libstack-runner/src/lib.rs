//! Command runner for libstack provisioning steps
//!
//! Every external collaborator (package manager, `psql`, `docker compose`,
//! `pm2`, build tools) is reached through this crate and nothing else.
//!
//! # Security Model
//!
//! All process execution goes through [`CommandSpec`] to ensure argv-style invocation.
//! Plan files never reach a shell: arguments are passed as discrete elements, so
//! operator-supplied values such as passwords cannot be reinterpreted as shell syntax.

pub mod command_spec;
pub mod error;
pub mod native;
pub mod process;
pub mod ring_buffer;
#[cfg(any(test, feature = "test-utils"))]
pub mod scripted;

pub use command_spec::CommandSpec;
pub use error::RunnerError;
pub use native::NativeRunner;
pub use process::{ProcessOutput, ProcessRunner};
pub use ring_buffer::RingBuffer;
#[cfg(any(test, feature = "test-utils"))]
pub use scripted::{ScriptedResponse, ScriptedRunner};
