//! Foundation utilities shared by every libstack crate: errors, exit codes,
//! redaction, canonical JSON, atomic writes, state paths and logging.

pub mod atomic_write;
pub mod canonicalization;
pub mod error;
pub mod exit_codes;
pub mod logging;
pub mod paths;
pub mod redaction;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
