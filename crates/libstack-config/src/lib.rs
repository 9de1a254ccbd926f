//! Configuration discovery and operator option resolution for libstack
//!
//! [`Config::discover`] loads CLI, config-file and default settings;
//! [`OptionResolver`] then fills the remaining operator options from prompts
//! or defaults and produces the read-only [`RunContext`] every step receives.

pub mod config;
pub mod context;
pub mod prompt;
pub mod resolver;

pub use config::{CliArgs, Config, ConfigSource, DEFAULT_LOCK_TTL_SECS, OptionValues};
pub use context::{BUILTIN_VARIABLES, RunContext, Secret, TestDataChoice};
pub use prompt::{Prompter, TerminalPrompter};
pub use resolver::{OptionResolver, PLACEHOLDER_PASSWORD, Resolution, ResolvedOption};

#[cfg(any(test, feature = "test-utils"))]
pub use prompt::ScriptedPrompter;
