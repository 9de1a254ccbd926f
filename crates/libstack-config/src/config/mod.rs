//! Configuration management for libstack
//!
//! Hierarchical configuration with discovery and precedence: CLI > file >
//! defaults. The TOML file has three sections:
//!
//! ```toml
//! [options]            # operator options, same names as the CLI flags
//! admin_email = "repo-admin@library.example"
//! server_url = "https://repo.library.example/server"
//! test_data = "sample"
//!
//! [vars]               # extra ${name} variables for plan commands
//! solr_port = "8983"
//!
//! [run]
//! non_interactive = true
//! lock_ttl_seconds = 1800
//! ```

mod discovery;
mod model;
mod sources;
mod validation;

pub use libstack_utils::types::ConfigSource;
pub use model::*;
