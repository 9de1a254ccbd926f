//! CLI argument definitions and parsing structures
//!
//! This module defines the command-line interface structure using clap,
//! including the main `Cli` struct and the subcommand enum.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use libstack_config::{CliArgs, OptionValues};

/// libstack - idempotent provisioning for DSpace and Koha hosts
#[derive(Parser, Debug)]
#[command(name = "libstack")]
#[command(about = "Idempotent, resumable provisioning of DSpace and Koha hosts")]
#[command(long_about = r#"
libstack runs a provisioning plan step by step. Before every mutating step it
checks whether the goal state already exists and skips the step if so, waits
for services to become ready with a bounded poll budget, and runs the plan's
cleanup exactly once if a run fails after it has changed the host.

EXAMPLES:
  # Provision DSpace with Docker Compose, prompting for unset options
  libstack provision --plan plans/dspace-docker.toml

  # Unattended run with explicit credentials
  libstack provision --plan plans/dspace-native.toml --non-interactive \
      --admin-email repo-admin@library.example --admin-password 'long passphrase'

  # Show what would run on this host without changing anything
  libstack provision --plan plans/koha-docker.toml --dry-run

  # Inspect a plan and the option values it would use
  libstack plan --plan plans/dspace-docker.toml --json

  # Check tools and privileges before provisioning
  libstack doctor --plan plans/dspace-native.toml

CONFIGURATION:
  Options are resolved with precedence: CLI flags > config file > prompt > defaults
  The config file is discovered by searching upward from CWD for .libstack/config.toml
  Use --config to specify an explicit config file path
  State (run locks, last-run summaries) lives in $LIBSTACK_HOME (default: .libstack)
"#)]
#[command(version)]
pub struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Emit machine-readable canonical JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,

    /// Never prompt; unset options take their defaults
    #[arg(long, global = true)]
    pub non_interactive: bool,

    #[command(flatten)]
    pub options: OptionArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Operator option overrides, highest precedence.
#[derive(Args, Debug, Clone, Default)]
pub struct OptionArgs {
    /// Administrator e-mail address
    #[arg(long, global = true, value_name = "EMAIL")]
    pub admin_email: Option<String>,

    /// Administrator password
    #[arg(long, global = true, value_name = "PASSWORD")]
    pub admin_password: Option<String>,

    /// Administrator first name
    #[arg(long, global = true, value_name = "NAME")]
    pub admin_first_name: Option<String>,

    /// Administrator last name
    #[arg(long, global = true, value_name = "NAME")]
    pub admin_last_name: Option<String>,

    /// Public URL of the backend (REST API)
    #[arg(long, global = true, value_name = "URL")]
    pub server_url: Option<String>,

    /// Public URL of the user interface
    #[arg(long, global = true, value_name = "URL")]
    pub ui_url: Option<String>,

    /// Site name shown in the user interface
    #[arg(long, global = true, value_name = "NAME")]
    pub site_name: Option<String>,

    /// Absolute installation directory
    #[arg(long, global = true, value_name = "DIR")]
    pub install_dir: Option<String>,

    /// Test data to import: none, sample or entities
    #[arg(long, global = true, value_name = "CHOICE")]
    pub test_data: Option<String>,
}

impl From<OptionArgs> for OptionValues {
    fn from(args: OptionArgs) -> Self {
        Self {
            admin_email: args.admin_email,
            admin_password: args.admin_password,
            admin_first_name: args.admin_first_name,
            admin_last_name: args.admin_last_name,
            server_url: args.server_url,
            ui_url: args.ui_url,
            site_name: args.site_name,
            install_dir: args.install_dir,
            test_data: args.test_data,
        }
    }
}

impl Cli {
    /// Overrides handed to config discovery.
    #[must_use]
    pub fn config_args(&self) -> CliArgs {
        CliArgs {
            config_path: self.config.clone(),
            non_interactive: self.non_interactive,
            options: self.options.clone().into(),
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a provisioning plan
    ///
    /// Steps whose goal state already exists are skipped, so an interrupted
    /// or failed run can simply be started again.
    ///
    /// EXAMPLES:
    ///   libstack provision --plan plans/dspace-docker.toml
    ///   libstack provision --plan plans/koha-docker.toml --dry-run --json
    Provision {
        /// Plan file to run
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,

        /// Evaluate idempotency guards only; run no actions
        #[arg(long)]
        dry_run: bool,

        /// Take over the run lock even if another run appears to hold it
        #[arg(long)]
        force_unlock: bool,
    },

    /// Validate a plan and show its steps, resolved options and last run
    ///
    /// Never prompts and never changes the host.
    Plan {
        /// Plan file to inspect
        #[arg(long, value_name = "FILE")]
        plan: PathBuf,
    },

    /// Check tools, privileges and the state directory
    ///
    /// With --plan, also checks the tools and privilege that plan requires.
    Doctor {
        /// Plan whose requirements to check
        #[arg(long, value_name = "FILE")]
        plan: Option<PathBuf>,
    },
}

impl Commands {
    /// Short name used in error reports.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::Provision { .. } => "provision",
            Self::Plan { .. } => "plan",
            Self::Doctor { .. } => "doctor",
        }
    }
}
