//! CLI entry point and dispatch logic
//!
//! This module owns the `run()` function which:
//! - Parses CLI arguments
//! - Initializes logging
//! - Builds CliArgs and discovers Config
//! - Dispatches to command handlers
//! - Handles all error output

use anyhow::Result;
use clap::Parser;

use super::args::{Cli, Commands};
use super::commands;

use crate::error_reporter::utils as error_utils;
use libstack_config::Config;
use libstack_utils::error::LibstackError;
use libstack_utils::exit_codes::ExitCode;
use libstack_utils::logging::init_tracing;
use libstack_utils::redaction::redact_user_string;

/// Main CLI execution function.
///
/// This function handles ALL output including errors. It returns `Result<(), ExitCode>`:
/// - On success: returns `Ok(())` after printing any output
/// - On error: prints error message via contextual reporting, returns `Err(ExitCode)`
///
/// main.rs only calls `std::process::exit(code.as_i32())` on error - it does NOT print.
pub fn run() -> Result<(), ExitCode> {
    run_with(Cli::parse())
}

/// Run an already-parsed command line.
pub fn run_with(cli: Cli) -> Result<(), ExitCode> {
    if let Err(e) = init_tracing(cli.verbose) {
        eprintln!("Warning: failed to initialize logging: {e}");
    }

    let operation = cli.command.operation();

    let config = match Config::discover(&cli.config_args()) {
        Ok(config) => config,
        Err(err) => {
            let err = LibstackError::Config(err);
            eprintln!("{}", error_utils::create_contextual_report(&err, operation));
            return Err(err.to_exit_code());
        }
    };

    let result: Result<ExitCode> = match &cli.command {
        Commands::Provision {
            plan,
            dry_run,
            force_unlock,
        } => commands::execute_provision_command(plan, *dry_run, *force_unlock, cli.json, &config),
        Commands::Plan { plan } => commands::execute_plan_command(plan, cli.json, &config),
        Commands::Doctor { plan } => commands::execute_doctor_command(plan.as_deref(), cli.json),
    };

    match result {
        Ok(code) if code == ExitCode::SUCCESS => Ok(()),
        Ok(code) => Err(code),
        Err(error) => {
            if let Some(libstack_error) = error.downcast_ref::<LibstackError>() {
                eprintln!(
                    "{}",
                    error_utils::create_contextual_report(libstack_error, operation)
                );
                return Err(libstack_error.to_exit_code());
            }

            eprintln!("✗ Unexpected error: {}", redact_user_string(&format!("{error:#}")));
            eprintln!("\n  General troubleshooting:");
            eprintln!("    - Run with --verbose for more detailed output");
            eprintln!("    - Check that LIBSTACK_HOME points to a writable directory");
            Err(ExitCode::INTERNAL)
        }
    }
}
