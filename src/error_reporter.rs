//! Error reporting utilities for user-friendly error display
//!
//! Builds on [`LibstackError::display_for_user`] and adds help specific to
//! the operation that failed. Every report passes through the redactor.

use libstack_utils::error::LibstackError;
use libstack_utils::redaction::SecretRedactor;

pub mod utils {
    use super::*;

    /// Contextual report using the process-wide redactor.
    #[must_use]
    pub fn create_contextual_report(error: &LibstackError, operation: &str) -> String {
        create_contextual_report_with_redactor(
            error,
            operation,
            libstack_utils::redaction::default_redactor(),
        )
    }

    /// Contextual report: the user-facing error, the failing step and
    /// operation-specific hints.
    #[must_use]
    pub fn create_contextual_report_with_redactor(
        error: &LibstackError,
        operation: &str,
        redactor: &SecretRedactor,
    ) -> String {
        let mut report = error.display_for_user_with_redactor(redactor);

        if let Some(step) = error.step() {
            report.push_str(&format!("\nFailed step: {step}\n"));
        }

        let hints = operation_hints(error, operation);
        if !hints.is_empty() {
            report.push_str(&format!("\nFor '{operation}':\n"));
            for hint in hints {
                report.push_str(&format!("  - {hint}\n"));
            }
        }

        redactor.redact_string(&report)
    }

    fn operation_hints(error: &LibstackError, operation: &str) -> Vec<&'static str> {
        match (operation, error) {
            ("provision", LibstackError::Provision(_)) => vec![
                "The run summary was saved to <LIBSTACK_HOME>/runs/<plan>/last-run.json",
                "Fix the cause and re-run; steps that already completed are skipped",
            ],
            ("provision", LibstackError::Lock(_)) => {
                vec!["Check for another 'libstack provision' of the same plan"]
            }
            ("provision" | "plan", LibstackError::Plan(_)) => {
                vec!["Run 'libstack plan --plan <file>' to validate a plan without running it"]
            }
            ("doctor", _) => vec!["Run with --verbose for more detailed output"],
            _ => Vec::new(),
        }
    }
}
