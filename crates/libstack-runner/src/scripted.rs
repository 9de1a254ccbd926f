//! Scripted process runner for tests.
//!
//! `ScriptedRunner` never spawns anything. Each command line is matched against
//! registered rules (substring match on the rendered command line, first rule
//! wins) and answered from that rule's queue of responses. The last response of
//! a queue repeats forever. Commands that match no rule succeed with empty output.
//! Every invocation is recorded so tests can assert exactly what ran.

use std::cell::RefCell;
use std::collections::VecDeque;

use crate::{CommandSpec, ProcessOutput, ProcessRunner, RunnerError};

/// A canned answer for a scripted command.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// The process ran and produced this output
    Output(ProcessOutput),
    /// The program could not be launched
    NotFound,
}

impl ScriptedResponse {
    /// Exit 0 with the given stdout.
    #[must_use]
    pub fn stdout(text: &str) -> Self {
        Self::Output(ProcessOutput::ok(text.as_bytes().to_vec()))
    }

    /// Exit 0 with no output.
    #[must_use]
    pub fn success() -> Self {
        Self::Output(ProcessOutput::ok(Vec::new()))
    }

    /// Exit with `code` and the given stderr.
    #[must_use]
    pub fn exit(code: i32, stderr: &str) -> Self {
        Self::Output(ProcessOutput::failed(code, stderr.as_bytes().to_vec()))
    }
}

#[derive(Debug)]
struct Rule {
    pattern: String,
    responses: VecDeque<ScriptedResponse>,
}

/// Test double for [`ProcessRunner`].
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    rules: RefCell<Vec<Rule>>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedRunner {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `pattern` with `response`.
    pub fn on(&self, pattern: &str, response: ScriptedResponse) -> &Self {
        self.on_sequence(pattern, vec![response])
    }

    /// Answer commands containing `pattern` with `responses` in order; the last
    /// one repeats once the others are used up.
    pub fn on_sequence(&self, pattern: &str, responses: Vec<ScriptedResponse>) -> &Self {
        self.rules.borrow_mut().push(Rule {
            pattern: pattern.to_string(),
            responses: responses.into(),
        });
        self
    }

    /// Every command line run so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    /// Number of recorded command lines containing `pattern`.
    #[must_use]
    pub fn count_matching(&self, pattern: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|line| line.contains(pattern))
            .count()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<ProcessOutput, RunnerError> {
        let line = cmd.to_string();
        self.calls.borrow_mut().push(line.clone());

        let mut rules = self.rules.borrow_mut();
        let Some(rule) = rules.iter_mut().find(|rule| line.contains(&rule.pattern)) else {
            return Ok(ProcessOutput::ok(Vec::new()));
        };

        let response = if rule.responses.len() > 1 {
            rule.responses.pop_front()
        } else {
            rule.responses.front().cloned()
        };

        match response {
            Some(ScriptedResponse::Output(output)) => Ok(output),
            Some(ScriptedResponse::NotFound) => Err(RunnerError::ProgramNotFound {
                program: cmd.program_name(),
            }),
            None => Ok(ProcessOutput::ok(Vec::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmatched_commands_succeed_and_are_recorded() {
        let runner = ScriptedRunner::new();
        let output = runner.run(&CommandSpec::new("pm2").arg("save")).unwrap();
        assert!(output.success());
        assert_eq!(runner.calls(), vec!["pm2 save".to_string()]);
    }

    #[test]
    fn test_sequence_then_repeat_last() {
        let runner = ScriptedRunner::new();
        runner.on_sequence(
            "pg_isready",
            vec![ScriptedResponse::exit(2, "no response"), ScriptedResponse::success()],
        );
        let cmd = CommandSpec::new("pg_isready");
        assert_eq!(runner.run(&cmd).unwrap().exit_code, Some(2));
        assert!(runner.run(&cmd).unwrap().success());
        assert!(runner.run(&cmd).unwrap().success());
        assert_eq!(runner.count_matching("pg_isready"), 3);
    }

    #[test]
    fn test_not_found_response() {
        let runner = ScriptedRunner::new();
        runner.on("docker", ScriptedResponse::NotFound);
        let err = runner
            .run(&CommandSpec::new("docker").args(["compose", "ps"]))
            .unwrap_err();
        assert_eq!(err.program(), Some("docker"));
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let runner = ScriptedRunner::new();
        runner
            .on("psql -tAc", ScriptedResponse::stdout("1"))
            .on("psql", ScriptedResponse::exit(1, "boom"));
        let probe = CommandSpec::new("psql").args(["-tAc", "SELECT 1"]);
        assert_eq!(runner.run(&probe).unwrap().stdout_string(), "1");
        let other = CommandSpec::new("psql").args(["-c", "CREATE ROLE dspace"]);
        assert_eq!(runner.run(&other).unwrap().exit_code, Some(1));
    }
}
