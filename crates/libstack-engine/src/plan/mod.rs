//! Provisioning plans
//!
//! A plan is an ordered list of steps loaded from a TOML file. Steps run in
//! file order; nothing is reordered or run in parallel. Strings may reference
//! `${name}` variables, which are substituted from the [`RunContext`] by
//! [`ProvisioningPlan::render`] before the sequencer starts.

mod loader;
pub mod template;

pub use loader::{load_plan, parse_plan};

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use libstack_config::{RunContext, TestDataChoice};
use libstack_runner::CommandSpec;
use libstack_utils::error::PlanError;

/// Default readiness budget when a step does not set `max_attempts`
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Default pause between readiness attempts (in seconds)
pub const DEFAULT_INTERVAL_SECS: u64 = 2;

/// An argv command. `argv[0]` is the program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCommand {
    pub argv: Vec<String>,
}

impl PlanCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn program(&self) -> &str {
        self.argv.first().map_or("", String::as_str)
    }

    /// Build the runner spec, applying the step's working directory and env.
    #[must_use]
    pub fn to_spec(&self, cwd: Option<&str>, env: &BTreeMap<String, String>) -> CommandSpec {
        let mut spec = CommandSpec::new(self.program()).args(self.argv.iter().skip(1));
        if let Some(dir) = cwd {
            spec = spec.cwd(dir);
        }
        spec.envs(env.iter())
    }
}

impl fmt::Display for PlanCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec(None, &BTreeMap::new()).to_string())
    }
}

/// How a command probe decides that the goal state exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeMode {
    /// Exit 0 means present, any other exit means absent
    ExitZero,
    /// Exit 0 with non-blank stdout means present; non-zero exit is a probe failure
    StdoutNonEmpty,
    /// Exit 0 with stdout containing the needle means present
    StdoutContains(String),
}

/// Idempotency check for a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardProbe {
    /// Goal state is never pre-satisfied; the action always runs
    Never,
    /// A filesystem path exists
    Path(String),
    /// An external query
    Command { command: PlanCommand, mode: ProbeMode },
}

impl GuardProbe {
    /// Short label used in logs and probe errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Never => "never",
            Self::Path(_) => "path",
            Self::Command { .. } => "command",
        }
    }
}

/// Condition polled until a step's service is ready.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadinessCheck {
    /// Exit 0 means ready
    Command(PlanCommand),
    /// GET the URL; ready on `expect_status`, or any 2xx when unset
    Http {
        url: String,
        expect_status: Option<u16>,
    },
    /// A TCP connection to `host:port` succeeds
    Tcp { host: String, port: u16 },
}

impl ReadinessCheck {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Command(_) => "command",
            Self::Http { .. } => "http",
            Self::Tcp { .. } => "tcp",
        }
    }
}

impl fmt::Display for ReadinessCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(cmd) => write!(f, "command `{cmd}`"),
            Self::Http { url, .. } => write!(f, "http {url}"),
            Self::Tcp { host, port } => write!(f, "tcp {host}:{port}"),
        }
    }
}

/// Readiness check plus its poll budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub check: ReadinessCheck,
    pub max_attempts: u32,
    pub interval: Duration,
}

/// One unit of provisioning work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningStep {
    pub name: String,
    pub description: Option<String>,
    /// If this reports the goal state exists, `actions` must not run
    pub guard: GuardProbe,
    /// Commands run in order; the first non-zero exit fails the step
    pub actions: Vec<PlanCommand>,
    pub readiness: Option<Readiness>,
    /// Whether a successful action is an irreversible change that arms cleanup
    pub mutating: bool,
    /// Test-data choices this step applies to; `None` means always
    pub when: Option<Vec<TestDataChoice>>,
    pub cwd: Option<String>,
    pub env: BTreeMap<String, String>,
}

impl ProvisioningStep {
    /// A mutating step with no guard, no readiness check and no actions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            guard: GuardProbe::Never,
            actions: Vec::new(),
            readiness: None,
            mutating: true,
            when: None,
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn guard(mut self, guard: GuardProbe) -> Self {
        self.guard = guard;
        self
    }

    #[must_use]
    pub fn action(mut self, command: PlanCommand) -> Self {
        self.actions.push(command);
        self
    }

    #[must_use]
    pub fn readiness(mut self, check: ReadinessCheck, max_attempts: u32, interval: Duration) -> Self {
        self.readiness = Some(Readiness {
            check,
            max_attempts,
            interval,
        });
        self
    }

    #[must_use]
    pub fn mutating(mut self, mutating: bool) -> Self {
        self.mutating = mutating;
        self
    }

    #[must_use]
    pub fn when(mut self, choices: Vec<TestDataChoice>) -> Self {
        self.when = Some(choices);
        self
    }

    /// Whether the step applies to the operator's test-data choice.
    #[must_use]
    pub fn selected_for(&self, choice: TestDataChoice) -> bool {
        self.when.as_ref().is_none_or(|set| set.contains(&choice))
    }

    fn strings(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        match &self.guard {
            GuardProbe::Never => {}
            GuardProbe::Path(path) => out.push(path),
            GuardProbe::Command { command, mode } => {
                out.extend(command.argv.iter().map(String::as_str));
                if let ProbeMode::StdoutContains(needle) = mode {
                    out.push(needle);
                }
            }
        }
        for action in &self.actions {
            out.extend(action.argv.iter().map(String::as_str));
        }
        if let Some(readiness) = &self.readiness {
            match &readiness.check {
                ReadinessCheck::Command(cmd) => out.extend(cmd.argv.iter().map(String::as_str)),
                ReadinessCheck::Http { url, .. } => out.push(url),
                ReadinessCheck::Tcp { host, .. } => out.push(host),
            }
        }
        if let Some(cwd) = &self.cwd {
            out.push(cwd);
        }
        out.extend(self.env.values().map(String::as_str));
        out
    }
}

/// Operating-system privilege a plan needs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Privilege {
    #[default]
    None,
    Root,
    Group(String),
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Root => f.write_str("root"),
            Self::Group(name) => write!(f, "group:{name}"),
        }
    }
}

/// Teardown commands run once if provisioning fails after a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CleanupAction {
    pub commands: Vec<PlanCommand>,
}

/// Ordered provisioning steps. Insertion order is execution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningPlan {
    pub name: String,
    pub description: Option<String>,
    /// Programs that must be on PATH before the run starts
    pub requires: Vec<String>,
    pub privilege: Privilege,
    pub cleanup: Option<CleanupAction>,
    pub steps: Vec<ProvisioningStep>,
}

impl ProvisioningPlan {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            requires: Vec::new(),
            privilege: Privilege::None,
            cleanup: None,
            steps: Vec::new(),
        }
    }

    #[must_use]
    pub fn step(mut self, step: ProvisioningStep) -> Self {
        self.steps.push(step);
        self
    }

    #[must_use]
    pub fn with_cleanup(mut self, commands: Vec<PlanCommand>) -> Self {
        self.cleanup = Some(CleanupAction { commands });
        self
    }

    /// Structural checks: unique non-empty step names, non-empty argv lists,
    /// positive readiness budgets and well-formed variable references.
    pub fn validate(&self) -> Result<(), PlanError> {
        let invalid = |reason: String| PlanError::Invalid {
            plan: self.name.clone(),
            reason,
        };

        if self.name.is_empty()
            || !self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(invalid(
                "plan name must be non-empty letters, digits, '-' or '_'".to_string(),
            ));
        }
        if self.steps.is_empty() {
            return Err(invalid("plan has no steps".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(invalid("step names must not be empty".to_string()));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(PlanError::DuplicateStep {
                    plan: self.name.clone(),
                    step: step.name.clone(),
                });
            }
            let commands = step
                .actions
                .iter()
                .chain(match &step.guard {
                    GuardProbe::Command { command, .. } => Some(command),
                    _ => None,
                })
                .chain(match step.readiness.as_ref().map(|r| &r.check) {
                    Some(ReadinessCheck::Command(cmd)) => Some(cmd),
                    _ => None,
                });
            for command in commands {
                if command.program().is_empty() {
                    return Err(invalid(format!("step '{}' has an empty command", step.name)));
                }
            }
            if let Some(readiness) = &step.readiness
                && readiness.max_attempts == 0
            {
                return Err(invalid(format!(
                    "step '{}' must allow at least one readiness attempt",
                    step.name
                )));
            }
            if step.actions.is_empty() && step.readiness.is_none() {
                return Err(invalid(format!(
                    "step '{}' has neither actions nor a readiness check",
                    step.name
                )));
            }
            for text in step.strings() {
                template::variables(text).map_err(|e| invalid(format!("step '{}': {e}", step.name)))?;
            }
        }

        if let Some(cleanup) = &self.cleanup
            && cleanup.commands.iter().any(|c| c.program().is_empty())
        {
            return Err(invalid("cleanup has an empty command".to_string()));
        }

        Ok(())
    }

    /// Every variable referenced anywhere in the plan must be resolvable.
    pub fn check_variables(&self, context: &RunContext) -> Result<(), PlanError> {
        let cleanup_strings = self
            .cleanup
            .iter()
            .flat_map(|c| c.commands.iter())
            .flat_map(|c| c.argv.iter().map(String::as_str));
        let by_step = self
            .steps
            .iter()
            .flat_map(|s| s.strings().into_iter().map(move |t| (s.name.as_str(), t)))
            .chain(cleanup_strings.map(|t| ("cleanup", t)));

        for (step, text) in by_step {
            let names = template::variables(text).map_err(|e| PlanError::Invalid {
                plan: self.name.clone(),
                reason: format!("step '{step}': {e}"),
            })?;
            if let Some(unknown) = names.into_iter().find(|n| !context.knows(n)) {
                return Err(PlanError::UnknownVariable {
                    step: step.to_string(),
                    variable: unknown,
                });
            }
        }
        Ok(())
    }

    /// Copy of the plan with every `${name}` substituted from `context`.
    pub fn render(&self, context: &RunContext) -> Result<ProvisioningPlan, PlanError> {
        self.check_variables(context)?;

        let sub = |step: &str, text: &str| -> Result<String, PlanError> {
            template::render(text, |name| context.lookup(name)).map_err(|e| match e {
                template::TemplateError::Unknown(variable) => PlanError::UnknownVariable {
                    step: step.to_string(),
                    variable,
                },
                template::TemplateError::Malformed(_) => PlanError::Invalid {
                    plan: self.name.clone(),
                    reason: format!("step '{step}': {e}"),
                },
            })
        };
        let sub_cmd = |step: &str, cmd: &PlanCommand| -> Result<PlanCommand, PlanError> {
            Ok(PlanCommand {
                argv: cmd
                    .argv
                    .iter()
                    .map(|a| sub(step, a))
                    .collect::<Result<_, _>>()?,
            })
        };

        let mut steps = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            let name = step.name.as_str();
            let guard = match &step.guard {
                GuardProbe::Never => GuardProbe::Never,
                GuardProbe::Path(path) => GuardProbe::Path(sub(name, path)?),
                GuardProbe::Command { command, mode } => GuardProbe::Command {
                    command: sub_cmd(name, command)?,
                    mode: match mode {
                        ProbeMode::StdoutContains(needle) => {
                            ProbeMode::StdoutContains(sub(name, needle)?)
                        }
                        other => other.clone(),
                    },
                },
            };
            let readiness = match &step.readiness {
                None => None,
                Some(r) => Some(Readiness {
                    check: match &r.check {
                        ReadinessCheck::Command(cmd) => ReadinessCheck::Command(sub_cmd(name, cmd)?),
                        ReadinessCheck::Http { url, expect_status } => ReadinessCheck::Http {
                            url: sub(name, url)?,
                            expect_status: *expect_status,
                        },
                        ReadinessCheck::Tcp { host, port } => ReadinessCheck::Tcp {
                            host: sub(name, host)?,
                            port: *port,
                        },
                    },
                    max_attempts: r.max_attempts,
                    interval: r.interval,
                }),
            };
            steps.push(ProvisioningStep {
                name: step.name.clone(),
                description: step.description.clone(),
                guard,
                actions: step
                    .actions
                    .iter()
                    .map(|c| sub_cmd(name, c))
                    .collect::<Result<_, _>>()?,
                readiness,
                mutating: step.mutating,
                when: step.when.clone(),
                cwd: step.cwd.as_deref().map(|c| sub(name, c)).transpose()?,
                env: step
                    .env
                    .iter()
                    .map(|(k, v)| -> Result<(String, String), PlanError> {
                        Ok((k.clone(), sub(name, v)?))
                    })
                    .collect::<Result<_, _>>()?,
            });
        }

        let cleanup = match &self.cleanup {
            None => None,
            Some(c) => Some(CleanupAction {
                commands: c
                    .commands
                    .iter()
                    .map(|cmd| sub_cmd("cleanup", cmd))
                    .collect::<Result<_, _>>()?,
            }),
        };

        Ok(ProvisioningPlan {
            name: self.name.clone(),
            description: self.description.clone(),
            requires: self.requires.clone(),
            privilege: self.privilege.clone(),
            cleanup,
            steps,
        })
    }
}
