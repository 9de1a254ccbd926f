use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use libstack_config::TestDataChoice;
use libstack_utils::error::PlanError;

use super::{
    CleanupAction, DEFAULT_INTERVAL_SECS, DEFAULT_MAX_ATTEMPTS, GuardProbe, PlanCommand,
    Privilege, ProbeMode, ProvisioningPlan, ProvisioningStep, Readiness, ReadinessCheck,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    name: String,
    description: Option<String>,
    #[serde(default)]
    requires: Vec<String>,
    privilege: Option<String>,
    cleanup: Option<CleanupFile>,
    #[serde(default)]
    steps: Vec<StepFile>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CleanupFile {
    run: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct StepFile {
    name: String,
    description: Option<String>,
    guard: Option<GuardFile>,
    #[serde(default)]
    run: Vec<Vec<String>>,
    ready: Option<ReadyFile>,
    #[serde(default = "default_true")]
    mutating: bool,
    when: Option<Vec<String>>,
    cwd: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct GuardFile {
    path: Option<String>,
    command: Option<Vec<String>>,
    #[serde(default)]
    stdout_nonempty: bool,
    stdout_contains: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadyFile {
    command: Option<Vec<String>>,
    http: Option<String>,
    expect_status: Option<u16>,
    tcp: Option<String>,
    max_attempts: Option<u32>,
    interval_seconds: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Read and validate a plan file.
pub fn load_plan(path: &Path) -> Result<ProvisioningPlan, PlanError> {
    let display = path.display().to_string();
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            PlanError::NotFound {
                path: display.clone(),
            }
        } else {
            PlanError::Parse {
                path: display.clone(),
                reason: e.to_string(),
            }
        }
    })?;
    parse_plan(&content, &display)
}

/// Parse and validate plan TOML. `origin` is only used in error messages.
pub fn parse_plan(content: &str, origin: &str) -> Result<ProvisioningPlan, PlanError> {
    let file: PlanFile = toml::from_str(content).map_err(|e| PlanError::Parse {
        path: origin.to_string(),
        reason: e.to_string(),
    })?;

    let plan_name = file.name.clone();
    let invalid = |reason: String| PlanError::Invalid {
        plan: plan_name.clone(),
        reason,
    };

    let privilege = match file.privilege.as_deref().map(str::trim) {
        None | Some("none" | "") => Privilege::None,
        Some("root") => Privilege::Root,
        Some(other) => match other.strip_prefix("group:") {
            Some(group) if !group.is_empty() => Privilege::Group(group.to_string()),
            _ => {
                return Err(invalid(format!(
                    "privilege '{other}' must be none, root or group:<name>"
                )));
            }
        },
    };

    let mut steps = Vec::with_capacity(file.steps.len());
    for step in file.steps {
        let guard = match step.guard {
            None => GuardProbe::Never,
            Some(g) => convert_guard(&step.name, g).map_err(&invalid)?,
        };
        let readiness = step
            .ready
            .map(|r| convert_ready(&step.name, r))
            .transpose()
            .map_err(&invalid)?;
        let when = step
            .when
            .map(|choices| {
                choices
                    .iter()
                    .map(|c| c.parse::<TestDataChoice>())
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()
            .map_err(|e| invalid(format!("step '{}': {e}", step.name)))?;

        steps.push(ProvisioningStep {
            name: step.name,
            description: step.description,
            guard,
            actions: step.run.into_iter().map(PlanCommand::new).collect(),
            readiness,
            mutating: step.mutating,
            when,
            cwd: step.cwd,
            env: step.env,
        });
    }

    let plan = ProvisioningPlan {
        name: file.name,
        description: file.description,
        requires: file.requires,
        privilege,
        cleanup: file.cleanup.map(|c| CleanupAction {
            commands: c.run.into_iter().map(PlanCommand::new).collect(),
        }),
        steps,
    };
    plan.validate()?;
    Ok(plan)
}

fn convert_guard(step: &str, guard: GuardFile) -> Result<GuardProbe, String> {
    match (guard.path, guard.command) {
        (Some(path), None) => {
            if guard.stdout_nonempty || guard.stdout_contains.is_some() {
                return Err(format!(
                    "step '{step}': stdout options only apply to command guards"
                ));
            }
            Ok(GuardProbe::Path(path))
        }
        (None, Some(argv)) => {
            let mode = match (guard.stdout_nonempty, guard.stdout_contains) {
                (false, None) => ProbeMode::ExitZero,
                (true, None) => ProbeMode::StdoutNonEmpty,
                (false, Some(needle)) => ProbeMode::StdoutContains(needle),
                (true, Some(_)) => {
                    return Err(format!(
                        "step '{step}': set only one of stdout_nonempty and stdout_contains"
                    ));
                }
            };
            Ok(GuardProbe::Command {
                command: PlanCommand::new(argv),
                mode,
            })
        }
        _ => Err(format!(
            "step '{step}': a guard needs exactly one of path or command"
        )),
    }
}

fn convert_ready(step: &str, ready: ReadyFile) -> Result<Readiness, String> {
    let check = match (ready.command, ready.http, ready.tcp) {
        (Some(argv), None, None) => ReadinessCheck::Command(PlanCommand::new(argv)),
        (None, Some(url), None) => ReadinessCheck::Http {
            url,
            expect_status: ready.expect_status,
        },
        (None, None, Some(addr)) => {
            let (host, port) = addr
                .rsplit_once(':')
                .ok_or_else(|| format!("step '{step}': tcp check must be host:port"))?;
            let port = port
                .parse::<u16>()
                .map_err(|_| format!("step '{step}': invalid tcp port '{port}'"))?;
            ReadinessCheck::Tcp {
                host: host.to_string(),
                port,
            }
        }
        _ => {
            return Err(format!(
                "step '{step}': a readiness check needs exactly one of command, http or tcp"
            ));
        }
    };
    if ready.expect_status.is_some() && !matches!(check, ReadinessCheck::Http { .. }) {
        return Err(format!(
            "step '{step}': expect_status only applies to http checks"
        ));
    }
    Ok(Readiness {
        check,
        max_attempts: ready.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
        interval: Duration::from_secs(ready.interval_seconds.unwrap_or(DEFAULT_INTERVAL_SECS)),
    })
}
