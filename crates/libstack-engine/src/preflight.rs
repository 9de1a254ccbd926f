//! Preflight checks
//!
//! Run once before the sequencer starts: required tools on PATH, the plan's
//! privilege and a writable state directory. A failed check is reported with
//! a remediation; libstack never tries to elevate itself.

use camino::Utf8Path;

use libstack_utils::error::LibstackError;
use libstack_utils::types::{CheckStatus, DoctorCheck, DoctorOutput};

use crate::plan::{Privilege, ProvisioningPlan};

/// Checks for one plan, or for the environment alone when `plan` is `None`.
pub struct Preflight<'a> {
    plan: Option<&'a ProvisioningPlan>,
    state_dir: &'a Utf8Path,
}

impl<'a> Preflight<'a> {
    #[must_use]
    pub fn new(plan: Option<&'a ProvisioningPlan>, state_dir: &'a Utf8Path) -> Self {
        Self { plan, state_dir }
    }

    /// Run every check. Checks are sorted by name for stable output.
    #[must_use]
    pub fn run(&self) -> DoctorOutput {
        let mut checks = vec![check_state_dir(self.state_dir)];
        if let Some(plan) = self.plan {
            checks.extend(plan.requires.iter().map(|tool| check_tool(tool)));
            checks.push(check_privilege(&plan.privilege));
        }
        checks.sort_by(|a, b| a.name.cmp(&b.name));
        DoctorOutput::new(self.plan.map(|p| p.name.clone()), checks)
    }

    /// Fail fast on the first failed check.
    pub fn ensure(&self) -> Result<DoctorOutput, LibstackError> {
        let output = self.run();
        if let Some(failed) = output
            .checks
            .iter()
            .find(|c| c.status == CheckStatus::Fail)
        {
            return Err(LibstackError::Precondition {
                check: failed.name.clone(),
                details: failed.details.clone(),
                remediation: failed
                    .remediation
                    .clone()
                    .unwrap_or_else(|| "Fix the failing check and run again.".to_string()),
            });
        }
        Ok(output)
    }
}

fn check_tool(tool: &str) -> DoctorCheck {
    let name = format!("tool:{tool}");
    match which::which(tool) {
        Ok(path) => DoctorCheck::pass(name, format!("Found {tool} at {}", path.display())),
        Err(_) => DoctorCheck::fail(
            name,
            format!("{tool} not found in PATH"),
            format!("Install {tool} or add its directory to PATH."),
        ),
    }
}

fn check_state_dir(dir: &Utf8Path) -> DoctorCheck {
    const NAME: &str = "state_dir";
    if let Err(e) = std::fs::create_dir_all(dir) {
        return DoctorCheck::fail(
            NAME,
            format!("Cannot create {dir}: {e}"),
            "Set LIBSTACK_HOME to a writable directory.",
        );
    }
    match tempfile::NamedTempFile::new_in(dir) {
        Ok(_) => DoctorCheck::pass(NAME, format!("{dir} is writable")),
        Err(e) => DoctorCheck::fail(
            NAME,
            format!("{dir} is not writable: {e}"),
            "Set LIBSTACK_HOME to a writable directory.",
        ),
    }
}

fn check_privilege(privilege: &Privilege) -> DoctorCheck {
    const NAME: &str = "privilege";
    match privilege {
        Privilege::None => DoctorCheck::pass(NAME, "No special privilege required"),
        Privilege::Root => {
            if sys::is_root() {
                DoctorCheck::pass(NAME, "Running as root")
            } else {
                DoctorCheck::fail(
                    NAME,
                    "This plan must run as root",
                    "Re-run with sudo.",
                )
            }
        }
        Privilege::Group(group) => match sys::in_group(group) {
            Ok(true) => DoctorCheck::pass(NAME, format!("Member of group {group}")),
            Ok(false) => DoctorCheck::fail(
                NAME,
                format!("Current user is not in group {group}"),
                format!(
                    "Add the user with `sudo usermod -aG {group} $USER`, then log out and back in (or run `newgrp {group}`)."
                ),
            ),
            Err(reason) => DoctorCheck::warn(
                NAME,
                format!("Could not verify membership of group {group}: {reason}"),
                "Check group membership manually with `id`.",
            ),
        },
    }
}

#[cfg(unix)]
mod sys {
    use nix::unistd::{Group, getegid, geteuid, getgroups};

    pub fn is_root() -> bool {
        geteuid().is_root()
    }

    pub fn in_group(name: &str) -> Result<bool, String> {
        if is_root() {
            return Ok(true);
        }
        let group = Group::from_name(name)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("group {name} does not exist"))?;
        if getegid() == group.gid {
            return Ok(true);
        }
        let groups = getgroups().map_err(|e| e.to_string())?;
        Ok(groups.contains(&group.gid))
    }
}

#[cfg(not(unix))]
mod sys {
    pub fn is_root() -> bool {
        false
    }

    pub fn in_group(_name: &str) -> Result<bool, String> {
        Err("group checks are only supported on Unix".to_string())
    }
}
