//! Resolved run configuration
//!
//! A [`RunContext`] is built once by the resolver before the first step and
//! is read-only afterwards; steps receive it by reference.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Names every plan can reference as `${name}` without declaring them.
pub const BUILTIN_VARIABLES: &[&str] = &[
    "admin_email",
    "admin_password",
    "admin_first_name",
    "admin_last_name",
    "server_url",
    "ui_url",
    "site_name",
    "install_dir",
    "test_data",
];

/// Which test data the operator asked to import.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestDataChoice {
    /// Empty repository
    #[default]
    None,
    /// Sample content (the AIP demo data set)
    Sample,
    /// Configurable entities demo data set
    Entities,
}

impl TestDataChoice {
    pub const ALL: [TestDataChoice; 3] = [Self::None, Self::Sample, Self::Entities];

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Sample => "sample",
            Self::Entities => "entities",
        }
    }
}

impl fmt::Display for TestDataChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TestDataChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "no" | "" => Ok(Self::None),
            "sample" | "aip" => Ok(Self::Sample),
            "entities" | "configurable-entities" => Ok(Self::Entities),
            other => Err(format!(
                "unknown test data choice '{other}' (expected none, sample or entities)"
            )),
        }
    }
}

/// A string that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The underlying value. Only for handing to the command that needs it.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Configuration resolved once at start and passed by reference into every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub admin_email: String,
    pub admin_password: Secret,
    pub admin_first_name: String,
    pub admin_last_name: String,
    pub server_url: String,
    pub ui_url: String,
    pub site_name: String,
    pub install_dir: String,
    pub test_data: TestDataChoice,
    /// Extra variables from the config file's `[vars]` table
    pub vars: BTreeMap<String, String>,
}

impl RunContext {
    /// Value of a template variable: built-in options first, then `[vars]`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&str> {
        let builtin = match name {
            "admin_email" => Some(self.admin_email.as_str()),
            "admin_password" => Some(self.admin_password.expose()),
            "admin_first_name" => Some(self.admin_first_name.as_str()),
            "admin_last_name" => Some(self.admin_last_name.as_str()),
            "server_url" => Some(self.server_url.as_str()),
            "ui_url" => Some(self.ui_url.as_str()),
            "site_name" => Some(self.site_name.as_str()),
            "install_dir" => Some(self.install_dir.as_str()),
            "test_data" => Some(self.test_data.as_str()),
            _ => None,
        };
        builtin.or_else(|| self.vars.get(name).map(String::as_str))
    }

    /// Whether `name` can be resolved by [`lookup`](Self::lookup).
    #[must_use]
    pub fn knows(&self, name: &str) -> bool {
        BUILTIN_VARIABLES.contains(&name) || self.vars.contains_key(name)
    }
}
