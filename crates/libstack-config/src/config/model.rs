use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use super::ConfigSource;

/// Default age after which an abandoned run lock is reclaimed (in seconds)
pub const DEFAULT_LOCK_TTL_SECS: u64 = 3600;

/// Operator option values as they appear in `[options]` or on the command line.
///
/// Every field is optional; the resolver fills gaps from prompts or defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OptionValues {
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_first_name: Option<String>,
    pub admin_last_name: Option<String>,
    pub server_url: Option<String>,
    pub ui_url: Option<String>,
    pub site_name: Option<String>,
    pub install_dir: Option<String>,
    pub test_data: Option<String>,
}

impl OptionValues {
    /// Value for an option key, if set.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "admin_email" => self.admin_email.as_deref(),
            "admin_password" => self.admin_password.as_deref(),
            "admin_first_name" => self.admin_first_name.as_deref(),
            "admin_last_name" => self.admin_last_name.as_deref(),
            "server_url" => self.server_url.as_deref(),
            "ui_url" => self.ui_url.as_deref(),
            "site_name" => self.site_name.as_deref(),
            "install_dir" => self.install_dir.as_deref(),
            "test_data" => self.test_data.as_deref(),
            _ => None,
        }
    }
}

/// `[run]` section of the config file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RunSettings {
    /// Never prompt; take defaults for unset options
    pub non_interactive: Option<bool>,
    /// Age in seconds after which an abandoned run lock is reclaimed
    pub lock_ttl_seconds: Option<u64>,
}

/// Command-line overrides, highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Explicit config file (`--config`); disables discovery
    pub config_path: Option<PathBuf>,
    /// `--non-interactive`
    pub non_interactive: bool,
    /// Option flags (`--admin-email` and friends)
    pub options: OptionValues,
}

/// Effective configuration after discovery: CLI > file > defaults.
///
/// Operator options are kept per source here; turning them into a
/// [`RunContext`](crate::RunContext) is the resolver's job, because prompts
/// sit between the file and the defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Option values from the command line
    pub cli_options: OptionValues,
    /// Option values from the config file's `[options]` table
    pub file_options: OptionValues,
    /// Extra template variables from `[vars]`
    pub vars: BTreeMap<String, String>,
    /// Never prompt
    pub non_interactive: bool,
    /// Stale lock threshold
    pub lock_ttl_seconds: u64,
    /// Config file that was loaded, if any
    pub config_path: Option<PathBuf>,
    /// Where each run setting came from
    pub source_attribution: HashMap<String, ConfigSource>,
}
