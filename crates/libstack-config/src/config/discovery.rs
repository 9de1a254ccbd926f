use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use libstack_utils::error::ConfigError;
use libstack_utils::paths;

use super::{CliArgs, Config, ConfigSource, DEFAULT_LOCK_TTL_SECS, OptionValues, RunSettings};

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    options: Option<OptionValues>,
    vars: Option<BTreeMap<String, String>>,
    run: Option<RunSettings>,
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults
    ///
    /// Uses the current working directory for config file discovery when no
    /// explicit path is provided in `cli_args`.
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = std::env::current_dir().map_err(|e| {
            ConfigError::InvalidFile(format!("Failed to get current directory: {e}"))
        })?;
        Self::discover_from(&start_dir, cli_args)
    }

    /// Discover and load configuration starting from a specific directory
    ///
    /// This is the path-driven variant used by tests to avoid process-global state.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut source_attribution = HashMap::new();
        source_attribution.insert("non_interactive".to_string(), ConfigSource::Default);
        source_attribution.insert("lock_ttl_seconds".to_string(), ConfigSource::Default);

        let config_path = match &cli_args.config_path {
            Some(explicit) => {
                if !explicit.is_file() {
                    return Err(ConfigError::NotFound {
                        path: explicit.display().to_string(),
                    });
                }
                Some(explicit.clone())
            }
            None => Self::discover_config_file_from(start_dir),
        };

        let file_config = match &config_path {
            Some(path) => Self::load_config_file(path)?,
            None => TomlConfig::default(),
        };

        let file_options = file_config.options.unwrap_or_default();
        let vars = file_config.vars.unwrap_or_default();
        let run = file_config.run.unwrap_or_default();

        let mut non_interactive = false;
        if let Some(value) = run.non_interactive {
            non_interactive = value;
            source_attribution.insert("non_interactive".to_string(), ConfigSource::Config);
        }
        if cli_args.non_interactive {
            non_interactive = true;
            source_attribution.insert("non_interactive".to_string(), ConfigSource::Cli);
        }

        let mut lock_ttl_seconds = DEFAULT_LOCK_TTL_SECS;
        if let Some(ttl) = run.lock_ttl_seconds {
            lock_ttl_seconds = ttl;
            source_attribution.insert("lock_ttl_seconds".to_string(), ConfigSource::Config);
        }

        let config = Self {
            cli_options: cli_args.options.clone(),
            file_options,
            vars,
            non_interactive,
            lock_ttl_seconds,
            config_path,
            source_attribution,
        };
        config.validate()?;
        Ok(config)
    }

    /// Search upward from `start_dir` for `.libstack/config.toml`.
    ///
    /// The search stops at a repository root (`.git`, `.hg`, `.svn`). When
    /// nothing is found, `<LIBSTACK_HOME>/config.toml` is used if it exists.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current = Some(start_dir);

        while let Some(dir) = current {
            let candidate = dir.join(".libstack").join("config.toml");
            if candidate.is_file() {
                return Some(candidate);
            }
            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }
            current = dir.parent();
        }

        let home_config = paths::libstack_home().join("config.toml");
        home_config
            .is_file()
            .then(|| home_config.into_std_path_buf())
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::InvalidFile(format!("Failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }
}
