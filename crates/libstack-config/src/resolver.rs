//! Interactive option resolver
//!
//! Turns the per-source option values in [`Config`] into a fully populated
//! [`RunContext`]. Precedence for every field: CLI flag, then the config
//! file's `[options]`, then an interactive prompt (interactive runs only),
//! then the built-in default.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use libstack_utils::error::ConfigError;
use libstack_utils::redaction::{REDACTED, register_secret};

use crate::config::{Config, ConfigSource};
use crate::context::{RunContext, Secret, TestDataChoice};
use crate::prompt::Prompter;

/// Placeholder admin password used when nothing else is supplied.
pub const PLACEHOLDER_PASSWORD: &str = "admin";

/// Passwords shorter than this produce a warning.
pub const MIN_PASSWORD_LEN: usize = 8;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^https?://[A-Za-z0-9.\-\[\]:]+(:[0-9]{1,5})?(/\S*)?$").expect("valid url regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Email,
    Name,
    Url,
    Password,
    Directory,
    TestData,
}

struct Field {
    key: &'static str,
    label: &'static str,
    default: &'static str,
    kind: Kind,
}

/// Resolution order. Also the order prompts are shown in.
const FIELDS: &[Field] = &[
    Field {
        key: "admin_email",
        label: "Administrator email",
        default: "admin@example.org",
        kind: Kind::Email,
    },
    Field {
        key: "admin_first_name",
        label: "Administrator first name",
        default: "Admin",
        kind: Kind::Name,
    },
    Field {
        key: "admin_last_name",
        label: "Administrator last name",
        default: "User",
        kind: Kind::Name,
    },
    Field {
        key: "admin_password",
        label: "Administrator password",
        default: PLACEHOLDER_PASSWORD,
        kind: Kind::Password,
    },
    Field {
        key: "site_name",
        label: "Site name",
        default: "Library Stack",
        kind: Kind::Name,
    },
    Field {
        key: "server_url",
        label: "Backend (server) URL",
        default: "http://localhost:8080/server",
        kind: Kind::Url,
    },
    Field {
        key: "ui_url",
        label: "Frontend (UI) URL",
        default: "http://localhost:4000",
        kind: Kind::Url,
    },
    Field {
        key: "install_dir",
        label: "Installation directory",
        default: "/opt/libstack",
        kind: Kind::Directory,
    },
    Field {
        key: "test_data",
        label: "Test data to import",
        default: "none",
        kind: Kind::TestData,
    },
];

/// Built-in default for an option key.
#[must_use]
pub fn default_for(key: &str) -> Option<&'static str> {
    FIELDS.iter().find(|f| f.key == key).map(|f| f.default)
}

fn validate(kind: Kind, raw: &str) -> Result<String, String> {
    let value = if kind == Kind::Password {
        raw.to_string()
    } else {
        raw.trim().to_string()
    };
    match kind {
        Kind::Email if !EMAIL_RE.is_match(&value) => {
            Err("expected an email address like name@example.org".to_string())
        }
        Kind::Url if !URL_RE.is_match(&value) => {
            Err("expected an http:// or https:// URL with a host".to_string())
        }
        Kind::Name if value.is_empty() => Err("must not be empty".to_string()),
        Kind::Directory if !value.starts_with('/') => {
            Err("must be an absolute path".to_string())
        }
        Kind::TestData => value
            .parse::<TestDataChoice>()
            .map(|choice| choice.as_str().to_string()),
        _ => Ok(value),
    }
}

/// One resolved option and where its value came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOption {
    pub key: String,
    /// Display value; the password is always masked
    pub value: String,
    pub source: ConfigSource,
}

/// Output of [`OptionResolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    pub context: RunContext,
    /// Per-option attribution, in resolution order
    pub sources: Vec<ResolvedOption>,
    /// Policy warnings (weak password and similar); never fatal
    pub warnings: Vec<String>,
}

impl Resolution {
    #[must_use]
    pub fn source_of(&self, key: &str) -> Option<ConfigSource> {
        self.sources.iter().find(|o| o.key == key).map(|o| o.source)
    }
}

/// Resolves operator options before provisioning starts.
pub struct OptionResolver<'a> {
    config: &'a Config,
}

impl<'a> OptionResolver<'a> {
    #[must_use]
    pub fn new(config: &'a Config) -> Self {
        Self { config }
    }

    fn interactive(&self) -> bool {
        !self.config.non_interactive
    }

    /// Resolve every option into a [`RunContext`].
    ///
    /// Non-interactive runs never touch `prompter`; a malformed supplied
    /// value is a [`ConfigError::InvalidValue`]. Interactive runs warn and
    /// ask again until the answer is valid.
    pub fn resolve(&self, prompter: &dyn Prompter) -> Result<Resolution, ConfigError> {
        let mut sources = Vec::with_capacity(FIELDS.len());
        let mut values = Vec::with_capacity(FIELDS.len());

        for field in FIELDS {
            let (value, source) = self.resolve_field(field, prompter)?;
            debug!(key = field.key, source = %source, "Resolved option");
            sources.push(ResolvedOption {
                key: field.key.to_string(),
                value: if field.kind == Kind::Password {
                    REDACTED.to_string()
                } else {
                    value.clone()
                },
                source,
            });
            values.push(value);
        }

        let get = |key: &str| -> String {
            FIELDS
                .iter()
                .position(|f| f.key == key)
                .map(|i| values[i].clone())
                .unwrap_or_default()
        };

        let password = get("admin_password");
        let warnings = password_warnings(&password);
        for warning in &warnings {
            warn!("{warning}");
        }
        if password != PLACEHOLDER_PASSWORD {
            register_secret(&password);
        }

        let test_data = get("test_data")
            .parse::<TestDataChoice>()
            .map_err(|reason| ConfigError::InvalidValue {
                key: "test_data".to_string(),
                value: get("test_data"),
                reason,
            })?;

        let context = RunContext {
            admin_email: get("admin_email"),
            admin_password: Secret::new(password),
            admin_first_name: get("admin_first_name"),
            admin_last_name: get("admin_last_name"),
            server_url: get("server_url"),
            ui_url: get("ui_url"),
            site_name: get("site_name"),
            install_dir: get("install_dir"),
            test_data,
            vars: self.config.vars.clone(),
        };

        Ok(Resolution {
            context,
            sources,
            warnings,
        })
    }

    fn resolve_field(
        &self,
        field: &Field,
        prompter: &dyn Prompter,
    ) -> Result<(String, ConfigSource), ConfigError> {
        let supplied = self
            .config
            .cli_options
            .get(field.key)
            .map(|v| (v, ConfigSource::Cli))
            .or_else(|| {
                self.config
                    .file_options
                    .get(field.key)
                    .map(|v| (v, ConfigSource::Config))
            });

        if let Some((raw, source)) = supplied {
            match validate(field.kind, raw) {
                Ok(value) => return Ok((value, source)),
                Err(reason) if self.interactive() => {
                    prompter.warn(&format!(
                        "{} from {source} is not valid ({reason}); please enter it again",
                        field.key
                    ));
                }
                Err(reason) => {
                    return Err(ConfigError::InvalidValue {
                        key: field.key.to_string(),
                        value: if field.kind == Kind::Password {
                            REDACTED.to_string()
                        } else {
                            raw.to_string()
                        },
                        reason,
                    });
                }
            }
        }

        if !self.interactive() {
            return Ok((field.default.to_string(), ConfigSource::Default));
        }

        loop {
            let answer = match field.kind {
                Kind::Password => {
                    let answer = prompter.password(field.key, field.label)?;
                    if answer.is_empty() {
                        return Ok((field.default.to_string(), ConfigSource::Default));
                    }
                    answer
                }
                Kind::TestData => {
                    let items: Vec<&str> =
                        TestDataChoice::ALL.iter().map(TestDataChoice::as_str).collect();
                    let default = items.iter().position(|i| *i == field.default).unwrap_or(0);
                    let index = prompter.select(field.key, field.label, &items, default)?;
                    items.get(index).copied().unwrap_or(field.default).to_string()
                }
                _ => prompter.input(field.key, field.label, field.default)?,
            };

            match validate(field.kind, &answer) {
                Ok(value) => return Ok((value, ConfigSource::Prompt)),
                Err(reason) => prompter.warn(&format!("{}: {reason}", field.label)),
            }
        }
    }
}

/// Weak-password policy: warn, never reject.
#[must_use]
pub fn password_warnings(password: &str) -> Vec<String> {
    if password == PLACEHOLDER_PASSWORD {
        vec![format!(
            "The administrator password is the built-in placeholder '{PLACEHOLDER_PASSWORD}'; change it after the first login"
        )]
    } else if password.chars().count() < MIN_PASSWORD_LEN {
        vec![format!(
            "The administrator password is shorter than {MIN_PASSWORD_LEN} characters"
        )]
    } else {
        Vec::new()
    }
}
