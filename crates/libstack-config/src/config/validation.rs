use libstack_utils::error::ConfigError;

use super::Config;
use crate::context::BUILTIN_VARIABLES;

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl Config {
    /// Validate settings that do not depend on the operator's answers.
    ///
    /// Option values (emails, URLs, test-data choice) are validated by the
    /// resolver, since interactive runs re-prompt instead of failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.lock_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                key: "run.lock_ttl_seconds".to_string(),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        for name in self.vars.keys() {
            if !is_identifier(name) {
                return Err(ConfigError::InvalidValue {
                    key: format!("vars.{name}"),
                    value: name.clone(),
                    reason: "variable names must be letters, digits and underscores".to_string(),
                });
            }
            if BUILTIN_VARIABLES.contains(&name.as_str()) {
                return Err(ConfigError::InvalidValue {
                    key: format!("vars.{name}"),
                    value: name.clone(),
                    reason: "shadows a built-in option; set it under [options] instead"
                        .to_string(),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_rules() {
        assert!(is_identifier("db_port"));
        assert!(is_identifier("_x1"));
        assert!(!is_identifier("1abc"));
        assert!(!is_identifier("solr-url"));
        assert!(!is_identifier(""));
    }
}
