//! Operator prompts
//!
//! The resolver talks to a [`Prompter`] rather than the terminal so option
//! resolution can be driven from tests with scripted answers.

use dialoguer::theme::ColorfulTheme;
use dialoguer::{Input, Password, Select};

use libstack_utils::error::ConfigError;

/// Source of interactive answers.
pub trait Prompter {
    /// Ask for free text; an empty answer returns `default`.
    fn input(&self, key: &str, label: &str, default: &str) -> Result<String, ConfigError>;

    /// Ask for a secret without echo. May return an empty string.
    fn password(&self, key: &str, label: &str) -> Result<String, ConfigError>;

    /// Pick one of `items`; returns the chosen index.
    fn select(
        &self,
        key: &str,
        label: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ConfigError>;

    /// Tell the operator something went wrong with their last answer.
    fn warn(&self, message: &str);
}

impl<P: Prompter + ?Sized> Prompter for &P {
    fn input(&self, key: &str, label: &str, default: &str) -> Result<String, ConfigError> {
        (**self).input(key, label, default)
    }

    fn password(&self, key: &str, label: &str) -> Result<String, ConfigError> {
        (**self).password(key, label)
    }

    fn select(
        &self,
        key: &str,
        label: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ConfigError> {
        (**self).select(key, label, items, default)
    }

    fn warn(&self, message: &str) {
        (**self).warn(message);
    }
}

/// Terminal prompts via `dialoguer`.
pub struct TerminalPrompter {
    theme: ColorfulTheme,
}

impl std::fmt::Debug for TerminalPrompter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPrompter")
            .field("theme", &"ColorfulTheme")
            .finish()
    }
}

impl Default for TerminalPrompter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalPrompter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            theme: ColorfulTheme::default(),
        }
    }
}

fn prompt_error(key: &str, err: dialoguer::Error) -> ConfigError {
    ConfigError::Prompt {
        key: key.to_string(),
        reason: err.to_string(),
    }
}

impl Prompter for TerminalPrompter {
    fn input(&self, key: &str, label: &str, default: &str) -> Result<String, ConfigError> {
        Input::<String>::with_theme(&self.theme)
            .with_prompt(label)
            .default(default.to_string())
            .interact_text()
            .map_err(|e| prompt_error(key, e))
    }

    fn password(&self, key: &str, label: &str) -> Result<String, ConfigError> {
        Password::with_theme(&self.theme)
            .with_prompt(label)
            .allow_empty_password(true)
            .interact()
            .map_err(|e| prompt_error(key, e))
    }

    fn select(
        &self,
        key: &str,
        label: &str,
        items: &[&str],
        default: usize,
    ) -> Result<usize, ConfigError> {
        Select::with_theme(&self.theme)
            .with_prompt(label)
            .items(items)
            .default(default)
            .interact()
            .map_err(|e| prompt_error(key, e))
    }

    fn warn(&self, message: &str) {
        eprintln!("  {message}");
    }
}

#[cfg(any(test, feature = "test-utils"))]
pub use scripted::ScriptedPrompter;

#[cfg(any(test, feature = "test-utils"))]
mod scripted {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};

    use super::Prompter;
    use libstack_utils::error::ConfigError;

    /// Prompter that answers from a script, keyed by option name.
    ///
    /// An empty scripted answer means "accept the default". Asking for a key
    /// with no answers left is an error, so a resolver loop that never
    /// accepts an answer terminates.
    #[derive(Debug, Default)]
    pub struct ScriptedPrompter {
        answers: RefCell<HashMap<String, VecDeque<String>>>,
        asked: RefCell<Vec<String>>,
        warnings: RefCell<Vec<String>>,
    }

    impl ScriptedPrompter {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue an answer for `key`. For selects, answer with the item text.
        #[must_use]
        pub fn answer(self, key: &str, value: &str) -> Self {
            self.answers
                .borrow_mut()
                .entry(key.to_string())
                .or_default()
                .push_back(value.to_string());
            self
        }

        /// Keys asked so far, in order (repeated on re-prompts).
        #[must_use]
        pub fn asked(&self) -> Vec<String> {
            self.asked.borrow().clone()
        }

        #[must_use]
        pub fn warnings(&self) -> Vec<String> {
            self.warnings.borrow().clone()
        }

        fn next(&self, key: &str) -> Result<String, ConfigError> {
            self.asked.borrow_mut().push(key.to_string());
            self.answers
                .borrow_mut()
                .get_mut(key)
                .and_then(VecDeque::pop_front)
                .ok_or_else(|| ConfigError::Prompt {
                    key: key.to_string(),
                    reason: "no scripted answer left".to_string(),
                })
        }
    }

    impl Prompter for ScriptedPrompter {
        fn input(&self, key: &str, _label: &str, default: &str) -> Result<String, ConfigError> {
            let answer = self.next(key)?;
            Ok(if answer.is_empty() {
                default.to_string()
            } else {
                answer
            })
        }

        fn password(&self, key: &str, _label: &str) -> Result<String, ConfigError> {
            self.next(key)
        }

        fn select(
            &self,
            key: &str,
            _label: &str,
            items: &[&str],
            default: usize,
        ) -> Result<usize, ConfigError> {
            let answer = self.next(key)?;
            if answer.is_empty() {
                return Ok(default);
            }
            items
                .iter()
                .position(|item| *item == answer)
                .ok_or_else(|| ConfigError::Prompt {
                    key: key.to_string(),
                    reason: format!("'{answer}' is not one of {items:?}"),
                })
        }

        fn warn(&self, message: &str) {
            self.warnings.borrow_mut().push(message.to_string());
        }
    }
}
