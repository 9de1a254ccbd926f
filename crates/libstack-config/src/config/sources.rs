use std::collections::BTreeMap;

use super::{Config, ConfigSource};

impl Config {
    /// Run settings as key -> (value, source label), for display.
    #[must_use]
    pub fn effective_settings(&self) -> BTreeMap<String, (String, String)> {
        let label = |key: &str| {
            self.source_attribution
                .get(key)
                .copied()
                .unwrap_or(ConfigSource::Default)
                .to_string()
        };

        let mut settings = BTreeMap::new();
        settings.insert(
            "non_interactive".to_string(),
            (self.non_interactive.to_string(), label("non_interactive")),
        );
        settings.insert(
            "lock_ttl_seconds".to_string(),
            (self.lock_ttl_seconds.to_string(), label("lock_ttl_seconds")),
        );
        if let Some(path) = &self.config_path {
            settings.insert(
                "config_file".to_string(),
                (path.display().to_string(), ConfigSource::Config.to_string()),
            );
        }
        settings
    }
}
