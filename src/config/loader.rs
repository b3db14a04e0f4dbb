use crate::config::schema::Configuration;
use crate::config::store::ConfigStore;
use crate::error::{Error, Result};
use serde::Deserialize;
use validator::Validate;

/// Key under which the configuration document lives in the store.
pub const CONFIG_KEY: &str = "quota_monitor_config";

const ENV_PREFIX: &str = "QUOTA_MONITOR";

pub struct ConfigLoader;

/// Values taken from `QUOTA_MONITOR_*` environment variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvOverrides {
    #[serde(default)]
    pub collector_url: Option<String>,
}

impl EnvOverrides {
    pub fn apply(&self, config: &mut Configuration) {
        if let Some(url) = self.collector_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            config.collector_url = url.to_string();
        }
    }
}

impl ConfigLoader {
    /// Reads the stored configuration. A missing or unreadable document
    /// yields defaults; every source is always backfilled.
    pub fn load(store: &dyn ConfigStore) -> Configuration {
        let Some(raw) = store.get(CONFIG_KEY) else {
            return Configuration::default();
        };

        match serde_json::from_str::<Configuration>(&raw) {
            Ok(mut config) => {
                config.backfill();
                config
            }
            Err(e) => {
                log::warn!("Stored configuration is unreadable, using defaults: {}", e);
                Configuration::default()
            }
        }
    }

    pub fn save(store: &dyn ConfigStore, config: &Configuration) -> Result<()> {
        config.validate()?;
        let raw = serde_json::to_string(config)?;
        store.set(CONFIG_KEY, &raw)
    }

    pub fn env_overrides() -> Result<EnvOverrides> {
        ::config::Config::builder()
            .add_source(::config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .and_then(|c| c.try_deserialize::<EnvOverrides>())
            .map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::store::MemoryStore;
    use crate::source::SOURCES;

    #[test]
    fn empty_store_loads_complete_defaults() {
        let store = MemoryStore::new();
        let config = ConfigLoader::load(&store);
        for source in &SOURCES {
            assert!(config.intervals.contains_key(source.key));
            assert!(config.enabled.contains_key(source.key));
            assert!(config.reload_seconds.contains_key(source.key));
        }
    }

    #[test]
    fn partial_stored_document_is_backfilled() {
        let store = MemoryStore::new();
        store
            .set(CONFIG_KEY, r#"{"collector_url":"http://127.0.0.1:9999","enabled":{"github_copilot":false}}"#)
            .unwrap();
        let config = ConfigLoader::load(&store);
        assert_eq!(config.collector_url, "http://127.0.0.1:9999");
        assert!(!config.is_enabled("github_copilot"));
        assert!(config.is_enabled("claude_usage"));
        assert_eq!(config.intervals.len(), SOURCES.len());
    }

    #[test]
    fn malformed_document_falls_back_to_defaults() {
        let store = MemoryStore::new();
        store.set(CONFIG_KEY, "{{{").unwrap();
        assert_eq!(ConfigLoader::load(&store), Configuration::default());
    }

    #[test]
    fn save_validates_before_writing() {
        let store = MemoryStore::new();
        let mut config = Configuration::default();
        config.collector_url = "nope".into();
        assert!(matches!(ConfigLoader::save(&store, &config), Err(Error::Validation(_))));
        assert!(store.get(CONFIG_KEY).is_none());

        config.collector_url = "http://localhost:8000".into();
        ConfigLoader::save(&store, &config).unwrap();
        assert_eq!(ConfigLoader::load(&store), config);
    }

    #[test]
    fn env_override_replaces_collector_url() {
        let mut config = Configuration::default();
        EnvOverrides { collector_url: Some("  ".into()) }.apply(&mut config);
        assert_eq!(config.collector_url, crate::config::schema::DEFAULT_COLLECTOR_URL);
        EnvOverrides { collector_url: Some("http://10.0.0.2:7890".into()) }.apply(&mut config);
        assert_eq!(config.collector_url, "http://10.0.0.2:7890");
    }
}
