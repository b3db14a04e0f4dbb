pub mod loader;
pub mod schema;
pub mod store;

pub use loader::{ConfigLoader, EnvOverrides};
pub use schema::Configuration;
pub use store::{ConfigStore, FileStore, MemoryStore};

use crate::error::Result;
use schema::{DEFAULT_COLLECTOR_URL, FALLBACK_INTERVAL_SECS, MAX_INTERVAL_SECS, MAX_RELOAD_SECS, MIN_INTERVAL_SECS};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// New values from the control panel's save action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsUpdate {
    /// 0 means "not given" and falls back to the default interval.
    pub interval_secs: u64,
    pub reload_secs: u64,
    /// Blank means the default collector.
    pub collector_url: String,
}

/// The live configuration, read at the start of every cycle and timer
/// restart. Only `apply` changes it, and it persists what it applies.
pub struct Settings {
    store: Arc<dyn ConfigStore>,
    current: RwLock<Configuration>,
}

impl Settings {
    pub fn load(store: Arc<dyn ConfigStore>) -> Self {
        let current = ConfigLoader::load(store.as_ref());
        Self {
            store,
            current: RwLock::new(current),
        }
    }

    pub fn snapshot(&self) -> Configuration {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn collector_url(&self) -> String {
        self.snapshot().collector_url
    }

    pub fn interval(&self, key: &str) -> Duration {
        self.snapshot().interval(key)
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.snapshot().is_enabled(key)
    }

    pub fn reload_after(&self, key: &str) -> Option<Duration> {
        self.snapshot().reload_after(key)
    }

    /// Session-only overrides (environment); not persisted.
    pub fn apply_overrides(&self, overrides: &EnvOverrides) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        overrides.apply(&mut current);
    }

    /// Sanitises the update for `source_key`, validates, persists, and only
    /// then makes it live.
    pub fn apply(&self, source_key: &str, update: &SettingsUpdate) -> Result<Configuration> {
        let mut next = self.snapshot();

        let interval = match update.interval_secs {
            0 => FALLBACK_INTERVAL_SECS,
            secs => secs.clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS),
        };
        next.intervals.insert(source_key.to_string(), interval);
        next.reload_seconds
            .insert(source_key.to_string(), update.reload_secs.min(MAX_RELOAD_SECS));
        next.collector_url = match update.collector_url.trim() {
            "" => DEFAULT_COLLECTOR_URL.to_string(),
            url => url.trim_end_matches('/').to_string(),
        };

        ConfigLoader::save(self.store.as_ref(), &next)?;
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = next.clone();
        Ok(next)
    }
}
