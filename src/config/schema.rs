use crate::source::{self, SOURCES};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use validator::{Validate, ValidationError};

pub const DEFAULT_COLLECTOR_URL: &str = "http://localhost:7890";
pub const FALLBACK_INTERVAL_SECS: u64 = 60;
pub const MIN_INTERVAL_SECS: u64 = 10;
pub const MAX_INTERVAL_SECS: u64 = 3600;
pub const MAX_RELOAD_SECS: u64 = 600;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Configuration {
    #[serde(default = "default_collector_url")]
    #[validate(url)]
    pub collector_url: String,

    /// Seconds between periodic extractions, per source key.
    #[serde(default)]
    #[validate(custom = "validate_intervals")]
    pub intervals: BTreeMap<String, u64>,

    #[serde(default)]
    pub enabled: BTreeMap<String, bool>,

    /// Seconds until a whole-document reload; 0 disables it.
    #[serde(default)]
    #[validate(custom = "validate_reloads")]
    pub reload_seconds: BTreeMap<String, u64>,
}

impl Default for Configuration {
    fn default() -> Self {
        let mut config = Self {
            collector_url: default_collector_url(),
            intervals: BTreeMap::new(),
            enabled: BTreeMap::new(),
            reload_seconds: BTreeMap::new(),
        };
        config.backfill();
        config
    }
}

impl Configuration {
    /// Gives every known source an entry in every per-source map.
    pub fn backfill(&mut self) {
        for source in &SOURCES {
            self.intervals
                .entry(source.key.to_string())
                .or_insert(source.default_interval_secs);
            self.enabled.entry(source.key.to_string()).or_insert(true);
            self.reload_seconds.entry(source.key.to_string()).or_insert(0);
        }
        if self.collector_url.trim().is_empty() {
            self.collector_url = default_collector_url();
        }
    }

    pub fn interval(&self, key: &str) -> Duration {
        let secs = self
            .intervals
            .get(key)
            .copied()
            .or_else(|| source::by_key(key).map(|s| s.default_interval_secs))
            .unwrap_or(FALLBACK_INTERVAL_SECS);
        Duration::from_secs(secs.max(1))
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.enabled.get(key).copied().unwrap_or(true)
    }

    pub fn reload_after(&self, key: &str) -> Option<Duration> {
        match self.reload_seconds.get(key).copied().unwrap_or(0) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

fn default_collector_url() -> String {
    DEFAULT_COLLECTOR_URL.to_string()
}

fn validate_intervals(intervals: &BTreeMap<String, u64>) -> Result<(), ValidationError> {
    if intervals
        .values()
        .all(|secs| (MIN_INTERVAL_SECS..=MAX_INTERVAL_SECS).contains(secs))
    {
        Ok(())
    } else {
        Err(ValidationError::new("interval_out_of_range"))
    }
}

fn validate_reloads(reloads: &BTreeMap<String, u64>) -> Result<(), ValidationError> {
    if reloads.values().all(|secs| *secs <= MAX_RELOAD_SECS) {
        Ok(())
    } else {
        Err(ValidationError::new("reload_out_of_range"))
    }
}
