use crate::error::{Error, Result};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Persistent key-value storage for agent settings.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn get_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn set(&self, key: &str, value: &str) -> Result<()>;
}

#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConfigStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreFormat {
    Json,
    Yaml,
    Toml,
}

impl StoreFormat {
    fn for_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(StoreFormat::Json),
            Some("yaml") | Some("yml") => Ok(StoreFormat::Yaml),
            Some("toml") => Ok(StoreFormat::Toml),
            _ => Err(Error::Config(format!(
                "Unsupported file extension: {}",
                path.display()
            ))),
        }
    }

    fn parse(&self, content: &str) -> Result<BTreeMap<String, String>> {
        let values = match self {
            StoreFormat::Json => serde_json::from_str(content)?,
            StoreFormat::Yaml => serde_yaml::from_str(content)?,
            StoreFormat::Toml => toml::from_str(content)?,
        };
        Ok(values)
    }

    fn render(&self, values: &BTreeMap<String, String>) -> Result<String> {
        let content = match self {
            StoreFormat::Json => serde_json::to_string_pretty(values)?,
            StoreFormat::Yaml => serde_yaml::to_string(values)?,
            StoreFormat::Toml => toml::to_string(values)?,
        };
        Ok(content)
    }
}

/// A store persisted as a flat map in a JSON, YAML or TOML file; the format
/// follows the file extension. Every `set` writes the file through.
pub struct FileStore {
    path: PathBuf,
    format: StoreFormat,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let format = StoreFormat::for_path(&path)?;

        let values = match fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => format
                .parse(&content)
                .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(Error::Config(format!("{}: {}", path.display(), e))),
        };

        Ok(Self {
            path,
            format,
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        next.insert(key.to_string(), value.to_string());
        let content = self.format.render(&next)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, content)?;
        *values = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_defaults() {
        let store = MemoryStore::new();
        assert_eq!(store.get_or("missing", "fallback"), "fallback");
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("v"));
    }

    #[test]
    fn file_store_round_trips_each_format() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["store.json", "store.yaml", "store.toml"] {
            let path = dir.path().join(name);
            let store = FileStore::open(&path).unwrap();
            assert!(store.get("config").is_none());
            store.set("config", r#"{"collector_url":"http://127.0.0.1:9000"}"#).unwrap();

            let reopened = FileStore::open(&path).unwrap();
            assert_eq!(
                reopened.get("config").as_deref(),
                Some(r#"{"collector_url":"http://127.0.0.1:9000"}"#),
                "{}",
                name
            );
        }
    }

    #[test]
    fn failed_write_leaves_the_store_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path).unwrap();
        store.set("config", "first").unwrap();

        // a directory where the file should be makes the write fail
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();
        assert!(store.set("config", "second").is_err());
        assert_eq!(store.get("config").as_deref(), Some("first"));
    }

    #[test]
    fn unsupported_extension_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileStore::open(dir.path().join("store.ini"));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn corrupt_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::Config(_))));
    }
}
