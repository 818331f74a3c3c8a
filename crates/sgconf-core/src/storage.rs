//! Key-value persistence for the config

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info, warn};

use crate::clean::clean_config;
use crate::error::{ConfigError, ConfigResult};
use crate::model::Config;

/// Storage key the config lives under
pub const CONFIG_KEY: &str = "secretgraphConfig";

/// String key-value store (the shape of browser local storage).
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> ConfigResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> ConfigResult<()>;
    fn remove_item(&self, key: &str) -> ConfigResult<()>;
}

/// One file per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> ConfigResult<PathBuf> {
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(ConfigError::Storage(format!("invalid storage key: {key:?}")));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> ConfigResult<Option<String>> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ConfigError::Storage(format!("reading {}: {e}", path.display()))),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> ConfigResult<()> {
        let path = self.path_for(key)?;
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| ConfigError::Storage(format!("creating {}: {e}", self.dir.display())))?;

        // Atomic write: write to temp file, then rename
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, value)
            .map_err(|e| ConfigError::Storage(format!("writing {}: {e}", tmp_path.display())))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| ConfigError::Storage(format!("renaming {}: {e}", path.display())))?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> ConfigResult<()> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ConfigError::Storage(format!("removing {}: {e}", path.display()))),
        }
    }
}

/// In-process storage, for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> ConfigResult<Option<String>> {
        let items = self
            .items
            .read()
            .map_err(|_| ConfigError::Storage("memory storage lock poisoned".into()))?;
        Ok(items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> ConfigResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| ConfigError::Storage("memory storage lock poisoned".into()))?;
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> ConfigResult<()> {
        let mut items = self
            .items
            .write()
            .map_err(|_| ConfigError::Storage("memory storage lock poisoned".into()))?;
        items.remove(key);
        Ok(())
    }
}

pub fn save_config(storage: &dyn Storage, key: &str, config: &Config) -> ConfigResult<()> {
    let json = serde_json::to_string(config)?;
    storage.set_item(key, &json)?;
    info!(key, bytes = json.len(), "config saved");
    Ok(())
}

/// Read and clean the stored config. A missing or unparseable entry yields
/// `(None, false)`.
pub fn load_config_sync(
    storage: &dyn Storage,
    key: &str,
    domain: Option<&str>,
) -> ConfigResult<(Option<Config>, bool)> {
    let Some(raw) = storage.get_item(key)? else {
        debug!(key, "no stored config");
        return Ok((None, false));
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(clean_config(value, domain)),
        Err(e) => {
            warn!(key, error = %e, "stored config is not JSON");
            Ok((None, false))
        }
    }
}
