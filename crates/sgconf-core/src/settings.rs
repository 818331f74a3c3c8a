use serde::{Deserialize, Serialize};
use sgconf_crypto::HashAlgorithm;
use std::path::{Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::storage::CONFIG_KEY;

/// Default PBKDF2 rounds for pre-keys and encrypted exports
pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// PBKDF2 and key-addressing hash when none is configured or recorded
pub const DEFAULT_HASH_ALGORITHM: HashAlgorithm = HashAlgorithm::Sha512;

/// Engine settings (loaded from sgconf.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub storage: StorageSettings,
    pub crypto: CryptoSettings,
    pub auth: AuthSettings,
    pub http: HttpSettings,
    pub log: LogSettings,
}

impl EngineSettings {
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text)
            .map_err(|e| ConfigError::Settings(format!("{}: {e}", path.display())))
    }

    /// Load `path` if given, otherwise defaults.
    pub fn load_or_default(path: Option<&Path>) -> ConfigResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory backing the key-value store
    pub dir: PathBuf,
    /// Key the config is stored under
    pub key: String,
}

/// Crypto parameters for new pre-keys and exports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoSettings {
    /// Hash for PBKDF2 and for addressing new keys (default: sha512)
    pub hash_algorithm: HashAlgorithm,
    pub pbkdf2_iterations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    /// Cap on token matches per auth query
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("~/.local/share/sgconf"),
            key: CONFIG_KEY.into(),
        }
    }
}

impl Default for CryptoSettings {
    fn default() -> Self {
        Self {
            hash_algorithm: DEFAULT_HASH_ALGORITHM,
            pbkdf2_iterations: DEFAULT_ITERATIONS,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            limit: crate::auth::DEFAULT_LIMIT,
        }
    }
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: format!("sgconf/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_settings() {
        let toml_str = r#"
[storage]
dir = "/var/lib/sgconf"
key = "otherConfig"

[crypto]
hash_algorithm = "sha256"
pbkdf2_iterations = 5000

[auth]
limit = 10

[http]
timeout_secs = 5
user_agent = "test-agent"

[log]
level = "debug"
format = "json"
"#;
        let settings: EngineSettings = toml::from_str(toml_str).unwrap();

        assert_eq!(settings.storage.dir, PathBuf::from("/var/lib/sgconf"));
        assert_eq!(settings.storage.key, "otherConfig");
        assert_eq!(settings.crypto.hash_algorithm, HashAlgorithm::Sha256);
        assert_eq!(settings.crypto.pbkdf2_iterations, 5000);
        assert_eq!(settings.auth.limit, 10);
        assert_eq!(settings.http.timeout_secs, 5);
        assert_eq!(settings.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let settings: EngineSettings = toml::from_str("").unwrap();

        assert_eq!(settings.storage.key, "secretgraphConfig");
        assert_eq!(settings.crypto.hash_algorithm, HashAlgorithm::Sha512);
        assert_eq!(settings.crypto.pbkdf2_iterations, DEFAULT_ITERATIONS);
        assert_eq!(settings.auth.limit, 100);
        assert_eq!(settings.log.level, "info");
    }

    #[test]
    fn test_parse_partial_settings() {
        let settings: EngineSettings = toml::from_str("[auth]\nlimit = 3\n").unwrap();

        // Overridden
        assert_eq!(settings.auth.limit, 3);
        // Defaults
        assert_eq!(settings.http.timeout_secs, 30);
        assert_eq!(settings.log.format, "text");
    }

    #[test]
    fn test_unknown_hash_rejected() {
        let result: Result<EngineSettings, _> =
            toml::from_str("[crypto]\nhash_algorithm = \"md5\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sgconf.toml");
        std::fs::write(&path, "[log]\nlevel = \"trace\"\n").unwrap();

        let settings = EngineSettings::load(&path).unwrap();
        assert_eq!(settings.log.level, "trace");
        assert!(EngineSettings::load(&dir.path().join("missing.toml")).is_err());
    }
}
