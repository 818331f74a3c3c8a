//! Config export, optionally password-encrypted
//!
//! Encrypted export format:
//! ```text
//! { "data": base64(AES-GCM(main key, config JSON)),
//!   "nonce": base64(13 bytes),
//!   "iterations": PBKDF2 rounds,
//!   "prekeys": [ one pre-key blob per password, each wrapping the main key ],
//!   "hashAlgorithm": PBKDF2 hash (sha512 when absent) }
//! ```

use std::path::{Path, PathBuf};

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigResult;
use crate::model::Config;
use crate::settings::DEFAULT_HASH_ALGORITHM;
use sgconf_crypto::{buffer_to_base64, encrypt_aead, encrypt_pre_key, generate_key, HashAlgorithm};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedExport {
    pub data: String,
    pub nonce: String,
    pub iterations: u32,
    pub prekeys: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_algorithm: Option<HashAlgorithm>,
}

impl EncryptedExport {
    pub fn hash(&self) -> HashAlgorithm {
        self.hash_algorithm.unwrap_or(DEFAULT_HASH_ALGORITHM)
    }
}

/// Serialize `config`. Without passwords the result is plain JSON; with
/// passwords it is an [`EncryptedExport`] that any one of them unlocks.
pub fn export_config(
    config: &Config,
    passwords: &[SecretString],
    iterations: u32,
    hash: HashAlgorithm,
) -> ConfigResult<String> {
    let json = serde_json::to_string(config)?;
    if passwords.is_empty() {
        return Ok(json);
    }

    let main_key = generate_key();
    let out = encrypt_aead(&main_key, json.as_bytes(), None)?;
    let prekeys = passwords
        .iter()
        .map(|password| encrypt_pre_key(&main_key, password, hash, iterations, None))
        .collect::<Result<Vec<_>, _>>()?;

    let export = EncryptedExport {
        data: buffer_to_base64(&out.ciphertext),
        nonce: buffer_to_base64(&out.nonce),
        iterations,
        prekeys,
        hash_algorithm: Some(hash),
    };
    Ok(serde_json::to_string(&export)?)
}

/// Export to `path`, replacing any existing file atomically.
pub async fn export_config_to_file(
    config: &Config,
    passwords: &[SecretString],
    iterations: u32,
    hash: HashAlgorithm,
    path: &Path,
) -> ConfigResult<PathBuf> {
    let serialized = export_config(config, passwords, iterations, hash)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("tmp");
    tokio::fs::write(&tmp_path, serialized.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    info!(
        path = %path.display(),
        encrypted = !passwords.is_empty(),
        "config exported"
    );
    Ok(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean_config;
    use crate::load::{load_config_from_text, LoadOptions};
    use sgconf_crypto::{base64_to_buffer, decrypt_aead, decrypt_first_pre_key};

    const ITERATIONS: u32 = 100;

    #[test]
    fn test_plain_export_is_config_json() {
        let config = Config::new("https://example.com/", "c1");
        let exported = export_config(&config, &[], ITERATIONS, HashAlgorithm::Sha512).unwrap();
        let (parsed, changed) = load_config_from_text(&exported, &LoadOptions::new(&[])).unwrap();
        assert_eq!(parsed, Some(config));
        assert!(!changed);
    }

    #[test]
    fn test_encrypted_export_unlocks_with_any_password() {
        let config = Config::new("https://example.com/", "c1");
        let passwords = vec![
            SecretString::from("first".to_string()),
            SecretString::from("second".to_string()),
        ];
        let exported =
            export_config(&config, &passwords, ITERATIONS, HashAlgorithm::Sha256).unwrap();
        assert!(!exported.contains("example.com"));

        let export: EncryptedExport = serde_json::from_str(&exported).unwrap();
        assert_eq!(export.prekeys.len(), 2);
        assert_eq!(export.hash(), HashAlgorithm::Sha256);

        let second = [SecretString::from("second".to_string())];
        let main_key =
            decrypt_first_pre_key(&export.prekeys, &second, export.hash(), export.iterations)
                .unwrap();
        let plaintext = decrypt_aead(
            &main_key.plaintext,
            &base64_to_buffer(&export.data).unwrap(),
            &base64_to_buffer(&export.nonce).unwrap(),
        )
        .unwrap();
        let (parsed, changed) = clean_config(serde_json::from_slice(&plaintext).unwrap(), None);
        assert_eq!(parsed, Some(config));
        assert!(!changed);
    }

    #[test]
    fn test_missing_hash_algorithm_uses_settings_default() {
        let export: EncryptedExport = serde_json::from_value(serde_json::json!({
            "data": "", "nonce": "", "iterations": 1, "prekeys": []
        }))
        .unwrap();
        assert_eq!(export.hash_algorithm, None);
        assert_eq!(export.hash(), DEFAULT_HASH_ALGORITHM);

        let unknown = serde_json::from_value::<EncryptedExport>(serde_json::json!({
            "data": "", "nonce": "", "iterations": 1, "prekeys": [], "hashAlgorithm": "md5"
        }));
        assert!(unknown.is_err());
    }

    #[tokio::test]
    async fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports/config.json");
        let config = Config::new("https://example.com/", "c1");

        let written = export_config_to_file(&config, &[], ITERATIONS, HashAlgorithm::Sha512, &path)
            .await
            .unwrap();
        assert_eq!(written, path);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"configCluster\":\"c1\""));
        assert!(!path.with_extension("tmp").exists());
    }
}
