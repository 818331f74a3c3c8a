use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// A patch is structurally invalid (missing data, content without cluster)
    #[error("invalid merge: {0}")]
    InvalidMerge(String),

    /// A merge produced a config that fails validation. Always a bug.
    #[error("config invariant violated: {0}")]
    Invariant(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] sgconf_crypto::CryptoError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("settings error: {0}")]
    Settings(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
