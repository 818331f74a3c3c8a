use thiserror::Error;

pub type CryptoResult<T> = Result<T, CryptoError>;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("unsupported key material: {0}")]
    UnsupportedInput(String),

    #[error("key is not extractable: {0}")]
    KeyExtraction(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("encoding error: {0}")]
    Encoding(String),

    #[error("all {attempts} candidates failed")]
    AllCandidatesFailed { attempts: usize },
}

impl From<base64::DecodeError> for CryptoError {
    fn from(e: base64::DecodeError) -> Self {
        CryptoError::Encoding(format!("base64 decode: {e}"))
    }
}
