use thiserror::Error;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("cipher key is not configured: {0}")]
    MissingKey(String),

    #[error("invalid cipher key: {0}")]
    InvalidKey(String),

    #[error("invalid cipher key length: expected {expected} bytes, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed: authentication tag mismatch or corrupted ciphertext")]
    Decryption,

    #[error("unsupported envelope version {version}, only version {supported} is supported")]
    UnsupportedVersion { version: u32, supported: u32 },

    #[error("invalid encrypted envelope: {0}")]
    InvalidEnvelope(String),

    #[error("decrypted secret is not valid UTF-8")]
    InvalidUtf8,
}

pub type CipherResult<T> = Result<T, CipherError>;
