use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Authentication failed: ciphertext, IV, or tag did not verify")]
    AuthenticationFailed,

    #[error("Invalid master key: {0}")]
    InvalidKey(String),

    #[error("Invalid key length: expected {expected} hex characters, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Invalid encrypted data encoding: {0}")]
    InvalidEncoding(String),

    #[error("Invalid IV length: expected 12 bytes, got {0}")]
    InvalidIvLength(usize),

    #[error("Invalid authentication tag length: expected 16 bytes, got {0}")]
    InvalidTagLength(usize),

    #[error("Decrypted payload is not a known credential shape: {0}")]
    InvalidPayload(String),

    #[error("Declared credential type {declared} does not match payload type {actual}")]
    TypeMismatch { declared: String, actual: String },

    #[error("Insecure development key is not permitted in production")]
    DevKeyInProduction,

    #[error("Credential storage error: {0}")]
    Storage(String),
}

pub type VaultResult<T> = Result<T, VaultError>;
