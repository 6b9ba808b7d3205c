use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid secret key bytes")]
    InvalidSecretKey,

    #[error("invalid recovery id {0}")]
    InvalidRecoveryId(u8),

    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    #[error("public key recovery failed: {0}")]
    RecoveryFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),
}
