use thiserror::Error;
use tinylink_core::StorageError;

/// Reasons a session token fails to decode. All of them are treated the same
/// way by the resolver: the token is discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("token is not valid hex")]
    InvalidHex,
    #[error("token is shorter than the nonce")]
    Truncated,
    #[error("token failed authentication")]
    Authentication,
    #[error("decrypted identity is not valid utf-8")]
    InvalidUtf8,
    #[error("encryption failed")]
    Encryption,
}

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("failed to issue session token: {0}")]
    Codec(#[from] CodecError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
