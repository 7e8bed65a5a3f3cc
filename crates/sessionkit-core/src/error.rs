//! Error types for sessionkit core.

use thiserror::Error;

use crate::types::Address;

/// Core errors that can occur while building, signing or decoding grants.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid signature")]
    InvalidSignature,

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("invalid secret key material")]
    InvalidSecretKey,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("invalid chain id: {0}")]
    InvalidChainId(String),

    #[error("grant signed by {recovered}, expected owner {expected}")]
    GrantSignerMismatch { expected: Address, recovered: Address },

    #[error("grant must contain at least one policy descriptor")]
    EmptyPolicySet,

    #[error("unsupported grant version: {0}")]
    UnsupportedVersion(u8),

    #[error("malformed grant: {0}")]
    MalformedGrant(String),

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
