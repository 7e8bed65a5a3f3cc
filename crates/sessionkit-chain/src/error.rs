//! Error types for chain interactions.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use sessionkit_core::OperationId;

/// Why the network refused a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    /// The grant referenced by a subsequent use has not been registered.
    PermissionNotEnabled,
    /// A signature did not recover to the expected signer.
    InvalidSignature,
    /// The permission-validation module is not installed on the account.
    ModuleNotInstalled,
    /// A call is not covered by the grant's policies.
    PolicyViolation,
    /// The account does not exist on this chain.
    UnknownAccount,
    /// The operation nonce was already used.
    NonceReused,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RejectReason::PermissionNotEnabled => "permission not enabled",
            RejectReason::InvalidSignature => "invalid signature",
            RejectReason::ModuleNotInstalled => "permissions module not installed",
            RejectReason::PolicyViolation => "policy violation",
            RejectReason::UnknownAccount => "unknown account",
            RejectReason::NonceReused => "nonce reused",
        };
        f.write_str(s)
    }
}

/// Errors from account resolution, signing, submission and polling.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The network refused the submission. Nothing was accepted.
    #[error("submission rejected ({reason}): {detail}")]
    Rejected { reason: RejectReason, detail: String },

    /// Broadcast or poll I/O failed. The operation may or may not have
    /// been accepted.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The network has no record of this operation.
    #[error("unknown operation: {0}")]
    UnknownOperation(OperationId),

    /// The signing backend failed.
    #[error("signing failed: {0}")]
    Signing(String),

    /// The caller's deadline passed before a terminal status was observed.
    #[error("wait for {0} elapsed before a terminal status")]
    WaitElapsed(OperationId),

    /// Operation encoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] sessionkit_core::CoreError),
}

impl ChainError {
    pub fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        ChainError::Rejected {
            reason,
            detail: detail.into(),
        }
    }

    /// Whether the failure is an I/O problem that is safe to retry by polling.
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_))
    }
}

/// Result type for chain operations.
pub type Result<T> = std::result::Result<T, ChainError>;
