//! Error types for the session lifecycle.
//!
//! Every error names the account it concerns and the phase that produced
//! it, so callers can decide how to recover. Nothing is retried or
//! corrected automatically.

use std::fmt;

use thiserror::Error;

use sessionkit_chain::ChainError;
use sessionkit_core::{CoreError, GrantId, OperationId, SmartAccountHandle};
use sessionkit_perms::PermsError;
use sessionkit_store::StoreError;

/// Lifecycle step that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Grant,
    BuildContext,
    Use,
    Wait,
    /// Read-only lookups such as activation state.
    Query,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Prepare => "prepare",
            Phase::Grant => "grant",
            Phase::BuildContext => "build-context",
            Phase::Use => "use",
            Phase::Wait => "wait",
            Phase::Query => "query",
        };
        f.write_str(s)
    }
}

/// Stored artifact that was expected but absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
    Credential,
    Grant,
}

impl fmt::Display for Missing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Missing::Credential => f.write_str("session credential"),
            Missing::Grant => f.write_str("permission grant"),
        }
    }
}

/// Errors that can occur while granting, activating or using a permission.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A step ran out of order or with inconsistent inputs.
    #[error("precondition violated during {phase} for {account}: {detail}")]
    PreconditionViolation {
        account: SmartAccountHandle,
        phase: Phase,
        detail: String,
    },

    /// Run the step that produces the missing artifact.
    #[error("no {missing} stored for {account}")]
    NotFound {
        account: SmartAccountHandle,
        phase: Phase,
        missing: Missing,
    },

    /// Rejected locally; nothing was submitted.
    #[error("action not authorized for {account}: {source}")]
    ActionNotAuthorized {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: PermsError,
    },

    /// Subsequent use of a grant that is not activated.
    #[error("permission {grant} is not activated for {account}")]
    PermissionNotActivated {
        account: SmartAccountHandle,
        phase: Phase,
        grant: GrantId,
    },

    /// The network refused a first activation. State was not advanced.
    #[error("activation rejected for {account}: {source}")]
    ActivationRejected {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: ChainError,
    },

    /// The network refused a subsequent use. State was not changed.
    #[error("use rejected for {account}: {source}")]
    UseRejected {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: ChainError,
    },

    /// Broadcast or poll I/O failed. Re-poll; do not resubmit.
    #[error("network failure during {phase} for {account}: {source}")]
    TransientNetworkFailure {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: ChainError,
    },

    /// No deployed account exists at the handle.
    #[error("account {account} is not deployed")]
    AccountUnresolved {
        account: SmartAccountHandle,
        phase: Phase,
    },

    /// The wait deadline passed. The operation is still pending; wait again.
    #[error("wait for {operation} elapsed for {account}")]
    WaitElapsed {
        account: SmartAccountHandle,
        phase: Phase,
        operation: OperationId,
    },

    /// The grant failed verification, e.g. after tampering.
    #[error("invalid grant for {account}: {source}")]
    InvalidGrant {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: CoreError,
    },

    /// Storage error.
    #[error("storage error during {phase} for {account}: {source}")]
    Store {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: StoreError,
    },

    /// Core error.
    #[error("core error during {phase} for {account}: {source}")]
    Core {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: CoreError,
    },

    /// Chain error.
    #[error("chain error during {phase} for {account}: {source}")]
    Chain {
        account: SmartAccountHandle,
        phase: Phase,
        #[source]
        source: ChainError,
    },
}

impl SessionError {
    pub(crate) fn precondition(
        account: SmartAccountHandle,
        phase: Phase,
        detail: impl Into<String>,
    ) -> Self {
        SessionError::PreconditionViolation {
            account,
            phase,
            detail: detail.into(),
        }
    }

    pub(crate) fn store(account: SmartAccountHandle, phase: Phase) -> impl FnOnce(StoreError) -> Self {
        move |source| SessionError::Store {
            account,
            phase,
            source,
        }
    }

    pub(crate) fn core(account: SmartAccountHandle, phase: Phase) -> impl FnOnce(CoreError) -> Self {
        move |source| SessionError::Core {
            account,
            phase,
            source,
        }
    }

    /// Classify a chain error that is not a submission rejection.
    pub(crate) fn chain(account: SmartAccountHandle, phase: Phase) -> impl FnOnce(ChainError) -> Self {
        move |source| match source {
            ChainError::Transport(_) => SessionError::TransientNetworkFailure {
                account,
                phase,
                source,
            },
            ChainError::WaitElapsed(operation) => SessionError::WaitElapsed {
                account,
                phase,
                operation,
            },
            source => SessionError::Chain {
                account,
                phase,
                source,
            },
        }
    }

    pub fn account(&self) -> &SmartAccountHandle {
        match self {
            SessionError::PreconditionViolation { account, .. }
            | SessionError::NotFound { account, .. }
            | SessionError::ActionNotAuthorized { account, .. }
            | SessionError::PermissionNotActivated { account, .. }
            | SessionError::ActivationRejected { account, .. }
            | SessionError::UseRejected { account, .. }
            | SessionError::TransientNetworkFailure { account, .. }
            | SessionError::AccountUnresolved { account, .. }
            | SessionError::WaitElapsed { account, .. }
            | SessionError::InvalidGrant { account, .. }
            | SessionError::Store { account, .. }
            | SessionError::Core { account, .. }
            | SessionError::Chain { account, .. } => account,
        }
    }

    pub fn phase(&self) -> Phase {
        match self {
            SessionError::PreconditionViolation { phase, .. }
            | SessionError::NotFound { phase, .. }
            | SessionError::ActionNotAuthorized { phase, .. }
            | SessionError::PermissionNotActivated { phase, .. }
            | SessionError::ActivationRejected { phase, .. }
            | SessionError::UseRejected { phase, .. }
            | SessionError::TransientNetworkFailure { phase, .. }
            | SessionError::AccountUnresolved { phase, .. }
            | SessionError::WaitElapsed { phase, .. }
            | SessionError::InvalidGrant { phase, .. }
            | SessionError::Store { phase, .. }
            | SessionError::Core { phase, .. }
            | SessionError::Chain { phase, .. } => *phase,
        }
    }

    /// Whether waiting again on the same operation is the right recovery.
    ///
    /// Never true for a submission: a failed submit may still have been
    /// accepted.
    pub fn is_retryable_wait(&self) -> bool {
        matches!(
            self,
            SessionError::TransientNetworkFailure {
                phase: Phase::Wait,
                ..
            } | SessionError::WaitElapsed { .. }
        )
    }
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_core::{Address, ChainId};

    fn account() -> SmartAccountHandle {
        SmartAccountHandle::new(ChainId::BASE, Address::from_bytes([0x01; 20]))
    }

    #[test]
    fn test_chain_classification() {
        let err = SessionError::chain(account(), Phase::Wait)(ChainError::Transport("reset".into()));
        assert!(matches!(err, SessionError::TransientNetworkFailure { .. }));
        assert!(err.is_retryable_wait());

        let op = OperationId::from_bytes([0x02; 32]);
        let err = SessionError::chain(account(), Phase::Wait)(ChainError::WaitElapsed(op));
        assert!(matches!(err, SessionError::WaitElapsed { operation, .. } if operation == op));
        assert!(err.is_retryable_wait());
    }

    #[test]
    fn test_submit_failure_not_retryable() {
        let err = SessionError::chain(account(), Phase::Use)(ChainError::Transport("reset".into()));
        assert!(!err.is_retryable_wait());
        assert_eq!(err.phase(), Phase::Use);
        assert_eq!(err.account(), &account());
    }

    #[test]
    fn test_message_names_account_and_phase() {
        let err = SessionError::precondition(account(), Phase::Grant, "prepare not confirmed");
        let message = err.to_string();
        assert!(message.contains("grant"));
        assert!(message.contains(&account().to_string()));
    }
}
