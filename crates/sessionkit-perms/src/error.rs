//! Error types for the permissions module.

use thiserror::Error;

use sessionkit_core::{Address, ChainId, Selector};

/// Errors that can occur while checking actions against a grant.
#[derive(Debug, Error)]
pub enum PermsError {
    /// No policy descriptor in the grant matches the action.
    #[error(
        "action {index} not authorized: no policy for target {target} selector {selector:?} on chain {chain_id}"
    )]
    ActionNotAuthorized {
        index: usize,
        chain_id: ChainId,
        target: Address,
        selector: Option<Selector>,
    },

    /// A submission must carry at least one action.
    #[error("no actions supplied")]
    EmptyActionSet,

    /// Core error.
    #[error("core error: {0}")]
    CoreError(#[from] sessionkit_core::CoreError),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
