//! Collaborator interfaces: account resolution, signing and broadcasting.
//!
//! Implementations must be thread-safe (Send + Sync).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sessionkit_core::{Address, ChainId, EcdsaSignature, Keccak256Hash, OperationId, SmartAccountHandle};

use crate::error::Result;
use crate::operation::{OperationStatus, SignedOperation};

/// How to find an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountLookup {
    /// The account controlled by `owner`, deployed or not.
    Owner { chain_id: ChainId, owner: Address },
    /// A known account address.
    Handle(SmartAccountHandle),
}

/// What the network knows about an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub handle: SmartAccountHandle,

    /// Owner, when known. Unknown for an undeployed account looked up by
    /// address.
    pub owner: Option<Address>,

    /// Whether account code exists on-chain.
    pub deployed: bool,

    /// Whether the permission-validation module is installed.
    pub permissions_enabled: bool,

    /// Number of grants registered so far; the next grant's nonce.
    pub grant_nonce: u64,
}

/// Resolves owners and handles to on-chain accounts.
#[async_trait]
pub trait AccountResolver: Send + Sync {
    async fn resolve(&self, lookup: &AccountLookup) -> Result<AccountStatus>;
}

/// Produces owner signatures. The secret never leaves the backend.
#[async_trait]
pub trait SigningBackend: Send + Sync {
    /// The address whose signatures this backend produces.
    fn address(&self) -> Address;

    /// Sign a 32-byte digest with a recoverable signature.
    async fn sign_digest(&self, digest: &Keccak256Hash) -> Result<EcdsaSignature>;
}

/// Submits signed operations and reports their status.
#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit an operation. Returns its id once accepted.
    ///
    /// A transport error here leaves acceptance unknown; do not resubmit
    /// blindly.
    async fn submit(&self, operation: &SignedOperation) -> Result<OperationId>;

    /// Report the current status of a submitted operation.
    async fn poll(&self, operation: &OperationId) -> Result<OperationStatus>;
}

/// A full chain client: resolution plus broadcasting.
pub trait Chain: AccountResolver + Broadcaster {}

impl<T: AccountResolver + Broadcaster + ?Sized> Chain for T {}
