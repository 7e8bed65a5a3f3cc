//! # sessionkit chain
//!
//! The network side of session-key delegation: resolving accounts,
//! signing and submitting operations, and waiting for receipts.
//!
//! ## Overview
//!
//! Everything that talks to a chain goes through three traits:
//!
//! - [`AccountResolver`] - owner or handle to on-chain account status
//! - [`SigningBackend`] - produces recoverable secp256k1 signatures
//! - [`Broadcaster`] - submits signed operations and polls their status
//!
//! [`MemoryChain`] implements the resolver and broadcaster in memory and
//! enforces the same rules a real validator module would. It backs the
//! test suites.
//!
//! ## Operation Flow
//!
//! ```text
//! UnsignedOperation --sign--> SignedOperation --submit--> OperationId
//!                                                              |
//!                                 ExecutionReceipt <--poll-----+
//! ```

pub mod error;
pub mod memory;
pub mod operation;
pub mod signer;
pub mod traits;
pub mod wait;

pub use error::{ChainError, RejectReason, Result};
pub use memory::MemoryChain;
pub use operation::{
    ExecutionReceipt, OperationBody, OperationStatus, ReceiptStatus, SignedOperation,
    UnsignedOperation, OPERATION_DOMAIN,
};
pub use signer::{sign_operation, LocalSigner};
pub use traits::{AccountLookup, AccountResolver, AccountStatus, Broadcaster, Chain, SigningBackend};
pub use wait::{wait_for_receipt, WaitOptions};
