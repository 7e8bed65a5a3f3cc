//! # sessionkit
//!
//! Delegated, policy-scoped authority over smart accounts through session
//! keys.
//!
//! ## Overview
//!
//! An owner authorizes a disposable session credential to run a fixed set
//! of calls on its account, without co-signing each one:
//!
//! 1. **Prepare**: install the permission-validation module (owner signs)
//! 2. **Grant**: sign a grant of policy descriptors to the session
//!    credential's address (off-chain)
//! 3. **Build context**: bind the stored credential to the account, with no
//!    owner involvement
//! 4. **Use**: submit calls under the grant, first in `FirstActivation`
//!    mode, then in `SubsequentUse` mode
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sessionkit::{ApiKey, PrepareOutcome, SessionKit, SessionsConfig};
//! use sessionkit::chain::{LocalSigner, MemoryChain, SigningBackend};
//! use sessionkit::core::{Action, Address, ChainId, FeeDesignation, PolicyDescriptor, Selector, UsageMode};
//! use sessionkit::store::MemoryStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let fee = FeeDesignation::new(Address::ZERO, ChainId::BASE);
//!     let config = SessionsConfig::new("https://rpc", "https://bundler", ApiKey::new("key"), fee);
//!     let kit = SessionKit::new(
//!         Arc::new(MemoryChain::new(ChainId::BASE)),
//!         Arc::new(MemoryStore::new()),
//!         config,
//!     )?;
//!
//!     let owner = LocalSigner::generate();
//!     let account = kit.resolve_account(owner.address()).await?.handle;
//!     if let PrepareOutcome::Submitted(op) = kit.prepare(&owner, &account).await? {
//!         kit.wait_for_prepare(&account, &op, None).await?;
//!     }
//!
//!     kit.provision_credential(&account).await?;
//!     let counter = Address::from_bytes([0xaa; 20]);
//!     let increment = Selector::from_signature("incrementCount()");
//!     kit.grant(&owner, &account, vec![PolicyDescriptor::unrestricted(ChainId::BASE, counter, increment)])
//!         .await?;
//!
//!     let context = kit.build_context(&account).await?;
//!     let action = Action::call(ChainId::BASE, counter, increment, &[]);
//!     let op = kit.use_permission(&context, UsageMode::FirstActivation, vec![action]).await?;
//!     let receipt = kit.wait_for_receipt(&context, &op, None).await?;
//!     assert!(receipt.is_confirmed());
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `sessionkit::core` - Primitives (grants, policies, credentials)
//! - `sessionkit::store` - Credential storage
//! - `sessionkit::chain` - Collaborator traits and the in-memory chain
//! - `sessionkit::perms` - Authorization and activation tracking

pub mod config;
pub mod context;
pub mod error;
pub mod kit;
pub mod protocol;
pub mod usage;

pub use sessionkit_chain as chain;
pub use sessionkit_core as core;
pub use sessionkit_perms as perms;
pub use sessionkit_store as store;

pub use config::{ApiKey, ConfigError, SessionsConfig};
pub use context::SessionExecutionContext;
pub use error::{Missing, Phase, Result, SessionError};
pub use kit::SessionKit;
pub use protocol::{PermissionGrantProtocol, PrepareOutcome};
pub use usage::PermissionUsageEngine;

pub use sessionkit_core::{
    Action, Address, ChainId, FeeDesignation, PermissionGrant, PolicyDescriptor, Selector,
    SessionCredential, SmartAccountHandle, UsageMode,
};
pub use sessionkit_perms::ActivationState;
