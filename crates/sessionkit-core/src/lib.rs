//! # sessionkit core
//!
//! Pure primitives for session-key delegation on smart accounts.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`SessionCredential`] - Disposable secp256k1 key acting for an account
//! - [`PolicyDescriptor`] - One authorized (chain, target, selector) entry point
//! - [`PermissionGrant`] - Owner-signed artifact binding policies to a redeemer
//! - [`ChainId`] - Chain identifier that never loses precision in transit
//!
//! ## Canonicalization
//!
//! Grants are signed over deterministic CBOR. See [`canonical`] module.

pub mod canonical;
pub mod credential;
pub mod crypto;
pub mod error;
pub mod grant;
pub mod policy;
pub mod types;

pub use credential::SessionCredential;
pub use crypto::{keccak256, Blake3Hash, EcdsaSignature, Keccak256Hash, Keypair};
pub use error::{CoreError, Result};
pub use grant::{GrantBuilder, GrantContent, GrantId, PermissionGrant, UnsignedGrant, GRANT_VERSION};
pub use policy::{Action, EnforcementPolicy, PolicyDescriptor};
pub use types::{
    Address, ChainId, FeeDesignation, OperationId, Selector, SmartAccountHandle, UsageMode,
};
