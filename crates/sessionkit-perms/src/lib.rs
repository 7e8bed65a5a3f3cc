//! # sessionkit permissions
//!
//! Checks actions against permission grants and tracks whether each grant
//! has been activated on-chain.
//!
//! ## Key Concepts
//!
//! - **Authorization**: every action must match a descriptor in the grant by
//!   (chain, target, selector) before it is signed or submitted
//! - **Activation**: a grant is registered on-chain by its first use; later
//!   uses reference the registered grant
//!
//! Activation state is keyed by [`ActivationKey`] and moves through
//! [`ActivationState`]. Once `Activated`, a key never regresses.

pub mod authorize;
pub mod error;
pub mod state;

pub use authorize::authorize_actions;
pub use error::{PermsError, Result};
pub use state::{
    ActivationKey, ActivationState, ActivationStateTracker, CompletionOutcome, RejectionOutcome,
};
