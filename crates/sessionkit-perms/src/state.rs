//! Activation state per (account, session credential, grant).
//!
//! The state machine is:
//!
//! ```text
//! Ungranted -> Granted -> ActivationPending -> Activated
//!                  ^             |
//!                  |             v
//!                  +---- ActivationRejected
//! ```
//!
//! Transitions for one key are serialized behind that key's mutex; distinct
//! keys never contend beyond the brief map lookup. `Activated` is sticky:
//! nothing in this module moves a key out of it.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use sessionkit_core::{Address, GrantId, OperationId, SmartAccountHandle};

/// Identifies one delegation: which account, which session key, which grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActivationKey {
    pub account: SmartAccountHandle,
    pub redeemer: Address,
    pub grant: GrantId,
}

impl ActivationKey {
    pub fn new(account: SmartAccountHandle, redeemer: Address, grant: GrantId) -> Self {
        Self {
            account,
            redeemer,
            grant,
        }
    }
}

/// Where a delegation is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationState {
    /// No grant has been registered for this key.
    Ungranted,

    /// Grant issued, not yet registered on-chain.
    Granted,

    /// One or more first-activation submissions are in flight.
    ActivationPending { in_flight: BTreeSet<OperationId> },

    /// Registered on-chain. `operation` is the submission that confirmed it,
    /// when known to this process.
    Activated { operation: Option<OperationId> },

    /// The last activation attempt was rejected. A new first activation may
    /// be attempted.
    ActivationRejected { reason: String },
}

impl ActivationState {
    pub fn is_activated(&self) -> bool {
        matches!(self, ActivationState::Activated { .. })
    }
}

/// Result of confirming an activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// This confirmation moved the key to `Activated`.
    Transitioned,
    /// The key was already `Activated`; nothing changed.
    AlreadyActivated,
}

/// Result of recording a rejected activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionOutcome {
    /// The key moved to `ActivationRejected`.
    Rejected,
    /// Other submissions are still in flight; the key stays pending.
    StillPending,
    /// The key is already `Activated`; the rejection is informational.
    AlreadyActivated,
}

type Slot = Arc<Mutex<ActivationState>>;

/// Thread-safe tracker of activation state for many delegations.
#[derive(Debug, Default)]
pub struct ActivationStateTracker {
    slots: RwLock<HashMap<ActivationKey, Slot>>,
}

impl ActivationStateTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &ActivationKey) -> Option<Slot> {
        let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
        slots.get(key).cloned()
    }

    fn slot_or_insert(&self, key: &ActivationKey) -> Slot {
        if let Some(slot) = self.slot(key) {
            return slot;
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots
            .entry(*key)
            .or_insert_with(|| Arc::new(Mutex::new(ActivationState::Ungranted)))
            .clone()
    }

    fn with_state<R>(&self, key: &ActivationKey, f: impl FnOnce(&mut ActivationState) -> R) -> R {
        let slot = self.slot_or_insert(key);
        let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Current state of a key.
    pub fn state(&self, key: &ActivationKey) -> ActivationState {
        match self.slot(key) {
            Some(slot) => slot.lock().unwrap_or_else(PoisonError::into_inner).clone(),
            None => ActivationState::Ungranted,
        }
    }

    pub fn is_activated(&self, key: &ActivationKey) -> bool {
        self.state(key).is_activated()
    }

    /// Record that a grant has been issued. Keys past `Ungranted` are left
    /// untouched.
    pub fn register_grant(&self, key: &ActivationKey) -> ActivationState {
        self.with_state(key, |state| {
            if *state == ActivationState::Ungranted {
                *state = ActivationState::Granted;
            }
            state.clone()
        })
    }

    /// Mark a key as activated from durable storage, e.g. after a restart.
    pub fn restore_activated(&self, key: &ActivationKey) {
        self.with_state(key, |state| {
            if !state.is_activated() {
                *state = ActivationState::Activated { operation: None };
            }
        })
    }

    /// Record an accepted first-activation submission.
    ///
    /// Returns the state after recording. An already-activated key stays
    /// activated; the submission's outcome is then informational only.
    pub fn record_submission(&self, key: &ActivationKey, operation: OperationId) -> ActivationState {
        self.with_state(key, |state| {
            match state {
                ActivationState::Activated { .. } => {
                    tracing::warn!(
                        account = %key.account,
                        redeemer = %key.redeemer,
                        operation = %operation,
                        "activation submitted for an already activated grant"
                    );
                }
                ActivationState::ActivationPending { in_flight } => {
                    in_flight.insert(operation);
                }
                _ => {
                    *state = ActivationState::ActivationPending {
                        in_flight: BTreeSet::from([operation]),
                    };
                }
            }
            state.clone()
        })
    }

    /// Record that an activation submission confirmed on-chain.
    ///
    /// Exactly one caller per key observes `Transitioned`.
    pub fn complete_activation(&self, key: &ActivationKey, operation: OperationId) -> CompletionOutcome {
        self.with_state(key, |state| {
            if state.is_activated() {
                tracing::debug!(
                    account = %key.account,
                    operation = %operation,
                    "activation confirmed after grant was already active"
                );
                return CompletionOutcome::AlreadyActivated;
            }
            *state = ActivationState::Activated {
                operation: Some(operation),
            };
            tracing::info!(
                account = %key.account,
                redeemer = %key.redeemer,
                grant = %key.grant,
                operation = %operation,
                "permission activated"
            );
            CompletionOutcome::Transitioned
        })
    }

    /// Record that an activation attempt was rejected.
    ///
    /// `operation` is `None` when the network refused the submission outright.
    pub fn reject_activation(
        &self,
        key: &ActivationKey,
        operation: Option<OperationId>,
        reason: impl Into<String>,
    ) -> RejectionOutcome {
        let reason = reason.into();
        self.with_state(key, |state| match state {
            ActivationState::Activated { .. } => RejectionOutcome::AlreadyActivated,
            ActivationState::ActivationPending { in_flight } => {
                if let Some(op) = operation {
                    in_flight.remove(&op);
                }
                if in_flight.is_empty() {
                    tracing::warn!(account = %key.account, %reason, "activation rejected");
                    *state = ActivationState::ActivationRejected { reason };
                    RejectionOutcome::Rejected
                } else {
                    RejectionOutcome::StillPending
                }
            }
            _ => {
                tracing::warn!(account = %key.account, %reason, "activation rejected");
                *state = ActivationState::ActivationRejected { reason };
                RejectionOutcome::Rejected
            }
        })
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_core::ChainId;
    use std::thread;

    fn key(n: u8) -> ActivationKey {
        ActivationKey::new(
            SmartAccountHandle::new(ChainId::BASE, Address::from_bytes([n; 20])),
            Address::from_bytes([0x22; 20]),
            GrantId::from_bytes([n; 32]),
        )
    }

    fn op(n: u8) -> OperationId {
        OperationId::from_bytes([n; 32])
    }

    #[test]
    fn test_unknown_key_is_ungranted() {
        let tracker = ActivationStateTracker::new();
        assert_eq!(tracker.state(&key(1)), ActivationState::Ungranted);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_happy_path() {
        let tracker = ActivationStateTracker::new();
        let k = key(1);

        assert_eq!(tracker.register_grant(&k), ActivationState::Granted);
        tracker.record_submission(&k, op(1));
        assert!(matches!(
            tracker.state(&k),
            ActivationState::ActivationPending { .. }
        ));
        assert_eq!(
            tracker.complete_activation(&k, op(1)),
            CompletionOutcome::Transitioned
        );
        assert_eq!(
            tracker.state(&k),
            ActivationState::Activated {
                operation: Some(op(1))
            }
        );
    }

    #[test]
    fn test_register_does_not_regress() {
        let tracker = ActivationStateTracker::new();
        let k = key(1);
        tracker.restore_activated(&k);
        tracker.register_grant(&k);
        assert!(tracker.is_activated(&k));
    }

    #[test]
    fn test_rejection_with_other_submission_in_flight() {
        let tracker = ActivationStateTracker::new();
        let k = key(1);
        tracker.register_grant(&k);
        tracker.record_submission(&k, op(1));
        tracker.record_submission(&k, op(2));

        assert_eq!(
            tracker.reject_activation(&k, Some(op(1)), "reverted"),
            RejectionOutcome::StillPending
        );
        assert_eq!(
            tracker.reject_activation(&k, Some(op(2)), "reverted"),
            RejectionOutcome::Rejected
        );
        assert_eq!(
            tracker.state(&k),
            ActivationState::ActivationRejected {
                reason: "reverted".into()
            }
        );

        // A new attempt is allowed after rejection
        tracker.record_submission(&k, op(3));
        assert_eq!(
            tracker.complete_activation(&k, op(3)),
            CompletionOutcome::Transitioned
        );
    }

    #[test]
    fn test_rejection_after_activation_is_informational() {
        let tracker = ActivationStateTracker::new();
        let k = key(1);
        tracker.record_submission(&k, op(1));
        tracker.record_submission(&k, op(2));
        tracker.complete_activation(&k, op(1));

        assert_eq!(
            tracker.reject_activation(&k, Some(op(2)), "nonce reused"),
            RejectionOutcome::AlreadyActivated
        );
        assert!(tracker.is_activated(&k));
    }

    #[test]
    fn test_concurrent_completion_single_transition() {
        let tracker = Arc::new(ActivationStateTracker::new());
        let k = key(7);
        tracker.register_grant(&k);

        let handles: Vec<_> = (0..8u8)
            .map(|i| {
                let tracker = Arc::clone(&tracker);
                thread::spawn(move || {
                    tracker.record_submission(&k, op(i));
                    tracker.complete_activation(&k, op(i))
                })
            })
            .collect();

        let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let transitioned = outcomes
            .iter()
            .filter(|o| **o == CompletionOutcome::Transitioned)
            .count();
        assert_eq!(transitioned, 1);
        assert!(tracker.is_activated(&k));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = ActivationStateTracker::new();
        tracker.register_grant(&key(1));
        tracker.restore_activated(&key(2));
        assert_eq!(tracker.state(&key(1)), ActivationState::Granted);
        assert!(tracker.is_activated(&key(2)));
        assert_eq!(tracker.len(), 2);
    }
}
