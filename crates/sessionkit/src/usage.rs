//! Using a permission: submitting actions under a session credential and
//! settling activation state when receipts arrive.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use sessionkit_chain::{
    sign_operation, wait_for_receipt, Broadcaster, ChainError, ExecutionReceipt, OperationBody,
    RejectReason, UnsignedOperation, WaitOptions,
};
use sessionkit_core::{Action, FeeDesignation, OperationId, PermissionGrant, UsageMode};
use sessionkit_perms::{
    authorize_actions, ActivationKey, ActivationState, ActivationStateTracker, CompletionOutcome,
    PermsError,
};
use sessionkit_store::CredentialStore;

use crate::context::SessionExecutionContext;
use crate::error::{Phase, Result, SessionError};

/// Bookkeeping for a submission whose receipt has not been seen.
#[derive(Debug, Clone, Copy)]
struct PendingUse {
    key: ActivationKey,
    mode: UsageMode,
}

/// Submits actions under a grant and tracks their confirmation.
pub struct PermissionUsageEngine<B: Broadcaster, S: CredentialStore> {
    broadcaster: Arc<B>,
    store: Arc<S>,
    tracker: Arc<ActivationStateTracker>,
    sponsored: bool,
    pending: Mutex<HashMap<OperationId, PendingUse>>,
}

impl<B: Broadcaster, S: CredentialStore> PermissionUsageEngine<B, S> {
    pub fn new(broadcaster: Arc<B>, store: Arc<S>, tracker: Arc<ActivationStateTracker>) -> Self {
        Self {
            broadcaster,
            store,
            tracker,
            sponsored: false,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Mark submitted operations as sponsored. The fee designation still
    /// applies.
    pub fn with_sponsorship(mut self, sponsored: bool) -> Self {
        self.sponsored = sponsored;
        self
    }

    pub fn tracker(&self) -> &ActivationStateTracker {
        &self.tracker
    }

    /// Operations submitted by this engine whose receipts are still
    /// outstanding.
    ///
    /// An entry is kept until a wait on it settles or [`forget`] drops it.
    /// Callers that never wait on an operation should forget it.
    ///
    /// [`forget`]: Self::forget
    pub fn pending_operations(&self) -> Vec<OperationId> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let mut ops: Vec<_> = pending.keys().copied().collect();
        ops.sort();
        ops
    }

    /// Submit `actions` under `grant`.
    ///
    /// Every action is checked against the grant first; an unauthorized
    /// action fails with `ActionNotAuthorized` and nothing reaches the
    /// network. `SubsequentUse` on a grant not known to be activated fails
    /// with `PermissionNotActivated` without submitting. `FirstActivation`
    /// on an activated grant is allowed but logged.
    pub async fn use_permission(
        &self,
        context: &SessionExecutionContext,
        grant: &PermissionGrant,
        mode: UsageMode,
        actions: Vec<Action>,
        fee: FeeDesignation,
    ) -> Result<OperationId> {
        let account = *context.account();

        if grant.account() != &account {
            return Err(SessionError::precondition(
                account,
                Phase::Use,
                format!("grant belongs to {}", grant.account()),
            ));
        }
        if grant.redeemer() != context.redeemer() {
            return Err(SessionError::precondition(
                account,
                Phase::Use,
                "grant was issued to a different session credential",
            ));
        }
        grant.verify().map_err(|source| SessionError::InvalidGrant {
            account,
            phase: Phase::Use,
            source,
        })?;

        authorize_actions(grant, &actions).map_err(|e| match e {
            PermsError::EmptyActionSet => {
                SessionError::precondition(account, Phase::Use, "no actions supplied")
            }
            PermsError::CoreError(source) => SessionError::Core {
                account,
                phase: Phase::Use,
                source,
            },
            source => SessionError::ActionNotAuthorized {
                account,
                phase: Phase::Use,
                source,
            },
        })?;

        let grant_id = grant.id().map_err(SessionError::core(account, Phase::Use))?;
        let key = ActivationKey::new(account, context.redeemer(), grant_id);
        self.tracker.register_grant(&key);

        // Hydrates the tracker from storage, so a redundant first activation
        // is reported when it is recorded.
        let activated = self.is_activated(&key).await?;
        if mode == UsageMode::SubsequentUse && !activated {
            return Err(SessionError::PermissionNotActivated {
                account,
                phase: Phase::Use,
                grant: grant_id,
            });
        }

        let operation = UnsignedOperation::new(
            account,
            fee,
            OperationBody::Execute {
                mode,
                grant: grant.clone(),
                calls: actions,
            },
        )
        .sponsored(self.sponsored);
        let signed = sign_operation(context.credential(), operation)
            .await
            .map_err(SessionError::chain(account, Phase::Use))?;

        let id = match self.broadcaster.submit(&signed).await {
            Ok(id) => id,
            Err(e) => return Err(self.submission_failed(&key, mode, e)),
        };

        if mode == UsageMode::FirstActivation {
            self.tracker.record_submission(&key, id);
        }
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, PendingUse { key, mode });

        tracing::info!(
            account = %account,
            grant = %grant_id,
            operation = %id,
            mode = %mode,
            "permission use submitted"
        );
        Ok(id)
    }

    /// Whether the grant is activated, consulting durable storage when the
    /// in-memory tracker does not know.
    async fn is_activated(&self, key: &ActivationKey) -> Result<bool> {
        if self.tracker.is_activated(key) {
            return Ok(true);
        }
        let stored = self
            .store
            .is_activated(&key.account, &key.redeemer, &key.grant)
            .await
            .map_err(SessionError::store(key.account, Phase::Use))?;
        if stored {
            self.tracker.restore_activated(key);
        }
        Ok(stored)
    }

    fn submission_failed(&self, key: &ActivationKey, mode: UsageMode, err: ChainError) -> SessionError {
        let account = key.account;
        let ChainError::Rejected { reason, .. } = err else {
            return SessionError::chain(account, Phase::Use)(err);
        };
        match (reason, mode) {
            (RejectReason::PermissionNotEnabled, UsageMode::SubsequentUse) => {
                SessionError::PermissionNotActivated {
                    account,
                    phase: Phase::Use,
                    grant: key.grant,
                }
            }
            (_, UsageMode::FirstActivation) => {
                self.tracker.reject_activation(key, None, reason.to_string());
                SessionError::ActivationRejected {
                    account,
                    phase: Phase::Use,
                    source: err,
                }
            }
            (_, UsageMode::SubsequentUse) => {
                tracing::warn!(account = %account, %reason, "use rejected");
                SessionError::UseRejected {
                    account,
                    phase: Phase::Use,
                    source: err,
                }
            }
        }
    }

    /// Wait for the receipt of an operation submitted through `context`.
    ///
    /// A confirmed first activation moves the grant to `Activated` and is
    /// persisted; a failed one moves it to `ActivationRejected`. A failed
    /// receipt is returned, not an error. When the deadline in `options`
    /// passes, or persisting the activation fails, the operation stays
    /// pending here and a later wait settles it.
    pub async fn wait_for_receipt(
        &self,
        context: &SessionExecutionContext,
        operation: &OperationId,
        options: &WaitOptions,
    ) -> Result<ExecutionReceipt> {
        let account = *context.account();
        let receipt = wait_for_receipt(&*self.broadcaster, operation, options)
            .await
            .map_err(SessionError::chain(account, Phase::Wait))?;

        let pending = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(operation)
            .copied();
        let Some(PendingUse { key, mode }) = pending else {
            tracing::debug!(operation = %operation, "receipt for an untracked operation");
            return Ok(receipt);
        };

        match (mode, receipt.is_confirmed()) {
            (UsageMode::FirstActivation, true) => {
                let outcome = self.tracker.complete_activation(&key, *operation);
                self.persist_activation(&key, outcome).await?;
            }
            (UsageMode::FirstActivation, false) => {
                self.tracker.reject_activation(
                    &key,
                    Some(*operation),
                    receipt.failure_reason().unwrap_or("reverted"),
                );
            }
            (UsageMode::SubsequentUse, true) => {
                tracing::debug!(account = %account, operation = %operation, "permission use confirmed");
            }
            (UsageMode::SubsequentUse, false) => {
                tracing::warn!(
                    account = %account,
                    operation = %operation,
                    failed_call = ?receipt.failed_call(),
                    "permission use failed"
                );
            }
        }

        // Settled. The entry stays until here so a failed write is retried
        // by waiting again.
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(operation);
        Ok(receipt)
    }

    /// Write the durable activation flag for a confirmed activation.
    ///
    /// A confirmation that did not move the tracker still writes the flag
    /// when storage lacks it, e.g. after an earlier write failed.
    async fn persist_activation(&self, key: &ActivationKey, outcome: CompletionOutcome) -> Result<()> {
        if outcome == CompletionOutcome::AlreadyActivated {
            let stored = self
                .store
                .is_activated(&key.account, &key.redeemer, &key.grant)
                .await
                .map_err(SessionError::store(key.account, Phase::Wait))?;
            if stored {
                return Ok(());
            }
            tracing::debug!(account = %key.account, grant = %key.grant, "writing missing activation flag");
        }
        self.store
            .mark_activated(&key.account, &key.redeemer, &key.grant)
            .await
            .map_err(SessionError::store(key.account, Phase::Wait))
    }

    /// Stop tracking `operation` without waiting for it.
    ///
    /// The operation itself is unaffected. A first activation dropped here
    /// is not settled by a later wait; its grant stays pending in this
    /// process until another first activation confirms or the durable flag
    /// is read after a restart. Returns whether the operation was tracked.
    pub fn forget(&self, operation: &OperationId) -> bool {
        let removed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(operation)
            .is_some();
        if removed {
            tracing::debug!(operation = %operation, "stopped tracking operation");
        }
        removed
    }

    /// Current activation state of a grant for the context's credential.
    pub fn activation_state(
        &self,
        context: &SessionExecutionContext,
        grant: &PermissionGrant,
    ) -> Result<ActivationState> {
        let account = *context.account();
        let grant_id = grant.id().map_err(SessionError::core(account, Phase::Use))?;
        Ok(self
            .tracker
            .state(&ActivationKey::new(account, context.redeemer(), grant_id)))
    }
}
