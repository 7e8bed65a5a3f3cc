//! Owner-side flow: prepare the account, then grant permissions.
//!
//! Neither phase retries on its own. Prepare submits at most one operation;
//! Grant signs off-chain and submits nothing.

use std::sync::Arc;

use sessionkit_chain::{
    sign_operation, wait_for_receipt, AccountLookup, AccountStatus, Chain, ExecutionReceipt,
    OperationBody, SigningBackend, UnsignedOperation, WaitOptions,
};
use sessionkit_core::{
    Address, ChainId, FeeDesignation, GrantBuilder, OperationId, PermissionGrant,
    PolicyDescriptor, SmartAccountHandle,
};
use sessionkit_perms::{ActivationKey, ActivationStateTracker};
use sessionkit_store::{CredentialStore, CredentialStoreExt};

use crate::error::{Phase, Result, SessionError};

/// Result of [`PermissionGrantProtocol::prepare`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// The permissions module was already installed. Nothing was submitted.
    AlreadyInstalled,
    /// An installation operation was accepted. Wait for its confirmation
    /// before granting.
    Submitted(OperationId),
}

/// Owner-side steps of the delegation lifecycle.
pub struct PermissionGrantProtocol<C: Chain, S: CredentialStore> {
    chain: Arc<C>,
    store: Arc<S>,
    tracker: Arc<ActivationStateTracker>,
}

impl<C: Chain, S: CredentialStore> PermissionGrantProtocol<C, S> {
    pub fn new(chain: Arc<C>, store: Arc<S>, tracker: Arc<ActivationStateTracker>) -> Self {
        Self {
            chain,
            store,
            tracker,
        }
    }

    /// Find the account controlled by `owner` on `chain_id`, deployed or not.
    pub async fn resolve_account(&self, chain_id: ChainId, owner: Address) -> Result<AccountStatus> {
        // Before resolution the owner's handle stands in for the account.
        let subject = SmartAccountHandle::new(chain_id, owner);
        let status = self
            .chain
            .resolve(&AccountLookup::Owner { chain_id, owner })
            .await
            .map_err(SessionError::chain(subject, Phase::Prepare))?;

        tracing::info!(
            account = %status.handle,
            owner = %owner,
            deployed = status.deployed,
            permissions_enabled = status.permissions_enabled,
            "account resolved"
        );
        Ok(status)
    }

    /// Generate and store a session credential for `account`, replacing any
    /// previous one. Returns only the public address.
    pub async fn provision_credential(&self, account: &SmartAccountHandle) -> Result<Address> {
        let redeemer = self
            .store
            .provision(account)
            .await
            .map_err(SessionError::store(*account, Phase::Prepare))?;
        tracing::info!(account = %account, redeemer = %redeemer, "session credential provisioned");
        Ok(redeemer)
    }

    async fn status(&self, account: &SmartAccountHandle, phase: Phase) -> Result<AccountStatus> {
        self.chain
            .resolve(&AccountLookup::Handle(*account))
            .await
            .map_err(SessionError::chain(*account, phase))
    }

    /// Install the permission-validation module on `account` if needed.
    ///
    /// An undeployed account is deployed by the same operation. Rejections
    /// and signing failures surface unchanged.
    pub async fn prepare<O: SigningBackend + ?Sized>(
        &self,
        owner: &O,
        account: &SmartAccountHandle,
        fee: FeeDesignation,
        sponsored: bool,
    ) -> Result<PrepareOutcome> {
        let status = self.status(account, Phase::Prepare).await?;
        if status.permissions_enabled {
            tracing::info!(account = %account, "permissions module already installed");
            return Ok(PrepareOutcome::AlreadyInstalled);
        }
        if let Some(expected) = status.owner {
            if expected != owner.address() {
                return Err(SessionError::precondition(
                    *account,
                    Phase::Prepare,
                    format!("{} does not own the account", owner.address()),
                ));
            }
        }
        if sponsored {
            tracing::debug!(
                account = %account,
                fee_token = %fee.token,
                "sponsorship requested alongside a fee designation; fee designation applies"
            );
        }

        let operation = UnsignedOperation::new(*account, fee, OperationBody::InstallPermissionsModule)
            .sponsored(sponsored);
        let signed = sign_operation(owner, operation)
            .await
            .map_err(SessionError::chain(*account, Phase::Prepare))?;
        let id = self
            .chain
            .submit(&signed)
            .await
            .map_err(SessionError::chain(*account, Phase::Prepare))?;

        tracing::info!(account = %account, operation = %id, "permissions module installation submitted");
        Ok(PrepareOutcome::Submitted(id))
    }

    /// Wait for a prepare operation. A failed receipt is returned, not an
    /// error.
    pub async fn wait_for_prepare(
        &self,
        account: &SmartAccountHandle,
        operation: &OperationId,
        options: &WaitOptions,
    ) -> Result<ExecutionReceipt> {
        let receipt = wait_for_receipt(&*self.chain, operation, options)
            .await
            .map_err(SessionError::chain(*account, Phase::Wait))?;
        if receipt.is_confirmed() {
            tracing::info!(account = %account, operation = %operation, "account prepared");
        } else {
            tracing::warn!(
                account = %account,
                operation = %operation,
                reason = receipt.failure_reason().unwrap_or_default(),
                "prepare failed"
            );
        }
        Ok(receipt)
    }

    /// Sign a grant of `policies` to `redeemer`, persist it and record it as
    /// granted.
    ///
    /// Requires a confirmed prepare. Submits nothing: the grant becomes
    /// active on its first use in first-activation mode.
    pub async fn grant<O: SigningBackend + ?Sized>(
        &self,
        owner: &O,
        account: &SmartAccountHandle,
        redeemer: Address,
        fee: FeeDesignation,
        policies: Vec<PolicyDescriptor>,
    ) -> Result<PermissionGrant> {
        if policies.is_empty() {
            return Err(SessionError::precondition(
                *account,
                Phase::Grant,
                "a grant needs at least one policy descriptor",
            ));
        }

        let status = self.status(account, Phase::Grant).await?;
        if !status.deployed || !status.permissions_enabled {
            return Err(SessionError::precondition(
                *account,
                Phase::Grant,
                "prepare has not been confirmed",
            ));
        }
        if status.owner.is_some_and(|expected| expected != owner.address()) {
            return Err(SessionError::precondition(
                *account,
                Phase::Grant,
                format!("{} does not own the account", owner.address()),
            ));
        }

        let unsigned = GrantBuilder::new(*account, owner.address(), redeemer, fee)
            .nonce(status.grant_nonce)
            .policies(policies)
            .build()
            .map_err(SessionError::core(*account, Phase::Grant))?;
        let digest = unsigned
            .digest()
            .map_err(SessionError::core(*account, Phase::Grant))?;
        let signature = owner
            .sign_digest(&digest)
            .await
            .map_err(SessionError::chain(*account, Phase::Grant))?;
        let grant = unsigned.seal(signature);

        grant.verify().map_err(|source| SessionError::InvalidGrant {
            account: *account,
            phase: Phase::Grant,
            source,
        })?;
        let id = grant
            .id()
            .map_err(SessionError::core(*account, Phase::Grant))?;

        self.store
            .persist_grant(account, &grant)
            .await
            .map_err(SessionError::store(*account, Phase::Grant))?;
        self.tracker
            .register_grant(&ActivationKey::new(*account, redeemer, id));

        tracing::info!(
            account = %account,
            redeemer = %redeemer,
            grant = %id,
            policies = grant.policies().len(),
            "permission granted"
        );
        Ok(grant)
    }
}
