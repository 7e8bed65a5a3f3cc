//! SessionKit: one entry point for the whole delegation lifecycle.
//!
//! Wires the grant protocol and the usage engine to a shared store and
//! activation tracker, and fills in defaults from [`SessionsConfig`].

use std::sync::Arc;

use tokio::time::Instant;

use sessionkit_chain::{AccountStatus, Chain, ExecutionReceipt, SigningBackend, WaitOptions};
use sessionkit_core::{
    Action, Address, OperationId, PermissionGrant, PolicyDescriptor, SmartAccountHandle, UsageMode,
};
use sessionkit_perms::{ActivationKey, ActivationState, ActivationStateTracker};
use sessionkit_store::{CredentialStore, CredentialStoreExt};

use crate::config::{ConfigError, SessionsConfig};
use crate::context::SessionExecutionContext;
use crate::error::{Missing, Phase, Result, SessionError};
use crate::protocol::{PermissionGrantProtocol, PrepareOutcome};
use crate::usage::PermissionUsageEngine;

/// The session-key delegation facade.
///
/// Provides:
/// - Account resolution and session credential provisioning
/// - Prepare and grant on the owner side
/// - Context building, use and receipt waiting on the session side
/// - A queryable activation state per account
pub struct SessionKit<C: Chain, S: CredentialStore> {
    chain: Arc<C>,
    store: Arc<S>,
    tracker: Arc<ActivationStateTracker>,
    config: SessionsConfig,
    protocol: PermissionGrantProtocol<C, S>,
    engine: PermissionUsageEngine<C, S>,
}

impl<C: Chain, S: CredentialStore> SessionKit<C, S> {
    /// Create a kit. The chain and store are shared so callers can keep
    /// their own handles.
    pub fn new(chain: Arc<C>, store: Arc<S>, config: SessionsConfig) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let tracker = Arc::new(ActivationStateTracker::new());
        let protocol = PermissionGrantProtocol::new(chain.clone(), store.clone(), tracker.clone());
        let engine = PermissionUsageEngine::new(chain.clone(), store.clone(), tracker.clone())
            .with_sponsorship(config.sponsorship);
        Ok(Self {
            chain,
            store,
            tracker,
            config,
            protocol,
            engine,
        })
    }

    pub fn config(&self) -> &SessionsConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn chain(&self) -> &C {
        &self.chain
    }

    pub fn protocol(&self) -> &PermissionGrantProtocol<C, S> {
        &self.protocol
    }

    pub fn engine(&self) -> &PermissionUsageEngine<C, S> {
        &self.engine
    }

    fn wait_options(&self, deadline: Option<Instant>) -> WaitOptions {
        WaitOptions {
            deadline,
            ..self.config.wait_options()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Owner side
    // ─────────────────────────────────────────────────────────────────────────

    /// Find the account controlled by `owner` on the default fee chain.
    pub async fn resolve_account(&self, owner: Address) -> Result<AccountStatus> {
        self.protocol
            .resolve_account(self.config.default_fee.chain_id, owner)
            .await
    }

    /// Generate and store a session credential, rotating any previous one.
    pub async fn provision_credential(&self, account: &SmartAccountHandle) -> Result<Address> {
        self.protocol.provision_credential(account).await
    }

    /// Install the permissions module if needed, paying with the default
    /// fee designation.
    pub async fn prepare<O: SigningBackend + ?Sized>(
        &self,
        owner: &O,
        account: &SmartAccountHandle,
    ) -> Result<PrepareOutcome> {
        self.protocol
            .prepare(owner, account, self.config.default_fee, self.config.sponsorship)
            .await
    }

    /// Wait for a prepare operation to confirm or fail.
    pub async fn wait_for_prepare(
        &self,
        account: &SmartAccountHandle,
        operation: &OperationId,
        deadline: Option<Instant>,
    ) -> Result<ExecutionReceipt> {
        self.protocol
            .wait_for_prepare(account, operation, &self.wait_options(deadline))
            .await
    }

    /// Grant `policies` to the stored session credential of `account`.
    pub async fn grant<O: SigningBackend + ?Sized>(
        &self,
        owner: &O,
        account: &SmartAccountHandle,
        policies: Vec<PolicyDescriptor>,
    ) -> Result<PermissionGrant> {
        let redeemer = self
            .stored_address(account, Phase::Grant)
            .await?
            .ok_or(SessionError::NotFound {
                account: *account,
                phase: Phase::Grant,
                missing: Missing::Credential,
            })?;
        self.protocol
            .grant(owner, account, redeemer, self.config.default_fee, policies)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Session side
    // ─────────────────────────────────────────────────────────────────────────

    /// Build an execution context from the stored credential. The owner is
    /// not needed.
    pub async fn build_context(&self, account: &SmartAccountHandle) -> Result<SessionExecutionContext> {
        let credential = self
            .store
            .load_credential(account)
            .await
            .map_err(SessionError::store(*account, Phase::BuildContext))?
            .ok_or(SessionError::NotFound {
                account: *account,
                phase: Phase::BuildContext,
                missing: Missing::Credential,
            })?;
        SessionExecutionContext::build(&*self.chain, *account, credential).await
    }

    async fn stored_grant(&self, account: &SmartAccountHandle, phase: Phase) -> Result<PermissionGrant> {
        self.store
            .load_grant(account)
            .await
            .map_err(SessionError::store(*account, phase))?
            .ok_or(SessionError::NotFound {
                account: *account,
                phase,
                missing: Missing::Grant,
            })
    }

    /// Submit `actions` under the stored grant, paying with the default fee
    /// designation.
    pub async fn use_permission(
        &self,
        context: &SessionExecutionContext,
        mode: UsageMode,
        actions: Vec<Action>,
    ) -> Result<OperationId> {
        let grant = self.stored_grant(context.account(), Phase::Use).await?;
        self.engine
            .use_permission(context, &grant, mode, actions, self.config.default_fee)
            .await
    }

    /// Wait for a use operation, settling activation state. Without a
    /// deadline this waits indefinitely.
    pub async fn wait_for_receipt(
        &self,
        context: &SessionExecutionContext,
        operation: &OperationId,
        deadline: Option<Instant>,
    ) -> Result<ExecutionReceipt> {
        self.engine
            .wait_for_receipt(context, operation, &self.wait_options(deadline))
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────────────────────

    /// Address of the stored session credential. The secret stays in the
    /// store.
    pub async fn session_address(&self, account: &SmartAccountHandle) -> Result<Option<Address>> {
        self.stored_address(account, Phase::Query).await
    }

    async fn stored_address(&self, account: &SmartAccountHandle, phase: Phase) -> Result<Option<Address>> {
        self.store
            .credential_address(account)
            .await
            .map_err(SessionError::store(*account, phase))
    }

    /// Activation state of the stored grant for the stored credential.
    ///
    /// `Ungranted` when either is missing. Durable activation flags are
    /// folded in, so a fresh process reports `Activated` for grants
    /// activated earlier.
    pub async fn activation_state(&self, account: &SmartAccountHandle) -> Result<ActivationState> {
        let Some(redeemer) = self.session_address(account).await? else {
            return Ok(ActivationState::Ungranted);
        };
        let grant = match self.stored_grant(account, Phase::Query).await {
            Ok(grant) => grant,
            Err(SessionError::NotFound { .. }) => return Ok(ActivationState::Ungranted),
            Err(e) => return Err(e),
        };
        if grant.redeemer() != redeemer {
            // The credential was rotated after the grant was issued.
            return Ok(ActivationState::Ungranted);
        }

        let grant_id = grant.id().map_err(SessionError::core(*account, Phase::Query))?;
        let key = ActivationKey::new(*account, redeemer, grant_id);
        if !self.tracker.is_activated(&key) {
            let stored = self
                .store
                .is_activated(account, &redeemer, &grant_id)
                .await
                .map_err(SessionError::store(*account, Phase::Query))?;
            if stored {
                self.tracker.restore_activated(&key);
            } else {
                self.tracker.register_grant(&key);
            }
        }
        Ok(self.tracker.state(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ApiKey;
    use sessionkit_chain::{LocalSigner, MemoryChain};
    use sessionkit_core::{ChainId, FeeDesignation, Selector};
    use sessionkit_store::MemoryStore;

    const TARGET: Address = Address::from_bytes([0xaa; 20]);

    fn config() -> SessionsConfig {
        let mut config = SessionsConfig::new(
            "memory://rpc",
            "memory://bundler",
            ApiKey::new("test"),
            FeeDesignation::new(Address::from_bytes([0xfe; 20]), ChainId::BASE),
        );
        config.poll_interval_ms = 1;
        config
    }

    fn kit() -> SessionKit<MemoryChain, MemoryStore> {
        SessionKit::new(
            Arc::new(MemoryChain::new(ChainId::BASE)),
            Arc::new(MemoryStore::new()),
            config(),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = config();
        config.rpc_url.clear();
        let result = SessionKit::new(
            Arc::new(MemoryChain::new(ChainId::BASE)),
            Arc::new(MemoryStore::new()),
            config,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_context_without_credential() {
        let kit = kit();
        let account = kit.chain().deploy_account(&Address::from_bytes([0x0b; 20]));
        let result = kit.build_context(&account).await;
        assert!(matches!(
            result,
            Err(SessionError::NotFound {
                missing: Missing::Credential,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_use_without_grant() {
        let kit = kit();
        let account = kit.chain().deploy_account(&Address::from_bytes([0x0b; 20]));
        kit.provision_credential(&account).await.unwrap();
        let context = kit.build_context(&account).await.unwrap();

        let action = Action::call(ChainId::BASE, TARGET, Selector::from_signature("incrementCount()"), &[]);
        let result = kit
            .use_permission(&context, UsageMode::FirstActivation, vec![action])
            .await;
        assert!(matches!(
            result,
            Err(SessionError::NotFound {
                missing: Missing::Grant,
                phase: Phase::Use,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_activation_state_follows_lifecycle() {
        let kit = kit();
        let owner = LocalSigner::generate();
        let account = kit.resolve_account(owner.address()).await.unwrap().handle;
        assert_eq!(kit.activation_state(&account).await.unwrap(), ActivationState::Ungranted);

        let PrepareOutcome::Submitted(op) = kit.prepare(&owner, &account).await.unwrap() else {
            panic!("expected a submission");
        };
        kit.wait_for_prepare(&account, &op, None).await.unwrap();

        kit.provision_credential(&account).await.unwrap();
        let policy = PolicyDescriptor::unrestricted(
            ChainId::BASE,
            TARGET,
            Selector::from_signature("incrementCount()"),
        );
        kit.grant(&owner, &account, vec![policy]).await.unwrap();
        assert_eq!(kit.activation_state(&account).await.unwrap(), ActivationState::Granted);

        let context = kit.build_context(&account).await.unwrap();
        let action = Action::call(ChainId::BASE, TARGET, Selector::from_signature("incrementCount()"), &[]);
        let op = kit
            .use_permission(&context, UsageMode::FirstActivation, vec![action])
            .await
            .unwrap();
        kit.wait_for_receipt(&context, &op, None).await.unwrap();
        assert!(kit.activation_state(&account).await.unwrap().is_activated());

        // Rotating the credential orphans the grant.
        kit.provision_credential(&account).await.unwrap();
        assert_eq!(kit.activation_state(&account).await.unwrap(), ActivationState::Ungranted);
    }

    #[tokio::test]
    async fn test_lookup_errors_carry_caller_phase() {
        use sessionkit_store::{SealingKey, SqliteStore};

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.db");
        let account = SmartAccountHandle::new(ChainId::BASE, Address::from_bytes([0x0c; 20]));
        SqliteStore::open(&path, SealingKey::from_bytes([0x01; 32]))
            .unwrap()
            .provision(&account)
            .await
            .unwrap();

        // The wrong sealing key makes every credential read fail.
        let store = SqliteStore::open(&path, SealingKey::from_bytes([0x02; 32])).unwrap();
        let kit = SessionKit::new(
            Arc::new(MemoryChain::new(ChainId::BASE)),
            Arc::new(store),
            config(),
        )
        .unwrap();

        for result in [
            kit.activation_state(&account).await.map(|_| ()),
            kit.session_address(&account).await.map(|_| ()),
        ] {
            assert!(matches!(
                result,
                Err(SessionError::Store {
                    phase: Phase::Query,
                    ..
                })
            ));
        }
        let owner = LocalSigner::generate();
        assert!(matches!(
            kit.grant(&owner, &account, Vec::new()).await,
            Err(SessionError::Store {
                phase: Phase::Grant,
                ..
            })
        ));
    }
}
