//! Test fixtures and helpers.
//!
//! Common setup code for scenario tests: an in-memory chain, a store, an
//! owner and a kit wired together.

use std::sync::Arc;

use sessionkit::{ApiKey, PrepareOutcome, Result, SessionKit, SessionsConfig};
use sessionkit_chain::{LocalSigner, MemoryChain, SigningBackend};
use sessionkit_core::{
    Action, Address, ChainId, FeeDesignation, PermissionGrant, PolicyDescriptor, Selector,
    SmartAccountHandle,
};
use sessionkit_store::{CredentialStore, MemoryStore};

/// First granted contract.
pub const TARGET_A: Address = Address::from_bytes([0xa0; 20]);

/// Second granted contract.
pub const TARGET_B: Address = Address::from_bytes([0xb0; 20]);

/// A contract no grant covers.
pub const UNLISTED_TARGET: Address = Address::from_bytes([0xee; 20]);

/// Token used for fees in fixtures.
pub const FEE_TOKEN: Address = Address::from_bytes([0xfe; 20]);

pub fn selector_x() -> Selector {
    Selector::from_signature("incrementCount()")
}

pub fn selector_y() -> Selector {
    Selector::from_signature("transfer(address,uint256)")
}

/// Config with a 1ms poll interval.
pub fn fast_config() -> SessionsConfig {
    let mut config = SessionsConfig::new(
        "memory://rpc",
        "memory://bundler",
        ApiKey::new("testkit"),
        FeeDesignation::new(FEE_TOKEN, ChainId::BASE),
    );
    config.poll_interval_ms = 1;
    config
}

/// Descriptor for `TARGET_A.incrementCount()`.
pub fn policy_ax() -> PolicyDescriptor {
    PolicyDescriptor::unrestricted(ChainId::BASE, TARGET_A, selector_x())
}

/// Descriptor for `TARGET_B.transfer(address,uint256)`.
pub fn policy_by() -> PolicyDescriptor {
    PolicyDescriptor::unrestricted(ChainId::BASE, TARGET_B, selector_y())
}

pub fn action_ax() -> Action {
    Action::call(ChainId::BASE, TARGET_A, selector_x(), &[])
}

pub fn action_by() -> Action {
    let mut args = vec![0u8; 64];
    args[31] = 0x01;
    args[63] = 0x2a;
    Action::call(ChainId::BASE, TARGET_B, selector_y(), &args)
}

pub fn action_unlisted() -> Action {
    Action::call(ChainId::BASE, UNLISTED_TARGET, selector_x(), &[])
}

/// A chain, a store, an owner and a kit over them.
pub struct TestFixture<S: CredentialStore = MemoryStore> {
    pub chain: Arc<MemoryChain>,
    pub store: Arc<S>,
    pub owner: LocalSigner,
    pub kit: SessionKit<MemoryChain, S>,
}

impl TestFixture<MemoryStore> {
    /// Create a fixture with a random owner and an in-memory store.
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()))
    }
}

impl Default for TestFixture<MemoryStore> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: CredentialStore> TestFixture<S> {
    /// Create a fixture over an existing store and a fresh chain.
    pub fn with_store(store: Arc<S>) -> Self {
        Self::with_parts(
            Arc::new(MemoryChain::new(ChainId::BASE)),
            store,
            LocalSigner::generate(),
        )
    }

    /// Create a fixture from explicit parts, e.g. to simulate a restart.
    pub fn with_parts(chain: Arc<MemoryChain>, store: Arc<S>, owner: LocalSigner) -> Self {
        let kit = SessionKit::new(chain.clone(), store.clone(), fast_config())
            .expect("fixture config is valid");
        Self {
            chain,
            store,
            owner,
            kit,
        }
    }

    /// The owner's account, deployed or not.
    pub fn account(&self) -> SmartAccountHandle {
        SmartAccountHandle::new(
            ChainId::BASE,
            self.chain.counterfactual_address(&self.owner.address()),
        )
    }

    /// Resolve, prepare and wait for confirmation.
    pub async fn prepared(&self) -> Result<SmartAccountHandle> {
        let account = self.kit.resolve_account(self.owner.address()).await?.handle;
        if let PrepareOutcome::Submitted(op) = self.kit.prepare(&self.owner, &account).await? {
            self.kit.wait_for_prepare(&account, &op, None).await?;
        }
        Ok(account)
    }

    /// Prepare, provision a credential and grant `policies` to it.
    pub async fn granted(
        &self,
        policies: Vec<PolicyDescriptor>,
    ) -> Result<(SmartAccountHandle, PermissionGrant)> {
        let account = self.prepared().await?;
        self.kit.provision_credential(&account).await?;
        let grant = self.kit.grant(&self.owner, &account, policies).await?;
        Ok((account, grant))
    }

    /// Grant both fixture descriptors (A/x, B/y).
    pub async fn granted_two(&self) -> Result<(SmartAccountHandle, PermissionGrant)> {
        self.granted(vec![policy_ax(), policy_by()]).await
    }
}
