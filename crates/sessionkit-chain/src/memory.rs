//! An in-memory chain for testing.
//!
//! Validates submissions the way a bundler and the account's validator
//! would, then applies effects when an operation is included. Inclusion
//! happens on poll, after a configurable number of pending polls.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use sessionkit_core::{
    keccak256, Action, Address, ChainId, GrantId, OperationId, SmartAccountHandle, UsageMode,
};

use crate::error::{ChainError, RejectReason, Result};
use crate::operation::{OperationBody, OperationStatus, SignedOperation};
use crate::traits::{AccountLookup, AccountResolver, AccountStatus, Broadcaster};

const COUNTERFACTUAL_DOMAIN: &[u8] = b"sessionkit/counterfactual-account/v1";

#[derive(Debug, Clone)]
struct AccountRecord {
    owner: Address,
    permissions_enabled: bool,
    enabled_grants: HashSet<GrantId>,
    grant_nonce: u64,
    executed: Vec<Action>,
}

impl AccountRecord {
    fn new(owner: Address) -> Self {
        Self {
            owner,
            permissions_enabled: false,
            enabled_grants: HashSet::new(),
            grant_nonce: 0,
            executed: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct OperationRecord {
    operation: SignedOperation,
    pending_polls: u32,
    status: OperationStatus,
}

#[derive(Debug, Default)]
struct MemoryChainInner {
    accounts: HashMap<Address, AccountRecord>,
    operations: HashMap<OperationId, OperationRecord>,
    used_nonces: HashSet<(Address, u64)>,
    failing_targets: HashSet<Address>,
    inclusion_delay: u32,
    offline: bool,
}

/// In-memory account resolver and broadcaster for one chain.
#[derive(Debug)]
pub struct MemoryChain {
    chain_id: ChainId,
    inner: Mutex<MemoryChainInner>,
    network_calls: AtomicU64,
}

impl MemoryChain {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            inner: Mutex::new(MemoryChainInner::default()),
            network_calls: AtomicU64::new(0),
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn lock(&self) -> MutexGuard<'_, MemoryChainInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Address the account of `owner` has (or will have) on this chain.
    pub fn counterfactual_address(&self, owner: &Address) -> Address {
        let mut message = COUNTERFACTUAL_DOMAIN.to_vec();
        message.extend_from_slice(&self.chain_id.get().to_be_bytes());
        message.extend_from_slice(owner.as_bytes());
        let digest = keccak256(&message);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest.0[12..]);
        Address::from_bytes(out)
    }

    /// Deploy an account for `owner` without installing the permissions
    /// module.
    pub fn deploy_account(&self, owner: &Address) -> SmartAccountHandle {
        let address = self.counterfactual_address(owner);
        self.lock()
            .accounts
            .entry(address)
            .or_insert_with(|| AccountRecord::new(*owner));
        SmartAccountHandle::new(self.chain_id, address)
    }

    /// Number of polls an operation stays pending before inclusion.
    pub fn set_inclusion_delay(&self, polls: u32) {
        self.lock().inclusion_delay = polls;
    }

    /// Make every call to `target` revert.
    pub fn fail_calls_to(&self, target: Address) {
        self.lock().failing_targets.insert(target);
    }

    /// Simulate a network outage: every call fails with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Total resolve, submit and poll calls made so far.
    pub fn network_calls(&self) -> u64 {
        self.network_calls.load(Ordering::SeqCst)
    }

    /// Number of operations accepted so far.
    pub fn submitted_operations(&self) -> usize {
        self.lock().operations.len()
    }

    /// Calls executed by an account, in inclusion order.
    pub fn executed_calls(&self, account: &SmartAccountHandle) -> Vec<Action> {
        self.lock()
            .accounts
            .get(&account.address)
            .map(|record| record.executed.clone())
            .unwrap_or_default()
    }

    /// Whether a grant is registered on-chain for an account.
    pub fn is_grant_enabled(&self, account: &SmartAccountHandle, grant: &GrantId) -> bool {
        self.lock()
            .accounts
            .get(&account.address)
            .map(|record| record.enabled_grants.contains(grant))
            .unwrap_or(false)
    }

    fn count_call(&self) {
        self.network_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn status_of(&self, address: Address, record: Option<&AccountRecord>, owner: Option<Address>) -> AccountStatus {
        AccountStatus {
            handle: SmartAccountHandle::new(self.chain_id, address),
            owner: record.map(|r| r.owner).or(owner),
            deployed: record.is_some(),
            permissions_enabled: record.map(|r| r.permissions_enabled).unwrap_or(false),
            grant_nonce: record.map(|r| r.grant_nonce).unwrap_or(0),
        }
    }

    /// Check a submission against current account state.
    fn validate(&self, inner: &MemoryChainInner, op: &SignedOperation) -> Result<()> {
        let unsigned = &op.operation;
        let address = unsigned.account.address;

        if unsigned.account.chain_id != self.chain_id {
            return Err(ChainError::rejected(
                RejectReason::UnknownAccount,
                format!("chain {} is not served here", unsigned.account.chain_id),
            ));
        }
        if inner.used_nonces.contains(&(address, unsigned.nonce)) {
            return Err(ChainError::rejected(
                RejectReason::NonceReused,
                format!("nonce {} already used", unsigned.nonce),
            ));
        }

        let signer = op
            .signer()
            .map_err(|e| ChainError::rejected(RejectReason::InvalidSignature, e.to_string()))?;
        let record = inner.accounts.get(&address);

        match &unsigned.body {
            OperationBody::InstallPermissionsModule => {
                let authorized = match record {
                    Some(record) => record.owner == signer,
                    None => self.counterfactual_address(&signer) == address,
                };
                if !authorized {
                    return Err(ChainError::rejected(
                        RejectReason::InvalidSignature,
                        format!("{} is not the owner of {}", signer, address),
                    ));
                }
            }
            OperationBody::Execute { mode, grant, calls } => {
                let record = record.ok_or_else(|| {
                    ChainError::rejected(RejectReason::UnknownAccount, format!("{} is not deployed", address))
                })?;
                if !record.permissions_enabled {
                    return Err(ChainError::rejected(
                        RejectReason::ModuleNotInstalled,
                        format!("{} has no permissions module", address),
                    ));
                }
                if grant.account() != &unsigned.account {
                    return Err(ChainError::rejected(
                        RejectReason::InvalidSignature,
                        "grant belongs to another account",
                    ));
                }
                grant
                    .verify()
                    .map_err(|e| ChainError::rejected(RejectReason::InvalidSignature, e.to_string()))?;
                if grant.owner() != record.owner {
                    return Err(ChainError::rejected(
                        RejectReason::InvalidSignature,
                        "grant not signed by the account owner",
                    ));
                }
                if signer != grant.redeemer() {
                    return Err(ChainError::rejected(
                        RejectReason::InvalidSignature,
                        format!("operation signed by {}, grant redeemer is {}", signer, grant.redeemer()),
                    ));
                }
                if let Some(index) = calls.iter().position(|call| grant.find_policy(call).is_none()) {
                    return Err(ChainError::rejected(
                        RejectReason::PolicyViolation,
                        format!("call {} is outside the grant", index),
                    ));
                }
                if *mode == UsageMode::SubsequentUse {
                    let id = grant.id()?;
                    if !record.enabled_grants.contains(&id) {
                        return Err(ChainError::rejected(
                            RejectReason::PermissionNotEnabled,
                            format!("grant {} is not enabled", id),
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Apply an included operation. Either every effect lands or none does.
    fn include(&self, inner: &mut MemoryChainInner, op: &SignedOperation) -> OperationStatus {
        let unsigned = &op.operation;
        let address = unsigned.account.address;

        match &unsigned.body {
            OperationBody::InstallPermissionsModule => {
                let owner = match op.signer() {
                    Ok(owner) => owner,
                    Err(e) => {
                        return OperationStatus::Failed {
                            reason: e.to_string(),
                            failed_call: None,
                        }
                    }
                };
                let record = inner
                    .accounts
                    .entry(address)
                    .or_insert_with(|| AccountRecord::new(owner));
                record.permissions_enabled = true;
            }
            OperationBody::Execute { mode, grant, calls } => {
                if let Some(index) = calls
                    .iter()
                    .position(|call| inner.failing_targets.contains(&call.target))
                {
                    return OperationStatus::Failed {
                        reason: format!("call to {} reverted", calls[index].target),
                        failed_call: Some(index),
                    };
                }
                let id = match grant.id() {
                    Ok(id) => id,
                    Err(e) => {
                        return OperationStatus::Failed {
                            reason: e.to_string(),
                            failed_call: None,
                        }
                    }
                };
                let Some(record) = inner.accounts.get_mut(&address) else {
                    return OperationStatus::Failed {
                        reason: format!("{} is not deployed", address),
                        failed_call: None,
                    };
                };
                match mode {
                    UsageMode::FirstActivation => {
                        if record.enabled_grants.insert(id) {
                            record.grant_nonce += 1;
                        }
                    }
                    UsageMode::SubsequentUse => {
                        if !record.enabled_grants.contains(&id) {
                            return OperationStatus::Failed {
                                reason: format!("grant {} is not enabled", id),
                                failed_call: None,
                            };
                        }
                    }
                }
                record.executed.extend(calls.iter().cloned());
            }
        }
        OperationStatus::Confirmed { confirmations: 1 }
    }
}

#[async_trait]
impl AccountResolver for MemoryChain {
    async fn resolve(&self, lookup: &AccountLookup) -> Result<AccountStatus> {
        self.count_call();
        let inner = self.lock();
        if inner.offline {
            return Err(ChainError::Transport("network unreachable".into()));
        }

        match lookup {
            AccountLookup::Owner { chain_id, owner } => {
                if *chain_id != self.chain_id {
                    return Err(ChainError::rejected(
                        RejectReason::UnknownAccount,
                        format!("chain {} is not served here", chain_id),
                    ));
                }
                let address = self.counterfactual_address(owner);
                Ok(self.status_of(address, inner.accounts.get(&address), Some(*owner)))
            }
            AccountLookup::Handle(handle) => {
                if handle.chain_id != self.chain_id {
                    return Err(ChainError::rejected(
                        RejectReason::UnknownAccount,
                        format!("chain {} is not served here", handle.chain_id),
                    ));
                }
                Ok(self.status_of(handle.address, inner.accounts.get(&handle.address), None))
            }
        }
    }
}

#[async_trait]
impl Broadcaster for MemoryChain {
    async fn submit(&self, operation: &SignedOperation) -> Result<OperationId> {
        self.count_call();
        let mut inner = self.lock();
        if inner.offline {
            return Err(ChainError::Transport("network unreachable".into()));
        }

        self.validate(&inner, operation)?;

        let id = operation.id()?;
        let unsigned = &operation.operation;
        inner
            .used_nonces
            .insert((unsigned.account.address, unsigned.nonce));
        let pending_polls = inner.inclusion_delay;
        inner.operations.insert(
            id,
            OperationRecord {
                operation: operation.clone(),
                pending_polls,
                status: OperationStatus::Pending,
            },
        );

        tracing::debug!(operation = %id, account = %unsigned.account, "operation accepted");
        Ok(id)
    }

    async fn poll(&self, operation: &OperationId) -> Result<OperationStatus> {
        self.count_call();
        let mut guard = self.lock();
        let inner = &mut *guard;
        if inner.offline {
            return Err(ChainError::Transport("network unreachable".into()));
        }

        let record = inner
            .operations
            .get_mut(operation)
            .ok_or(ChainError::UnknownOperation(*operation))?;

        match &mut record.status {
            OperationStatus::Pending if record.pending_polls > 0 => {
                record.pending_polls -= 1;
                Ok(OperationStatus::Pending)
            }
            OperationStatus::Pending => {
                let signed = record.operation.clone();
                let status = self.include(inner, &signed);
                if let Some(record) = inner.operations.get_mut(operation) {
                    record.status = status.clone();
                }
                Ok(status)
            }
            OperationStatus::Confirmed { confirmations } => {
                *confirmations += 1;
                Ok(record.status.clone())
            }
            OperationStatus::Failed { .. } => Ok(record.status.clone()),
        }
    }
}
