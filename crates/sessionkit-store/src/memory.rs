//! In-memory implementation of the CredentialStore trait.
//!
//! Primarily for testing. Same semantics as SQLite, but everything is lost
//! when the store is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use zeroize::Zeroizing;

use sessionkit_core::{Address, GrantId, PermissionGrant, SessionCredential, SmartAccountHandle};

use crate::error::Result;
use crate::traits::CredentialStore;

/// In-memory store implementation. Thread-safe via RwLock.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Session secrets by account. Wiped when replaced or dropped.
    secrets: HashMap<SmartAccountHandle, Zeroizing<[u8; 32]>>,

    /// Grants by account, as CBOR bytes so loads never share state.
    grants: HashMap<SmartAccountHandle, Vec<u8>>,

    activations: HashSet<(SmartAccountHandle, Address, GrantId)>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("MemoryStore")
            .field("credentials", &inner.secrets.len())
            .field("grants", &inner.grants.len())
            .field("activations", &inner.activations.len())
            .finish()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn persist_credential(
        &self,
        account: &SmartAccountHandle,
        credential: &SessionCredential,
    ) -> Result<()> {
        let secret = credential.expose_secret();
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.secrets.insert(*account, secret);
        Ok(())
    }

    async fn load_credential(&self, account: &SmartAccountHandle) -> Result<Option<SessionCredential>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.secrets.get(account) {
            Some(secret) => Ok(Some(SessionCredential::from_secret_bytes(secret)?)),
            None => Ok(None),
        }
    }

    async fn persist_grant(&self, account: &SmartAccountHandle, grant: &PermissionGrant) -> Result<()> {
        let bytes = grant.to_bytes()?;
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.grants.insert(*account, bytes);
        Ok(())
    }

    async fn load_grant(&self, account: &SmartAccountHandle) -> Result<Option<PermissionGrant>> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.grants.get(account) {
            Some(bytes) => Ok(Some(PermissionGrant::from_bytes(bytes)?)),
            None => Ok(None),
        }
    }

    async fn mark_activated(
        &self,
        account: &SmartAccountHandle,
        redeemer: &Address,
        grant: &GrantId,
    ) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.activations.insert((*account, *redeemer, *grant));
        Ok(())
    }

    async fn is_activated(
        &self,
        account: &SmartAccountHandle,
        redeemer: &Address,
        grant: &GrantId,
    ) -> Result<bool> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        Ok(inner.activations.contains(&(*account, *redeemer, *grant)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::CredentialStoreExt;
    use sessionkit_core::ChainId;

    fn account() -> SmartAccountHandle {
        SmartAccountHandle::new(ChainId::BASE, Address::from_bytes([0x01; 20]))
    }

    #[tokio::test]
    async fn test_missing_credential_is_none() {
        let store = MemoryStore::new();
        assert!(store.load_credential(&account()).await.unwrap().is_none());
        assert!(store.load_grant(&account()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_is_last_write_wins() {
        let store = MemoryStore::new();
        let first = store.provision(&account()).await.unwrap();
        let second = store.provision(&account()).await.unwrap();
        assert_ne!(first, second);

        let loaded = store.load_credential(&account()).await.unwrap().unwrap();
        assert_eq!(loaded.address(), second);
        assert_eq!(
            store.credential_address(&account()).await.unwrap(),
            Some(second)
        );
    }

    #[tokio::test]
    async fn test_activation_flags() {
        let store = MemoryStore::new();
        let redeemer = Address::from_bytes([0x02; 20]);
        let grant = GrantId::from_bytes([0x03; 32]);

        assert!(!store.is_activated(&account(), &redeemer, &grant).await.unwrap());
        store.mark_activated(&account(), &redeemer, &grant).await.unwrap();
        assert!(store.is_activated(&account(), &redeemer, &grant).await.unwrap());

        let other = GrantId::from_bytes([0x04; 32]);
        assert!(!store.is_activated(&account(), &redeemer, &other).await.unwrap());
    }
}
