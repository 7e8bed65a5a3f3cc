//! CredentialStore trait: the abstract interface for session persistence.
//!
//! Everything is keyed by [`SmartAccountHandle`]. All persistence stays
//! inside the caller's trust boundary; nothing here talks to the network.

use async_trait::async_trait;

use sessionkit_core::{Address, GrantId, PermissionGrant, SessionCredential, SmartAccountHandle};

use crate::error::Result;

/// Async interface for session credential, grant and activation storage.
///
/// A missing credential or grant is `Ok(None)`: the caller should run the
/// step that produces it.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Credentials
    // ─────────────────────────────────────────────────────────────────────────

    /// Generate a fresh credential. Not persisted.
    fn generate(&self) -> SessionCredential {
        SessionCredential::generate()
    }

    /// Store the credential for `account`, replacing any previous one.
    async fn persist_credential(
        &self,
        account: &SmartAccountHandle,
        credential: &SessionCredential,
    ) -> Result<()>;

    /// Load the credential for `account`.
    async fn load_credential(&self, account: &SmartAccountHandle) -> Result<Option<SessionCredential>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Grants
    // ─────────────────────────────────────────────────────────────────────────

    /// Store the grant for `account` verbatim, replacing any previous one.
    async fn persist_grant(&self, account: &SmartAccountHandle, grant: &PermissionGrant) -> Result<()>;

    /// Load the grant for `account`.
    async fn load_grant(&self, account: &SmartAccountHandle) -> Result<Option<PermissionGrant>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Activation
    // ─────────────────────────────────────────────────────────────────────────

    /// Record that `grant`, redeemed by `redeemer`, is activated on-chain.
    async fn mark_activated(
        &self,
        account: &SmartAccountHandle,
        redeemer: &Address,
        grant: &GrantId,
    ) -> Result<()>;

    async fn is_activated(
        &self,
        account: &SmartAccountHandle,
        redeemer: &Address,
        grant: &GrantId,
    ) -> Result<bool>;
}

/// Convenience operations built on [`CredentialStore`].
#[async_trait]
pub trait CredentialStoreExt: CredentialStore {
    /// Generate and persist a new credential, returning its address.
    ///
    /// Calling this again rotates the credential.
    async fn provision(&self, account: &SmartAccountHandle) -> Result<Address> {
        let credential = self.generate();
        self.persist_credential(account, &credential).await?;
        Ok(credential.address())
    }

    /// Address of the stored credential, without exposing the secret.
    async fn credential_address(&self, account: &SmartAccountHandle) -> Result<Option<Address>> {
        Ok(self.load_credential(account).await?.map(|c| c.address()))
    }
}

impl<T: CredentialStore + ?Sized> CredentialStoreExt for T {}
