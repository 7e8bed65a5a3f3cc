//! Execution context bound to a session credential.

use std::fmt;

use sessionkit_chain::{AccountLookup, AccountResolver, AccountStatus};
use sessionkit_core::{Address, SessionCredential, SmartAccountHandle};

use crate::error::{Phase, Result, SessionError};

/// A deployed account plus the session credential that acts for it.
///
/// Built from the handle and a stored credential alone; the owner takes no
/// part. The credential's secret lives exactly as long as the context.
pub struct SessionExecutionContext {
    status: AccountStatus,
    credential: SessionCredential,
}

impl SessionExecutionContext {
    /// Resolve `account` and bind `credential` to it.
    ///
    /// Fails with `AccountUnresolved` when no account is deployed at the
    /// handle.
    pub async fn build<R: AccountResolver + ?Sized>(
        resolver: &R,
        account: SmartAccountHandle,
        credential: SessionCredential,
    ) -> Result<Self> {
        let status = resolver
            .resolve(&AccountLookup::Handle(account))
            .await
            .map_err(SessionError::chain(account, Phase::BuildContext))?;

        if !status.deployed {
            return Err(SessionError::AccountUnresolved {
                account,
                phase: Phase::BuildContext,
            });
        }

        tracing::debug!(
            account = %account,
            redeemer = %credential.address(),
            "session context built"
        );
        Ok(Self { status, credential })
    }

    pub fn account(&self) -> &SmartAccountHandle {
        &self.status.handle
    }

    /// Address of the session credential.
    pub fn redeemer(&self) -> Address {
        self.credential.address()
    }

    /// Account status observed when the context was built.
    pub fn status(&self) -> &AccountStatus {
        &self.status
    }

    pub(crate) fn credential(&self) -> &SessionCredential {
        &self.credential
    }
}

impl fmt::Debug for SessionExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionExecutionContext")
            .field("account", &self.status.handle)
            .field("redeemer", &self.credential.address())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_chain::{LocalSigner, MemoryChain, SigningBackend};
    use sessionkit_core::ChainId;

    #[tokio::test]
    async fn test_undeployed_account_unresolved() {
        let chain = MemoryChain::new(ChainId::BASE);
        let owner = LocalSigner::generate();
        let account =
            SmartAccountHandle::new(ChainId::BASE, chain.counterfactual_address(&owner.address()));

        let result =
            SessionExecutionContext::build(&chain, account, SessionCredential::generate()).await;
        assert!(matches!(
            result,
            Err(SessionError::AccountUnresolved {
                phase: Phase::BuildContext,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_build_without_owner() {
        let chain = MemoryChain::new(ChainId::BASE);
        let account = chain.deploy_account(&Address::from_bytes([0x0b; 20]));
        let credential = SessionCredential::generate();
        let redeemer = credential.address();

        let context = SessionExecutionContext::build(&chain, account, credential)
            .await
            .unwrap();
        assert_eq!(context.account(), &account);
        assert_eq!(context.redeemer(), redeemer);

        let debug = format!("{:?}", context);
        assert!(debug.contains("redeemer"));
    }

    #[tokio::test]
    async fn test_offline_is_transient() {
        let chain = MemoryChain::new(ChainId::BASE);
        let account = chain.deploy_account(&Address::from_bytes([0x0b; 20]));
        chain.set_offline(true);

        let result =
            SessionExecutionContext::build(&chain, account, SessionCredential::generate()).await;
        assert!(matches!(
            result,
            Err(SessionError::TransientNetworkFailure { .. })
        ));
    }
}
