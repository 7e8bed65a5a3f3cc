//! In-process signing backends.

use async_trait::async_trait;

use sessionkit_core::{Address, EcdsaSignature, Keccak256Hash, Keypair, SessionCredential};

use crate::error::{ChainError, Result};
use crate::operation::{SignedOperation, UnsignedOperation};
use crate::traits::SigningBackend;

/// Owner signer holding a secp256k1 key in process memory.
#[derive(Debug)]
pub struct LocalSigner {
    keypair: Keypair,
}

impl LocalSigner {
    /// Generate a signer with a fresh random key.
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    pub fn from_keypair(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        Ok(Self {
            keypair: Keypair::from_secret_bytes(secret)?,
        })
    }
}

#[async_trait]
impl SigningBackend for LocalSigner {
    fn address(&self) -> Address {
        self.keypair.address()
    }

    async fn sign_digest(&self, digest: &Keccak256Hash) -> Result<EcdsaSignature> {
        self.keypair
            .sign_digest(digest)
            .map_err(|e| ChainError::Signing(e.to_string()))
    }
}

#[async_trait]
impl SigningBackend for SessionCredential {
    fn address(&self) -> Address {
        SessionCredential::address(self)
    }

    async fn sign_digest(&self, digest: &Keccak256Hash) -> Result<EcdsaSignature> {
        SessionCredential::sign_digest(self, digest).map_err(|e| ChainError::Signing(e.to_string()))
    }
}

/// Sign an operation with any backend.
pub async fn sign_operation<S: SigningBackend + ?Sized>(
    signer: &S,
    operation: UnsignedOperation,
) -> Result<SignedOperation> {
    let digest = operation.digest()?;
    let signature = signer.sign_digest(&digest).await?;
    Ok(operation.seal(signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::OperationBody;
    use sessionkit_core::{ChainId, FeeDesignation, SmartAccountHandle};

    #[tokio::test]
    async fn test_sign_operation_with_session_credential() {
        let credential = SessionCredential::generate();
        let op = UnsignedOperation::new(
            SmartAccountHandle::new(ChainId::BASE, Address::from_bytes([0x01; 20])),
            FeeDesignation::new(Address::ZERO, ChainId::BASE),
            OperationBody::InstallPermissionsModule,
        );
        let signed = sign_operation(&credential, op).await.unwrap();
        assert_eq!(signed.signer().unwrap(), credential.address());
    }

    #[tokio::test]
    async fn test_local_signer_address() {
        let signer = LocalSigner::from_secret_bytes(&[0x42; 32]).unwrap();
        let expected = Keypair::from_secret_bytes(&[0x42; 32]).unwrap().address();
        assert_eq!(signer.address(), expected);
    }
}
