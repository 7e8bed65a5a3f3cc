//! Session credentials: disposable keys that act for an account within a grant.

use std::fmt;
use zeroize::Zeroizing;

use crate::crypto::{EcdsaSignature, Keccak256Hash, Keypair};
use crate::error::Result;
use crate::types::Address;

/// An ephemeral secp256k1 keypair, independent of the owner's keys.
///
/// The public address is the grant's "redeemer". The secret is wiped on drop
/// and never appears in `Debug` output.
pub struct SessionCredential {
    keypair: Keypair,
}

impl SessionCredential {
    /// Generate a fresh credential, uniform over the key space.
    pub fn generate() -> Self {
        Self {
            keypair: Keypair::generate(),
        }
    }

    /// Rebuild a credential from persisted secret bytes.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        Ok(Self {
            keypair: Keypair::from_secret_bytes(secret)?,
        })
    }

    /// The redeemer address.
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn sign_digest(&self, digest: &Keccak256Hash) -> Result<EcdsaSignature> {
        self.keypair.sign_digest(digest)
    }

    /// Secret bytes for persistence. The buffer is wiped when dropped.
    pub fn expose_secret(&self) -> Zeroizing<[u8; 32]> {
        self.keypair.secret_bytes()
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCredential")
            .field("address", &self.address())
            .field("secret", &"<redacted>")
            .finish()
    }
}
