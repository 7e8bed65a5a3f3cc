//! Sealing of session secrets at rest.
//!
//! Secrets are encrypted with ChaCha20-Poly1305 under a caller-supplied
//! [`SealingKey`]. The owning account is bound in as associated data, so a
//! sealed secret copied onto another account's row fails to open.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use sessionkit_core::SmartAccountHandle;

use crate::error::{Result, StoreError};

const AAD_DOMAIN: &[u8] = b"sessionkit/session-key/v1";

/// A 256-bit key that seals stored session secrets.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SealingKey([u8; 32]);

impl SealingKey {
    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive a key from application key material and a context string.
    pub fn derive(material: &[u8], context: &str) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key("sessionkit-store-v1 sealing key");
        hasher.update(context.as_bytes());
        hasher.update(material);
        Self(*hasher.finalize().as_bytes())
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305> {
        ChaCha20Poly1305::new_from_slice(&self.0).map_err(|e| StoreError::Sealing(e.to_string()))
    }
}

impl fmt::Debug for SealingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SealingKey(<redacted>)")
    }
}

/// Format identifier for sealed secrets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SealFormat {
    /// ChaCha20-Poly1305 with 256-bit key.
    ChaCha20Poly1305 = 1,
}

/// An encrypted 32-byte session secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedSecret {
    pub format: SealFormat,

    /// Unique per sealing.
    pub nonce: [u8; 12],

    /// Ciphertext including the authentication tag.
    pub ciphertext: Vec<u8>,
}

/// Associated data binding a sealed secret to its account.
pub fn account_aad(account: &SmartAccountHandle) -> Vec<u8> {
    let mut aad = AAD_DOMAIN.to_vec();
    aad.extend_from_slice(account.chain_id.to_string().as_bytes());
    aad.push(b':');
    aad.extend_from_slice(account.address.as_bytes());
    aad
}

impl SealedSecret {
    /// Seal a secret for `account`.
    pub fn seal(secret: &[u8; 32], key: &SealingKey, account: &SmartAccountHandle) -> Result<Self> {
        let mut nonce = [0u8; 12];
        rand::thread_rng().fill_bytes(&mut nonce);

        let aad = account_aad(account);
        let ciphertext = key
            .cipher()?
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: secret,
                    aad: &aad,
                },
            )
            .map_err(|_| StoreError::Sealing("encryption failed".into()))?;

        Ok(Self {
            format: SealFormat::ChaCha20Poly1305,
            nonce,
            ciphertext,
        })
    }

    /// Open a secret sealed for `account`.
    pub fn open(&self, key: &SealingKey, account: &SmartAccountHandle) -> Result<Zeroizing<[u8; 32]>> {
        let aad = account_aad(account);
        let plaintext = match self.format {
            SealFormat::ChaCha20Poly1305 => Zeroizing::new(
                key.cipher()?
                    .decrypt(
                        Nonce::from_slice(&self.nonce),
                        Payload {
                            msg: &self.ciphertext,
                            aad: &aad,
                        },
                    )
                    .map_err(|_| {
                        StoreError::Sealing(format!("cannot open secret for account {}", account))
                    })?,
            ),
        };

        if plaintext.len() != 32 {
            return Err(StoreError::InvalidData(format!(
                "sealed secret has length {}, expected 32",
                plaintext.len()
            )));
        }
        let mut secret = Zeroizing::new([0u8; 32]);
        secret.copy_from_slice(&plaintext);
        Ok(secret)
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }
}
