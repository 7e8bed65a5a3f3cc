//! Cryptographic primitives for sessionkit.
//!
//! Wraps secp256k1 ECDSA (the signature scheme smart accounts verify),
//! keccak-256 and Blake3 with strong types.

use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use std::fmt;
use zeroize::{Zeroize, Zeroizing};

use crate::error::{CoreError, Result};
use crate::types::{hexbytes, Address};

/// Compute the keccak-256 hash of the given data.
pub fn keccak256(data: &[u8]) -> Keccak256Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Keccak256Hash(hasher.finalize().into())
}

/// A 32-byte keccak-256 digest. This is what owners and session keys sign.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Keccak256Hash(#[serde(with = "hexbytes")] pub [u8; 32]);

impl Keccak256Hash {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Keccak256Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keccak256({})", &self.to_hex()[..16])
    }
}

/// A 32-byte Blake3 hash, used for local content addressing.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Blake3Hash(#[serde(with = "hexbytes")] pub [u8; 32]);

impl Blake3Hash {
    /// Compute the Blake3 hash of the given data.
    pub fn hash(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Blake3Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Blake3({})", &self.to_hex()[..16])
    }
}

/// A 65-byte recoverable ECDSA signature: `r || s || v` with `v` in {27, 28}.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EcdsaSignature(#[serde(with = "hexbytes")] pub [u8; 65]);

impl EcdsaSignature {
    pub const fn from_bytes(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Recover the address that produced this signature over `digest`.
    pub fn recover(&self, digest: &Keccak256Hash) -> Result<Address> {
        let sig = Signature::try_from(&self.0[..64]).map_err(|_| CoreError::InvalidSignature)?;
        let v = self.0[64];
        let id = match v {
            27 | 28 => v - 27,
            0 | 1 => v,
            _ => return Err(CoreError::InvalidSignature),
        };
        let recovery_id = RecoveryId::try_from(id).map_err(|_| CoreError::InvalidSignature)?;
        let key = VerifyingKey::recover_from_prehash(&digest.0, &sig, recovery_id)
            .map_err(|_| CoreError::InvalidSignature)?;
        address_from_verifying_key(&key)
    }

    /// Check that this signature over `digest` was produced by `expected`.
    pub fn verify(&self, digest: &Keccak256Hash, expected: &Address) -> Result<()> {
        let recovered = self.recover(digest)?;
        if &recovered != expected {
            return Err(CoreError::InvalidSignature);
        }
        Ok(())
    }

    /// The zero signature (invalid, used as placeholder).
    pub const ZERO: Self = Self([0u8; 65]);
}

impl fmt::Debug for EcdsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EcdsaSig({}...)", &self.to_hex()[..16])
    }
}

/// Derive the EVM address of a secp256k1 public key.
pub fn address_from_verifying_key(key: &VerifyingKey) -> Result<Address> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(CoreError::InvalidPublicKey);
    }
    let digest = keccak256(&pubkey[1..]);
    Address::try_from(&digest.0[12..])
}

/// A secp256k1 keypair.
///
/// The signing key is zeroized on drop. `Debug` prints only the address.
pub struct Keypair {
    signing_key: SigningKey,
    address: Address,
}

impl Keypair {
    /// Generate a new random keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::random(&mut rand::rngs::OsRng);
        let address = address_from_verifying_key(signing_key.verifying_key())
            .unwrap_or(Address::ZERO);
        Self {
            signing_key,
            address,
        }
    }

    /// Rebuild a keypair from its 32-byte secret scalar.
    pub fn from_secret_bytes(secret: &[u8; 32]) -> Result<Self> {
        let signing_key =
            SigningKey::from_slice(secret).map_err(|_| CoreError::InvalidSecretKey)?;
        let address = address_from_verifying_key(signing_key.verifying_key())?;
        Ok(Self {
            signing_key,
            address,
        })
    }

    /// The EVM address of the public key.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Sign a 32-byte digest, producing a recoverable signature.
    pub fn sign_digest(&self, digest: &Keccak256Hash) -> Result<EcdsaSignature> {
        let (sig, recovery_id) = self
            .signing_key
            .sign_prehash_recoverable(&digest.0)
            .map_err(|_| CoreError::InvalidSignature)?;
        let mut out = [0u8; 65];
        out[..64].copy_from_slice(&sig.to_bytes());
        out[64] = recovery_id.to_byte() + 27;
        Ok(EcdsaSignature(out))
    }

    /// Copy the secret scalar out into a buffer that is wiped on drop.
    pub fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        let mut field = self.signing_key.to_bytes();
        let mut out = Zeroizing::new([0u8; 32]);
        out.copy_from_slice(&field);
        field.as_mut_slice().zeroize();
        out
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.address)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypair_sign_recover() {
        let keypair = Keypair::generate();
        let digest = keccak256(b"hello world");
        let signature = keypair.sign_digest(&digest).unwrap();

        assert_eq!(signature.recover(&digest).unwrap(), keypair.address());

        // Tampered digest recovers someone else
        let tampered = keccak256(b"hello worlD");
        assert_ne!(signature.recover(&tampered).ok(), Some(keypair.address()));
    }

    #[test]
    fn test_keypair_deterministic_from_secret() {
        let secret = [0x42u8; 32];
        let kp1 = Keypair::from_secret_bytes(&secret).unwrap();
        let kp2 = Keypair::from_secret_bytes(&secret).unwrap();
        assert_eq!(kp1.address(), kp2.address());
        assert_eq!(*kp1.secret_bytes(), secret);
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(Keypair::from_secret_bytes(&[0u8; 32]).is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let secret = [0x42u8; 32];
        let keypair = Keypair::from_secret_bytes(&secret).unwrap();
        let debug = format!("{:?}", keypair);
        assert!(!debug.contains(&hex::encode(secret)));
        assert!(debug.contains(&keypair.address().to_hex()));
    }

    #[test]
    fn test_bad_recovery_byte() {
        let keypair = Keypair::generate();
        let digest = keccak256(b"payload");
        let mut signature = keypair.sign_digest(&digest).unwrap();
        signature.0[64] = 31;
        assert!(matches!(
            signature.recover(&digest),
            Err(CoreError::InvalidSignature)
        ));
    }

    #[test]
    fn test_blake3_hash() {
        let h1 = Blake3Hash::hash(b"test data");
        let h2 = Blake3Hash::hash(b"test data");
        assert_eq!(h1, h2);
        assert_ne!(h1, Blake3Hash::hash(b"different data"));
    }
}
