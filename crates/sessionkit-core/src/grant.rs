//! Permission grants: the owner-signed artifact delegating policies to a
//! session credential.
//!
//! A grant is immutable once sealed. Its signature covers the canonical
//! encoding of every content field, so any mutation is detected by
//! [`PermissionGrant::verify`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::canonical::{canonical_content_bytes, canonical_grant_bytes};
use crate::crypto::{keccak256, Blake3Hash, EcdsaSignature, Keccak256Hash, Keypair};
use crate::error::{CoreError, Result};
use crate::policy::{Action, PolicyDescriptor};
use crate::types::{hexbytes, parse_hex_fixed, Address, FeeDesignation, SmartAccountHandle};

/// The current grant schema version.
pub const GRANT_VERSION: u8 = 1;

/// Domain separator prepended to the canonical content before hashing.
pub const GRANT_DOMAIN: &[u8] = b"sessionkit/permission-grant/v1";

/// Content-addressed identifier of a sealed grant (Blake3 over its
/// canonical bytes, signature included).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GrantId(#[serde(with = "hexbytes")] pub [u8; 32]);

impl GrantId {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        parse_hex_fixed(s).map(Self)
    }
}

impl fmt::Debug for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GrantId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for GrantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

/// Everything the owner signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantContent {
    /// Schema version.
    pub version: u8,

    /// The account whose authority is delegated.
    pub account: SmartAccountHandle,

    /// The owner that signed the grant.
    pub owner: Address,

    /// The session credential's address.
    pub redeemer: Address,

    /// Fee token and chain used when the grant is exercised.
    pub fee: FeeDesignation,

    /// Account-level grant nonce at signing time.
    pub nonce: u64,

    /// Ordered, non-empty set of authorized actions.
    pub policies: Vec<PolicyDescriptor>,
}

/// A sealed permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionGrant {
    pub content: GrantContent,
    pub signature: EcdsaSignature,
}

/// Builder for grant content.
#[derive(Debug, Clone)]
pub struct GrantBuilder {
    account: SmartAccountHandle,
    owner: Address,
    redeemer: Address,
    fee: FeeDesignation,
    nonce: u64,
    policies: Vec<PolicyDescriptor>,
}

impl GrantBuilder {
    pub fn new(
        account: SmartAccountHandle,
        owner: Address,
        redeemer: Address,
        fee: FeeDesignation,
    ) -> Self {
        Self {
            account,
            owner,
            redeemer,
            fee,
            nonce: 0,
            policies: Vec::new(),
        }
    }

    pub fn nonce(mut self, nonce: u64) -> Self {
        self.nonce = nonce;
        self
    }

    /// Append one descriptor. Order is preserved.
    pub fn policy(mut self, descriptor: PolicyDescriptor) -> Self {
        self.policies.push(descriptor);
        self
    }

    pub fn policies(mut self, descriptors: impl IntoIterator<Item = PolicyDescriptor>) -> Self {
        self.policies.extend(descriptors);
        self
    }

    /// Finish the content. Fails if no descriptor was supplied.
    pub fn build(self) -> Result<UnsignedGrant> {
        if self.policies.is_empty() {
            return Err(CoreError::EmptyPolicySet);
        }
        Ok(UnsignedGrant {
            content: GrantContent {
                version: GRANT_VERSION,
                account: self.account,
                owner: self.owner,
                redeemer: self.redeemer,
                fee: self.fee,
                nonce: self.nonce,
                policies: self.policies,
            },
        })
    }
}

/// Grant content awaiting the owner's signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedGrant {
    content: GrantContent,
}

impl UnsignedGrant {
    pub fn content(&self) -> &GrantContent {
        &self.content
    }

    /// The digest the owner must sign.
    pub fn digest(&self) -> Result<Keccak256Hash> {
        content_digest(&self.content)
    }

    /// Attach a signature produced elsewhere (e.g. a wallet backend).
    pub fn seal(self, signature: EcdsaSignature) -> PermissionGrant {
        PermissionGrant {
            content: self.content,
            signature,
        }
    }

    /// Sign with a local keypair and seal.
    pub fn sign(self, owner: &Keypair) -> Result<PermissionGrant> {
        let signature = owner.sign_digest(&self.digest()?)?;
        Ok(self.seal(signature))
    }
}

fn content_digest(content: &GrantContent) -> Result<Keccak256Hash> {
    let mut message = GRANT_DOMAIN.to_vec();
    message.extend_from_slice(&canonical_content_bytes(content)?);
    Ok(keccak256(&message))
}

impl PermissionGrant {
    pub fn account(&self) -> &SmartAccountHandle {
        &self.content.account
    }

    pub fn owner(&self) -> Address {
        self.content.owner
    }

    pub fn redeemer(&self) -> Address {
        self.content.redeemer
    }

    pub fn fee(&self) -> &FeeDesignation {
        &self.content.fee
    }

    pub fn policies(&self) -> &[PolicyDescriptor] {
        &self.content.policies
    }

    /// Recompute the digest the owner signed.
    pub fn digest(&self) -> Result<Keccak256Hash> {
        content_digest(&self.content)
    }

    /// Check structure and that the owner signed exactly this content.
    pub fn verify(&self) -> Result<()> {
        if self.content.version != GRANT_VERSION {
            return Err(CoreError::UnsupportedVersion(self.content.version));
        }
        if self.content.policies.is_empty() {
            return Err(CoreError::EmptyPolicySet);
        }
        let recovered = self.signature.recover(&self.digest()?)?;
        if recovered != self.content.owner {
            return Err(CoreError::GrantSignerMismatch {
                expected: self.content.owner,
                recovered,
            });
        }
        Ok(())
    }

    /// Content address of the sealed grant.
    pub fn id(&self) -> Result<GrantId> {
        let bytes = canonical_grant_bytes(self)?;
        Ok(GrantId(Blake3Hash::hash(&bytes).0))
    }

    /// Find the first descriptor authorizing `action`.
    pub fn find_policy(&self, action: &Action) -> Option<(usize, &PolicyDescriptor)> {
        self.content
            .policies
            .iter()
            .enumerate()
            .find(|(_, d)| d.matches(action))
    }

    /// Serialize to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| CoreError::EncodingError(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize from CBOR bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))
    }

    /// Serialize to JSON. Chain ids are written as decimal strings.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| CoreError::EncodingError(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::DecodingError(e.to_string()))
    }
}
