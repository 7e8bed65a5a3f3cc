//! Operation envelopes: what gets signed, submitted and polled.

use serde::{Deserialize, Serialize};

use sessionkit_core::{
    keccak256, Action, Address, EcdsaSignature, FeeDesignation, Keccak256Hash, OperationId,
    PermissionGrant, SmartAccountHandle, UsageMode,
};

use crate::error::{ChainError, Result};

/// Domain separator prepended to the encoded operation before hashing.
pub const OPERATION_DOMAIN: &[u8] = b"sessionkit/operation/v1";

/// What an operation does once included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationBody {
    /// Deploy the account if needed and install the permission-validation
    /// module. Signed by the owner.
    InstallPermissionsModule,

    /// Run calls under a grant. Signed by the grant's redeemer.
    /// `FirstActivation` also registers the grant, atomically with the calls.
    Execute {
        mode: UsageMode,
        grant: PermissionGrant,
        calls: Vec<Action>,
    },
}

/// An operation awaiting its signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedOperation {
    pub account: SmartAccountHandle,

    /// Random per submission.
    pub nonce: u64,

    /// Token and chain that pay for the operation. Authoritative.
    pub fee: FeeDesignation,

    /// Hint that a third party covers fees.
    pub sponsored: bool,

    pub body: OperationBody,
}

impl UnsignedOperation {
    /// Create an operation with a fresh random nonce.
    pub fn new(account: SmartAccountHandle, fee: FeeDesignation, body: OperationBody) -> Self {
        Self {
            account,
            nonce: rand::random(),
            fee,
            sponsored: false,
            body,
        }
    }

    pub fn sponsored(mut self, sponsored: bool) -> Self {
        self.sponsored = sponsored;
        self
    }

    /// Encode to CBOR bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf).map_err(|e| ChainError::Encoding(e.to_string()))?;
        Ok(buf)
    }

    /// The digest the signer must sign.
    pub fn digest(&self) -> Result<Keccak256Hash> {
        let mut message = OPERATION_DOMAIN.to_vec();
        message.extend_from_slice(&self.to_bytes()?);
        Ok(keccak256(&message))
    }

    pub fn seal(self, signature: EcdsaSignature) -> SignedOperation {
        SignedOperation {
            operation: self,
            signature,
        }
    }
}

/// A signed operation, ready for a broadcaster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOperation {
    pub operation: UnsignedOperation,
    pub signature: EcdsaSignature,
}

impl SignedOperation {
    /// Recover the address that signed this operation.
    pub fn signer(&self) -> Result<Address> {
        Ok(self.signature.recover(&self.operation.digest()?)?)
    }

    /// Identifier of this submission: keccak over the digest and signature.
    pub fn id(&self) -> Result<OperationId> {
        let mut message = self.operation.digest()?.0.to_vec();
        message.extend_from_slice(self.signature.as_bytes());
        Ok(OperationId::from_bytes(keccak256(&message).0))
    }
}

/// Status reported by a broadcaster for a submitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    /// Not yet included.
    Pending,
    /// Included, with this many confirmations so far.
    Confirmed { confirmations: u32 },
    /// Included and reverted. `failed_call` names the sub-action, if known.
    Failed {
        reason: String,
        failed_call: Option<usize>,
    },
}

/// Terminal status of an operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Confirmed { confirmations: u32 },
    Failed {
        reason: String,
        failed_call: Option<usize>,
    },
}

/// Outcome of a submitted operation. A failed status is a value, not an
/// error, so callers can inspect which call failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub operation: OperationId,
    pub status: ReceiptStatus,
}

impl ExecutionReceipt {
    pub fn is_confirmed(&self) -> bool {
        matches!(self.status, ReceiptStatus::Confirmed { .. })
    }

    /// Index of the call that reverted, for failed receipts.
    pub fn failed_call(&self) -> Option<usize> {
        match &self.status {
            ReceiptStatus::Failed { failed_call, .. } => *failed_call,
            ReceiptStatus::Confirmed { .. } => None,
        }
    }

    /// Revert reason, for failed receipts.
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ReceiptStatus::Failed { reason, .. } => Some(reason),
            ReceiptStatus::Confirmed { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sessionkit_core::{ChainId, Keypair};

    fn install_op() -> UnsignedOperation {
        UnsignedOperation::new(
            SmartAccountHandle::new(ChainId::BASE, Address::from_bytes([0x01; 20])),
            FeeDesignation::new(Address::from_bytes([0x02; 20]), ChainId::BASE),
            OperationBody::InstallPermissionsModule,
        )
    }

    #[test]
    fn test_signer_recovery() {
        let keypair = Keypair::from_secret_bytes(&[0x42; 32]).unwrap();
        let op = install_op();
        let signature = keypair.sign_digest(&op.digest().unwrap()).unwrap();
        let signed = op.seal(signature);
        assert_eq!(signed.signer().unwrap(), keypair.address());
    }

    #[test]
    fn test_nonces_differ() {
        let a = install_op();
        let b = install_op();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.digest().unwrap(), b.digest().unwrap());
    }

    #[test]
    fn test_sponsorship_is_signed() {
        let op = install_op();
        let sponsored = op.clone().sponsored(true);
        assert_ne!(op.digest().unwrap(), sponsored.digest().unwrap());
    }

    #[test]
    fn test_failed_receipt_accessors() {
        let receipt = ExecutionReceipt {
            operation: OperationId::from_bytes([0x01; 32]),
            status: ReceiptStatus::Failed {
                reason: "reverted".into(),
                failed_call: Some(1),
            },
        };
        assert!(!receipt.is_confirmed());
        assert_eq!(receipt.failed_call(), Some(1));
        assert_eq!(receipt.failure_reason(), Some("reverted"));
    }
}
